//! End-to-end scenarios driven through the streaming wrapper.

mod common;

use common::*;
use warpgrain::{SampleRates, StreamProcessor, Stretcher};

#[test]
fn stream_identity_preserves_tone_and_length() {
    let input = gen_sine(440.0, 44100, 44100);
    let output = run_stream_mono(44100, &input, 441, 1.0, 1.0);

    let len = output.len() as f64;
    assert!((len - 44100.0).abs() < 2048.0, "output length {}", len);

    let mid = output.len() / 2;
    let freq = estimate_freq_zero_crossings(&output, 44100, mid - 11025, mid + 11025);
    assert!((freq - 440.0).abs() < 10.0, "dominant frequency {:.1}", freq);
    assert!(rms(&output[mid - 11025..mid + 11025]) > 0.3);
}

#[test]
fn stream_speed_up_shortens_output() {
    let input = gen_sine(440.0, 44100, 44100);
    let output = run_stream_mono(44100, &input, 1024, 1.25, 1.0);

    let expected = 44100.0 / 1.25;
    let len = output.len() as f64;
    assert!(
        (len - expected).abs() < 3000.0,
        "output length {}, expected about {}",
        len,
        expected
    );

    // Speed does not move the pitch.
    let mid = output.len() / 2;
    let freq = estimate_freq_zero_crossings(&output, 44100, mid - 8000, mid + 8000);
    assert!((freq - 440.0).abs() < 12.0, "dominant frequency {:.1}", freq);
}

#[test]
fn stream_pitch_shift_keeps_duration() {
    let input = gen_sine(440.0, 44100, 44100);
    let output = run_stream_mono(44100, &input, 512, 1.0, 2.0);

    let len = output.len() as f64;
    assert!((len - 44100.0).abs() < 3000.0, "output length {}", len);

    let mid = output.len() / 2;
    let segment = &output[mid - 8000..mid + 8000];
    let freq = estimate_freq_zero_crossings(segment, 44100, 0, segment.len());
    assert!(
        (freq - 880.0).abs() < 880.0 * 0.03,
        "dominant frequency {:.1}",
        freq
    );
}

#[test]
fn stream_varying_push_sizes_stay_continuous() {
    let input = gen_sine(330.0, 44100, 44100);
    let frames = input.len();

    let stretcher = Stretcher::new(SampleRates::same(44100), 1, 0).unwrap();
    let max_push = 1000usize;
    let mut stream = StreamProcessor::new(stretcher, max_push);
    let mut scratch = vec![0.0f32; 2 * max_push + 2];
    let mut output = Vec::new();

    // Deterministic xorshift push sizes.
    let mut rng = 0x9e3779b9u32;
    let mut position = 0usize;
    while position < frames {
        rng ^= rng << 13;
        rng ^= rng >> 17;
        rng ^= rng << 5;
        let count = ((rng as usize % max_push) + 1).min(frames - position);
        let slice = &input[position..position + count];
        let rendered = stream.process(
            Some(&[slice]),
            &mut [&mut scratch[..]],
            count,
            count as f64,
            1.0,
        );
        output.extend_from_slice(&scratch[..rendered]);
        position += count;
    }
    // Drain with silence.
    for _ in 0..40 {
        let rendered = stream.process(None, &mut [&mut scratch[..]], 512, 512.0, 1.0);
        output.extend_from_slice(&scratch[..rendered]);
    }

    assert!(output.iter().all(|x| x.is_finite()));
    // The mid-stream audio is a clean continuous tone: no discontinuity
    // spikes beyond the source amplitude.
    let mid = output.len() / 2;
    let segment = &output[mid - 10000..mid + 10000];
    let peak = segment.iter().fold(0.0f32, |m, &x| m.max(x.abs()));
    assert!(peak < 1.2, "peak {}", peak);
    assert!(rms(segment) > 0.3, "rms {}", rms(segment));
    let freq = estimate_freq_zero_crossings(segment, 44100, 0, segment.len());
    assert!((freq - 330.0).abs() < 10.0, "dominant frequency {:.1}", freq);
}

#[test]
fn stream_reports_monotonic_output_position() {
    let input = gen_sine(220.0, 44100, 22050);
    let stretcher = Stretcher::new(SampleRates::same(44100), 1, 0).unwrap();
    let mut stream = StreamProcessor::new(stretcher, 441);
    let mut scratch = vec![0.0f32; 512];

    let mut last = f64::NEG_INFINITY;
    let mut seen = false;
    for chunk in input.chunks(441) {
        stream.process(Some(&[chunk]), &mut [&mut scratch[..]], chunk.len(), chunk.len() as f64, 1.0);
        let position = stream.output_position();
        if position.is_finite() {
            if seen {
                assert!(position >= last, "position regressed: {} -> {}", last, position);
            }
            last = position;
            seen = true;
        }
    }
    assert!(seen, "output position never became finite");
}
