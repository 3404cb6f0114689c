use std::f32::consts::PI;

use warpgrain::{Request, SampleRates, StreamProcessor, Stretcher, CHUNK_BEGIN, CHUNK_END};

pub fn gen_sine(freq_hz: f32, sample_rate: u32, frames: usize) -> Vec<f32> {
    (0..frames)
        .map(|i| (2.0 * PI * freq_hz * i as f32 / sample_rate as f32).sin())
        .collect()
}

/// Goertzel-style probe: normalised energy of `signal` at one frequency.
pub fn energy_at_freq(signal: &[f32], sample_rate: u32, freq_hz: f32) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    let mut re = 0.0f64;
    let mut im = 0.0f64;
    for (i, &s) in signal.iter().enumerate() {
        let angle = 2.0 * std::f64::consts::PI * freq_hz as f64 * i as f64 / sample_rate as f64;
        re += s as f64 * angle.cos();
        im -= s as f64 * angle.sin();
    }
    (re * re + im * im).sqrt() / signal.len() as f64
}

/// Frequency estimate from positive-going zero crossings over
/// `signal[start..end]`. Robust for clean single tones.
pub fn estimate_freq_zero_crossings(signal: &[f32], sample_rate: u32, start: usize, end: usize) -> f64 {
    let end = end.min(signal.len());
    if end <= start + 1 {
        return 0.0;
    }
    let mut crossings = 0usize;
    for i in start..end - 1 {
        if signal[i] <= 0.0 && signal[i + 1] > 0.0 {
            crossings += 1;
        }
    }
    crossings as f64 * sample_rate as f64 / (end - start) as f64
}

pub fn rms(signal: &[f32]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    let sum: f64 = signal.iter().map(|&s| s as f64 * s as f64).sum();
    (sum / signal.len() as f64).sqrt()
}

/// Signal-to-noise ratio in dB between a reference and a test slice of the
/// same length.
pub fn snr_db(reference: &[f32], test: &[f32]) -> f64 {
    let len = reference.len().min(test.len());
    let mut signal = 0.0f64;
    let mut noise = 0.0f64;
    for i in 0..len {
        let r = reference[i] as f64;
        let d = r - test[i] as f64;
        signal += r * r;
        noise += d * d;
    }
    if noise == 0.0 {
        return f64::INFINITY;
    }
    10.0 * (signal / noise).log10()
}

/// Renders planar input through the granular API at constant speed.
pub fn render_granular(
    rates: SampleRates,
    input: &[Vec<f32>],
    speed: f64,
    pitch: f64,
) -> Vec<Vec<f32>> {
    render_granular_ramp(rates, input, pitch, |_| speed).0
}

/// Renders with a per-grain speed schedule. Returns the planar output and
/// the emitted chunk begin positions (for monotonicity checks). Output
/// frames are clipped to input positions in `[0, frames)`.
pub fn render_granular_ramp(
    rates: SampleRates,
    input: &[Vec<f32>],
    pitch: f64,
    mut speed_at: impl FnMut(usize) -> f64,
) -> (Vec<Vec<f32>>, Vec<f64>) {
    let channels = input.len();
    let frames = input[0].len();
    let mut planar = vec![0.0f32; frames * channels];
    for (c, channel) in input.iter().enumerate() {
        planar[c * frames..(c + 1) * frames].copy_from_slice(channel);
    }

    let mut stretcher = Stretcher::new(rates, channels, 0).unwrap();
    let speed0 = speed_at(0);
    let mut request = Request {
        position: if speed0 < 0.0 { frames as f64 } else { 0.0 },
        speed: speed0,
        pitch,
        reset: true,
        ..Request::default()
    };
    stretcher.preroll(&mut request);

    let mut output: Vec<Vec<f32>> = vec![Vec::new(); channels];
    let mut positions = Vec::new();

    for grain in 0..100_000 {
        request.speed = speed_at(grain);
        let chunk = stretcher.specify_grain(&request, 0.0);
        let mute_head = (-chunk.begin).max(0);
        let mute_tail = (chunk.end - frames as i32).max(0);
        let first = chunk.begin + mute_head;

        if mute_head + mute_tail >= chunk.frame_count() {
            stretcher.analyse_grain(None, 0, 0, 0);
        } else {
            stretcher.analyse_grain(Some(&planar[first as usize..]), frames, mute_head, mute_tail);
        }

        let out = stretcher.synthesise_grain();
        let begin = out.request[CHUNK_BEGIN].position;
        let end = out.request[CHUNK_END].position;
        if begin.is_finite() && end.is_finite() {
            positions.push(begin);
            for frame in 0..out.frame_count() {
                let position = out.position_of_frame(frame);
                if position >= 0.0 && position < frames as f64 {
                    for (c, channel) in output.iter_mut().enumerate() {
                        channel.push(out.channel(c)[frame]);
                    }
                }
            }
            let drained = if speed_at(grain) >= 0.0 {
                begin > frames as f64
            } else {
                begin < 0.0
            };
            if drained {
                break;
            }
        }
        drop(out);
        stretcher.next(&mut request);
    }

    (output, positions)
}

/// Renders mono input through the granular API without clipping: every
/// frame of every emitted chunk is collected, the startup region included,
/// for exactly `grain_count` grains.
///
/// With `zero_pad` zero, frames outside the track are declared through the
/// mute counts; with `zero_pad` set, the track is embedded in a buffer of
/// real zeros and supplied in full via `buffer_start_position`. The two
/// spellings describe identical audio, so their renders must agree sample
/// for sample.
pub fn render_granular_unclipped(
    rates: SampleRates,
    input: &[f32],
    speed: f64,
    pitch: f64,
    zero_pad: usize,
    grain_count: usize,
) -> Vec<f32> {
    let frames = input.len();
    let mut stretcher = Stretcher::new(rates, 1, 0).unwrap();

    let mut padded = Vec::new();
    if zero_pad > 0 {
        padded = vec![0.0f32; zero_pad + frames + zero_pad];
        padded[zero_pad..zero_pad + frames].copy_from_slice(input);
    }

    let mut request = Request {
        position: 0.0,
        speed,
        pitch,
        reset: true,
        ..Request::default()
    };
    stretcher.preroll(&mut request);

    let mut output = Vec::new();
    for _ in 0..grain_count {
        if zero_pad > 0 {
            let chunk = stretcher.specify_grain(&request, -(zero_pad as f64));
            assert!(
                chunk.begin >= 0 && chunk.end as usize <= padded.len(),
                "zero_pad too small for chunk {:?}",
                chunk
            );
            stretcher.analyse_grain(
                Some(&padded[chunk.begin as usize..]),
                padded.len(),
                0,
                0,
            );
        } else {
            let chunk = stretcher.specify_grain(&request, 0.0);
            let mute_head = (-chunk.begin).max(0);
            let mute_tail = (chunk.end - frames as i32).max(0);
            let first = chunk.begin + mute_head;
            if mute_head + mute_tail >= chunk.frame_count() {
                stretcher.analyse_grain(None, 0, 0, 0);
            } else {
                stretcher.analyse_grain(
                    Some(&input[first as usize..]),
                    frames,
                    mute_head,
                    mute_tail,
                );
            }
        }

        let out = stretcher.synthesise_grain();
        for frame in 0..out.frame_count() {
            output.push(out.channel(0)[frame]);
        }
        drop(out);
        stretcher.next(&mut request);
    }
    output
}

/// Renders mono input through the streaming wrapper with a fixed push size,
/// clipping output frames to input positions within the track.
pub fn run_stream_mono(
    sample_rate: u32,
    input: &[f32],
    push: usize,
    speed: f64,
    pitch: f64,
) -> Vec<f32> {
    let frames = input.len();
    let stretcher = Stretcher::new(SampleRates::same(sample_rate), 1, 0).unwrap();
    let mut stream = StreamProcessor::new(stretcher, push);
    let max_output = ((push as f64 / speed).ceil() as usize).max(1) + 1;
    let mut scratch = vec![0.0f32; max_output];
    let mut output = Vec::new();
    let mut position = 0usize;

    loop {
        let count = push.min(frames.saturating_sub(position));
        let slice;
        let input_ref = if count > 0 {
            slice = &input[position..position + count];
            Some([slice])
        } else {
            None
        };
        let pushed = if count > 0 { count } else { push };
        let ideal = pushed as f64 / speed;
        let rendered = stream.process(
            input_ref.as_ref().map(|s| &s[..]),
            &mut [&mut scratch[..]],
            pushed,
            ideal,
            pitch,
        );

        let position_end = stream.output_position();
        let position_begin = position_end - rendered as f64 * speed;
        for frame in 0..rendered {
            let input_position = position_begin + frame as f64 * speed;
            if input_position >= 0.0 && input_position < frames as f64 {
                output.push(scratch[frame]);
            }
        }
        position += pushed;

        if position >= frames && position_begin > frames as f64 {
            break;
        }
        if position > frames * 4 + 100 * push {
            panic!("stream failed to drain");
        }
    }
    output
}
