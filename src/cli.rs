//! Command-line front end: reads a WAV file, stretches and shifts it, and
//! writes the result.

use warpgrain::{Request, SampleRates, StreamProcessor, Stretcher};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        print_usage();
        std::process::exit(1);
    }

    let input_path = &args[1];
    let output_path = &args[2];

    let mut speed = 1.0f64;
    let mut semitones = 0.0f64;
    let mut grain_adjust = 0i32;
    let mut push = 0i32;
    let mut instrumentation = false;

    let mut i = 3;
    while i < args.len() {
        match args[i].as_str() {
            "--speed" | "-s" => {
                i += 1;
                speed = parse_f64(&args, i, "speed");
            }
            "--pitch" | "-p" => {
                i += 1;
                semitones = parse_f64(&args, i, "pitch");
            }
            "--grain" | "-g" => {
                i += 1;
                grain_adjust = parse_f64(&args, i, "grain") as i32;
            }
            "--push" => {
                i += 1;
                push = parse_f64(&args, i, "push") as i32;
            }
            "--instrumentation" => instrumentation = true,
            "--help" | "-h" => {
                print_usage();
                return;
            }
            other => {
                eprintln!("ERROR: unknown option {}", other);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    if speed == 0.0 {
        eprintln!("ERROR: speed must be non-zero");
        std::process::exit(1);
    }
    let pitch = (semitones / 12.0).exp2();

    let (channels, sample_rate, input) = match read_wav(input_path) {
        Ok(audio) => audio,
        Err(e) => {
            eprintln!("ERROR: failed to read {}: {}", input_path, e);
            std::process::exit(1);
        }
    };
    if input.is_empty() || input[0].is_empty() {
        eprintln!("ERROR: {} contains no audio", input_path);
        std::process::exit(1);
    }
    let frame_count = input[0].len();
    eprintln!(
        "Input: {} frames, {} Hz, {} channel(s); speed {}, pitch {} semitone(s)",
        frame_count, sample_rate, channels, speed, semitones
    );

    let mut stretcher =
        match Stretcher::new(SampleRates::same(sample_rate), channels, grain_adjust) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("ERROR: {}", e);
                std::process::exit(1);
            }
        };
    stretcher.enable_instrumentation(instrumentation);

    let target = (frame_count as f64 / speed.abs()).round() as usize;
    let output = if push != 0 {
        render_streaming(stretcher, &input, speed, pitch, push, target)
    } else {
        render_granular(stretcher, &input, speed, pitch, target)
    };

    if let Err(e) = write_wav(output_path, sample_rate, &output) {
        eprintln!("ERROR: failed to write {}: {}", output_path, e);
        std::process::exit(1);
    }
    eprintln!("Output: {} frames written to {}", output[0].len(), output_path);
}

fn print_usage() {
    eprintln!(
        "warpgrain {} ({}) - audio speed and pitch changer\n\n\
         Usage: warpgrain <input.wav> <output.wav> [options]\n\n\
         Options:\n\
         \x20 --speed, -s <ratio>     playback speed (negative for reverse, default 1)\n\
         \x20 --pitch, -p <semitones> pitch shift in semitones (default 0)\n\
         \x20 --grain, -g <adjust>    log2 synthesis-hop adjustment: -1, 0 or +1\n\
         \x20 --push <n>              0: granular loop; n>0: stream n samples per call;\n\
         \x20                         n<0: stream with random push sizes up to |n|\n\
         \x20 --instrumentation       enable diagnostic logging (RUST_LOG=debug)",
        warpgrain::version(),
        warpgrain::edition()
    );
}

fn parse_f64(args: &[String], index: usize, name: &str) -> f64 {
    args.get(index)
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| {
            eprintln!("ERROR: missing or invalid value for --{}", name);
            std::process::exit(1);
        })
}

/// Drives the low-level granular API: preroll, then one
/// specify/analyse/synthesise/next cycle per grain, clipping emitted chunks
/// to the input's position range.
fn render_granular(
    mut stretcher: Stretcher,
    input: &[Vec<f32>],
    speed: f64,
    pitch: f64,
    target: usize,
) -> Vec<Vec<f32>> {
    let channels = input.len();
    let frame_count = input[0].len();

    // Planar copy with a common channel stride for analyse_grain.
    let mut planar = vec![0.0f32; frame_count * channels];
    for (c, channel) in input.iter().enumerate() {
        planar[c * frame_count..(c + 1) * frame_count].copy_from_slice(channel);
    }

    let mut request = Request {
        position: if speed < 0.0 { frame_count as f64 } else { 0.0 },
        speed,
        pitch,
        reset: true,
        ..Request::default()
    };
    stretcher.preroll(&mut request);

    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(target); channels];
    let mut written = 0usize;
    while written < target {
        let chunk = stretcher.specify_grain(&request, 0.0);
        let mute_head = (-chunk.begin).max(0);
        let mute_tail = (chunk.end - frame_count as i32).max(0);
        let first = chunk.begin + mute_head;

        if mute_head + mute_tail >= chunk.frame_count() {
            stretcher.analyse_grain(None, 0, 0, 0);
        } else {
            stretcher.analyse_grain(
                Some(&planar[first as usize..]),
                frame_count,
                mute_head,
                mute_tail,
            );
        }

        let out = stretcher.synthesise_grain();
        written += append_in_range(&mut output, &out, frame_count, target, written);

        // The emitted window has moved past the input: nothing more to come.
        let begin_position = out.request[warpgrain::CHUNK_BEGIN].position;
        let drained = begin_position.is_finite()
            && if speed >= 0.0 {
                begin_position > frame_count as f64
            } else {
                begin_position < 0.0
            };
        drop(out);
        if drained {
            break;
        }
        stretcher.next(&mut request);
    }
    output
}

/// Appends the frames of `chunk` whose interpolated input position falls
/// inside the track, up to `target` total frames. Returns how many were
/// appended.
fn append_in_range(
    output: &mut [Vec<f32>],
    chunk: &warpgrain::OutputChunk<'_>,
    frame_count: usize,
    target: usize,
    written: usize,
) -> usize {
    if !chunk.request[warpgrain::CHUNK_BEGIN].position.is_finite()
        || !chunk.request[warpgrain::CHUNK_END].position.is_finite()
    {
        return 0;
    }
    let mut appended = 0usize;
    for frame in 0..chunk.frame_count() {
        let position = chunk.position_of_frame(frame);
        if position < 0.0 || position > frame_count as f64 {
            continue;
        }
        if written + appended >= target {
            break;
        }
        for (c, channel) in output.iter_mut().enumerate() {
            channel.push(chunk.channel(c)[frame]);
        }
        appended += 1;
    }
    appended
}

/// Drives the streaming wrapper, pushing fixed or randomised segment sizes.
fn render_streaming(
    stretcher: Stretcher,
    input: &[Vec<f32>],
    speed: f64,
    pitch: f64,
    push: i32,
    target: usize,
) -> Vec<Vec<f32>> {
    if speed <= 0.0 {
        eprintln!("ERROR: streaming mode requires a positive speed");
        std::process::exit(1);
    }
    let channels = input.len();
    let frame_count = input[0].len();
    let max_push = push.unsigned_abs() as usize;
    let max_output = ((max_push as f64 / speed).ceil() as usize).max(1) + 1;

    if push < 0 {
        eprintln!(
            "Using StreamProcessor::process with random segments of 1 to {} samples",
            max_push
        );
    } else {
        eprintln!("Using StreamProcessor::process with {} samples per call", max_push);
    }

    let mut stream = StreamProcessor::new(stretcher, max_push);
    let mut rng = 0x2545f491u32;
    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(target); channels];
    let mut scratch: Vec<Vec<f32>> = vec![vec![0.0; max_output]; channels];
    let mut written = 0usize;
    let mut position = 0usize;

    while written < target {
        let mut count = if push < 0 {
            // Deterministic xorshift so randomised runs reproduce.
            rng ^= rng << 13;
            rng ^= rng >> 17;
            rng ^= rng << 5;
            (rng as usize % max_push) + 1
        } else {
            max_push
        };

        let slices: Vec<&[f32]>;
        let input_refs = if position < frame_count {
            count = count.min(frame_count - position);
            slices = input
                .iter()
                .map(|channel| &channel[position..position + count])
                .collect();
            Some(&slices[..])
        } else {
            None // input exhausted: push silence to drain the pipeline
        };

        let ideal = count as f64 / speed;
        let mut outs: Vec<&mut [f32]> = scratch
            .iter_mut()
            .map(|channel| &mut channel[..])
            .collect();
        let rendered = stream.process(input_refs, &mut outs, count, ideal, pitch);

        // Map rendered frames back to input positions and keep only those
        // within the track, dropping start-up latency and drain silence.
        let position_end = stream.output_position();
        let position_begin = position_end - rendered as f64 * speed;
        for frame in 0..rendered {
            let input_position = position_begin + frame as f64 * speed;
            if !(0.0..=frame_count as f64).contains(&input_position) {
                continue;
            }
            if written >= target {
                break;
            }
            for (c, channel) in output.iter_mut().enumerate() {
                channel.push(scratch[c][frame]);
            }
            written += 1;
        }
        position += count;

        if position >= frame_count && position_begin > frame_count as f64 {
            break; // pipeline drained past the end of the input
        }
    }
    output
}

fn read_wav(path: &str) -> Result<(usize, u32, Vec<Vec<f32>>), hound::Error> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()?
        }
    };

    let frames = interleaved.len() / channels;
    let mut planar = vec![Vec::with_capacity(frames); channels];
    for (i, &sample) in interleaved.iter().enumerate() {
        planar[i % channels].push(sample);
    }
    Ok((channels, spec.sample_rate, planar))
}

fn write_wav(path: &str, sample_rate: u32, audio: &[Vec<f32>]) -> Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels: audio.len() as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    let frames = audio[0].len();
    for frame in 0..frames {
        for channel in audio {
            writer.write_sample(channel[frame])?;
        }
    }
    writer.finalize()
}
