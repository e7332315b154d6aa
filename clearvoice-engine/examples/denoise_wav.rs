/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

// This example does the following:
// 1. Loads a WAV file (passed on the command-line).
// 2. Brings up a denoise session against a session-owned audio context at
//    the file's sample rate, with model weights served from disk (or a
//    placeholder blob when none are given).
// 3. Feeds the file through the session's processed stream in 128-frame
//    quanta and collects the output.
// 4. Writes the denoised audio back out as 16-bit WAV.

use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use clearvoice_engine::graph::{MediaStream, MediaStreamTrack};
use clearvoice_engine::model::StaticModelFetcher;
use clearvoice_engine::quantum::AudioQuantum;
use clearvoice_engine::{DenoiseSession, SessionMode, SessionOptions};
use futures::executor::block_on;

const QUANTUM_FRAMES: usize = 128;

#[derive(Parser, Debug)]
#[clap(about = "Run a WAV file through the clearvoice noise gate", version)]
struct Args {
    #[clap(value_parser, help = "Path to the input WAV file")]
    input: String,

    #[clap(value_parser, help = "Path for the denoised output WAV file")]
    output: String,

    #[clap(long, help = "Model weights file (any opaque blob accepted)")]
    model: Option<String>,

    #[clap(long, help = "Leave the filter disabled (pass-through comparison)")]
    disabled: bool,

    #[clap(long, help = "Enable kernel diagnostic logging")]
    kernel_logging: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    // ── Read WAV ──────────────────────────────────────────────────────────
    let mut reader = hound::WavReader::open(&args.input)
        .with_context(|| format!("open {}", args.input))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        bail!("{} has no channels", args.input);
    }
    log::info!(
        "WAV spec -> sample_rate: {} Hz, channels: {}, bits_per_sample: {}",
        spec.sample_rate,
        channels,
        spec.bits_per_sample
    );

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };
    let frames = samples.len() / channels;

    // ── Bring up the session ──────────────────────────────────────────────
    let weights = match &args.model {
        Some(path) => std::fs::read(path).with_context(|| format!("read {path}"))?,
        None => vec![0u8; 64],
    };
    let mut session = DenoiseSession::new(SessionOptions {
        model_fetcher: std::sync::Arc::new(StaticModelFetcher::uniform(weights)),
        sample_rate: spec.sample_rate,
        logging: args.kernel_logging,
        ..SessionOptions::default()
    });
    block_on(session.init(SessionMode::NoiseCancellation, None))?;

    let (writer, track) = MediaStreamTrack::audio();
    let capture = MediaStream::with_tracks(vec![track]);
    let processed = session.connect(&capture)?;
    if !args.disabled {
        session.enable()?;
    }
    log::info!(
        "session {} ({} frames to process)",
        session.state(),
        frames
    );

    let processed_tracks = processed.audio_tracks();
    let rx = processed_tracks[0]
        .quanta()
        .context("processed track carries no audio")?;

    // ── Pump quanta through ───────────────────────────────────────────────
    let mut output_samples: Vec<f32> = Vec::with_capacity(samples.len());
    let mut frame = 0usize;
    while frame < frames {
        let mut quantum = AudioQuantum::new(channels);
        let take = QUANTUM_FRAMES.min(frames - frame);
        for ch in 0..channels {
            let dst = quantum.channel_mut(ch);
            for i in 0..take {
                dst[i] = samples[(frame + i) * channels + ch];
            }
            // Final partial quantum stays zero-padded.
        }
        writer.push(quantum)?;

        let denoised = rx
            .recv_timeout(Duration::from_secs(5))
            .context("render context produced no output")?;
        for i in 0..take {
            for ch in 0..channels {
                output_samples.push(denoised.channel(ch)[i]);
            }
        }
        frame += take;
    }

    // ── Write WAV ─────────────────────────────────────────────────────────
    let out_spec = hound::WavSpec {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut out = hound::WavWriter::create(&args.output, out_spec)
        .with_context(|| format!("create {}", args.output))?;
    for sample in &output_samples {
        out.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    out.finalize()?;
    log::info!(
        "wrote {} frames to {}",
        output_samples.len() / channels,
        args.output
    );

    block_on(session.destroy())?;
    Ok(())
}
