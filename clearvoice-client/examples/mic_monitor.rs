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
// 1. Opens the default (or name-matched) input device through cpal.
// 2. Routes the capture track through an engine denoise session.
// 3. Prints the RMS of the processed audio once a second; speak into the
//    microphone to watch the gate open, stop to watch it close.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use clearvoice_client::{
    CaptureProfile, EngineNoiseCancellation, MicrophoneTrackProvider, NoiseCancellation,
    TrackProvider,
};
use clearvoice_engine::model::StaticModelFetcher;
use clearvoice_engine::SessionOptions;
use futures::executor::block_on;

#[derive(Parser, Debug)]
#[clap(about = "Denoise the microphone and meter the processed audio", version)]
struct Args {
    #[clap(
        long,
        help = "Input device name substring (system default when omitted)"
    )]
    device: Option<String>,

    #[clap(long, default_value_t = 10, help = "Seconds to run before exiting")]
    seconds: u64,

    #[clap(long, help = "List input devices and exit")]
    list_devices: bool,

    #[clap(long, help = "Enable kernel diagnostic logging")]
    kernel_logging: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.list_devices {
        for name in MicrophoneTrackProvider::list_input_devices()? {
            println!("{name}");
        }
        return Ok(());
    }

    // ── Capture and denoise ───────────────────────────────────────────────
    let mut provider = MicrophoneTrackProvider::new(args.device);
    let track = provider.acquire(&CaptureProfile::for_engine_denoise(true))?;

    let options = SessionOptions {
        model_fetcher: Arc::new(StaticModelFetcher::uniform(vec![0u8; 64])),
        logging: args.kernel_logging,
        ..SessionOptions::default()
    };
    let mut anc = block_on(EngineNoiseCancellation::init(options))?;
    let clean = anc.connect(track)?;
    let quanta = clean.quanta().context("processed track carries no audio")?;

    // ── Meter ─────────────────────────────────────────────────────────────
    log::info!("metering processed audio for {} s", args.seconds);
    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    let mut energy = 0.0f64;
    let mut samples = 0usize;
    let mut last_print = Instant::now();
    while Instant::now() < deadline {
        if let Ok(quantum) = quanta.recv_timeout(Duration::from_millis(250)) {
            for sample in quantum.channel(0) {
                energy += f64::from(sample * sample);
                samples += 1;
            }
        }
        if last_print.elapsed() >= Duration::from_secs(1) {
            let rms = if samples == 0 {
                0.0
            } else {
                (energy / samples as f64).sqrt()
            };
            println!("processed rms: {rms:.6}");
            energy = 0.0;
            samples = 0;
            last_print = Instant::now();
        }
    }

    anc.disconnect()?;
    provider.release();
    block_on(anc.destroy())?;
    Ok(())
}
