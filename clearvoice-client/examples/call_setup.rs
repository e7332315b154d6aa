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
// 1. Builds a synthetic tone "microphone" and an in-process publisher.
// 2. Initializes the engine denoise adapter with placeholder weights (no
//    network involved).
// 3. Publishes raw capture, then toggles engine denoising on, replacing the
//    published track with the processed one.
// 4. Pumps a loud tone and then near-silence through capture, metering the
//    published audio so the gate's behavior is visible.
// 5. Toggles denoising back off and dumps the publish ledger.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use clearvoice_client::{
    AncToggle, EngineNoiseCancellation, MediaPublisher, RecordingPublisher, SyntheticTrackProvider,
};
use clearvoice_engine::model::StaticModelFetcher;
use clearvoice_engine::SessionOptions;
use futures::executor::block_on;

#[derive(Parser, Debug)]
#[clap(about = "Simulate call setup with an engine denoise toggle", version)]
struct Args {
    #[clap(
        long,
        default_value_t = 440.0,
        help = "Tone frequency of the synthetic microphone"
    )]
    tone_hz: f32,

    #[clap(long, default_value_t = 32, help = "Quanta to pump per amplitude step")]
    quanta: usize,

    #[clap(long, help = "Enable kernel diagnostic logging")]
    kernel_logging: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    // ── Bring up the call pieces ──────────────────────────────────────────
    let options = SessionOptions {
        model_fetcher: Arc::new(StaticModelFetcher::uniform(vec![0u8; 64])),
        logging: args.kernel_logging,
        ..SessionOptions::default()
    };
    let anc = block_on(EngineNoiseCancellation::init(options))?;
    let mut toggle = AncToggle::new(
        SyntheticTrackProvider::new(args.tone_hz),
        RecordingPublisher::default(),
        Box::new(anc),
    );

    let raw = toggle.publish_local_audio()?;
    log::info!("published raw capture {}", raw.id());

    // ── Engage the engine denoiser ────────────────────────────────────────
    toggle.toggle()?;
    log::info!("engine denoising active: {}", toggle.is_active());

    let clean = toggle
        .publisher()
        .published()
        .first()
        .context("no published track after toggle")?
        .clone();
    let quanta = clean.quanta().context("published track carries no audio")?;

    // ── Meter the processed audio ─────────────────────────────────────────
    for (label, amplitude) in [("tone", 0.5f32), ("near-silence", 0.005f32)] {
        toggle.provider_mut().set_amplitude(amplitude);
        toggle.provider_mut().pump(args.quanta)?;

        let mut energy = 0.0f64;
        let mut samples = 0usize;
        for _ in 0..args.quanta {
            let quantum = quanta
                .recv_timeout(Duration::from_secs(5))
                .context("waiting for a processed quantum")?;
            for sample in quantum.channel(0) {
                energy += f64::from(sample * sample);
                samples += 1;
            }
        }
        let rms = (energy / samples.max(1) as f64).sqrt();
        println!("{label:>14}: published rms {rms:.6}");
    }

    // ── Back to platform capture ──────────────────────────────────────────
    toggle.toggle()?;
    log::info!("engine denoising active: {}", toggle.is_active());

    println!("publish ledger:");
    for event in toggle.publisher().events() {
        println!("  {event:?}");
    }
    Ok(())
}
