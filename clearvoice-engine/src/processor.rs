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

//! Render-side processor state machine.
//!
//! [`FilterProcessor`] is pure with respect to its surroundings: commands in,
//! per-quantum renders in, optional events out. The native render thread
//! drives it directly; on the web target the worklet shim implements the
//! same transitions against the same wire messages (see
//! `scripts/denoiser.worklet.js`).
//!
//! The wire protocol matches the worklet port messages:
//! `{"type":"init", data, sampleRate, isVad}`, `{"type":"destroy"}`,
//! `{"type":"logging", enabled}` inbound and `{"vadResult": score}`
//! outbound.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::kernel::{AudioKernel, KernelFactory, KernelMode};
use crate::quantum::{AudioQuantum, StagingBuffer};

/// Controller → renderer commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkletCommand {
    /// Loads the model and opens a kernel session at the context rate.
    #[serde(rename_all = "camelCase")]
    Init {
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
        sample_rate: u32,
        is_vad: bool,
    },
    /// Closes the kernel session and releases render-side resources.
    Destroy,
    /// Toggles kernel diagnostics. Ignored before `Init`.
    #[serde(rename = "logging")]
    SetLogging { enabled: bool },
}

/// Renderer → controller events.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WorkletEvent {
    /// Voice activity score for the last rendered quantum, VAD mode only.
    #[serde(rename = "vadResult")]
    VadScore(f32),
}

struct InitParams {
    weights: Vec<u8>,
    sample_rate: u32,
    mode: KernelMode,
}

/// One wired stream through the processor. Each lane gets its own kernel
/// instance so concurrent streams never share smoothing state.
#[derive(Default)]
struct Lane {
    kernel: Option<Box<dyn AudioKernel>>,
    failed: bool,
}

/// The render-side state machine.
///
/// Uninitialized or disabled renders are exact pass-through; the render path
/// must never fail, so kernel construction errors demote the lane to
/// pass-through instead of surfacing.
pub struct FilterProcessor {
    factory: Arc<dyn KernelFactory>,
    init: Option<InitParams>,
    lanes: Vec<Lane>,
    staging_in: StagingBuffer,
    staging_out: StagingBuffer,
    logging: bool,
}

impl FilterProcessor {
    pub fn new(factory: Arc<dyn KernelFactory>) -> Self {
        Self {
            factory,
            init: None,
            lanes: Vec::new(),
            staging_in: StagingBuffer::new(),
            staging_out: StagingBuffer::new(),
            logging: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.init.is_some()
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Registers a new wired stream and returns its lane index.
    pub fn add_lane(&mut self) -> usize {
        self.lanes.push(Lane::default());
        self.lanes.len() - 1
    }

    /// Drops all wired streams and their kernels.
    pub fn clear_lanes(&mut self) {
        for lane in &mut self.lanes {
            if let Some(kernel) = lane.kernel.as_mut() {
                kernel.close_session();
            }
        }
        self.lanes.clear();
    }

    pub fn handle_command(&mut self, command: WorkletCommand) {
        match command {
            WorkletCommand::Init {
                data,
                sample_rate,
                is_vad,
            } => {
                let mode = if is_vad {
                    KernelMode::VoiceActivity
                } else {
                    KernelMode::NoiseCancellation
                };
                log::debug!(
                    "processor init: {} bytes, {}Hz, mode {:?}",
                    data.len(),
                    sample_rate,
                    mode
                );
                self.init = Some(InitParams {
                    weights: data,
                    sample_rate,
                    mode,
                });
                // Existing lanes pick the new session up on their next
                // quantum.
                for lane in &mut self.lanes {
                    if let Some(kernel) = lane.kernel.as_mut() {
                        kernel.close_session();
                    }
                    lane.kernel = None;
                    lane.failed = false;
                }
            }
            WorkletCommand::Destroy => {
                for lane in &mut self.lanes {
                    if let Some(kernel) = lane.kernel.as_mut() {
                        kernel.close_session();
                    }
                    lane.kernel = None;
                    lane.failed = false;
                }
                self.init = None;
            }
            WorkletCommand::SetLogging { enabled } => {
                if self.init.is_none() {
                    return;
                }
                self.logging = enabled;
                for lane in &mut self.lanes {
                    if let Some(kernel) = lane.kernel.as_mut() {
                        kernel.set_logging(enabled);
                    }
                }
            }
        }
    }

    /// Renders one quantum for one lane. `enabled` is sampled by the caller
    /// from the shared flag (the AudioParam analog) once per quantum.
    pub fn render(
        &mut self,
        lane: usize,
        enabled: bool,
        input: &AudioQuantum,
        output: &mut AudioQuantum,
    ) -> Option<WorkletEvent> {
        if !enabled || self.init.is_none() {
            output.copy_from(input);
            return None;
        }

        if lane >= self.lanes.len() {
            self.lanes.resize_with(lane + 1, Lane::default);
        }
        self.ensure_kernel(lane);

        let lane_state = &mut self.lanes[lane];
        let kernel = match lane_state.kernel.as_mut() {
            Some(kernel) => kernel,
            None => {
                output.copy_from(input);
                return None;
            }
        };

        self.staging_in.load(input);
        let score = kernel.process(&self.staging_in, &mut self.staging_out);

        let mode = self.init.as_ref().map(|p| p.mode);
        if mode == Some(KernelMode::VoiceActivity) {
            output.fill_silence();
            Some(WorkletEvent::VadScore(score.unwrap_or(0.0)))
        } else {
            self.staging_out.store(output);
            None
        }
    }

    fn ensure_kernel(&mut self, lane: usize) {
        if self.lanes[lane].kernel.is_some() || self.lanes[lane].failed {
            return;
        }
        let params = match self.init.as_ref() {
            Some(params) => params,
            None => return,
        };
        let mut kernel = self.factory.create(params.mode);
        let built = kernel
            .init_weights(&params.weights)
            .and_then(|_| kernel.open_session(params.sample_rate));
        match built {
            Ok(()) => {
                kernel.set_logging(self.logging);
                self.lanes[lane].kernel = Some(kernel);
            }
            Err(e) => {
                log::error!("kernel setup failed on lane {lane}: {e}");
                self.lanes[lane].failed = true;
            }
        }
    }
}
