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

//! The native rendering context: a dedicated `std::thread` around a
//! [`FilterProcessor`].
//!
//! The thread blocks on a selector over the control channel and every wired
//! lane, so it is input-driven: one quantum in, one quantum out, no clock of
//! its own. Detached lanes drop their sink sender, which is how downstream
//! consumers observe end-of-stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use flume::{Receiver, Sender};

use clearvoice_diagnostics::{emit, metric, now_ms, DiagEvent};

use crate::error::{EngineError, Result};
use crate::graph::{AudioContextHandle, DestinationNode, SourceNode};
use crate::kernel::KernelFactory;
use crate::processor::{FilterProcessor, WorkletCommand, WorkletEvent};
use crate::quantum::AudioQuantum;

pub type VadCallback = Box<dyn Fn(f32) + Send + 'static>;

type CallbackSlot = Arc<Mutex<Option<VadCallback>>>;

enum WireOp {
    Attach {
        input: Receiver<AudioQuantum>,
        output: Sender<AudioQuantum>,
    },
    DetachAll,
}

enum RenderMsg {
    Command(WorkletCommand),
    Wire(WireOp),
    Shutdown,
}

struct LaneIo {
    input: Receiver<AudioQuantum>,
    output: Sender<AudioQuantum>,
}

/// Controller-side handle of the render thread.
pub struct FilterNode {
    sender: Sender<RenderMsg>,
    enabled: Arc<AtomicBool>,
    vad_callback: CallbackSlot,
    thread_handle: Option<JoinHandle<()>>,
}

impl FilterNode {
    /// Spawns the render thread. The context carries no native resources;
    /// the signature matches the web implementation, which registers the
    /// worklet module against it.
    pub async fn create(
        _context: &AudioContextHandle,
        factory: Arc<dyn KernelFactory>,
    ) -> Result<Self> {
        let (sender, receiver) = flume::unbounded();
        let enabled = Arc::new(AtomicBool::new(false));
        let vad_callback: CallbackSlot = Arc::new(Mutex::new(None));

        let thread_enabled = enabled.clone();
        let thread_callback = vad_callback.clone();
        let thread_handle = Some(thread::spawn(move || {
            render_loop(
                FilterProcessor::new(factory),
                receiver,
                thread_enabled,
                thread_callback,
            );
        }));

        Ok(Self {
            sender,
            enabled,
            vad_callback,
            thread_handle,
        })
    }

    pub fn send(&self, command: WorkletCommand) -> Result<()> {
        self.sender
            .send(RenderMsg::Command(command))
            .map_err(|_| EngineError::Graph("render thread is gone".into()))
    }

    /// Routes one source through the processor into one destination. Lane
    /// order matches wire order.
    pub fn wire(&self, source: &SourceNode, destination: &DestinationNode) -> Result<()> {
        self.sender
            .send(RenderMsg::Wire(WireOp::Attach {
                input: source.quanta(),
                output: destination.sink(),
            }))
            .map_err(|_| EngineError::Graph("render thread is gone".into()))
    }

    pub fn unwire_all(&self) {
        let _ = self.sender.send(RenderMsg::Wire(WireOp::DetachAll));
    }

    pub fn set_enabled(&self, value: bool) {
        if value != self.enabled.load(Ordering::Acquire) {
            self.enabled.store(value, Ordering::Release);
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_vad_callback(&self, callback: VadCallback) {
        if let Ok(mut slot) = self.vad_callback.lock() {
            *slot = Some(callback);
        }
    }

    /// Tears the render context down: destroys the kernel session and joins
    /// the thread.
    pub fn kill(&mut self) {
        let _ = self.sender.send(RenderMsg::Command(WorkletCommand::Destroy));
        let _ = self.sender.send(RenderMsg::Shutdown);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("render thread panicked during shutdown");
            }
        }
    }
}

impl Drop for FilterNode {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            self.kill();
        }
    }
}

enum Selected {
    Ctrl(std::result::Result<RenderMsg, flume::RecvError>),
    Lane(usize, std::result::Result<AudioQuantum, flume::RecvError>),
}

/// Applies one control message. Returns false when the loop should exit.
fn handle_ctrl(
    processor: &mut FilterProcessor,
    lanes: &mut Vec<Option<LaneIo>>,
    message: RenderMsg,
) -> bool {
    match message {
        RenderMsg::Command(command) => {
            processor.handle_command(command);
        }
        RenderMsg::Wire(WireOp::Attach { input, output }) => {
            let lane = processor.add_lane();
            debug_assert_eq!(lane, lanes.len());
            lanes.push(Some(LaneIo { input, output }));
            emit(DiagEvent {
                subsystem: "filter",
                session_id: None,
                ts_ms: now_ms(),
                metrics: vec![metric!("lanes", lanes.len() as u64)],
            });
        }
        RenderMsg::Wire(WireOp::DetachAll) => {
            processor.clear_lanes();
            lanes.clear();
            emit(DiagEvent {
                subsystem: "filter",
                session_id: None,
                ts_ms: now_ms(),
                metrics: vec![metric!("lanes", 0u64)],
            });
        }
        RenderMsg::Shutdown => return false,
    }
    true
}

fn render_loop(
    mut processor: FilterProcessor,
    control: Receiver<RenderMsg>,
    enabled: Arc<AtomicBool>,
    vad_callback: CallbackSlot,
) {
    // Index-stable lane table; a dead lane keeps its slot so later lanes
    // keep their processor kernels.
    let mut lanes: Vec<Option<LaneIo>> = Vec::new();

    loop {
        // Lifecycle messages are out-of-band: drain them before touching
        // audio so a queued quantum never overtakes an init or detach.
        loop {
            match control.try_recv() {
                Ok(message) => {
                    if !handle_ctrl(&mut processor, &mut lanes, message) {
                        return;
                    }
                }
                Err(flume::TryRecvError::Empty) => break,
                Err(flume::TryRecvError::Disconnected) => return,
            }
        }

        let selected = {
            let mut selector = flume::Selector::new().recv(&control, Selected::Ctrl);
            for (index, lane) in lanes.iter().enumerate() {
                if let Some(io) = lane {
                    selector = selector.recv(&io.input, move |q| Selected::Lane(index, q));
                }
            }
            selector.wait()
        };

        match selected {
            Selected::Ctrl(Ok(message)) => {
                if !handle_ctrl(&mut processor, &mut lanes, message) {
                    return;
                }
            }
            Selected::Ctrl(Err(_)) => return,
            Selected::Lane(index, Ok(quantum)) => {
                let mut output = AudioQuantum::new(quantum.channels());
                let event = processor.render(
                    index,
                    enabled.load(Ordering::Acquire),
                    &quantum,
                    &mut output,
                );
                // Score before audio, so a consumer that saw the quantum
                // can rely on the matching score having been delivered.
                if let Some(WorkletEvent::VadScore(score)) = event {
                    if let Ok(slot) = vad_callback.lock() {
                        if let Some(callback) = slot.as_ref() {
                            callback(score);
                        }
                    }
                }
                if let Some(io) = &lanes[index] {
                    if io.output.send(output).is_err() {
                        // Downstream consumer is gone; retire the lane.
                        lanes[index] = None;
                    }
                }
            }
            Selected::Lane(index, Err(_)) => {
                // Producer hung up; dropping our sink sender signals
                // end-of-stream downstream.
                lanes[index] = None;
            }
        }
    }
}
