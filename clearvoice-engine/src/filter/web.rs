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

//! The browser rendering context: an [`AudioWorkletNode`] running the bundled
//! processor script on the audio render thread.
//!
//! The script is inlined at compile time and registered through a blob URL so
//! deployments do not have to serve a separate worklet asset. Commands travel
//! over the node's message port in the same wire format the native render
//! thread consumes, and the enable switch is the node's `enabled` AudioParam.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{AudioParam, AudioWorkletNode, MessageEvent};

use crate::constants::WORKLET_PROCESSOR_NAME;
use crate::error::{EngineError, Result};
use crate::graph::{js_err, AudioContextHandle, DestinationNode, SourceNode};
use crate::kernel::KernelFactory;
use crate::processor::{WorkletCommand, WorkletEvent};

const PROCESSOR_JS: &str = include_str!("../scripts/denoiser.worklet.js");

/// Invoked on the main thread for every voice-activity score the worklet
/// posts back.
pub type VadCallback = Box<dyn Fn(f32) + 'static>;

pub struct FilterNode {
    node: AudioWorkletNode,
    enabled_param: AudioParam,
    onmessage: RefCell<Option<Closure<dyn FnMut(MessageEvent)>>>,
    killed: Cell<bool>,
}

impl FilterNode {
    /// Registers the processor module on `context` and instantiates the
    /// worklet node. The kernel runs inside the worklet script, so the
    /// factory only matters on native builds.
    pub async fn create(
        context: &AudioContextHandle,
        _factory: Arc<dyn KernelFactory>,
    ) -> Result<Self> {
        let blob_parts = js_sys::Array::new();
        blob_parts.push(&JsValue::from_str(PROCESSOR_JS));
        let blob_opts = web_sys::BlobPropertyBag::new();
        blob_opts.set_type("application/javascript");
        let blob = web_sys::Blob::new_with_str_sequence_and_options(&blob_parts, &blob_opts)
            .map_err(|e| js_err("build worklet blob", e))?;
        let url = web_sys::Url::create_object_url_with_blob(&blob)
            .map_err(|e| js_err("create worklet url", e))?;

        let registered = async {
            let worklet = context.raw().audio_worklet()?;
            let promise = worklet.add_module(&url)?;
            JsFuture::from(promise).await?;
            std::result::Result::<(), JsValue>::Ok(())
        }
        .await;
        let _ = web_sys::Url::revoke_object_url(&url);
        registered.map_err(|e| js_err("register worklet module", e))?;

        let node = AudioWorkletNode::new(context.raw(), WORKLET_PROCESSOR_NAME)
            .map_err(|e| js_err("create worklet node", e))?;
        let enabled_param = node
            .parameters()
            .map_err(|e| js_err("read worklet parameters", e))?
            .get("enabled")
            .ok_or_else(|| EngineError::Graph("worklet has no enabled parameter".to_string()))?;

        log::debug!("registered {WORKLET_PROCESSOR_NAME} worklet");
        Ok(Self {
            node,
            enabled_param,
            onmessage: RefCell::new(None),
            killed: Cell::new(false),
        })
    }

    pub fn send(&self, command: WorkletCommand) -> Result<()> {
        let message = serde_wasm_bindgen::to_value(&command)
            .map_err(|e| EngineError::Graph(format!("encode worklet command: {e}")))?;
        self.node
            .port()
            .map_err(|e| js_err("open worklet port", e))?
            .post_message(&message)
            .map_err(|e| js_err("post worklet command", e))
    }

    /// Splices the worklet between a source and a destination.
    pub fn wire(&self, source: &SourceNode, destination: &DestinationNode) -> Result<()> {
        source
            .raw()
            .connect_with_audio_node(&self.node)
            .map_err(|e| js_err("connect source to worklet", e))?;
        self.node
            .connect_with_audio_node(destination.raw())
            .map_err(|e| js_err("connect worklet to destination", e))?;
        Ok(())
    }

    pub fn unwire_all(&self) {
        let _ = self.node.disconnect();
    }

    pub fn set_enabled(&self, value: bool) {
        self.enabled_param.set_value(if value { 1.0 } else { 0.0 });
    }

    pub fn enabled(&self) -> bool {
        self.enabled_param.value() >= 0.5
    }

    pub fn set_vad_callback(&self, callback: VadCallback) {
        let closure = Closure::wrap(Box::new(move |event: MessageEvent| {
            if let Ok(WorkletEvent::VadScore(score)) =
                serde_wasm_bindgen::from_value::<WorkletEvent>(event.data())
            {
                callback(score);
            }
        }) as Box<dyn FnMut(MessageEvent)>);
        if let Ok(port) = self.node.port() {
            port.set_onmessage(Some(closure.as_ref().unchecked_ref()));
        }
        *self.onmessage.borrow_mut() = Some(closure);
    }

    /// Tears the worklet down: tells the processor to drop its kernels, then
    /// detaches the message handler and the graph edges.
    pub fn kill(&mut self) {
        if self.killed.replace(true) {
            return;
        }
        let _ = self.send(WorkletCommand::Destroy);
        if let Ok(port) = self.node.port() {
            port.set_onmessage(None);
        }
        self.onmessage.borrow_mut().take();
        let _ = self.node.disconnect();
    }
}

impl Drop for FilterNode {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    fn property(message: &JsValue, name: &str) -> JsValue {
        js_sys::Reflect::get(message, &JsValue::from_str(name)).unwrap()
    }

    #[wasm_bindgen_test]
    fn init_command_reaches_js_with_typed_weights() {
        let message = serde_wasm_bindgen::to_value(&WorkletCommand::Init {
            data: vec![1, 2, 3],
            sample_rate: 48000,
            is_vad: false,
        })
        .unwrap();

        assert_eq!(property(&message, "type").as_string().unwrap(), "init");
        assert_eq!(property(&message, "sampleRate").as_f64().unwrap(), 48000.0);
        assert_eq!(property(&message, "isVad").as_bool().unwrap(), false);
        // The worklet feeds the weights straight into the kernel; they must
        // arrive as a typed array, not a JS number array.
        let data: js_sys::Uint8Array = property(&message, "data").dyn_into().unwrap();
        assert_eq!(data.to_vec(), vec![1, 2, 3]);
    }

    #[wasm_bindgen_test]
    fn control_commands_carry_their_type_tags() {
        let destroy = serde_wasm_bindgen::to_value(&WorkletCommand::Destroy).unwrap();
        assert_eq!(property(&destroy, "type").as_string().unwrap(), "destroy");

        let logging =
            serde_wasm_bindgen::to_value(&WorkletCommand::SetLogging { enabled: true }).unwrap();
        assert_eq!(property(&logging, "type").as_string().unwrap(), "logging");
        assert_eq!(property(&logging, "enabled").as_bool().unwrap(), true);
    }

    #[wasm_bindgen_test]
    fn vad_scores_parse_from_worklet_messages() {
        let posted = js_sys::Object::new();
        js_sys::Reflect::set(
            &posted,
            &JsValue::from_str("vadResult"),
            &JsValue::from_f64(0.25),
        )
        .unwrap();

        let event: WorkletEvent = serde_wasm_bindgen::from_value(posted.into()).unwrap();
        assert_eq!(event, WorkletEvent::VadScore(0.25));
    }
}
