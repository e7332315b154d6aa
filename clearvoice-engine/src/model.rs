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

//! Model weight retrieval.
//!
//! Each [`ModelVariant`] maps to one opaque weight file on a CDN. The
//! session picks the variant from its mode and the context sample rate,
//! fetches the payload once during `init`, and hands the bytes to the render
//! context untouched. [`HttpModelFetcher`] is the production path (reqwest
//! works on both targets); [`StaticModelFetcher`] serves embedded bytes for
//! tests, demos and offline use.

use std::collections::HashMap;

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use web_time::Instant;

use clearvoice_diagnostics::{emit, metric, now_ms, DiagEvent};

use crate::constants::DEFAULT_MODEL_CDN;
use crate::error::{EngineError, Result};
use crate::kernel::KernelMode;

/// Weight file variants the engine knows how to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelVariant {
    /// Narrowband noise cancellation, rates up to 8 kHz.
    Nc8k,
    /// Noise cancellation for rates up to 16 kHz.
    Nc16k,
    /// Wideband noise cancellation, everything above 16 kHz.
    NcWideband,
    /// Voice activity detection.
    Vad,
}

impl ModelVariant {
    /// Selection policy: VAD wins regardless of rate, otherwise the smallest
    /// model whose band covers the context sample rate.
    pub fn for_config(sample_rate: u32, vad: bool) -> Self {
        if vad {
            ModelVariant::Vad
        } else if sample_rate <= 8000 {
            ModelVariant::Nc8k
        } else if sample_rate <= 16000 {
            ModelVariant::Nc16k
        } else {
            ModelVariant::NcWideband
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            ModelVariant::Nc8k => "small_8k.cvw",
            ModelVariant::Nc16k => "small_16k.cvw",
            ModelVariant::NcWideband => "nc_wideband.cvw",
            ModelVariant::Vad => "vad.cvw",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModelVariant::Nc8k => "nc_8k",
            ModelVariant::Nc16k => "nc_16k",
            ModelVariant::NcWideband => "nc_wideband",
            ModelVariant::Vad => "vad",
        }
    }

    /// Kernel mode this variant is consumed by.
    pub fn kernel_mode(self) -> KernelMode {
        match self {
            ModelVariant::Vad => KernelMode::VoiceActivity,
            _ => KernelMode::NoiseCancellation,
        }
    }

    pub fn url(self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.file_name())
    }
}

/// Retrieves model payloads. Object-safe so the session can hold it behind
/// `Arc<dyn ModelFetcher>`; the future is local because the wasm target has
/// no `Send` executors.
pub trait ModelFetcher {
    fn fetch(&self, variant: ModelVariant) -> LocalBoxFuture<'_, Result<Vec<u8>>>;
}

/// Fetches weights over HTTP GET from a CDN base URL.
pub struct HttpModelFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpModelFetcher {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_MODEL_CDN)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl Default for HttpModelFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelFetcher for HttpModelFetcher {
    fn fetch(&self, variant: ModelVariant) -> LocalBoxFuture<'_, Result<Vec<u8>>> {
        let url = variant.url(&self.base_url);
        let client = self.client.clone();
        async move {
            let started = Instant::now();
            let response = client
                .get(&url)
                .send()
                .await
                .map_err(|e| EngineError::ModelFetch(e.to_string()))?
                .error_for_status()
                .map_err(|e| EngineError::ModelFetch(e.to_string()))?;
            let bytes = response
                .bytes()
                .await
                .map_err(|e| EngineError::ModelFetch(e.to_string()))?;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            log::info!(
                "fetched model {} ({} bytes in {}ms)",
                variant.as_str(),
                bytes.len(),
                elapsed_ms
            );
            emit(DiagEvent {
                subsystem: "model",
                session_id: None,
                ts_ms: now_ms(),
                metrics: vec![
                    metric!("variant", variant.as_str()),
                    metric!("bytes", bytes.len() as u64),
                    metric!("fetch_ms", elapsed_ms),
                ],
            });
            Ok(bytes.to_vec())
        }
        .boxed_local()
    }
}

/// Serves payloads from memory. `uniform` hands the same bytes back for
/// every variant, which is all the built-in gate kernel needs.
#[derive(Debug, Default, Clone)]
pub struct StaticModelFetcher {
    payloads: HashMap<ModelVariant, Vec<u8>>,
    uniform: Option<Vec<u8>>,
}

impl StaticModelFetcher {
    pub fn uniform(payload: Vec<u8>) -> Self {
        Self {
            payloads: HashMap::new(),
            uniform: Some(payload),
        }
    }

    pub fn with_payload(mut self, variant: ModelVariant, payload: Vec<u8>) -> Self {
        self.payloads.insert(variant, payload);
        self
    }
}

impl ModelFetcher for StaticModelFetcher {
    fn fetch(&self, variant: ModelVariant) -> LocalBoxFuture<'_, Result<Vec<u8>>> {
        let payload = self
            .payloads
            .get(&variant)
            .or(self.uniform.as_ref())
            .cloned()
            .ok_or_else(|| {
                EngineError::ModelFetch(format!("no payload for variant {}", variant.as_str()))
            });
        async move { payload }.boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn variant_selection_follows_rate_bands() {
        assert_eq!(ModelVariant::for_config(8000, false), ModelVariant::Nc8k);
        assert_eq!(ModelVariant::for_config(8001, false), ModelVariant::Nc16k);
        assert_eq!(ModelVariant::for_config(16000, false), ModelVariant::Nc16k);
        assert_eq!(
            ModelVariant::for_config(16001, false),
            ModelVariant::NcWideband
        );
        assert_eq!(
            ModelVariant::for_config(44100, false),
            ModelVariant::NcWideband
        );
        assert_eq!(
            ModelVariant::for_config(48000, false),
            ModelVariant::NcWideband
        );
    }

    #[test]
    fn vad_flag_wins_regardless_of_rate() {
        assert_eq!(ModelVariant::for_config(8000, true), ModelVariant::Vad);
        assert_eq!(ModelVariant::for_config(48000, true), ModelVariant::Vad);
    }

    #[test]
    fn variant_urls_join_base_and_file() {
        assert_eq!(
            ModelVariant::Nc8k.url(DEFAULT_MODEL_CDN),
            "https://cdn.clearvoice.rs/models/small_8k.cvw"
        );
        assert_eq!(
            ModelVariant::Vad.url("https://example.com/weights/"),
            "https://example.com/weights/vad.cvw"
        );
        assert_eq!(
            ModelVariant::NcWideband.file_name(),
            "nc_wideband.cvw"
        );
        assert_eq!(ModelVariant::Nc16k.file_name(), "small_16k.cvw");
    }

    #[test]
    fn static_fetcher_serves_uniform_payload() {
        let fetcher = StaticModelFetcher::uniform(vec![7, 7, 7]);
        let bytes = block_on(fetcher.fetch(ModelVariant::NcWideband)).unwrap();
        assert_eq!(bytes, vec![7, 7, 7]);
    }

    #[test]
    fn static_fetcher_prefers_specific_payload() {
        let fetcher = StaticModelFetcher::uniform(vec![1])
            .with_payload(ModelVariant::Vad, vec![2, 2]);
        assert_eq!(block_on(fetcher.fetch(ModelVariant::Vad)).unwrap(), vec![2, 2]);
        assert_eq!(block_on(fetcher.fetch(ModelVariant::Nc8k)).unwrap(), vec![1]);
    }

    #[test]
    fn static_fetcher_errors_without_payload() {
        let fetcher = StaticModelFetcher::default();
        let err = block_on(fetcher.fetch(ModelVariant::Nc8k)).unwrap_err();
        assert!(matches!(err, EngineError::ModelFetch(_)));
    }
}
