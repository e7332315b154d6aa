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

//! Controller-side handle of the rendering context.
//!
//! [`FilterNode`] owns whichever render context the target provides: a
//! dedicated thread driving a [`crate::processor::FilterProcessor`] on
//! native, an `AudioWorkletNode` running the embedded shim on the web. Both
//! speak [`crate::processor::WorkletCommand`] inbound and surface VAD scores
//! through the registered callback; `enabled` is the shared per-quantum flag
//! (an `AudioParam` in the browser, an atomic on native).

// Conditionally compile and expose the native implementation
#[cfg(not(target_arch = "wasm32"))]
mod native;
#[cfg(not(target_arch = "wasm32"))]
pub use self::native::{FilterNode, VadCallback};

// Conditionally compile and expose the web implementation
#[cfg(target_arch = "wasm32")]
mod web;
#[cfg(target_arch = "wasm32")]
pub use self::web::{FilterNode, VadCallback};
