// Web Audio render quantum; the worklet processor is invoked once per
// quantum and the native render thread mirrors that cadence.
pub const RENDER_QUANTUM_FRAMES: usize = 128;

// Upper bound for staging buffer pre-allocation. Matches the Web Audio
// channel count ceiling so a channel layout change never reallocates.
pub const MAX_CHANNEL_COUNT: usize = 32;

pub const DEFAULT_SAMPLE_RATE: u32 = 48000u32;

// Registered name of the worklet processor on the web target.
pub static WORKLET_PROCESSOR_NAME: &str = "clearvoice-processor";

// Base URL the model loader resolves variant file names against.
pub static DEFAULT_MODEL_CDN: &str = "https://cdn.clearvoice.rs/models";
