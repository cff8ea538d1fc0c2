//! Breath lead DSP library: a monophonic, noise-excited resonator voice.
//!
//! Pure DSP math with no audio framework dependencies.

// Building blocks
pub mod filters;
pub mod limiter;
pub mod motion;
pub mod noise;
pub mod smoother;

// Voice synthesis
pub mod engine;
pub mod params;
pub mod voice;

// Host-facing surface
pub mod error;
pub mod event;
pub mod pool;
pub mod renderer;

pub use engine::BreathEngine;
pub use error::{Error, Result};
pub use event::VoiceEvent;
pub use params::ParameterSnapshot;
pub use pool::{SoundPolicy, VoicePool};
pub use renderer::Renderer;
pub use voice::Voice;
