//! The capability set shared by a single voice and the voice pool.

use crate::error::Result;
use crate::event::VoiceEvent;
use crate::params::ParameterSnapshot;

/// Something that can be configured, fed events and parameters, and asked
/// to add audio into a channel-major buffer.
///
/// All methods except `prepare` are real-time safe: no allocation, no locks,
/// no I/O.
pub trait Renderer {
    /// Configure for the host's sample rate, maximum block size and output
    /// channel count. Resets all state.
    fn prepare(&mut self, sample_rate: f64, max_block: usize, num_channels: usize) -> Result<()>;

    /// Silence everything without reconfiguring. Only call between blocks.
    fn reset(&mut self);

    fn handle_event(&mut self, event: &VoiceEvent);

    /// Push the current parameter values. At most once per block.
    fn set_parameters(&mut self, params: &ParameterSnapshot);

    /// Add `num_samples` samples into every channel of `output`, starting at
    /// `start`.
    fn render(&mut self, output: &mut [&mut [f32]], start: usize, num_samples: usize);
}
