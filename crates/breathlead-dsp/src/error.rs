//! Configuration errors. These are only ever raised by `prepare`; the
//! render path has no failure modes.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("invalid sample rate: {0} Hz (must be finite and > 0)")]
    InvalidSampleRate(f64),

    #[error("invalid output channel count: {0} (need at least 1)")]
    InvalidChannelCount(usize),

    #[error("invalid maximum block size: {0} samples (need at least 1)")]
    InvalidBlockSize(usize),
}

/// Validate a host processing configuration.
pub fn check_config(sample_rate: f64, max_block: usize, num_channels: usize) -> Result<()> {
    if !sample_rate.is_finite() || sample_rate <= 0.0 {
        return Err(Error::InvalidSampleRate(sample_rate));
    }
    if max_block == 0 {
        return Err(Error::InvalidBlockSize(max_block));
    }
    if num_channels == 0 {
        return Err(Error::InvalidChannelCount(num_channels));
    }
    Ok(())
}
