//! Soft limiter for the resonator output.
//!
//! `tanh` rounds peaks off the way a breath-driven resonator compresses when
//! over-blown: unity slope around zero, odd-symmetric, and asymptotic to ±1.

/// Soft-clip one sample. Output never leaves [-1, 1].
#[inline]
pub fn soft_limit(x: f64) -> f64 {
    x.tanh()
}
