//! Filter primitives for the breath resonator and tone tilt.
//!
//! All filters: `process(sample) -> sample`, `reset()`, and a coefficient
//! setter that leaves the state untouched so cutoffs can move per sample.

use std::f64::consts::{FRAC_1_SQRT_2, PI};

/// Butterworth Q used by the tone-tilt high/low-pass pair.
pub const BUTTERWORTH_Q: f64 = FRAC_1_SQRT_2;

/// Keep cutoffs strictly inside (0, Nyquist) so `tan`/`sin` stay finite.
fn safe_cutoff(cutoff_hz: f64, sample_rate: f64) -> f64 {
    cutoff_hz.clamp(1.0, sample_rate * 0.49)
}

/// Biquad filter: Direct Form II Transposed.
///
/// Coefficients from the Audio EQ Cookbook.
#[derive(Debug, Clone)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    s1: f64,
    s2: f64,
}

impl Biquad {
    /// Low-pass filter (Audio EQ Cookbook).
    pub fn lowpass(cutoff_hz: f64, q: f64, sample_rate: f64) -> Self {
        let mut f = Self::identity();
        f.set_lowpass(cutoff_hz, q, sample_rate);
        f
    }

    /// High-pass filter (Audio EQ Cookbook).
    pub fn highpass(cutoff_hz: f64, q: f64, sample_rate: f64) -> Self {
        let mut f = Self::identity();
        f.set_highpass(cutoff_hz, q, sample_rate);
        f
    }

    fn identity() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            s1: 0.0,
            s2: 0.0,
        }
    }

    /// Update coefficients to highpass without resetting filter state.
    pub fn set_highpass(&mut self, cutoff_hz: f64, q: f64, sample_rate: f64) {
        let w0 = 2.0 * PI * safe_cutoff(cutoff_hz, sample_rate) / sample_rate;
        let alpha = w0.sin() / (2.0 * q);
        let cos_w0 = w0.cos();

        let b1 = -(1.0 + cos_w0);
        let b0 = -b1 / 2.0;
        self.set_normalized(b0, b1, b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha);
    }

    /// Update coefficients to lowpass without resetting filter state.
    pub fn set_lowpass(&mut self, cutoff_hz: f64, q: f64, sample_rate: f64) {
        let w0 = 2.0 * PI * safe_cutoff(cutoff_hz, sample_rate) / sample_rate;
        let alpha = w0.sin() / (2.0 * q);
        let cos_w0 = w0.cos();

        let b1 = 1.0 - cos_w0;
        let b0 = b1 / 2.0;
        self.set_normalized(b0, b1, b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha);
    }

    fn set_normalized(&mut self, b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) {
        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
    }

    /// Process one sample (Direct Form II Transposed).
    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.s1;
        self.s1 = self.b1 * x - self.a1 * y + self.s2;
        self.s2 = self.b2 * x - self.a2 * y;
        y
    }

    pub fn reset(&mut self) {
        self.s1 = 0.0;
        self.s2 = 0.0;
    }
}

/// Topology-preserving-transform state variable filter, band-pass output.
///
/// Zero-delay-feedback SVF (trapezoidal integrators), so the cutoff can be
/// swept every sample without the blow-ups a direct-form biquad shows under
/// fast modulation. `resonance` is the filter Q: damping is `1 / resonance`
/// and the peak gain at the centre frequency equals `resonance`.
#[derive(Debug, Clone)]
pub struct SvfBandpass {
    g: f64,
    r2: f64,
    h: f64,
    s1: f64,
    s2: f64,
    cutoff_hz: f64,
    resonance: f64,
    sample_rate: f64,
}

impl SvfBandpass {
    pub fn new(cutoff_hz: f64, resonance: f64, sample_rate: f64) -> Self {
        let mut f = Self {
            g: 0.0,
            r2: 0.0,
            h: 0.0,
            s1: 0.0,
            s2: 0.0,
            cutoff_hz,
            resonance,
            sample_rate,
        };
        f.update_coefficients();
        f
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.update_coefficients();
    }

    pub fn set_cutoff(&mut self, cutoff_hz: f64) {
        if cutoff_hz != self.cutoff_hz {
            self.cutoff_hz = cutoff_hz;
            self.update_coefficients();
        }
    }

    pub fn set_resonance(&mut self, resonance: f64) {
        if resonance != self.resonance {
            self.resonance = resonance;
            self.update_coefficients();
        }
    }

    fn update_coefficients(&mut self) {
        let fc = safe_cutoff(self.cutoff_hz, self.sample_rate);
        self.g = (PI * fc / self.sample_rate).tan();
        self.r2 = 1.0 / self.resonance.max(1e-3);
        self.h = 1.0 / (1.0 + self.r2 * self.g + self.g * self.g);
    }

    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        let hp = self.h * (x - self.s1 * (self.g + self.r2) - self.s2);
        let v1 = self.g * hp;
        let bp = v1 + self.s1;
        self.s1 = bp + v1;
        let v2 = self.g * bp;
        let lp = v2 + self.s2;
        self.s2 = lp + v2;
        bp
    }

    pub fn reset(&mut self) {
        self.s1 = 0.0;
        self.s2 = 0.0;
    }
}
