//! Breath noise source: white and pink noise from a single seeded LCG.
//!
//! Both streams are derived from the same white draw each sample, so the
//! pink stream is a filtered view of the white one rather than an
//! independent generator. Pink uses Paul Kellet's refined 7-pole
//! approximation of a -3 dB/octave slope.

/// Seed used by the engine. Fixed so renders are reproducible.
pub const DEFAULT_SEED: u32 = 0x1234_5678;

/// Gain that brings the Kellet filter sum back to roughly unit peak.
const PINK_GAIN: f64 = 0.11;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseSample {
    pub white: f64,
    pub pink: f64,
}

#[derive(Debug, Clone)]
pub struct NoiseSource {
    rng_state: u32,
    pink: [f64; 7],
}

impl NoiseSource {
    pub fn new(seed: u32) -> Self {
        Self {
            rng_state: seed,
            pink: [0.0; 7],
        }
    }

    /// Restart both streams from `seed`.
    pub fn reset(&mut self, seed: u32) {
        self.rng_state = seed;
        self.pink = [0.0; 7];
    }

    /// Draw the next white/pink pair. Both lie in [-1, 1].
    #[inline]
    pub fn next(&mut self) -> NoiseSample {
        let white = self.next_white();
        NoiseSample {
            white,
            pink: self.pink_filter(white),
        }
    }

    fn next_white(&mut self) -> f64 {
        self.rng_state = self.rng_state.wrapping_mul(1664525).wrapping_add(1013904223);
        ((self.rng_state as i32) as f64 / i32::MAX as f64).max(-1.0)
    }

    fn pink_filter(&mut self, white: f64) -> f64 {
        let b = &mut self.pink;
        b[0] = 0.99886 * b[0] + white * 0.0555179;
        b[1] = 0.99332 * b[1] + white * 0.0750759;
        b[2] = 0.96900 * b[2] + white * 0.1538520;
        b[3] = 0.86650 * b[3] + white * 0.3104856;
        b[4] = 0.55000 * b[4] + white * 0.5329522;
        b[5] = -0.7616 * b[5] - white * 0.0168980;
        let sum = b[0] + b[1] + b[2] + b[3] + b[4] + b[5] + b[6] + white * 0.5362;
        b[6] = white * 0.115926;
        (sum * PINK_GAIN).clamp(-1.0, 1.0)
    }
}

impl Default for NoiseSource {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}
