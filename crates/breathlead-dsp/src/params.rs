//! Sound parameters, read once per processing block.
//!
//! The host owns the live values (plugin parameter store, CLI flags); the
//! engine only ever sees a copied `ParameterSnapshot` and clamps every field
//! into its domain before using it.

use std::ops::RangeInclusive;

pub const UNIT_RANGE: RangeInclusive<f64> = 0.0..=1.0;
pub const VIBRATO_RATE_HZ: RangeInclusive<f64> = 0.5..=8.0;
pub const ATTACK_MS: RangeInclusive<f64> = 1.0..=2000.0;
pub const RELEASE_MS: RangeInclusive<f64> = 5.0..=5000.0;
pub const OUTPUT_GAIN_DB: RangeInclusive<f64> = -60.0..=12.0;
pub const PORTAMENTO_MS: RangeInclusive<f64> = 0.0..=2000.0;

fn clamp_to(value: f64, range: &RangeInclusive<f64>) -> f64 {
    // NaN from a broken upstream lands on the low end instead of propagating.
    if value.is_nan() {
        return *range.start();
    }
    value.clamp(*range.start(), *range.end())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSnapshot {
    /// Excitation level (breath amount).
    pub air: f64,
    /// 0 = dark, 1 = bright. Drives the tilt high/low-pass pair.
    pub tone: f64,
    /// Vowel morph: 0 = open ("ah"), 1 = close ("eh").
    pub formant: f64,
    /// Bore resistance: tighter resonances, less raw noise, more drive.
    pub resistance: f64,
    pub vibrato_depth: f64,
    pub vibrato_rate_hz: f64,
    /// 0 = white noise, 1 = pink noise.
    pub noise_color: f64,
    /// Level of the sine that anchors intonation under the noise.
    pub sine_anchor: f64,
    /// Let controller movement sustain the breath pressure.
    pub motion_sustain: bool,
    pub motion_sensitivity: f64,
    pub attack_ms: f64,
    pub release_ms: f64,
    pub output_gain_db: f64,
    /// Glide time between notes. Consumed by the voice, not the engine.
    pub portamento_ms: f64,
}

impl Default for ParameterSnapshot {
    fn default() -> Self {
        Self {
            air: 0.8,
            tone: 0.5,
            formant: 0.3,
            resistance: 0.3,
            vibrato_depth: 0.15,
            vibrato_rate_hz: 5.0,
            noise_color: 0.4,
            sine_anchor: 0.3,
            motion_sustain: false,
            motion_sensitivity: 0.5,
            attack_ms: 25.0,
            release_ms: 180.0,
            output_gain_db: -6.0,
            portamento_ms: 40.0,
        }
    }
}

impl ParameterSnapshot {
    /// Copy with every field forced into its domain.
    pub fn clamped(&self) -> Self {
        Self {
            air: clamp_to(self.air, &UNIT_RANGE),
            tone: clamp_to(self.tone, &UNIT_RANGE),
            formant: clamp_to(self.formant, &UNIT_RANGE),
            resistance: clamp_to(self.resistance, &UNIT_RANGE),
            vibrato_depth: clamp_to(self.vibrato_depth, &UNIT_RANGE),
            vibrato_rate_hz: clamp_to(self.vibrato_rate_hz, &VIBRATO_RATE_HZ),
            noise_color: clamp_to(self.noise_color, &UNIT_RANGE),
            sine_anchor: clamp_to(self.sine_anchor, &UNIT_RANGE),
            motion_sustain: self.motion_sustain,
            motion_sensitivity: clamp_to(self.motion_sensitivity, &UNIT_RANGE),
            attack_ms: clamp_to(self.attack_ms, &ATTACK_MS),
            release_ms: clamp_to(self.release_ms, &RELEASE_MS),
            output_gain_db: clamp_to(self.output_gain_db, &OUTPUT_GAIN_DB),
            portamento_ms: clamp_to(self.portamento_ms, &PORTAMENTO_MS),
        }
    }
}

/// Decibels to linear gain.
#[inline]
pub fn db_to_gain(db: f64) -> f64 {
    10.0f64.powf(db / 20.0)
}

/// One-pole coefficient for a time constant in milliseconds.
///
/// `y = target + coeff * (y - target)` reaches 63% of a step after `ms`.
pub fn coeff_from_ms(ms: f64, sample_rate: f64) -> f64 {
    let tau = (ms / 1000.0).max(0.0001);
    (-1.0 / (tau * sample_rate)).exp()
}
