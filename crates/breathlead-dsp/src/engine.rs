//! Breath engine: excitation, resonators, tone tilt and limiter for one voice.
//!
//! Signal flow per sample:
//!
//!   noise (white/pink blend) + pitch-locked sine anchor
//!   -> x air * pressure envelope
//!   -> pitch band-pass + two formant band-passes (fixed, non-normalized mix)
//!   -> tone tilt (high-pass then low-pass, recomputed every sample)
//!   -> tanh soft limiter (driven harder by resistance)
//!   -> output gain -> hard clamp to [-1, 1]
//!   -> added to every output channel
//!
//! The pressure envelope is a single one-pole follower with separate attack
//! and release coefficients. It chases a target built from velocity, mod
//! wheel and (optionally) motion energy while the gate is held, and zero
//! otherwise. There are no ADSR stages.

use std::f64::consts::TAU;

use crate::error::{self, Result};
use crate::filters::{BUTTERWORTH_Q, Biquad, SvfBandpass};
use crate::limiter::soft_limit;
use crate::motion::MotionTracker;
use crate::noise::{DEFAULT_SEED, NoiseSource};
use crate::params::{ParameterSnapshot, coeff_from_ms, db_to_gain};
use crate::smoother::SmoothedValue;

/// Effective pitch is always kept inside this band.
pub const MIN_PITCH_HZ: f64 = 20.0;
pub const MAX_PITCH_HZ: f64 = 12000.0;

/// Pitch bend range at full deflection, in semitones.
const BEND_SEMITONES: f64 = 2.0;
/// Share of the vibrato LFO that reaches pitch, in semitones at full depth.
const VIBRATO_PITCH_WEIGHT: f64 = 0.35;

/// Formant pairs at the two ends of the vowel morph.
const OPEN_VOWEL_HZ: (f64, f64) = (750.0, 1200.0);
const CLOSE_VOWEL_HZ: (f64, f64) = (450.0, 2000.0);
/// Formants lift slightly with pitch, relative to this reference.
const FORMANT_TRACK_REF_HZ: f64 = 220.0;
const FORMANT_TRACK_AMOUNT: f64 = 0.08;
const FORMANT_TRACK_MIN: f64 = -0.12;
const FORMANT_TRACK_MAX: f64 = 0.18;

/// Resonator mix. Sums to 1.4 on purpose; the limiter absorbs the excess.
const PITCH_MIX: f64 = 0.70;
const FORMANT1_MIX: f64 = 0.40;
const FORMANT2_MIX: f64 = 0.30;

/// Smoother ramp times, in seconds.
const FAST_RAMP_SECS: f64 = 0.02;
const SLOW_RAMP_SECS: f64 = 0.05;

const DEFAULT_SAMPLE_RATE: f64 = 44100.0;

/// Instantaneous breath pressure target.
///
/// Velocity gives the note its initial "speak", the mod wheel and motion
/// energy hold it up. Zero while the gate is off.
pub fn pressure_target(gate: bool, velocity: f64, mod_wheel: f64, motion_energy: f64) -> f64 {
    if !gate {
        return 0.0;
    }
    let speak = 0.20 + 0.80 * velocity;
    (0.55 * speak + 0.75 * mod_wheel + 0.60 * motion_energy).clamp(0.0, 1.0)
}

/// Pitch after bend and vibrato, clamped to the playable band.
pub fn effective_pitch(pitch_hz: f64, pitch_bend: f64, vibrato: f64) -> f64 {
    let semitones = BEND_SEMITONES * pitch_bend + VIBRATO_PITCH_WEIGHT * vibrato;
    (pitch_hz * 2.0f64.powf(semitones / 12.0)).clamp(MIN_PITCH_HZ, MAX_PITCH_HZ)
}

/// Formant centre frequencies for a vowel morph position and pitch.
pub fn formant_centres(formant: f64, pitch_hz: f64) -> (f64, f64) {
    let f1 = (1.0 - formant) * OPEN_VOWEL_HZ.0 + formant * CLOSE_VOWEL_HZ.0;
    let f2 = (1.0 - formant) * OPEN_VOWEL_HZ.1 + formant * CLOSE_VOWEL_HZ.1;

    let track = ((pitch_hz / FORMANT_TRACK_REF_HZ).log2() * FORMANT_TRACK_AMOUNT)
        .clamp(FORMANT_TRACK_MIN, FORMANT_TRACK_MAX);
    let lift = 2.0f64.powf(track);

    ((f1 * lift).clamp(120.0, 6000.0), (f2 * lift).clamp(200.0, 8000.0))
}

/// Tone-tilt cutoffs: (high-pass, low-pass). Brighter tone removes less low
/// end and opens the top.
pub fn tilt_cutoffs(tone: f64) -> (f64, f64) {
    (40.0 + (1.0 - tone) * 120.0, 4500.0 + tone * 11500.0)
}

/// Excitation before the air and pressure scaling. Resistance chokes the
/// noise; the sine anchor sits underneath at a fixed fraction.
pub fn excitation(noise: f64, sine: f64, resistance: f64, sine_anchor: f64) -> f64 {
    noise * (1.0 - 0.35 * resistance) + sine * (0.15 * sine_anchor)
}

/// Resonance of the (pitch, formant 1, formant 2) band-passes.
pub fn resonances(resistance: f64) -> (f64, f64, f64) {
    (
        0.7 + 0.25 * resistance,
        0.55 + 0.25 * resistance,
        0.45 + 0.20 * resistance,
    )
}

/// Gain into the soft limiter. A tighter bore overblows sooner.
pub fn limiter_drive(resistance: f64) -> f64 {
    1.2 + 0.9 * resistance
}

/// All per-block continuous controls, each behind its own smoother.
struct Smoothers {
    air: SmoothedValue,
    tone: SmoothedValue,
    formant: SmoothedValue,
    resistance: SmoothedValue,
    vibrato_depth: SmoothedValue,
    vibrato_rate: SmoothedValue,
    noise_color: SmoothedValue,
    sine_anchor: SmoothedValue,
    motion_sensitivity: SmoothedValue,
    output_gain: SmoothedValue,
}

impl Smoothers {
    fn new(p: &ParameterSnapshot) -> Self {
        Self {
            air: SmoothedValue::new(p.air),
            tone: SmoothedValue::new(p.tone),
            formant: SmoothedValue::new(p.formant),
            resistance: SmoothedValue::new(p.resistance),
            vibrato_depth: SmoothedValue::new(p.vibrato_depth),
            vibrato_rate: SmoothedValue::new(p.vibrato_rate_hz),
            noise_color: SmoothedValue::new(p.noise_color),
            sine_anchor: SmoothedValue::new(p.sine_anchor),
            motion_sensitivity: SmoothedValue::new(p.motion_sensitivity),
            output_gain: SmoothedValue::new(db_to_gain(p.output_gain_db)),
        }
    }

    fn reset(&mut self, sr: f64) {
        self.air.reset(sr, FAST_RAMP_SECS);
        self.tone.reset(sr, FAST_RAMP_SECS);
        self.formant.reset(sr, FAST_RAMP_SECS);
        self.resistance.reset(sr, FAST_RAMP_SECS);
        self.vibrato_depth.reset(sr, SLOW_RAMP_SECS);
        self.vibrato_rate.reset(sr, SLOW_RAMP_SECS);
        self.noise_color.reset(sr, SLOW_RAMP_SECS);
        self.sine_anchor.reset(sr, SLOW_RAMP_SECS);
        self.motion_sensitivity.reset(sr, SLOW_RAMP_SECS);
        self.output_gain.reset(sr, SLOW_RAMP_SECS);
    }

    fn set_targets(&mut self, p: &ParameterSnapshot) {
        self.air.set_target(p.air);
        self.tone.set_target(p.tone);
        self.formant.set_target(p.formant);
        self.resistance.set_target(p.resistance);
        self.vibrato_depth.set_target(p.vibrato_depth);
        self.vibrato_rate.set_target(p.vibrato_rate_hz);
        self.noise_color.set_target(p.noise_color);
        self.sine_anchor.set_target(p.sine_anchor);
        self.motion_sensitivity.set_target(p.motion_sensitivity);
        self.output_gain.set_target(db_to_gain(p.output_gain_db));
    }
}

/// Smoothed control values for one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedControls {
    pub air: f64,
    pub tone: f64,
    pub formant: f64,
    pub resistance: f64,
    pub vibrato_depth: f64,
    pub vibrato_rate_hz: f64,
    pub noise_color: f64,
    pub sine_anchor: f64,
    pub motion_sensitivity: f64,
    pub output_gain: f64,
}

pub struct BreathEngine {
    sample_rate: f64,
    num_channels: usize,

    // Performance state
    gate: bool,
    pitch_hz: f64,
    velocity: f64,
    mod_wheel: f64,
    aftertouch: f64,
    pitch_bend: f64,

    // Oscillators
    vibrato_phase: f64,
    anchor_phase: f64,

    // Pressure envelope
    envelope: f64,
    attack_ms: f64,
    release_ms: f64,
    attack_coeff: f64,
    release_coeff: f64,

    smoothers: Smoothers,
    motion_sustain: bool,
    motion: MotionTracker,
    noise: NoiseSource,

    // Resonators and tilt
    pitch_bp: SvfBandpass,
    formant1_bp: SvfBandpass,
    formant2_bp: SvfBandpass,
    tilt_hp: Biquad,
    tilt_lp: Biquad,

    // Last computed values, for inspection
    last_hz: f64,
    last_motion: f64,
    last_target: f64,
}

impl BreathEngine {
    pub fn new() -> Self {
        let p = ParameterSnapshot::default();
        let sr = DEFAULT_SAMPLE_RATE;
        let mut engine = Self {
            sample_rate: sr,
            num_channels: 2,
            gate: false,
            pitch_hz: 440.0,
            velocity: 0.0,
            mod_wheel: 0.0,
            aftertouch: 0.0,
            pitch_bend: 0.0,
            vibrato_phase: 0.0,
            anchor_phase: 0.0,
            envelope: 0.0,
            attack_ms: p.attack_ms,
            release_ms: p.release_ms,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            smoothers: Smoothers::new(&p),
            motion_sustain: p.motion_sustain,
            motion: MotionTracker::new(sr),
            noise: NoiseSource::new(DEFAULT_SEED),
            pitch_bp: SvfBandpass::new(440.0, 0.7, sr),
            formant1_bp: SvfBandpass::new(OPEN_VOWEL_HZ.0, 0.55, sr),
            formant2_bp: SvfBandpass::new(OPEN_VOWEL_HZ.1, 0.45, sr),
            tilt_hp: Biquad::highpass(60.0, BUTTERWORTH_Q, sr),
            tilt_lp: Biquad::lowpass(14000.0, BUTTERWORTH_Q, sr),
            last_hz: 440.0,
            last_motion: 0.0,
            last_target: 0.0,
        };
        engine.configure(sr);
        engine
    }

    /// Configure for a sample rate and channel count, and reset all state.
    ///
    /// Must be called before rendering and whenever the host configuration
    /// changes. This is the only fallible call on the engine.
    pub fn prepare(&mut self, sample_rate: f64, max_block: usize, num_channels: usize) -> Result<()> {
        if let Err(e) = error::check_config(sample_rate, max_block, num_channels) {
            log::warn!("breath engine rejected configuration: {e}");
            return Err(e);
        }
        log::debug!(
            "breath engine prepared: {sample_rate} Hz, {max_block} samples/block, {num_channels} ch"
        );
        self.num_channels = num_channels;
        self.configure(sample_rate);
        Ok(())
    }

    fn configure(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;

        self.pitch_bp.set_sample_rate(sample_rate);
        self.formant1_bp.set_sample_rate(sample_rate);
        self.formant2_bp.set_sample_rate(sample_rate);
        self.tilt_hp = Biquad::highpass(60.0, BUTTERWORTH_Q, sample_rate);
        self.tilt_lp = Biquad::lowpass(14000.0, BUTTERWORTH_Q, sample_rate);

        self.noise.reset(DEFAULT_SEED);
        self.motion.prepare(sample_rate);
        self.smoothers.reset(sample_rate);
        self.attack_coeff = coeff_from_ms(self.attack_ms, sample_rate);
        self.release_coeff = coeff_from_ms(self.release_ms, sample_rate);

        self.reset();
    }

    /// Silence the engine without touching the sample rate: gate off,
    /// phases and envelope to zero, filters and motion extractors cleared.
    pub fn reset(&mut self) {
        self.gate = false;
        self.vibrato_phase = 0.0;
        self.anchor_phase = 0.0;
        self.envelope = 0.0;
        self.last_motion = 0.0;
        self.last_target = 0.0;

        self.pitch_bp.reset();
        self.formant1_bp.reset();
        self.formant2_bp.reset();
        self.tilt_hp.reset();
        self.tilt_lp.reset();
        self.motion.reset();
    }

    pub fn set_pitch_hz(&mut self, hz: f64) {
        self.pitch_hz = if hz.is_nan() {
            MIN_PITCH_HZ
        } else {
            hz.clamp(MIN_PITCH_HZ, MAX_PITCH_HZ)
        };
    }

    pub fn set_gate(&mut self, on: bool) {
        self.gate = on;
    }

    pub fn set_velocity(&mut self, velocity: f64) {
        self.velocity = clamp_unit(velocity);
    }

    pub fn set_mod_wheel(&mut self, value: f64) {
        self.mod_wheel = clamp_unit(value);
    }

    pub fn set_aftertouch(&mut self, value: f64) {
        self.aftertouch = clamp_unit(value);
    }

    pub fn set_pitch_bend(&mut self, value: f64) {
        self.pitch_bend = if value.is_nan() { 0.0 } else { value.clamp(-1.0, 1.0) };
    }

    /// Push a parameter snapshot into the smoothers. Call at most once per block.
    pub fn set_params(&mut self, params: &ParameterSnapshot) {
        let p = params.clamped();
        self.smoothers.set_targets(&p);
        self.motion_sustain = p.motion_sustain;

        // Coefficients only change when the times do.
        if p.attack_ms != self.attack_ms {
            self.attack_ms = p.attack_ms;
            self.attack_coeff = coeff_from_ms(p.attack_ms, self.sample_rate);
        }
        if p.release_ms != self.release_ms {
            self.release_ms = p.release_ms;
            self.release_coeff = coeff_from_ms(p.release_ms, self.sample_rate);
        }
    }

    /// Render `num_samples` samples, adding the mono result into every
    /// channel of `output` starting at `start`. Samples that fall outside a
    /// channel slice are computed but dropped.
    pub fn render(&mut self, output: &mut [&mut [f32]], start: usize, num_samples: usize) {
        for i in start..start + num_samples {
            let y = self.tick() as f32;
            for channel in output.iter_mut() {
                if let Some(s) = channel.get_mut(i) {
                    *s += y;
                }
            }
        }
    }

    /// Advance one sample and return the output value.
    pub fn tick(&mut self) -> f64 {
        let c = self.next_controls();
        let sr = self.sample_rate;

        // Vibrato
        self.vibrato_phase += c.vibrato_rate_hz / sr;
        if self.vibrato_phase >= 1.0 {
            self.vibrato_phase -= 1.0;
        }
        let vibrato = (self.vibrato_phase * TAU).sin() * c.vibrato_depth;

        let hz = effective_pitch(self.pitch_hz, self.pitch_bend, vibrato);
        self.last_hz = hz;

        let motion = if self.motion_sustain {
            self.motion.process(
                self.mod_wheel,
                self.aftertouch,
                self.pitch_bend,
                hz,
                c.motion_sensitivity,
            )
        } else {
            0.0
        };
        self.last_motion = motion;

        // Pressure envelope
        let target = pressure_target(self.gate, self.velocity, self.mod_wheel, motion);
        self.last_target = target;
        let coeff = if target > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = (target + coeff * (self.envelope - target)).clamp(0.0, 1.0);

        // Excitation: colored noise plus the intonation anchor
        let n = self.noise.next();
        let noise = (1.0 - c.noise_color) * n.white + c.noise_color * n.pink;

        self.anchor_phase += hz / sr;
        if self.anchor_phase >= 1.0 {
            self.anchor_phase -= 1.0;
        }
        let sine = (self.anchor_phase * TAU).sin();

        let x = excitation(noise, sine, c.resistance, c.sine_anchor) * c.air * self.envelope;

        // Resonators
        let (q_pitch, q_f1, q_f2) = resonances(c.resistance);
        self.pitch_bp.set_cutoff(hz);
        self.pitch_bp.set_resonance(q_pitch);

        let (f1, f2) = formant_centres(c.formant, hz);
        self.formant1_bp.set_cutoff(f1);
        self.formant2_bp.set_cutoff(f2);
        self.formant1_bp.set_resonance(q_f1);
        self.formant2_bp.set_resonance(q_f2);

        let y_pitch = self.pitch_bp.process(x);
        let y_f1 = self.formant1_bp.process(x);
        let y_f2 = self.formant2_bp.process(x);
        let mut y = PITCH_MIX * y_pitch + FORMANT1_MIX * y_f1 + FORMANT2_MIX * y_f2;

        // Tone tilt, high-pass first
        let (hp_hz, lp_hz) = tilt_cutoffs(c.tone);
        self.tilt_hp.set_highpass(hp_hz, BUTTERWORTH_Q, sr);
        self.tilt_lp.set_lowpass(lp_hz, BUTTERWORTH_Q, sr);
        y = self.tilt_hp.process(y);
        y = self.tilt_lp.process(y);

        y = soft_limit(y * limiter_drive(c.resistance));
        (y * c.output_gain).clamp(-1.0, 1.0)
    }

    fn next_controls(&mut self) -> SmoothedControls {
        let s = &mut self.smoothers;
        SmoothedControls {
            air: s.air.next_value(),
            tone: s.tone.next_value(),
            formant: s.formant.next_value(),
            resistance: s.resistance.next_value(),
            vibrato_depth: s.vibrato_depth.next_value(),
            vibrato_rate_hz: s.vibrato_rate.next_value(),
            noise_color: s.noise_color.next_value(),
            sine_anchor: s.sine_anchor.next_value(),
            motion_sensitivity: s.motion_sensitivity.next_value(),
            output_gain: s.output_gain.next_value(),
        }
    }

    /// Current smoothed values without advancing the smoothers.
    pub fn controls(&self) -> SmoothedControls {
        let s = &self.smoothers;
        SmoothedControls {
            air: s.air.current(),
            tone: s.tone.current(),
            formant: s.formant.current(),
            resistance: s.resistance.current(),
            vibrato_depth: s.vibrato_depth.current(),
            vibrato_rate_hz: s.vibrato_rate.current(),
            noise_color: s.noise_color.current(),
            sine_anchor: s.sine_anchor.current(),
            motion_sensitivity: s.motion_sensitivity.current(),
            output_gain: s.output_gain.current(),
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn is_gated(&self) -> bool {
        self.gate
    }

    pub fn envelope(&self) -> f64 {
        self.envelope
    }

    pub fn pitch_hz(&self) -> f64 {
        self.pitch_hz
    }

    /// Pitch after bend and vibrato from the most recent sample.
    pub fn effective_hz(&self) -> f64 {
        self.last_hz
    }

    /// Pressure target from the most recent sample.
    pub fn pressure(&self) -> f64 {
        self.last_target
    }

    /// Combined motion energy from the most recent sample.
    pub fn motion_energy(&self) -> f64 {
        self.last_motion
    }
}

impl Default for BreathEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SR: f64 = 48000.0;

    fn prepared() -> BreathEngine {
        let mut e = BreathEngine::new();
        e.prepare(SR, 512, 2).unwrap();
        e
    }

    fn scenario_params() -> ParameterSnapshot {
        ParameterSnapshot {
            air: 1.0,
            tone: 0.5,
            formant: 0.0,
            resistance: 0.0,
            vibrato_depth: 0.0,
            vibrato_rate_hz: 5.0,
            noise_color: 0.0,
            sine_anchor: 0.0,
            motion_sustain: false,
            motion_sensitivity: 0.0,
            attack_ms: 1.0,
            release_ms: 5.0,
            output_gain_db: 0.0,
            portamento_ms: 0.0,
        }
    }

    fn render_stereo(e: &mut BreathEngine, n: usize) -> (Vec<f32>, Vec<f32>) {
        let mut left = vec![0.0f32; n];
        let mut right = vec![0.0f32; n];
        {
            let mut chans: [&mut [f32]; 2] = [&mut left, &mut right];
            e.render(&mut chans, 0, n);
        }
        (left, right)
    }

    #[test]
    fn test_prepare_rejects_bad_config() {
        let mut e = BreathEngine::new();
        assert!(e.prepare(0.0, 512, 2).is_err());
        assert!(e.prepare(-1.0, 512, 2).is_err());
        assert!(e.prepare(48000.0, 512, 0).is_err());
        assert!(e.prepare(48000.0, 512, 1).is_ok());
    }

    #[test]
    fn test_pressure_target_formula() {
        assert_eq!(pressure_target(true, 1.0, 1.0, 0.0), 1.0);
        assert_eq!(pressure_target(false, 1.0, 1.0, 1.0), 0.0);
        assert_relative_eq!(pressure_target(true, 1.0, 0.0, 0.0), 0.55, epsilon = 1e-12);
        assert_relative_eq!(pressure_target(true, 0.0, 0.0, 0.0), 0.11, epsilon = 1e-12);
        assert_relative_eq!(pressure_target(true, 0.0, 0.0, 1.0), 0.71, epsilon = 1e-12);
    }

    #[test]
    fn test_excitation_formula() {
        assert_eq!(excitation(1.0, 0.0, 0.0, 1.0), 1.0);
        assert_relative_eq!(excitation(1.0, 0.0, 1.0, 0.0), 0.65, epsilon = 1e-12);
        // Resistance only scales the noise, never the anchor.
        assert_relative_eq!(excitation(0.0, 1.0, 1.0, 1.0), 0.15, epsilon = 1e-12);
        assert_relative_eq!(excitation(0.0, 1.0, 0.0, 0.5), 0.075, epsilon = 1e-12);
        assert_eq!(excitation(0.0, 1.0, 0.3, 0.0), 0.0);
        assert_relative_eq!(
            excitation(-0.5, 0.8, 0.4, 0.6),
            -0.5 * 0.86 + 0.8 * 0.09,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_resonances_track_resistance() {
        let (p, f1, f2) = resonances(0.0);
        assert_relative_eq!(p, 0.7, epsilon = 1e-12);
        assert_relative_eq!(f1, 0.55, epsilon = 1e-12);
        assert_relative_eq!(f2, 0.45, epsilon = 1e-12);

        let (p, f1, f2) = resonances(1.0);
        assert_relative_eq!(p, 0.95, epsilon = 1e-12);
        assert_relative_eq!(f1, 0.80, epsilon = 1e-12);
        assert_relative_eq!(f2, 0.65, epsilon = 1e-12);
    }

    #[test]
    fn test_limiter_drive_range() {
        assert_relative_eq!(limiter_drive(0.0), 1.2, epsilon = 1e-12);
        assert_relative_eq!(limiter_drive(0.5), 1.65, epsilon = 1e-12);
        assert_relative_eq!(limiter_drive(1.0), 2.1, epsilon = 1e-12);
    }

    /// Magnitude of the DFT bin at `hz` over `signal`.
    fn tone_magnitude(signal: &[f32], hz: f64) -> f64 {
        let w = TAU * hz / SR;
        let (mut re, mut im) = (0.0, 0.0);
        for (n, &x) in signal.iter().enumerate() {
            let phase = w * n as f64;
            re += x as f64 * phase.cos();
            im -= x as f64 * phase.sin();
        }
        (re * re + im * im).sqrt()
    }

    #[test]
    fn test_sine_anchor_adds_energy_at_pitch() {
        let render_with = |anchor: f64| {
            let mut e = BreathEngine::new();
            e.set_params(&ParameterSnapshot {
                sine_anchor: anchor,
                ..scenario_params()
            });
            e.prepare(SR, 512, 2).unwrap();
            e.set_gate(true);
            e.set_velocity(1.0);
            e.set_mod_wheel(1.0);
            e.set_pitch_hz(440.0);
            let (left, _) = render_stereo(&mut e, 48000);
            // Skip the attack.
            tone_magnitude(&left[4800..], 440.0)
        };

        let without = render_with(0.0);
        let with = render_with(1.0);
        assert!(
            with > 2.0 * without,
            "anchor should dominate the pitch bin: with {with}, without {without}"
        );
    }

    #[test]
    fn test_effective_pitch_always_clamped() {
        for i in 0..=200 {
            let hz = i as f64 * 100.0;
            for bend in [-1.0, 0.0, 1.0] {
                for vib in [-1.0, 0.0, 1.0] {
                    let f = effective_pitch(hz, bend, vib);
                    assert!((MIN_PITCH_HZ..=MAX_PITCH_HZ).contains(&f), "{hz} Hz -> {f}");
                }
            }
        }
    }

    #[test]
    fn test_bend_is_two_semitones() {
        let up = effective_pitch(440.0, 1.0, 0.0);
        assert_relative_eq!(up, 440.0 * 2.0f64.powf(2.0 / 12.0), epsilon = 1e-9);
        let down = effective_pitch(440.0, -1.0, 0.0);
        assert_relative_eq!(down, 440.0 * 2.0f64.powf(-2.0 / 12.0), epsilon = 1e-9);
    }

    #[test]
    fn test_engine_pitch_stays_in_band() {
        let mut e = prepared();
        e.set_params(&ParameterSnapshot {
            vibrato_depth: 1.0,
            ..scenario_params()
        });
        e.set_gate(true);
        e.set_velocity(1.0);
        for hz in [0.0, 5.0, 19.9, 440.0, 11999.0, 15000.0, 20000.0] {
            e.set_pitch_hz(hz);
            e.set_pitch_bend(if hz > 1000.0 { 1.0 } else { -1.0 });
            for _ in 0..64 {
                e.tick();
                let f = e.effective_hz();
                assert!((MIN_PITCH_HZ..=MAX_PITCH_HZ).contains(&f), "{hz} -> {f}");
            }
        }
    }

    #[test]
    fn test_formant_centres_morph_and_clamp() {
        let (a1, a2) = formant_centres(0.0, FORMANT_TRACK_REF_HZ);
        assert_relative_eq!(a1, 750.0, epsilon = 1e-9);
        assert_relative_eq!(a2, 1200.0, epsilon = 1e-9);
        let (e1, e2) = formant_centres(1.0, FORMANT_TRACK_REF_HZ);
        assert_relative_eq!(e1, 450.0, epsilon = 1e-9);
        assert_relative_eq!(e2, 2000.0, epsilon = 1e-9);

        // Tracking is capped at +18% (in the exponent) high and -12% low.
        let (hi1, _) = formant_centres(0.0, 12000.0);
        assert_relative_eq!(hi1, 750.0 * 2.0f64.powf(0.18), epsilon = 1e-9);
        let (lo1, _) = formant_centres(0.0, 20.0);
        assert_relative_eq!(lo1, 750.0 * 2.0f64.powf(-0.12), epsilon = 1e-9);

        for form in [0.0, 0.5, 1.0] {
            for hz in [20.0, 220.0, 12000.0] {
                let (f1, f2) = formant_centres(form, hz);
                assert!((120.0..=6000.0).contains(&f1));
                assert!((200.0..=8000.0).contains(&f2));
            }
        }
    }

    #[test]
    fn test_tilt_cutoffs_direction() {
        assert_eq!(tilt_cutoffs(0.0), (160.0, 4500.0));
        assert_eq!(tilt_cutoffs(1.0), (40.0, 16000.0));
        let (hp_dark, lp_dark) = tilt_cutoffs(0.25);
        let (hp_bright, lp_bright) = tilt_cutoffs(0.75);
        assert!(hp_bright < hp_dark);
        assert!(lp_bright > lp_dark);
    }

    #[test]
    fn test_smoothed_params_converge_to_clamped_targets() {
        let mut e = prepared();
        let wild = ParameterSnapshot {
            air: 2.0,
            tone: 0.9,
            formant: -1.0,
            resistance: 0.6,
            vibrato_depth: 0.4,
            vibrato_rate_hz: 100.0,
            noise_color: 0.25,
            sine_anchor: 0.5,
            motion_sustain: false,
            motion_sensitivity: 0.75,
            attack_ms: 10.0,
            release_ms: 50.0,
            output_gain_db: 6.0,
            portamento_ms: 0.0,
        };
        e.set_params(&wild);
        // Longest ramp is 50 ms.
        for _ in 0..(SR * 0.05) as usize + 1 {
            e.tick();
            let c = e.controls();
            assert!((0.0..=1.0).contains(&c.air));
            assert!((0.5..=8.0).contains(&c.vibrato_rate_hz));
        }
        let c = e.controls();
        assert_eq!(c.air, 1.0);
        assert_eq!(c.tone, 0.9);
        assert_eq!(c.formant, 0.0);
        assert_eq!(c.resistance, 0.6);
        assert_eq!(c.vibrato_depth, 0.4);
        assert_eq!(c.vibrato_rate_hz, 8.0);
        assert_eq!(c.noise_color, 0.25);
        assert_eq!(c.sine_anchor, 0.5);
        assert_eq!(c.motion_sensitivity, 0.75);
        assert_eq!(c.output_gain, db_to_gain(6.0));
    }

    #[test]
    fn test_envelope_converges_to_zero_after_release() {
        let mut e = prepared();
        e.set_params(&scenario_params());
        e.set_pitch_hz(440.0);
        e.set_gate(true);
        e.set_velocity(1.0);
        for _ in 0..4800 {
            e.tick();
        }
        assert!(e.envelope() > 0.5);

        e.set_gate(false);
        // Release is 5 ms; 20 time constants.
        for _ in 0..(SR * 0.1) as usize {
            e.tick();
        }
        assert!(e.envelope() < 1e-6, "envelope stuck at {}", e.envelope());
    }

    #[test]
    fn test_envelope_stays_in_unit_range() {
        let mut e = prepared();
        e.set_params(&ParameterSnapshot {
            motion_sustain: true,
            motion_sensitivity: 1.0,
            ..scenario_params()
        });
        e.set_gate(true);
        e.set_velocity(1.0);
        e.set_mod_wheel(1.0);
        for i in 0..24000 {
            if i % 100 == 0 {
                e.set_aftertouch((i / 100 % 2) as f64);
            }
            e.tick();
            assert!((0.0..=1.0).contains(&e.envelope()));
            assert!((0.0..=1.0).contains(&e.motion_energy()));
        }
    }

    #[test]
    fn test_scenario_attack_and_channel_duplication() {
        let mut e = prepared();
        e.set_params(&scenario_params());
        e.set_gate(true);
        e.set_velocity(1.0);
        e.set_mod_wheel(1.0);
        e.set_pitch_hz(440.0);

        // Attack tau is 1 ms (48 samples): 99% after ~5 ms, 99.9% after ~7 ms.
        let mut left = vec![0.0f32; 48000];
        let mut right = vec![0.0f32; 48000];
        let mut env_at = Vec::with_capacity(400);
        for i in 0..48000 {
            {
                let mut chans: [&mut [f32]; 2] = [&mut left, &mut right];
                e.render(&mut chans, i, 1);
            }
            if i < 400 {
                env_at.push(e.envelope());
            }
        }
        assert_eq!(e.pressure(), 1.0);
        assert!(env_at[239] >= 0.99, "env after 240 samples: {}", env_at[239]);
        assert!(env_at[339] >= 0.999, "env after 340 samples: {}", env_at[339]);

        assert_eq!(left, right);
        let peak = left.iter().fold(0.0f32, |m, x| m.max(x.abs()));
        assert!(peak > 0.01, "no audio produced: {peak}");
    }

    #[test]
    fn test_render_adds_into_buffer() {
        let mut a = prepared();
        let mut b = prepared();
        for e in [&mut a, &mut b] {
            e.set_params(&scenario_params());
            e.set_gate(true);
            e.set_velocity(1.0);
        }
        let mut base = vec![0.25f32; 256];
        let mut clean = vec![0.0f32; 256];
        {
            let mut chans: [&mut [f32]; 1] = [&mut base];
            a.render(&mut chans, 0, 256);
        }
        {
            let mut chans: [&mut [f32]; 1] = [&mut clean];
            b.render(&mut chans, 0, 256);
        }
        for (x, y) in base.iter().zip(&clean) {
            assert_eq!(*x, 0.25 + *y);
        }
    }

    #[test]
    fn test_render_respects_offset() {
        let mut e = prepared();
        e.set_params(&scenario_params());
        e.set_gate(true);
        e.set_velocity(1.0);
        e.set_mod_wheel(1.0);
        let mut buf = vec![0.0f32; 512];
        {
            let mut chans: [&mut [f32]; 1] = [&mut buf];
            e.render(&mut chans, 256, 256);
        }
        assert!(buf[..256].iter().all(|&s| s == 0.0));
        assert!(buf[256..].iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_output_bounded_for_extreme_settings() {
        let mut e = prepared();
        e.set_params(&ParameterSnapshot {
            air: 1.0,
            tone: 1.0,
            formant: 1.0,
            resistance: 1.0,
            vibrato_depth: 1.0,
            vibrato_rate_hz: 8.0,
            noise_color: 0.5,
            sine_anchor: 1.0,
            motion_sustain: true,
            motion_sensitivity: 1.0,
            attack_ms: 1.0,
            release_ms: 5.0,
            output_gain_db: 12.0,
            portamento_ms: 0.0,
        });
        e.set_gate(true);
        e.set_velocity(1.0);
        e.set_mod_wheel(1.0);
        e.set_pitch_hz(60.0);
        for i in 0..48000 {
            if i % 480 == 0 {
                e.set_pitch_bend(((i / 480) % 3) as f64 - 1.0);
            }
            let y = e.tick();
            assert!((-1.0..=1.0).contains(&y), "sample {i} out of range: {y}");
        }
    }

    #[test]
    fn test_deterministic() {
        let run = || {
            let mut e = prepared();
            e.set_params(&ParameterSnapshot::default());
            e.set_gate(true);
            e.set_velocity(0.8);
            e.set_pitch_hz(330.0);
            let (l, _) = render_stereo(&mut e, 4800);
            e.set_gate(false);
            let (l2, _) = render_stereo(&mut e, 2400);
            [l, l2].concat()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_reset_silences() {
        let mut e = prepared();
        e.set_params(&scenario_params());
        e.set_gate(true);
        e.set_velocity(1.0);
        render_stereo(&mut e, 1000);
        assert!(e.envelope() > 0.0);
        e.reset();
        assert!(!e.is_gated());
        assert_eq!(e.envelope(), 0.0);
        let (l, _) = render_stereo(&mut e, 256);
        assert!(l.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_motion_sustain_holds_pressure() {
        let mut with = prepared();
        let mut without = prepared();
        with.set_params(&ParameterSnapshot {
            motion_sustain: true,
            motion_sensitivity: 1.0,
            ..scenario_params()
        });
        without.set_params(&scenario_params());
        for e in [&mut with, &mut without] {
            e.set_pitch_hz(440.0);
            e.set_gate(true);
            e.set_velocity(0.0);
        }
        for i in 0..24000 {
            // Wiggle aftertouch in 7-bit steps.
            if i % 200 == 0 {
                let v = ((i / 200) % 16) as f64 / 127.0;
                with.set_aftertouch(v);
                without.set_aftertouch(v);
            }
            with.tick();
            without.tick();
        }
        assert!(with.motion_energy() > 0.0);
        assert_eq!(without.motion_energy(), 0.0);
        assert!(with.envelope() > without.envelope());
    }

    #[test]
    fn test_setters_clamp() {
        let mut e = prepared();
        e.set_velocity(3.0);
        e.set_mod_wheel(-1.0);
        e.set_pitch_bend(5.0);
        e.set_pitch_hz(1e9);
        e.set_gate(true);
        e.tick();
        assert_eq!(e.pressure(), (0.55f64).clamp(0.0, 1.0));
        assert_eq!(e.pitch_hz(), MAX_PITCH_HZ);
    }
}
