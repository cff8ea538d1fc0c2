//! Motion energy: turns controller movement into sustain pressure.
//!
//! Each extractor watches one control (mod wheel, aftertouch, pitch bend or
//! normalized pitch). Every sample it takes the absolute change since the
//! previous sample, scales it by a sensitivity-dependent gain, and feeds it
//! into a leaky integrator. Steady movement at `r` units/second settles at
//! roughly `r * gain * tau`; when the control stops, the estimate decays with
//! time constant `tau` and is flushed to exactly zero once it drops below
//! `ENERGY_FLOOR`.
//!
//! MIDI controllers move in steps, so a single sample carries the whole
//! change of an event. Integrating the change (instead of following the
//! per-sample rate) keeps that stepwise input from reading as a spike.

/// Decay time constant of the activity estimate, in seconds.
const DECAY_TAU: f64 = 0.2;

/// Gain at sensitivity 1; the gain scales linearly down to zero at
/// sensitivity 0. A full-range sweep over half a second reaches full energy
/// from sensitivity 0.25 upward.
const GAIN_MAX: f64 = 10.0;

/// Below this the estimate snaps to zero so stillness ends in silence.
const ENERGY_FLOOR: f64 = 1e-5;

/// Pitch motion counts half as much as the three performance controls.
const PITCH_WEIGHT: f64 = 0.5;

/// Reference frequency used to normalize pitch before tracking it.
pub const PITCH_REFERENCE_HZ: f64 = 2000.0;

#[derive(Debug, Clone)]
pub struct MotionEnergy {
    decay: f64,
    activity: f64,
    prev: f64,
    primed: bool,
}

impl MotionEnergy {
    pub fn new(sample_rate: f64) -> Self {
        let mut me = Self {
            decay: 0.0,
            activity: 0.0,
            prev: 0.0,
            primed: false,
        };
        me.prepare(sample_rate);
        me
    }

    pub fn prepare(&mut self, sample_rate: f64) {
        self.decay = (-1.0 / (DECAY_TAU * sample_rate)).exp();
    }

    /// Drop to zero energy. The next input becomes the new baseline, so the
    /// first event after a reset does not register as motion.
    pub fn reset(&mut self) {
        self.activity = 0.0;
        self.primed = false;
    }

    /// Track `value` for one sample and return the activity estimate in [0, 1].
    #[inline]
    pub fn process(&mut self, value: f64, sensitivity: f64) -> f64 {
        if !self.primed {
            self.prev = value;
            self.primed = true;
        }
        let delta = (value - self.prev).abs();
        self.prev = value;

        let gain = GAIN_MAX * sensitivity.clamp(0.0, 1.0);
        self.activity = (self.activity * self.decay + delta * gain).min(1.0);
        if self.activity < ENERGY_FLOOR {
            self.activity = 0.0;
        }
        self.activity
    }
}

/// The four extractors the engine runs while motion sustain is enabled.
#[derive(Debug, Clone)]
pub struct MotionTracker {
    mod_wheel: MotionEnergy,
    aftertouch: MotionEnergy,
    pitch_bend: MotionEnergy,
    pitch: MotionEnergy,
}

impl MotionTracker {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            mod_wheel: MotionEnergy::new(sample_rate),
            aftertouch: MotionEnergy::new(sample_rate),
            pitch_bend: MotionEnergy::new(sample_rate),
            pitch: MotionEnergy::new(sample_rate),
        }
    }

    pub fn prepare(&mut self, sample_rate: f64) {
        self.mod_wheel.prepare(sample_rate);
        self.aftertouch.prepare(sample_rate);
        self.pitch_bend.prepare(sample_rate);
        self.pitch.prepare(sample_rate);
    }

    pub fn reset(&mut self) {
        self.mod_wheel.reset();
        self.aftertouch.reset();
        self.pitch_bend.reset();
        self.pitch.reset();
    }

    /// Run all four extractors and return the combined motion energy in [0, 1].
    pub fn process(
        &mut self,
        mod_wheel: f64,
        aftertouch: f64,
        pitch_bend: f64,
        pitch_hz: f64,
        sensitivity: f64,
    ) -> f64 {
        let e_mw = self.mod_wheel.process(mod_wheel, sensitivity);
        let e_at = self.aftertouch.process(aftertouch, sensitivity);
        let e_pb = self.pitch_bend.process(pitch_bend, sensitivity);
        let e_p = self.pitch.process(pitch_hz / PITCH_REFERENCE_HZ, sensitivity);
        combine(e_mw, e_at, e_pb, e_p)
    }
}

/// Weighted sum of the per-control energies, clamped to [0, 1].
pub fn combine(mod_wheel: f64, aftertouch: f64, pitch_bend: f64, pitch: f64) -> f64 {
    (mod_wheel + aftertouch + pitch_bend + PITCH_WEIGHT * pitch).clamp(0.0, 1.0)
}
