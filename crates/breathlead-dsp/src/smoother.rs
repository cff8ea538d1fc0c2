//! Linear parameter smoother for zipper-free control changes.
//!
//! A smoother is either converged (holding its target) or ramping toward it
//! with a fixed per-sample step. Ramps always last `ramp_samples` samples and
//! land exactly on the target, so a converged smoother reads back the value
//! it was given bit-for-bit. Values stay between the previous and new target
//! for the whole ramp, which keeps caller-clamped domains intact mid-glide.

#[derive(Debug, Clone, Copy, PartialEq)]
enum Ramp {
    Converged,
    Ramping { step: f64, remaining: u32 },
}

#[derive(Debug, Clone)]
pub struct SmoothedValue {
    current: f64,
    target: f64,
    ramp: Ramp,
    ramp_samples: u32,
}

impl SmoothedValue {
    /// Create a converged smoother holding `initial`. Ramp length is zero
    /// until [`reset`](Self::reset) is called with a sample rate.
    pub fn new(initial: f64) -> Self {
        Self {
            current: initial,
            target: initial,
            ramp: Ramp::Converged,
            ramp_samples: 0,
        }
    }

    /// Set the ramp length and jump straight to the current target.
    pub fn reset(&mut self, sample_rate: f64, ramp_secs: f64) {
        self.ramp_samples = (ramp_secs.max(0.0) * sample_rate).floor() as u32;
        self.current = self.target;
        self.ramp = Ramp::Converged;
    }

    /// Start ramping toward `value`. Re-sending the current target is a no-op,
    /// so hosts can push the same snapshot every block without restarting ramps.
    pub fn set_target(&mut self, value: f64) {
        if value == self.target {
            return;
        }
        self.target = value;
        if self.ramp_samples == 0 {
            self.current = value;
            self.ramp = Ramp::Converged;
            return;
        }
        self.ramp = Ramp::Ramping {
            step: (value - self.current) / self.ramp_samples as f64,
            remaining: self.ramp_samples,
        };
    }

    /// Advance one sample and return the smoothed value.
    #[inline]
    pub fn next_value(&mut self) -> f64 {
        if let Ramp::Ramping { step, remaining } = self.ramp {
            if remaining <= 1 {
                self.current = self.target;
                self.ramp = Ramp::Converged;
            } else {
                self.current += step;
                self.ramp = Ramp::Ramping {
                    step,
                    remaining: remaining - 1,
                };
            }
        }
        self.current
    }

    pub fn current(&self) -> f64 {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lands_exactly_on_target() {
        let mut s = SmoothedValue::new(0.0);
        s.reset(48000.0, 0.02);
        assert_eq!(s.ramp_samples, 960);

        s.set_target(0.37);
        let mut last = 0.0;
        for _ in 0..960 {
            last = s.next_value();
        }
        assert_eq!(last, 0.37);
        assert_eq!(s.ramp, Ramp::Converged);
        assert_eq!(s.next_value(), 0.37);
    }

    #[test]
    fn test_monotonic_without_overshoot() {
        let mut s = SmoothedValue::new(1.0);
        s.reset(44100.0, 0.05);
        s.set_target(0.25);

        let mut prev = s.current();
        for _ in 0..(s.ramp_samples + 10) {
            let v = s.next_value();
            assert!(v <= prev, "ramp went back up: {prev} -> {v}");
            assert!(v >= 0.25, "overshot target: {v}");
            prev = v;
        }
    }

    #[test]
    fn test_same_target_does_not_restart_ramp() {
        let mut s = SmoothedValue::new(0.0);
        s.reset(1000.0, 0.01);
        s.set_target(1.0);
        for _ in 0..5 {
            s.next_value();
        }
        let mid = s.current();
        s.set_target(1.0);
        assert_eq!(s.current(), mid);
        for _ in 0..5 {
            s.next_value();
        }
        assert_eq!(s.current(), 1.0);
    }

    #[test]
    fn test_retarget_mid_ramp_continues_from_current() {
        let mut s = SmoothedValue::new(0.0);
        s.reset(1000.0, 0.01);
        s.set_target(1.0);
        for _ in 0..5 {
            s.next_value();
        }
        let mid = s.current();
        s.set_target(0.0);
        let next = s.next_value();
        assert!((next - mid).abs() < 0.1, "retarget jumped: {mid} -> {next}");
    }

    #[test]
    fn test_zero_ramp_snaps() {
        let mut s = SmoothedValue::new(0.0);
        s.set_target(0.8);
        assert_eq!(s.current(), 0.8);
        assert_eq!(s.next_value(), 0.8);
    }

    #[test]
    fn test_reset_jumps_to_target() {
        let mut s = SmoothedValue::new(0.0);
        s.reset(1000.0, 0.1);
        s.set_target(0.5);
        s.next_value();
        s.reset(1000.0, 0.1);
        assert_eq!(s.current(), 0.5);
        assert_eq!(s.next_value(), 0.5);
    }
}
