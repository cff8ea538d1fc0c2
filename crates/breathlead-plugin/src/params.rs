use breathlead_dsp::params::ParameterSnapshot;
use nih_plug::prelude::*;

#[derive(Params)]
pub struct BreathLeadParams {
    /// Breath amount feeding the resonators.
    #[id = "air"]
    pub air: FloatParam,

    /// Spectral tilt: 0 = dark, 1 = bright.
    #[id = "tone"]
    pub tone: FloatParam,

    /// Vowel morph from open to close.
    #[id = "formant"]
    pub formant: FloatParam,

    /// Bore resistance: narrower resonances, more drive.
    #[id = "resist"]
    pub resistance: FloatParam,

    #[id = "vib_depth"]
    pub vibrato_depth: FloatParam,

    #[id = "vib_rate"]
    pub vibrato_rate: FloatParam,

    /// 0 = white, 1 = pink.
    #[id = "noise_color"]
    pub noise_color: FloatParam,

    /// Level of the pitched sine under the noise.
    #[id = "sine_anchor"]
    pub sine_anchor: FloatParam,

    /// Keep the breath going while controllers are moving.
    #[id = "motion_sustain"]
    pub motion_sustain: BoolParam,

    #[id = "motion_sens"]
    pub motion_sensitivity: FloatParam,

    #[id = "attack"]
    pub attack: FloatParam,

    #[id = "release"]
    pub release: FloatParam,

    /// Output gain in dB.
    #[id = "gain"]
    pub output_gain: FloatParam,

    /// Portamento time between legato notes.
    #[id = "glide"]
    pub glide: FloatParam,
}

fn unit_param(name: &str, default: f64) -> FloatParam {
    FloatParam::new(name, default as f32, FloatRange::Linear { min: 0.0, max: 1.0 })
        .with_unit(" %")
        .with_value_to_string(formatters::v2s_f32_percentage(0))
        .with_string_to_value(formatters::s2v_f32_percentage())
}

fn time_param(name: &str, default: f64, min: f32, max: f32) -> FloatParam {
    FloatParam::new(
        name,
        default as f32,
        FloatRange::Skewed {
            min,
            max,
            factor: FloatRange::skew_factor(-2.0),
        },
    )
    .with_unit(" ms")
    .with_step_size(0.1)
}

impl Default for BreathLeadParams {
    fn default() -> Self {
        let d = ParameterSnapshot::default();
        Self {
            air: unit_param("Air", d.air),
            tone: unit_param("Tone", d.tone),
            formant: unit_param("Formant", d.formant),
            resistance: unit_param("Resistance", d.resistance),
            vibrato_depth: unit_param("Vibrato Depth", d.vibrato_depth),

            vibrato_rate: FloatParam::new(
                "Vibrato Rate",
                d.vibrato_rate_hz as f32,
                FloatRange::Linear { min: 0.5, max: 8.0 },
            )
            .with_unit(" Hz")
            .with_step_size(0.01),

            noise_color: unit_param("Noise Color", d.noise_color),
            sine_anchor: unit_param("Sine Anchor", d.sine_anchor),
            motion_sustain: BoolParam::new("Motion Sustain", d.motion_sustain),
            motion_sensitivity: unit_param("Motion Sensitivity", d.motion_sensitivity),

            attack: time_param("Attack", d.attack_ms, 1.0, 2000.0),
            release: time_param("Release", d.release_ms, 5.0, 5000.0),

            output_gain: FloatParam::new(
                "Output Gain",
                d.output_gain_db as f32,
                FloatRange::Linear {
                    min: -60.0,
                    max: 12.0,
                },
            )
            .with_unit(" dB")
            .with_step_size(0.1),

            glide: time_param("Glide", d.portamento_ms, 0.0, 2000.0),
        }
    }
}

impl BreathLeadParams {
    /// Current plain values, read once per block. The engine smooths them
    /// itself, so nih-plug smoothers are not used here.
    pub fn snapshot(&self) -> ParameterSnapshot {
        ParameterSnapshot {
            air: self.air.value() as f64,
            tone: self.tone.value() as f64,
            formant: self.formant.value() as f64,
            resistance: self.resistance.value() as f64,
            vibrato_depth: self.vibrato_depth.value() as f64,
            vibrato_rate_hz: self.vibrato_rate.value() as f64,
            noise_color: self.noise_color.value() as f64,
            sine_anchor: self.sine_anchor.value() as f64,
            motion_sustain: self.motion_sustain.value(),
            motion_sensitivity: self.motion_sensitivity.value() as f64,
            attack_ms: self.attack.value() as f64,
            release_ms: self.release.value() as f64,
            output_gain_db: self.output_gain.value() as f64,
            portamento_ms: self.glide.value() as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_snapshot_matches_dsp_defaults() {
        let params = BreathLeadParams::default();
        let snap = params.snapshot();
        let d = ParameterSnapshot::default();
        // Parameter values pass through f32.
        for (got, want) in [
            (snap.air, d.air),
            (snap.tone, d.tone),
            (snap.formant, d.formant),
            (snap.resistance, d.resistance),
            (snap.vibrato_depth, d.vibrato_depth),
            (snap.vibrato_rate_hz, d.vibrato_rate_hz),
            (snap.noise_color, d.noise_color),
            (snap.sine_anchor, d.sine_anchor),
            (snap.motion_sensitivity, d.motion_sensitivity),
            (snap.attack_ms, d.attack_ms),
            (snap.release_ms, d.release_ms),
            (snap.output_gain_db, d.output_gain_db),
            (snap.portamento_ms, d.portamento_ms),
        ] {
            assert!((got - want).abs() < 1e-6, "default mismatch: {got} vs {want}");
        }
        assert_eq!(snap.motion_sustain, d.motion_sustain);
    }
}
