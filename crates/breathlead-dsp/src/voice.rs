//! Single voice: note identity, portamento glide and controller routing
//! around one `BreathEngine`.
//!
//! Signal flow: target pitch -> one-pole glide -> engine pitch, rendered one
//! sample at a time so the glide is sample-accurate.

use crate::engine::BreathEngine;
use crate::error::Result;
use crate::event::{self, CC_MOD_WHEEL, VoiceEvent};
use crate::params::{self, ParameterSnapshot, coeff_from_ms};
use crate::renderer::Renderer;

/// Once released and below this envelope level, a voice gives up its note.
const SILENCE_THRESHOLD: f64 = 1e-4;

/// Glide time constant floor, in ms. Also what "no portamento" collapses to.
const MIN_GLIDE_MS: f64 = 1.0;

pub struct Voice {
    engine: BreathEngine,
    sample_rate: f64,

    // Glide
    current_hz: f64,
    target_hz: f64,
    portamento_ms: f64,
    glide_coeff: f64,

    // Last performance values, post-normalization
    velocity: f64,
    mod_wheel: f64,
    aftertouch: f64,
    pitch_bend: f64,

    // Note identity
    note: Option<u8>,
    channel: u8,
    key_down: bool,
    sustain_held: bool,
}

impl Voice {
    pub fn new() -> Self {
        let engine = BreathEngine::new();
        let sample_rate = engine.sample_rate();
        let portamento_ms = ParameterSnapshot::default().portamento_ms;
        Self {
            engine,
            sample_rate,
            current_hz: 440.0,
            target_hz: 440.0,
            portamento_ms,
            glide_coeff: coeff_from_ms(portamento_ms.max(MIN_GLIDE_MS), sample_rate),
            velocity: 0.0,
            mod_wheel: 0.0,
            aftertouch: 0.0,
            pitch_bend: 0.0,
            note: None,
            channel: 0,
            key_down: false,
            sustain_held: false,
        }
    }

    /// Start (or retrigger) a note.
    ///
    /// An idle voice jumps straight to the new pitch; a voice that is still
    /// sounding glides there from wherever it is.
    pub fn start_note(&mut self, channel: u8, note: u8, velocity: f32) {
        self.target_hz = event::midi_to_hz(note);
        if !self.is_active() {
            self.current_hz = self.target_hz;
            self.engine.set_pitch_hz(self.current_hz);
        }

        self.note = Some(note);
        self.channel = channel;
        self.key_down = true;
        self.sustain_held = false;

        self.velocity = (velocity as f64).clamp(0.0, 1.0);
        self.engine.set_gate(true);
        self.engine.set_velocity(self.velocity);
    }

    /// Close the gate. Without `allow_tail` the voice is freed at once and
    /// does not wait for the release envelope.
    pub fn stop_note(&mut self, _velocity: f32, allow_tail: bool) {
        self.engine.set_gate(false);
        self.key_down = false;
        self.sustain_held = false;
        if !allow_tail {
            self.clear_current_note();
        }
    }

    pub fn pitch_wheel_moved(&mut self, value: u16) {
        self.pitch_bend = event::normalize_pitch_bend(value);
        self.engine.set_pitch_bend(self.pitch_bend);
    }

    pub fn controller_moved(&mut self, number: u8, value: u8) {
        if number == CC_MOD_WHEEL {
            self.mod_wheel = event::normalize_7bit(value);
            self.engine.set_mod_wheel(self.mod_wheel);
        }
    }

    pub fn aftertouch_changed(&mut self, value: u8) {
        self.aftertouch = event::normalize_7bit(value);
        self.engine.set_aftertouch(self.aftertouch);
    }

    pub fn set_portamento_ms(&mut self, ms: f64) {
        self.portamento_ms = if ms.is_nan() {
            0.0
        } else {
            ms.clamp(*params::PORTAMENTO_MS.start(), *params::PORTAMENTO_MS.end())
        };
    }

    fn clear_current_note(&mut self) {
        self.note = None;
        self.key_down = false;
        self.sustain_held = false;
    }

    /// True while the voice owns a note, including its release tail.
    pub fn is_active(&self) -> bool {
        self.note.is_some()
    }

    pub fn current_note(&self) -> Option<u8> {
        self.note
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn is_key_down(&self) -> bool {
        self.key_down
    }

    pub fn set_key_down(&mut self, down: bool) {
        self.key_down = down;
    }

    /// Key released while the sustain pedal holds the note.
    pub fn is_sustain_held(&self) -> bool {
        self.sustain_held
    }

    pub fn set_sustain_held(&mut self, held: bool) {
        self.sustain_held = held;
    }

    pub fn is_playing_note(&self, channel: u8, note: u8) -> bool {
        self.note == Some(note) && self.channel == channel
    }

    pub fn current_hz(&self) -> f64 {
        self.current_hz
    }

    pub fn target_hz(&self) -> f64 {
        self.target_hz
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn mod_wheel(&self) -> f64 {
        self.mod_wheel
    }

    pub fn aftertouch(&self) -> f64 {
        self.aftertouch
    }

    pub fn pitch_bend(&self) -> f64 {
        self.pitch_bend
    }

    pub fn engine(&self) -> &BreathEngine {
        &self.engine
    }

    /// Render a complete note: gate held for `hold_secs`, then released,
    /// `duration_secs` in total. Mono.
    pub fn render_note(
        note: u8,
        velocity: f32,
        hold_secs: f64,
        duration_secs: f64,
        sample_rate: f64,
        params: &ParameterSnapshot,
    ) -> Result<Vec<f32>> {
        let chunk_size = 1024;
        let mut voice = Voice::new();
        voice.set_parameters(params);
        voice.prepare(sample_rate, chunk_size, 1)?;
        voice.start_note(0, note, velocity);

        let num_samples = (duration_secs * sample_rate) as usize;
        let release_at = ((hold_secs * sample_rate) as usize).min(num_samples);
        let mut output = vec![0.0f32; num_samples];

        let mut offset = 0;
        while offset < num_samples {
            let end = if offset < release_at {
                (offset + chunk_size).min(release_at)
            } else {
                (offset + chunk_size).min(num_samples)
            };
            if offset == release_at {
                voice.stop_note(0.0, true);
            }
            let mut channels: [&mut [f32]; 1] = [&mut output];
            voice.render(&mut channels, offset, end - offset);
            offset = end;
        }

        Ok(output)
    }
}

impl Default for Voice {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for Voice {
    fn prepare(&mut self, sample_rate: f64, max_block: usize, num_channels: usize) -> Result<()> {
        self.engine.prepare(sample_rate, max_block, num_channels)?;
        self.sample_rate = sample_rate;
        self.glide_coeff = coeff_from_ms(self.portamento_ms.max(MIN_GLIDE_MS), sample_rate);
        self.clear_current_note();
        Ok(())
    }

    fn reset(&mut self) {
        self.stop_note(0.0, false);
        self.engine.reset();
    }

    fn handle_event(&mut self, event: &VoiceEvent) {
        match *event {
            VoiceEvent::NoteOn {
                channel,
                note,
                velocity,
            } => self.start_note(channel, note, velocity),
            VoiceEvent::NoteOff {
                channel,
                note,
                velocity,
                allow_tail,
            } => {
                if self.is_playing_note(channel, note) {
                    self.stop_note(velocity, allow_tail);
                }
            }
            VoiceEvent::PitchBend { value, .. } => self.pitch_wheel_moved(value),
            VoiceEvent::Controller { number, value, .. } => self.controller_moved(number, value),
            VoiceEvent::ChannelPressure { value, .. } => self.aftertouch_changed(value),
        }
    }

    fn set_parameters(&mut self, params: &ParameterSnapshot) {
        self.set_portamento_ms(params.portamento_ms);
        self.engine.set_params(params);
    }

    fn render(&mut self, output: &mut [&mut [f32]], start: usize, num_samples: usize) {
        // Glide rate follows the portamento parameter once per block.
        self.glide_coeff = coeff_from_ms(self.portamento_ms.max(MIN_GLIDE_MS), self.sample_rate);

        for i in start..start + num_samples {
            self.current_hz = self.target_hz + self.glide_coeff * (self.current_hz - self.target_hz);
            self.engine.set_pitch_hz(self.current_hz);
            self.engine.render(output, i, 1);
        }

        if self.is_active()
            && !self.engine.is_gated()
            && self.engine.envelope() < SILENCE_THRESHOLD
        {
            self.clear_current_note();
        }
    }
}
