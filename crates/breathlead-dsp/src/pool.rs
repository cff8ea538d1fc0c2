//! Voice allocation and MIDI channel state.
//!
//! The instrument is played as a mono legato lead: the default pool holds a
//! single voice, and a note-on that finds no idle voice takes over the most
//! recently started one so the pitch glides instead of retriggering.

use std::ops::RangeInclusive;

use crate::error::Result;
use crate::event::{CC_ALL_NOTES_OFF, CC_ALL_SOUND_OFF, CC_SUSTAIN_PEDAL, VoiceEvent};
use crate::params::ParameterSnapshot;
use crate::renderer::Renderer;
use crate::voice::Voice;

const MIDI_CHANNELS: usize = 16;

/// Which notes and channels the pool answers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundPolicy {
    pub notes: RangeInclusive<u8>,
    /// `None` accepts every channel.
    pub channel: Option<u8>,
}

impl Default for SoundPolicy {
    fn default() -> Self {
        Self {
            notes: 0..=127,
            channel: None,
        }
    }
}

impl SoundPolicy {
    pub fn applies_to_note(&self, note: u8) -> bool {
        self.notes.contains(&note)
    }

    pub fn applies_to_channel(&self, channel: u8) -> bool {
        self.channel.is_none_or(|c| c == channel)
    }
}

pub struct VoicePool {
    voices: Vec<Voice>,
    /// Start stamp per voice, parallel to `voices`. Higher is newer.
    started: Vec<u64>,
    next_stamp: u64,
    policy: SoundPolicy,
    sustain_down: [bool; MIDI_CHANNELS],
}

impl VoicePool {
    /// Pool with `num_voices` voices (at least one) and the default policy.
    pub fn new(num_voices: usize) -> Self {
        Self::with_policy(num_voices, SoundPolicy::default())
    }

    /// The single-voice pool the instrument normally runs with.
    pub fn mono() -> Self {
        Self::new(1)
    }

    pub fn with_policy(num_voices: usize, policy: SoundPolicy) -> Self {
        let n = num_voices.max(1);
        Self {
            voices: (0..n).map(|_| Voice::new()).collect(),
            started: vec![0; n],
            next_stamp: 0,
            policy,
            sustain_down: [false; MIDI_CHANNELS],
        }
    }

    pub fn num_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn voice(&self, index: usize) -> Option<&Voice> {
        self.voices.get(index)
    }

    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    pub fn policy(&self) -> &SoundPolicy {
        &self.policy
    }

    pub fn is_sustain_down(&self, channel: u8) -> bool {
        self.sustain_down[channel_index(channel)]
    }

    fn note_on(&mut self, channel: u8, note: u8, velocity: f32) {
        if !self.policy.applies_to_note(note) {
            return;
        }

        // Same key struck again: retrigger the voice that already has it.
        let index = self
            .voices
            .iter()
            .position(|v| v.is_playing_note(channel, note))
            .or_else(|| self.voices.iter().position(|v| !v.is_active()))
            .unwrap_or_else(|| self.newest_voice());

        self.next_stamp += 1;
        self.started[index] = self.next_stamp;
        self.voices[index].start_note(channel, note, velocity);
    }

    fn newest_voice(&self) -> usize {
        self.started
            .iter()
            .enumerate()
            .max_by_key(|&(_, stamp)| *stamp)
            .map_or(0, |(i, _)| i)
    }

    fn note_off(&mut self, channel: u8, note: u8, velocity: f32, allow_tail: bool) {
        let sustained = allow_tail && self.is_sustain_down(channel);
        for voice in &mut self.voices {
            if voice.is_playing_note(channel, note) && voice.is_key_down() {
                voice.set_key_down(false);
                if sustained {
                    voice.set_sustain_held(true);
                } else {
                    voice.stop_note(velocity, allow_tail);
                }
            }
        }
    }

    fn sustain_pedal(&mut self, channel: u8, down: bool) {
        self.sustain_down[channel_index(channel)] = down;
        if down {
            return;
        }
        for voice in &mut self.voices {
            if voice.is_active() && voice.channel() == channel && voice.is_sustain_held() {
                voice.stop_note(0.0, true);
            }
        }
    }

    /// Stop every sounding voice, with or without release tail. Also lifts
    /// the sustain pedal so nothing is left held.
    fn all_notes_off(&mut self, allow_tail: bool) {
        self.sustain_down = [false; MIDI_CHANNELS];
        for voice in &mut self.voices {
            if voice.is_active() {
                voice.stop_note(0.0, allow_tail);
            }
        }
    }
}

impl Default for VoicePool {
    fn default() -> Self {
        Self::mono()
    }
}

fn channel_index(channel: u8) -> usize {
    channel as usize % MIDI_CHANNELS
}

impl Renderer for VoicePool {
    fn prepare(&mut self, sample_rate: f64, max_block: usize, num_channels: usize) -> Result<()> {
        for voice in &mut self.voices {
            voice.prepare(sample_rate, max_block, num_channels)?;
        }
        self.started.fill(0);
        self.next_stamp = 0;
        self.sustain_down = [false; MIDI_CHANNELS];
        log::debug!("voice pool prepared: {} voice(s)", self.voices.len());
        Ok(())
    }

    fn reset(&mut self) {
        for voice in &mut self.voices {
            voice.reset();
        }
        self.sustain_down = [false; MIDI_CHANNELS];
    }

    fn handle_event(&mut self, event: &VoiceEvent) {
        if !self.policy.applies_to_channel(event.channel()) {
            return;
        }

        match *event {
            VoiceEvent::NoteOn {
                channel,
                note,
                velocity,
            } => self.note_on(channel, note, velocity),
            VoiceEvent::NoteOff {
                channel,
                note,
                velocity,
                allow_tail,
            } => self.note_off(channel, note, velocity, allow_tail),
            VoiceEvent::PitchBend { value, .. } => {
                for voice in &mut self.voices {
                    voice.pitch_wheel_moved(value);
                }
            }
            VoiceEvent::Controller {
                channel,
                number,
                value,
            } => match number {
                CC_SUSTAIN_PEDAL => self.sustain_pedal(channel, value >= 64),
                CC_ALL_SOUND_OFF => self.all_notes_off(false),
                CC_ALL_NOTES_OFF => self.all_notes_off(true),
                _ => {
                    for voice in &mut self.voices {
                        voice.controller_moved(number, value);
                    }
                }
            },
            VoiceEvent::ChannelPressure { value, .. } => {
                for voice in &mut self.voices {
                    voice.aftertouch_changed(value);
                }
            }
        }
    }

    fn set_parameters(&mut self, params: &ParameterSnapshot) {
        for voice in &mut self.voices {
            voice.set_parameters(params);
        }
    }

    /// Every voice renders, active or not: a voice freed without a tail
    /// still has to release its envelope. An idle voice that has decayed
    /// adds exact zeros.
    fn render(&mut self, output: &mut [&mut [f32]], start: usize, num_samples: usize) {
        for voice in &mut self.voices {
            voice.render(output, start, num_samples);
        }
    }
}
