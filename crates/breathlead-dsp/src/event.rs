//! Performance events at MIDI resolution, plus the normalizations the voice
//! applies before handing values to the engine.

/// Pitch-wheel centre of the 14-bit range.
pub const PITCH_WHEEL_CENTRE: u16 = 8192;
pub const PITCH_WHEEL_MAX: u16 = 16383;

pub const CC_MOD_WHEEL: u8 = 1;
pub const CC_SUSTAIN_PEDAL: u8 = 64;
pub const CC_ALL_SOUND_OFF: u8 = 120;
pub const CC_ALL_NOTES_OFF: u8 = 123;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoiceEvent {
    NoteOn {
        channel: u8,
        note: u8,
        /// 0..1
        velocity: f32,
    },
    NoteOff {
        channel: u8,
        note: u8,
        velocity: f32,
        /// `false` frees the voice immediately instead of letting the
        /// release envelope ring out.
        allow_tail: bool,
    },
    PitchBend {
        channel: u8,
        /// 14-bit, centred on 8192.
        value: u16,
    },
    Controller {
        channel: u8,
        number: u8,
        /// 7-bit.
        value: u8,
    },
    ChannelPressure {
        channel: u8,
        /// 7-bit.
        value: u8,
    },
}

impl VoiceEvent {
    pub fn channel(&self) -> u8 {
        match *self {
            VoiceEvent::NoteOn { channel, .. }
            | VoiceEvent::NoteOff { channel, .. }
            | VoiceEvent::PitchBend { channel, .. }
            | VoiceEvent::Controller { channel, .. }
            | VoiceEvent::ChannelPressure { channel, .. } => channel,
        }
    }
}

/// Equal-tempered frequency of a MIDI note, A4 (69) = 440 Hz.
pub fn midi_to_hz(note: u8) -> f64 {
    440.0 * 2.0f64.powf((note as f64 - 69.0) / 12.0)
}

/// 14-bit pitch wheel to [-1, 1].
pub fn normalize_pitch_bend(value: u16) -> f64 {
    ((value as f64 - PITCH_WHEEL_CENTRE as f64) / PITCH_WHEEL_CENTRE as f64).clamp(-1.0, 1.0)
}

/// 7-bit controller value to [0, 1].
pub fn normalize_7bit(value: u8) -> f64 {
    (value as f64 / 127.0).clamp(0.0, 1.0)
}
