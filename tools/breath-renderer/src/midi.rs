//! Standard MIDI File to sample-stamped `VoiceEvent`s.
//!
//! All tracks are merged onto one timeline. Tempo meta events from any track
//! apply to every track; timecode files use their fixed tick rate.

use anyhow::{Context, Result, bail};
use breathlead_dsp::event::VoiceEvent;
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::path::Path;

/// 120 BPM, the SMF default until the first tempo event.
const DEFAULT_TEMPO_US: u32 = 500_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedEvent {
    pub sample: usize,
    pub event: VoiceEvent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MidiSequence {
    pub events: Vec<TimedEvent>,
    /// Time of the last event of any kind, including meta events.
    pub end_secs: f64,
}

enum Item {
    Tempo(u32),
    Voice(VoiceEvent),
    Other,
}

pub fn load(path: &Path, sample_rate: f64) -> Result<MidiSequence> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse(&bytes, sample_rate).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn parse(bytes: &[u8], sample_rate: f64) -> Result<MidiSequence> {
    let smf = Smf::parse(bytes).context("not a Standard MIDI File")?;

    // Absolute tick, track, position within track.
    let mut items: Vec<(u64, usize, usize, Item)> = Vec::new();
    for (track_idx, track) in smf.tracks.iter().enumerate() {
        let mut tick = 0u64;
        for (pos, ev) in track.iter().enumerate() {
            tick += ev.delta.as_int() as u64;
            items.push((tick, track_idx, pos, convert(&ev.kind)));
        }
    }
    items.sort_by_key(|&(tick, track, pos, _)| (tick, track, pos));

    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(tpq) => {
            let tpq = tpq.as_int();
            if tpq == 0 {
                bail!("file declares zero ticks per quarter note");
            }
            Some(tpq as f64)
        }
        Timing::Timecode(..) => None,
    };
    let timecode_secs_per_tick = match smf.header.timing {
        Timing::Timecode(fps, subframes) => 1.0 / (fps.as_f32() as f64 * subframes.max(1) as f64),
        Timing::Metrical(_) => 0.0,
    };

    let mut tempo_us = DEFAULT_TEMPO_US;
    let mut last_tick = 0u64;
    let mut secs = 0.0;
    let mut events = Vec::new();

    for (tick, _, _, item) in items {
        let ticks = (tick - last_tick) as f64;
        secs += match ticks_per_quarter {
            Some(tpq) => ticks * tempo_us as f64 / (1_000_000.0 * tpq),
            None => ticks * timecode_secs_per_tick,
        };
        last_tick = tick;

        match item {
            Item::Tempo(us) => tempo_us = us,
            Item::Voice(event) => events.push(TimedEvent {
                sample: (secs * sample_rate).round() as usize,
                event,
            }),
            Item::Other => {}
        }
    }

    Ok(MidiSequence {
        events,
        end_secs: secs,
    })
}

fn convert(kind: &TrackEventKind<'_>) -> Item {
    match kind {
        TrackEventKind::Meta(MetaMessage::Tempo(us)) => Item::Tempo(us.as_int()),
        TrackEventKind::Midi { channel, message } => {
            let channel = channel.as_int();
            match message {
                // Velocity-zero note-on is a note-off.
                MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => {
                    Item::Voice(VoiceEvent::NoteOff {
                        channel,
                        note: key.as_int(),
                        velocity: 0.0,
                        allow_tail: true,
                    })
                }
                MidiMessage::NoteOn { key, vel } => Item::Voice(VoiceEvent::NoteOn {
                    channel,
                    note: key.as_int(),
                    velocity: vel.as_int() as f32 / 127.0,
                }),
                MidiMessage::NoteOff { key, vel } => Item::Voice(VoiceEvent::NoteOff {
                    channel,
                    note: key.as_int(),
                    velocity: vel.as_int() as f32 / 127.0,
                    allow_tail: true,
                }),
                MidiMessage::PitchBend { bend } => Item::Voice(VoiceEvent::PitchBend {
                    channel,
                    value: bend.0.as_int(),
                }),
                MidiMessage::Controller { controller, value } => {
                    Item::Voice(VoiceEvent::Controller {
                        channel,
                        number: controller.as_int(),
                        value: value.as_int(),
                    })
                }
                MidiMessage::ChannelAftertouch { vel } => {
                    Item::Voice(VoiceEvent::ChannelPressure {
                        channel,
                        value: vel.as_int(),
                    })
                }
                _ => Item::Other,
            }
        }
        _ => Item::Other,
    }
}
