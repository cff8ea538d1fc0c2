// Breath Lead: monophonic physical-modeling lead instrument (CLAP + VST3).

use breathlead_dsp::event::{PITCH_WHEEL_MAX, VoiceEvent};
use breathlead_dsp::{Renderer, VoicePool};
use nih_plug::prelude::*;
use std::num::NonZeroU32;
use std::sync::Arc;

mod params;
use params::BreathLeadParams;

struct BreathLead {
    params: Arc<BreathLeadParams>,
    pool: VoicePool,
}

impl Default for BreathLead {
    fn default() -> Self {
        Self {
            params: Arc::new(BreathLeadParams::default()),
            pool: VoicePool::mono(),
        }
    }
}

/// Translate a host note event into the DSP event model. Events the
/// instrument does not react to map to `None`.
pub fn to_voice_event(event: &NoteEvent<()>) -> Option<VoiceEvent> {
    match *event {
        NoteEvent::NoteOn {
            channel,
            note,
            velocity,
            ..
        } => Some(VoiceEvent::NoteOn {
            channel,
            note,
            velocity,
        }),
        NoteEvent::NoteOff {
            channel,
            note,
            velocity,
            ..
        } => Some(VoiceEvent::NoteOff {
            channel,
            note,
            velocity,
            allow_tail: true,
        }),
        NoteEvent::Choke { channel, note, .. } => Some(VoiceEvent::NoteOff {
            channel,
            note,
            velocity: 0.0,
            allow_tail: false,
        }),
        NoteEvent::MidiPitchBend { channel, value, .. } => Some(VoiceEvent::PitchBend {
            channel,
            value: (value.clamp(0.0, 1.0) * PITCH_WHEEL_MAX as f32).round() as u16,
        }),
        NoteEvent::MidiCC {
            channel, cc, value, ..
        } => Some(VoiceEvent::Controller {
            channel,
            number: cc,
            value: (value.clamp(0.0, 1.0) * 127.0).round() as u8,
        }),
        NoteEvent::MidiChannelPressure {
            channel, pressure, ..
        } => Some(VoiceEvent::ChannelPressure {
            channel,
            value: (pressure.clamp(0.0, 1.0) * 127.0).round() as u8,
        }),
        _ => None,
    }
}

impl BreathLead {
    fn handle_note_event(&mut self, event: &NoteEvent<()>) {
        if let Some(voice_event) = to_voice_event(event) {
            self.pool.handle_event(&voice_event);
        }
    }
}

impl Plugin for BreathLead {
    const NAME: &'static str = "Breath Lead";
    const VENDOR: &'static str = "Breath Lead";
    const URL: &'static str = "";
    const EMAIL: &'static str = "";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        AudioIOLayout {
            main_input_channels: None,
            main_output_channels: NonZeroU32::new(2),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
        AudioIOLayout {
            main_input_channels: None,
            main_output_channels: NonZeroU32::new(1),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
    ];

    // Mod wheel, pitch bend and channel pressure all drive the breath.
    const MIDI_INPUT: MidiConfig = MidiConfig::MidiCCs;
    const SAMPLE_ACCURATE_AUTOMATION: bool = true;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    fn initialize(
        &mut self,
        audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        let sample_rate = buffer_config.sample_rate as f64;
        let max_block = buffer_config.max_buffer_size as usize;
        let num_channels = audio_io_layout
            .main_output_channels
            .map_or(0, |n| n.get() as usize);

        // Parameters first so the engine's smoothers start settled on them.
        self.pool.set_parameters(&self.params.snapshot());
        if let Err(e) = self.pool.prepare(sample_rate, max_block, num_channels) {
            nih_error!("Breath Lead failed to initialize: {e}");
            return false;
        }

        nih_log!(
            "Breath Lead initialized: {sample_rate} Hz, {max_block} samples, {num_channels} ch"
        );
        true
    }

    fn reset(&mut self) {
        self.pool.reset();
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        let num_samples = buffer.samples();
        let output = buffer.as_slice();
        for channel in output.iter_mut() {
            channel.fill(0.0);
        }

        // Parameters are read once per block; the engine ramps them.
        self.pool.set_parameters(&self.params.snapshot());

        // Event-splitting process loop: split at each MIDI event for sample-accuracy
        let mut next_event = context.next_event();
        let mut block_start: usize = 0;

        while block_start < num_samples {
            // Process all events at or before current position
            loop {
                match next_event {
                    Some(ref event) if (event.timing() as usize) <= block_start => {
                        self.handle_note_event(event);
                        next_event = context.next_event();
                    }
                    _ => break,
                }
            }

            // Find next event boundary (or end of buffer)
            let block_end = match next_event {
                Some(ref event) => (event.timing() as usize).min(num_samples),
                None => num_samples,
            };
            let block_len = block_end - block_start;

            if block_len > 0 {
                self.pool.render(output, block_start, block_len);
            }

            block_start = block_end;
        }

        // Drain any remaining events
        while let Some(event) = next_event {
            self.handle_note_event(&event);
            next_event = context.next_event();
        }

        ProcessStatus::Normal
    }
}

impl ClapPlugin for BreathLead {
    const CLAP_ID: &'static str = "com.breathlead.breath-lead";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("Monophonic breath-driven lead built from filtered noise and resonators");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::Instrument,
        ClapFeature::Synthesizer,
        ClapFeature::Mono,
        ClapFeature::Stereo,
    ];
}

impl Vst3Plugin for BreathLead {
    const VST3_CLASS_ID: [u8; 16] = *b"BreathLeadMonoVS";
    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] =
        &[Vst3SubCategory::Instrument, Vst3SubCategory::Synth];
}

nih_export_clap!(BreathLead);
nih_export_vst3!(BreathLead);
