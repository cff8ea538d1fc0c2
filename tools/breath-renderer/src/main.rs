//! Breath Renderer: offline WAV renderer for the breath lead voice.
//!
//! Renders a grid of notes × velocities, or a Standard MIDI File, through
//! the same `VoicePool` the plugin runs.

mod midi;

use anyhow::{Context, Result, bail};
use breathlead_dsp::event::VoiceEvent;
use breathlead_dsp::{ParameterSnapshot, Renderer, VoicePool};
use clap::{Args, Parser};
use midi::TimedEvent;
use std::path::{Path, PathBuf};
use tracing::info;

const BLOCK_SIZE: usize = 512;

/// Render breath lead notes or MIDI files to 24-bit WAV
#[derive(Parser)]
#[command(name = "breath-renderer")]
#[command(version)]
struct Cli {
    /// MIDI note(s) to render
    #[arg(short, long, value_delimiter = ',', default_value = "60",
          value_parser = clap::value_parser!(u8).range(0..=127))]
    note: Vec<u8>,

    /// Velocity(ies) to render
    #[arg(short, long, value_delimiter = ',', default_value = "100",
          value_parser = clap::value_parser!(u8).range(1..=127))]
    velocity: Vec<u8>,

    /// Total length of each note render in seconds
    #[arg(short, long, default_value_t = 2.0)]
    duration: f64,

    /// Seconds the gate stays open (default: three quarters of the duration)
    #[arg(long)]
    hold: Option<f64>,

    /// Render this Standard MIDI File instead of single notes
    #[arg(long)]
    midi: Option<PathBuf>,

    /// Seconds rendered after the last MIDI event
    #[arg(long, default_value_t = 1.0)]
    tail: f64,

    /// Output WAV file (single render only)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output directory for batch renders
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Output channel count; every channel carries the same signal
    #[arg(short, long, default_value_t = 1,
          value_parser = clap::value_parser!(u16).range(1..))]
    channels: u16,

    #[arg(long, default_value_t = 44100)]
    sample_rate: u32,

    #[command(flatten)]
    sound: SoundArgs,
}

#[derive(Args)]
struct SoundArgs {
    #[arg(long, default_value_t = ParameterSnapshot::default().air)]
    air: f64,
    #[arg(long, default_value_t = ParameterSnapshot::default().tone)]
    tone: f64,
    #[arg(long, default_value_t = ParameterSnapshot::default().formant)]
    formant: f64,
    #[arg(long, default_value_t = ParameterSnapshot::default().resistance)]
    resistance: f64,
    #[arg(long, default_value_t = ParameterSnapshot::default().vibrato_depth)]
    vibrato_depth: f64,
    /// Hz
    #[arg(long, default_value_t = ParameterSnapshot::default().vibrato_rate_hz)]
    vibrato_rate: f64,
    #[arg(long, default_value_t = ParameterSnapshot::default().noise_color)]
    noise_color: f64,
    #[arg(long, default_value_t = ParameterSnapshot::default().sine_anchor)]
    sine_anchor: f64,
    /// Let controller movement sustain the breath
    #[arg(long)]
    motion_sustain: bool,
    #[arg(long, default_value_t = ParameterSnapshot::default().motion_sensitivity)]
    motion_sensitivity: f64,
    /// ms
    #[arg(long, default_value_t = ParameterSnapshot::default().attack_ms)]
    attack: f64,
    /// ms
    #[arg(long, default_value_t = ParameterSnapshot::default().release_ms)]
    release: f64,
    /// Output gain in dB
    #[arg(long, default_value_t = ParameterSnapshot::default().output_gain_db,
          allow_negative_numbers = true)]
    gain: f64,
    /// Portamento in ms
    #[arg(long, default_value_t = ParameterSnapshot::default().portamento_ms)]
    glide: f64,
}

impl SoundArgs {
    fn snapshot(&self) -> ParameterSnapshot {
        ParameterSnapshot {
            air: self.air,
            tone: self.tone,
            formant: self.formant,
            resistance: self.resistance,
            vibrato_depth: self.vibrato_depth,
            vibrato_rate_hz: self.vibrato_rate,
            noise_color: self.noise_color,
            sine_anchor: self.sine_anchor,
            motion_sustain: self.motion_sustain,
            motion_sensitivity: self.motion_sensitivity,
            attack_ms: self.attack,
            release_ms: self.release,
            output_gain_db: self.gain,
            portamento_ms: self.glide,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let params = cli.sound.snapshot();

    match cli.midi {
        Some(ref path) => render_midi_file(&cli, path, &params),
        None => render_notes(&cli, &params),
    }
}

fn render_notes(cli: &Cli, params: &ParameterSnapshot) -> Result<()> {
    if cli.duration.is_nan() || cli.duration <= 0.0 {
        bail!("duration must be positive, got {}", cli.duration);
    }
    let sample_rate = cli.sample_rate as f64;
    let hold = cli.hold.unwrap_or(cli.duration * 0.75).clamp(0.0, cli.duration);
    let num_samples = (cli.duration * sample_rate) as usize;
    let release_at = (hold * sample_rate) as usize;
    let single = cli.note.len() == 1 && cli.velocity.len() == 1;

    for &note in &cli.note {
        for &vel in &cli.velocity {
            let note_name = midi_note_name(note);
            let filename = match cli.output {
                Some(ref f) if single => f.clone(),
                _ => cli.output_dir.join(format!("breath_{note_name}_v{vel}.wav")),
            };

            info!(
                "Rendering MIDI {note} ({note_name}) vel={vel} hold={hold}s dur={}s -> {}",
                cli.duration,
                filename.display()
            );

            let events = [
                TimedEvent {
                    sample: 0,
                    event: VoiceEvent::NoteOn {
                        channel: 0,
                        note,
                        velocity: vel as f32 / 127.0,
                    },
                },
                TimedEvent {
                    sample: release_at,
                    event: VoiceEvent::NoteOff {
                        channel: 0,
                        note,
                        velocity: 0.0,
                        allow_tail: true,
                    },
                },
            ];
            let audio = render_events(
                &events,
                num_samples,
                cli.channels as usize,
                sample_rate,
                params,
            )?;
            report_peak(&audio);
            write_wav(&filename, &audio, cli.sample_rate)?;
            info!("Written: {}", filename.display());
        }
    }
    Ok(())
}

fn render_midi_file(cli: &Cli, path: &Path, params: &ParameterSnapshot) -> Result<()> {
    let sample_rate = cli.sample_rate as f64;
    let sequence = midi::load(path, sample_rate)?;
    let tail = cli.tail.max(0.0);
    let num_samples = ((sequence.end_secs + tail) * sample_rate).round() as usize;

    let filename = match cli.output {
        Some(ref f) => f.clone(),
        None => {
            let stem = path
                .file_stem()
                .map_or_else(|| "render".into(), |s| s.to_string_lossy());
            cli.output_dir.join(format!("{stem}.wav"))
        }
    };

    info!(
        "Rendering {} ({} events, {:.2}s + {tail}s tail) -> {}",
        path.display(),
        sequence.events.len(),
        sequence.end_secs,
        filename.display()
    );

    let audio = render_events(
        &sequence.events,
        num_samples,
        cli.channels as usize,
        sample_rate,
        params,
    )?;
    report_peak(&audio);
    write_wav(&filename, &audio, cli.sample_rate)?;
    info!("Written: {}", filename.display());
    Ok(())
}

/// Run sample-stamped events through a mono voice pool. Returns one buffer
/// per channel. Events must be sorted by sample; those past the end are
/// dropped.
fn render_events(
    events: &[TimedEvent],
    num_samples: usize,
    num_channels: usize,
    sample_rate: f64,
    params: &ParameterSnapshot,
) -> Result<Vec<Vec<f32>>> {
    let mut pool = VoicePool::mono();
    // Parameters first so prepare starts the smoothers on them.
    pool.set_parameters(params);
    pool.prepare(sample_rate, BLOCK_SIZE, num_channels)
        .context("invalid render configuration")?;

    let mut audio = vec![vec![0.0f32; num_samples]; num_channels];
    let mut outputs: Vec<&mut [f32]> = audio.iter_mut().map(Vec::as_mut_slice).collect();

    let mut next = 0;
    let mut pos = 0;
    while pos < num_samples {
        while let Some(timed) = events.get(next).filter(|e| e.sample <= pos) {
            pool.handle_event(&timed.event);
            next += 1;
        }

        let mut end = (pos + BLOCK_SIZE).min(num_samples);
        if let Some(timed) = events.get(next) {
            end = end.min(timed.sample);
        }

        pool.render(&mut outputs, pos, end - pos);
        pos = end;
    }

    drop(outputs);
    Ok(audio)
}

fn report_peak(audio: &[Vec<f32>]) {
    let peak = audio
        .iter()
        .flatten()
        .map(|x| x.abs() as f64)
        .fold(0.0f64, f64::max);
    info!("  Peak amplitude: {peak:.6} ({:.1} dBFS)", 20.0 * peak.log10());
}

fn write_wav(path: &Path, audio: &[Vec<f32>], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: audio.len() as u16,
        sample_rate,
        bits_per_sample: 24,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let scale = (1 << 23) as f64 - 1.0;
    let num_frames = audio.first().map_or(0, Vec::len);
    for i in 0..num_frames {
        for channel in audio {
            let clamped = (channel[i] as f64).clamp(-1.0, 1.0);
            writer
                .write_sample((clamped * scale) as i32)
                .context("failed to write sample")?;
        }
    }
    writer.finalize().context("failed to finalize WAV")?;
    Ok(())
}

fn midi_note_name(midi: u8) -> String {
    let names = ["C", "Cs", "D", "Ds", "E", "F", "Fs", "G", "Gs", "A", "As", "B"];
    let octave = (midi / 12) as i32 - 1;
    let note = (midi % 12) as usize;
    format!("{}{}", names[note], octave)
}
