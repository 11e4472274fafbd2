/// Bridge Sim - drives the audio bridge with a simulated SDK audio engine
use anyhow::Context;
use audiobridge_analysis::{AudioSinkRenderer, MultibandVolumeRenderer, VolumeRenderer};
use audiobridge_core::{
    event_channel, logging::init_logging, AudioBuffer, AudioFormat, BridgeConfig, BridgeEvent,
    ProcessingStage, RendererSide, SampleRate,
};
use audiobridge_processing::{AudioPipelineManager, ClipProcessor, GainProcessor, RendererTags};
use clap::{Args, Parser, Subcommand};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::f32::consts::TAU;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "bridge-sim")]
#[command(about = "Run the audio bridge against a simulated audio engine", long_about = None)]
struct Cli {
    /// Configuration file path (defaults to ./audiobridge.toml when present)
    #[arg(short, long, global = true, env = "AUDIOBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream simulated audio through both stages and print bridge events
    Run(RunArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Seconds of audio to simulate
    #[arg(short, long, default_value_t = 1.0)]
    seconds: f64,

    /// Sample rate of both streams in Hz
    #[arg(long, default_value_t = 48_000)]
    sample_rate: u32,

    /// Channel count of both streams
    #[arg(long, default_value_t = 1)]
    channels: u16,

    /// Frequency of the simulated microphone tone in Hz
    #[arg(long, default_value_t = 440.0)]
    capture_frequency: f32,

    /// Frequency of the simulated remote tone in Hz
    #[arg(long, default_value_t = 3000.0)]
    render_frequency: f32,

    /// Peak amplitude of both tones
    #[arg(long, default_value_t = 0.5)]
    amplitude: f32,

    /// Linear gain applied on the capture-post stage before clipping
    #[arg(long, default_value_t = 1.0)]
    gain: f32,

    /// Pace frames at 10 ms like a real engine instead of running flat out
    #[arg(long)]
    realtime: bool,

    /// Also forward every processed microphone frame as base64 PCM
    #[arg(long)]
    sink: bool,
}

fn main() -> anyhow::Result<()> {
    init_logging("bridge_sim=info,audiobridge_processing=info");

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => BridgeConfig::load_from(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => BridgeConfig::load()?,
    };

    match cli.command {
        Commands::Run(args) => run(&config, &args),
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn run(config: &BridgeConfig, args: &RunArgs) -> anyhow::Result<()> {
    let format = AudioFormat::new(SampleRate::new(args.sample_rate), args.channels);
    anyhow::ensure!(format.is_valid(), "invalid stream format: {:?}", format);

    let manager = Arc::new(AudioPipelineManager::with_config(config));
    let tags = RendererTags::new();
    let (sink, events) = event_channel(config.events.channel_capacity);
    let sink = Arc::new(sink);

    // Capture-post chain: gain then clip
    manager.add_capture_post_processor(Arc::new(GainProcessor::new(args.gain)));
    manager.add_capture_post_processor(Arc::new(ClipProcessor::new()));

    // Volume on the microphone, spectrum on the speaker
    let volume = Arc::new(VolumeRenderer::from_settings(&config.volume, sink.clone()));
    let volume_tag = tags.register(volume.clone());
    volume.set_tag(Some(volume_tag.clone()));
    tags.attach(&manager, &volume_tag, RendererSide::Local)?;

    let multiband = Arc::new(MultibandVolumeRenderer::new(&config.multiband, sink.clone()));
    let multiband_tag = tags.register(multiband.clone());
    multiband.set_tag(Some(multiband_tag.clone()));
    tags.attach(&manager, &multiband_tag, RendererSide::Remote)?;

    let sink_tag = if args.sink {
        let recorder = Arc::new(AudioSinkRenderer::new(sink.clone()));
        let tag = tags.register(recorder.clone());
        recorder.set_tag(Some(tag.clone()));
        tags.attach(&manager, &tag, RendererSide::Local)?;
        Some(tag)
    } else {
        None
    };

    tracing::info!(
        volume = %volume_tag,
        multiband = %multiband_tag,
        sink = ?sink_tag,
        "Renderers attached"
    );

    let frame_count = (args.seconds * 100.0).ceil().max(0.0) as usize;
    let engine = {
        let manager = Arc::clone(&manager);
        let args = args.clone();
        thread::Builder::new()
            .name("audio-engine".to_string())
            .spawn(move || simulate_engine(&manager, format, &args, frame_count))
            .context("spawning audio engine thread")?
    };

    let printed = print_events(&events, || engine.is_finished());
    engine
        .join()
        .map_err(|_| anyhow::anyhow!("audio engine thread panicked"))?;
    let printed = printed + print_remaining(&events);

    for stage in ProcessingStage::ALL {
        let stats = manager.adapter(stage).stats();
        tracing::info!(
            stage = %stage,
            frames = stats.frames_processed,
            failures = stats.processor_failures,
            mismatches = stats.format_mismatches,
            "Stage summary"
        );
    }
    tracing::info!(printed, dropped = sink.dropped(), "Events delivered");

    tags.detach(&manager, &volume_tag, RendererSide::Local)?;
    tags.detach(&manager, &multiband_tag, RendererSide::Remote)?;
    if let Some(tag) = &sink_tag {
        tags.detach(&manager, tag, RendererSide::Local)?;
    }
    manager.clear_all();
    Ok(())
}

/// What the SDK does: start both streams, push 10 ms frames, stop
fn simulate_engine(manager: &AudioPipelineManager, format: AudioFormat, args: &RunArgs, frames: usize) {
    let module = manager.module();
    let frame_len = format.sample_rate.frames_per_10ms();
    let mut capture = ToneGenerator::new(args.capture_frequency, args.amplitude, format);
    let mut render = ToneGenerator::new(args.render_frequency, args.amplitude, format);

    for stage in ProcessingStage::ALL {
        module.stream_started(stage, format);
    }

    for _ in 0..frames {
        let mut mic = capture.next_frame(frame_len);
        module.process_frame(ProcessingStage::CapturePost, &mut mic);

        let mut speaker = render.next_frame(frame_len);
        module.process_frame(ProcessingStage::RenderPre, &mut speaker);

        if args.realtime {
            thread::sleep(Duration::from_millis(10));
        }
    }

    for stage in ProcessingStage::ALL {
        module.stream_stopped(stage);
    }
}

/// Phase-continuous sine generator, identical on every channel
struct ToneGenerator {
    step: f32,
    phase: f32,
    amplitude: f32,
    format: AudioFormat,
}

impl ToneGenerator {
    fn new(frequency: f32, amplitude: f32, format: AudioFormat) -> Self {
        Self {
            step: TAU * frequency / format.sample_rate.as_hz() as f32,
            phase: 0.0,
            amplitude,
            format,
        }
    }

    fn next_frame(&mut self, frames: usize) -> AudioBuffer {
        let channels = usize::from(self.format.channels);
        let mut samples = Vec::with_capacity(frames * channels);
        for _ in 0..frames {
            let value = self.amplitude * self.phase.sin();
            samples.extend(std::iter::repeat(value).take(channels));
            self.phase = (self.phase + self.step) % TAU;
        }
        AudioBuffer::new(samples, self.format)
    }
}

fn print_events(events: &Receiver<BridgeEvent>, finished: impl Fn() -> bool) -> usize {
    let mut printed = 0;
    loop {
        match events.recv_timeout(Duration::from_millis(50)) {
            Ok(event) => {
                print_event(&event);
                printed += 1;
            }
            Err(RecvTimeoutError::Timeout) if finished() => return printed,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return printed,
        }
    }
}

fn print_remaining(events: &Receiver<BridgeEvent>) -> usize {
    events.try_iter().map(|event| print_event(&event)).count()
}

fn print_event(event: &BridgeEvent) {
    match event.to_json() {
        Ok(body) => println!("{} {}", event.name(), body),
        Err(err) => tracing::warn!(event = event.name(), "Failed to serialize event: {}", err),
    }
}
