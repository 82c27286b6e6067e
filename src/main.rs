use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use voice_command_engine::chat::HttpChatServices;
use voice_command_engine::service::{CommandRoundTrip, HttpCommandTransport, RetryPolicy};
use voice_command_engine::voice::{
    self, AudioClip, AudioPlayback, CpalMicrophone, KeywordSpotter, Microphone, RecordingMode,
    SilentFeedback, SpectrumAnalyzer, SpeechFeedback, StopReason, SynthesizedFeedback,
    TextToSpeech, VadFrame, VadState, spectrum::FFT_SIZE,
};
use voice_command_engine::{ActivationMode, Assistant, AssistantHandle, Collaborators, Config};

/// vocmd - hands-free voice commands for chat
#[derive(Parser)]
#[command(name = "vocmd", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long, env = "VOCMD_CONFIG")]
    config: Option<PathBuf>,

    /// Start commands from the keyboard instead of the wake word
    #[arg(long)]
    push_to_talk: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Print voice activity decisions from the microphone
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Speak a sentence through the configured TTS provider
    TestTts {
        /// Text to speak
        #[arg(default_value = "Xin chào! Đây là thử nghiệm giọng nói.")]
        text: String,
    },
    /// Send a WAV file through one command round trip
    SendClip {
        /// Path to a 16-bit mono WAV file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,voice_command_engine=info",
        1 => "info,voice_command_engine=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if cli.push_to_talk {
        config.settings.activation_mode = ActivationMode::PushToTalk;
    }

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestTts { text } => test_tts(&config, &text).await,
            Command::SendClip { path } => send_clip(&config, &path).await,
        };
    }

    tracing::info!(
        mode = ?config.settings.activation_mode,
        service = %config.service.url,
        "starting voice command engine"
    );

    let microphone: Rc<dyn Microphone> = Rc::new(CpalMicrophone::new()?);
    let spotter: Box<dyn KeywordSpotter> = match config.settings.activation_mode {
        ActivationMode::WakeWord => voice::spotter_from_config(&config)?,
        ActivationMode::PushToTalk => Box::new(NeverSpotter),
    };

    let collaborators = Collaborators {
        microphone,
        spotter,
        transport: Arc::new(HttpCommandTransport::new(&config.service)?),
        chat: Arc::new(HttpChatServices::new(&config.chat)?),
        speech: speech_feedback(&config),
    };

    let retry = RetryPolicy::with_max_retries(config.service.max_retries);
    let (assistant, handle, mut status) = Assistant::new(config.settings.clone(), collaborators, retry);

    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            println!("[{current}]");
        }
    });

    spawn_keyboard(handle.clone());

    let ctrl_c = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.shutdown();
        }
    });

    match config.settings.activation_mode {
        ActivationMode::WakeWord => println!(
            "Say \"{}\" to give a command. Keys: t = talk, r = reset, q = quit",
            config.settings.wake_phrase
        ),
        ActivationMode::PushToTalk => println!("Keys: t (or Enter) = talk, r = reset, q = quit"),
    }

    assistant.run().await?;
    Ok(())
}

/// Spoken feedback, or log-only when disabled or not configured
fn speech_feedback(config: &Config) -> Arc<dyn SpeechFeedback> {
    if !config.settings.tts_enabled {
        return Arc::new(SilentFeedback);
    }
    match TextToSpeech::from_config(&config.tts, config.settings.speech_rate) {
        Ok(tts) => Arc::new(SynthesizedFeedback::new(tts)),
        Err(e) => {
            tracing::warn!(error = %e, "spoken feedback unavailable, logging only");
            Arc::new(SilentFeedback)
        }
    }
}

/// Map stdin lines to control commands
fn spawn_keyboard(handle: AssistantHandle) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            match line {
                "" | "t" => handle.push_to_talk(),
                "r" => handle.reset(),
                "q" => {
                    handle.shutdown();
                    break;
                }
                _ => {
                    if let Some(caller) = line.strip_prefix("call ") {
                        handle.incoming_call("cli-call", caller.trim(), false);
                    } else {
                        println!("unknown key: {line}");
                    }
                }
            }
        }
    });
}

/// Keyword spotter for push-to-talk sessions, which never listen
struct NeverSpotter;

#[async_trait(?Send)]
impl KeywordSpotter for NeverSpotter {
    fn frame_length(&self) -> usize {
        512
    }

    async fn process(&mut self, _frame: &[i16]) -> voice_command_engine::Result<Option<usize>> {
        Ok(None)
    }

    fn reset(&mut self) {}
}

/// Print per-tick voice activity decisions
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let microphone = CpalMicrophone::new()?;
    let mut stream = microphone.open()?;
    let sample_rate = stream.sample_rate();
    println!("Sample rate: {sample_rate} Hz");
    println!("---");

    let thresholds = RecordingMode::FreshCommand.thresholds();
    let mut analyzer = SpectrumAnalyzer::new(sample_rate);
    let bin_hz = analyzer.bin_hz();
    let mut state = VadState::new();
    let mut samples: Vec<f32> = Vec::new();

    let started = tokio::time::Instant::now();
    let mut ticker = tokio::time::interval(voice::POLL_INTERVAL);

    while started.elapsed() < Duration::from_secs(duration) {
        ticker.tick().await;
        samples.extend(stream.drain());
        if samples.len() < FFT_SIZE {
            continue;
        }
        let window = &samples[samples.len() - FFT_SIZE..];
        let spectrum = analyzer.analyze(window);
        let frame = VadFrame {
            spectrum,
            samples: window,
            bin_hz,
        };
        let decision = voice::vad::analyze(&frame, &mut state, thresholds);
        state.observe(decision.is_speech, started.elapsed(), thresholds);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (decision.energy / 4.0).min(50.0) as usize;
        println!(
            "[{:5}ms] energy {:6.1} | threshold {:6.1} | zcr {:.3} | {} {}",
            started.elapsed().as_millis(),
            decision.energy,
            decision.threshold,
            decision.zero_crossing_rate,
            if decision.is_speech { "SPEECH " } else { "silence" },
            "█".repeat(meter_len)
        );

        let keep = samples.len() - FFT_SIZE;
        samples.drain(..keep);
    }

    println!("\n---");
    println!("If energy rose above the threshold while you spoke, VAD is working.");
    Ok(())
}

/// Speak a sentence
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let tts = TextToSpeech::from_config(&config.tts, config.settings.speech_rate)?;
    println!("Synthesizing speech...");
    let mp3_data = tts.synthesize(text).await?;
    println!("Got {} bytes of audio data", mp3_data.len());

    println!("Playing audio...");
    tokio::task::spawn_blocking(move || AudioPlayback::play_mp3(&mp3_data, &AtomicBool::new(false)))
        .await??;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");
    Ok(())
}

/// Upload a recorded WAV once and print the interpreted response
async fn send_clip(config: &Config, path: &Path) -> anyhow::Result<()> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let frames = reader.duration();
    drop(reader);

    let clip = AudioClip {
        wav: std::fs::read(path)?,
        sample_rate: spec.sample_rate,
        duration: Duration::from_secs_f64(f64::from(frames) / f64::from(spec.sample_rate)),
        mode: RecordingMode::FreshCommand,
        had_speech: true,
        stop_reason: StopReason::TimeBasedSilence,
    };

    let transport = Arc::new(HttpCommandTransport::new(&config.service)?);
    let round_trip = CommandRoundTrip::new(
        transport,
        RetryPolicy::with_max_retries(config.service.max_retries),
    );

    println!("Sending {} ({} ms)...", path.display(), clip.duration.as_millis());
    let result = round_trip.send(&clip, None).await?;

    println!("transcript:         {}", result.transcript);
    println!("reply:              {}", result.reply);
    println!("needs confirmation: {}", result.needs_confirmation);
    println!("pending:            {:?}", result.pending);
    println!("client action:      {:?}", result.client_action);
    Ok(())
}
