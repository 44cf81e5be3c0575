use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sottovoce::voice::{
    AudioPlayback, CpalInput, Speaker, TextToSpeech, default_input_device, list_input_devices,
};
use sottovoce::{CaptureOutcome, Config, Conversation, Recorder, app};

/// Sottovoce - talk to a chat model through your microphone
#[derive(Parser)]
#[command(name = "sottovoce", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Same as a single -v
    #[arg(long, env = "DEBUG_MODE")]
    debug: bool,

    /// Never speak replies, even if TTS is enabled
    #[arg(long)]
    no_tts: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List audio input devices
    Devices,
    /// Capture a single utterance and save it as WAV
    Listen {
        /// Output file
        #[arg(short, long, default_value = "utterance.wav")]
        output: PathBuf,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let verbose = if cli.debug { cli.verbose.max(1) } else { cli.verbose };
    let filter = match verbose {
        0 => "info,sottovoce=info",
        1 => "info,sottovoce=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
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
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Devices => list_devices(),
            Command::Listen { output } => listen_once(&output).await,
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(&text).await,
        };
    }

    let config = Config::load()?;
    tracing::debug!(?config, "loaded configuration");

    let speak = config.tts.enabled && !cli.no_tts;
    let mut conversation = Conversation::from_config(&config, speak)?;
    let recorder = Recorder::new(CpalInput::with_device(config.input_device.clone()), config.vad)?
        .with_listen_timeout(config.listen_timeout);

    tracing::info!(
        sample_rate = config.vad.sample_rate,
        frame_ms = config.vad.frame_duration_ms,
        max_silence_ms = config.vad.max_silence_ms,
        tts = speak,
        "sottovoce ready"
    );

    tokio::select! {
        result = app::run(&recorder, &mut conversation, config.device_retry) => result?,
        _ = tokio::signal::ctrl_c() => {
            println!("\n[SYSTEM] Stopped by user. Goodbye!");
        }
    }

    Ok(())
}

/// Print input devices, marking the default
fn list_devices() -> anyhow::Result<()> {
    let default = default_input_device();
    let devices = list_input_devices()?;

    if devices.is_empty() {
        println!("No input devices found.");
        return Ok(());
    }

    for name in devices {
        let marker = if default.as_deref() == Some(name.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{marker} {name}");
    }

    Ok(())
}

/// Record one utterance to a WAV file
#[allow(clippy::future_not_send)]
async fn listen_once(output: &std::path::Path) -> anyhow::Result<()> {
    let config = Config::load()?;
    let recorder = Recorder::new(CpalInput::with_device(config.input_device.clone()), config.vad)?
        .with_listen_timeout(config.listen_timeout);

    println!("[SYSTEM] Listening for speech...");
    match recorder.record().await? {
        CaptureOutcome::Utterance(utterance) => {
            std::fs::write(output, utterance.to_wav()?)?;
            println!(
                "Saved {:.1}s of speech to {}",
                utterance.duration().as_secs_f32(),
                output.display()
            );
            Ok(())
        }
        CaptureOutcome::NoSpeech => {
            println!("[SYSTEM] No speech detected.");
            Ok(())
        }
        CaptureOutcome::DeviceUnavailable(reason) => {
            anyhow::bail!("could not access audio device: {reason}")
        }
    }
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlayback::new(1.0);

    let sample_rate = 24000_u32;
    let frequency = 440.0_f32;
    let num_samples = sample_rate as usize * 2;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);
    playback.play(samples, sample_rate).await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Speak a line through the configured TTS endpoint
async fn test_tts(text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load()?;
    let tts = TextToSpeech::new(&config.tts)?;

    println!("Synthesizing speech via {}...", config.tts.endpoint);
    tts.speak(text).await?;

    println!("Done.");
    Ok(())
}
