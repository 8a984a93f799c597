use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use hearth::activation::ActivationDetector;
use hearth::capability::CapabilityPriming;
use hearth::intent::Instructions;
use hearth::voice::{
    AudioCapture, ConsoleOutput, MicrophoneInput, SAMPLE_RATE, Speaker, SpeechOutput,
    calculate_energy,
};
use hearth::{
    Config, Dispatcher, IntentSession, Orchestrator, OrchestratorSettings, capabilities, llm,
};

/// Hearth - Voice-driven home automation assistant
#[derive(Parser)]
#[command(name = "hearth", version, about)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "HEARTH_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Type requests instead of speaking them; answers are printed
    #[arg(long)]
    chat: bool,

    /// Also write logs to this file
    #[arg(long, env = "HEARTH_LOG_FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Write the documentation feed of every enabled capability
    Docs {
        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Bonjour ! Ceci est un test de synthèse vocale.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("hearth: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Console logging, plus a plain-text copy in `log_file` when given
///
/// `RUST_LOG` overrides the verbosity flag.
fn init_logging(verbose: u8, log_file: Option<&Path>) -> anyhow::Result<()> {
    let default = match verbose {
        0 => "info",
        1 => "info,hearth=debug",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| anyhow::anyhow!("cannot open log file {}: {e}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(())
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Docs { out } => write_docs(cli.config.as_deref(), &out),
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestTts { text } => test_tts(cli.config.as_deref(), &text).await,
        };
    }

    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "loaded configuration");
    tracing::info!(
        name = %config.assistant_name,
        language = %config.language,
        provider = config.llm.provider.as_str(),
        chat = cli.chat,
        "starting hearth"
    );

    let registry = Arc::new(capabilities::build_registry(&config)?);
    let instructions = Instructions::new(&config.assistant_name, &config.language)
        .with_persona(config.llm.persona.clone())
        .with_capabilities(
            registry
                .iter()
                .map(|p| CapabilityPriming::from_provider(p.as_ref())),
        );

    let model = llm::from_config(&config.llm)?;
    let session = IntentSession::new(model, &instructions, config.llm.session_ttl)?;
    let mut orchestrator = Orchestrator::new(
        session,
        Dispatcher::new(registry),
        OrchestratorSettings::from_config(&config),
    )?;

    if cli.chat {
        println!("Type a request for {} (Ctrl-D to quit).", config.assistant_name);
        let stdin = BufReader::new(tokio::io::stdin());
        orchestrator
            .run_interactive(stdin, &ConsoleOutput, shutdown_signal())
            .await?;
        return Ok(());
    }

    let mut detector = ActivationDetector::from_config(&config)?;
    let mut input = MicrophoneInput::from_config(&config)?;
    let speaker = Speaker::from_config(&config)?;

    tracing::info!("hearth ready - say \"{}\"", config.assistant_name);
    orchestrator
        .run_continuous(&mut detector, &mut input, &speaker, shutdown_signal())
        .await?;

    Ok(())
}

/// Resolves on Ctrl-C
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

/// Write capability documentation files
fn write_docs(config_path: Option<&Path>, out: &Path) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    let docs = capabilities::documentation(&config)?;

    if docs.is_empty() {
        println!("No capabilities enabled.");
        return Ok(());
    }

    for doc in docs {
        let path = doc.write_to(out)?;
        println!("{}: {}", doc.name, path.display());
    }

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    println!("Sample rate: {SAMPLE_RATE} Hz");
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_buffer();
        let energy = calculate_energy(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test TTS output
#[allow(clippy::future_not_send)]
async fn test_tts(config_path: Option<&Path>, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load(config_path)?;
    let speaker = Speaker::from_config(&config)?;

    println!("Synthesizing and playing...");
    speaker.say(text).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
