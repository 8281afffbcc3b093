use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use subweave::cli::{Cli, Commands, ConfigAction};
use subweave::config::Config;
use subweave::pipeline::{Pipeline, PipelineOutcome};
use subweave::srt::format_timecode;
use subweave::{AudioSource, ElevenLabsClient, OpenAiCompatClient, WavSource};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    match cli.command {
        Commands::Generate {
            audio,
            output,
            language,
            max_chunk,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if language.is_some() {
                config.stt.language = language;
            }
            if let Some(secs) = max_chunk {
                config.chunking.max_chunk_secs = secs;
            }
            let output = output.unwrap_or_else(|| audio.with_extension("srt"));
            run_generate(config, &audio, &output, cli.quiet).await?;
        }
        Commands::Convert {
            transcript,
            output,
            provider,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let output = output.unwrap_or_else(|| transcript.with_extension("srt"));
            run_convert(config, &transcript, &output, provider, cli.quiet).await?;
        }
        Commands::Plan { audio, max_chunk } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(secs) = max_chunk {
                config.chunking.max_chunk_secs = secs;
            }
            run_plan(&config, &audio)?;
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref())?;
        }
    }

    Ok(())
}

/// Route log output to stderr so stdout stays clean for piping.
fn init_logging(quiet: bool, verbose: u8) {
    let default = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "subweave=info",
            _ => "subweave=debug",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/subweave/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path())?
    };
    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

async fn run_generate(config: Config, audio: &Path, output: &Path, quiet: bool) -> Result<()> {
    let source = WavSource::open(
        audio,
        config.chunking.silence_threshold_db,
        config.chunking.min_silence_secs,
    )?;
    let stt = ElevenLabsClient::new(config.stt.clone())?;
    let llm = OpenAiCompatClient::new(config.llm.clone())?;
    let pipeline = Pipeline::new(Arc::new(stt), Arc::new(llm), config);

    let outcome = pipeline.generate(&source).await?;
    finish(outcome, output, quiet)
}

async fn run_convert(
    config: Config,
    transcript: &Path,
    output: &Path,
    provider: Option<subweave::Provider>,
    quiet: bool,
) -> Result<()> {
    let raw = std::fs::read_to_string(transcript)
        .with_context(|| format!("failed to read {}", transcript.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", transcript.display()))?;

    let llm = OpenAiCompatClient::new(config.llm.clone())?;
    let pipeline = Pipeline::new(
        Arc::new(subweave::stt::UnconfiguredService),
        Arc::new(llm),
        config,
    );

    let outcome = pipeline.from_transcript(&value, provider).await?;
    finish(outcome, output, quiet)
}

fn run_plan(config: &Config, audio: &Path) -> Result<()> {
    let source = WavSource::open(
        audio,
        config.chunking.silence_threshold_db,
        config.chunking.min_silence_secs,
    )?;
    let chunks = subweave::audio::plan_chunks(&source, &config.chunking);

    println!(
        "{} ({} total)",
        audio.display(),
        format_timecode(source.duration())
    );
    for chunk in &chunks {
        println!(
            "  chunk {:>3}: {} --> {}  ({:.1}s)",
            chunk.index,
            format_timecode(chunk.offset),
            format_timecode(chunk.end()),
            chunk.duration
        );
    }
    Ok(())
}

fn finish(outcome: PipelineOutcome, output: &Path, quiet: bool) -> Result<()> {
    std::fs::write(output, &outcome.srt)
        .with_context(|| format!("failed to write {}", output.display()))?;

    if !quiet {
        for warning in &outcome.warnings {
            eprintln!("{} {}", "warning:".yellow().bold(), warning);
        }
        println!(
            "{} {} ({} entries)",
            "wrote".green().bold(),
            output.display(),
            outcome.entries.len()
        );
    }
    Ok(())
}

/// Handle configuration commands.
fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Path => {
            let path = custom_path
                .map(PathBuf::from)
                .unwrap_or_else(Config::default_path);
            println!("{}", path.display());
        }
        ConfigAction::Show => {
            let config = load_config(custom_path)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}
