//! Debatecast CLI - Debate Podcast Assembly Tool
//!
//! Replays a recorded debate stream (NDJSON events) or a pre-formed
//! conversation-blocks file through the podcast pipeline and reports
//! the assembled artifact.

use clap::Parser;
use colored::Colorize;
use debatecast_core::{
    Config, FfmpegAssembler, OpenAiSpeech, PipelineEvent, PodcastPipeline, RawBlock, Speaker,
    StreamEvent, TextEvent,
};
use std::env;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(
    name = "debatecast",
    version,
    about = "Assemble a two-speaker debate podcast from a turn stream",
    long_about = "Consumes a debate text stream (or pre-formed conversation blocks), \
synthesizes speech per turn, and merges the result into one audio file."
)]
struct Cli {
    /// NDJSON file of stream events ({type, content, turn} per line)
    #[arg(long, value_name = "FILE", conflicts_with = "blocks")]
    events: Option<PathBuf>,

    /// JSON file containing an array of conversation blocks
    #[arg(long, value_name = "FILE")]
    blocks: Option<PathBuf>,

    /// Voice for the optimistic speaker
    #[arg(long, value_name = "VOICE")]
    voice_for: Option<String>,

    /// Voice for the skeptical speaker
    #[arg(long, value_name = "VOICE")]
    voice_against: Option<String>,

    /// Which speaker opens each turn
    #[arg(long, value_name = "SPEAKER")]
    lead: Option<String>,

    /// Silence between segments, in seconds
    #[arg(long, value_name = "SECONDS")]
    silence: Option<f64>,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Copy the finished audio to this path
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

/// One NDJSON line of the generation stream's wire format.
#[derive(serde::Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: String,
    turn: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(voice) = &cli.voice_for {
        config.voices.for_voice = voice.clone();
    }
    if let Some(voice) = &cli.voice_against {
        config.voices.against_voice = voice.clone();
    }
    if let Some(silence) = cli.silence {
        config.pipeline.silence_seconds = silence;
    }
    if let Some(lead) = &cli.lead {
        config.pipeline.lead_speaker = match lead.to_lowercase().as_str() {
            "for" => Speaker::For,
            "against" => Speaker::Against,
            other => return Err(format!("unknown speaker '{}', use for|against", other).into()),
        };
    }
    if let Ok(api_base) = env::var("OPENAI_API_BASE").or_else(|_| env::var("OPENAI_BASE_URL")) {
        config.synthesis.api_base = api_base;
    }

    let api_key = env::var("OPENAI_API_KEY").unwrap_or_else(|_| {
        eprintln!(
            "{}",
            "Warning: OPENAI_API_KEY not set. Synthesis calls may fail.".yellow()
        );
        String::new()
    });

    let synthesizer = OpenAiSpeech::new(&config.synthesis, api_key)?;
    let assembler = FfmpegAssembler::new(config.assembly.clone());
    let pipeline = PodcastPipeline::new(config, Box::new(synthesizer), Box::new(assembler))
        .with_callback(create_console_callback());

    let artifact = match (&cli.events, &cli.blocks) {
        (Some(events_path), None) => {
            let rx = replay_events(events_path).await?;
            pipeline.run_stream(rx).await?
        }
        (None, Some(blocks_path)) => {
            let content = tokio::fs::read_to_string(blocks_path).await?;
            let raw: Vec<RawBlock> = serde_json::from_str(&content)?;
            pipeline.run_blocks(raw).await?
        }
        _ => {
            eprintln!(
                "{} Provide exactly one of --events or --blocks.",
                "Error:".red().bold()
            );
            std::process::exit(1);
        }
    };

    let final_path = match &cli.output {
        Some(output) => {
            if let Some(parent) = output.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(&artifact.audio_path, output).await?;
            output.clone()
        }
        None => artifact.audio_path.clone(),
    };

    println!();
    println!("{}", "Podcast assembled.".bright_green().bold());
    println!("  {} {}", "Audio:".bold(), final_path.display());
    println!(
        "  {} {:.1}s across {} blocks",
        "Duration:".bold(),
        artifact.duration_seconds,
        artifact.block_count
    );

    Ok(())
}

/// Feed the recorded NDJSON stream into a channel, line by line.
async fn replay_events(
    path: &std::path::Path,
) -> Result<mpsc::Receiver<StreamEvent>, Box<dyn std::error::Error>> {
    let content = tokio::fs::read_to_string(path).await?;
    let mut events = Vec::new();
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        let wire: WireEvent = serde_json::from_str(line)?;
        let event = match wire.kind.as_str() {
            "believer" => StreamEvent::Delta(TextEvent {
                speaker: Speaker::For,
                turn: wire.turn.unwrap_or(1),
                delta: wire.content,
            }),
            "skeptic" => StreamEvent::Delta(TextEvent {
                speaker: Speaker::Against,
                turn: wire.turn.unwrap_or(1),
                delta: wire.content,
            }),
            "error" => StreamEvent::Error(wire.content),
            other => return Err(format!("unknown event type '{}'", other).into()),
        };
        events.push(event);
    }

    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        for event in events {
            if tx.send(event).await.is_err() {
                break;
            }
        }
    });
    Ok(rx)
}

/// Create a callback that prints pipeline progress to the console.
fn create_console_callback() -> Box<dyn Fn(PipelineEvent) + Send + Sync> {
    let current: Mutex<Option<(Speaker, u32)>> = Mutex::new(None);

    Box::new(move |event| match event {
        PipelineEvent::StateChanged(state) => {
            println!("{}", format!("[{}]", state).dimmed());
        }
        PipelineEvent::Delta {
            speaker,
            turn,
            delta,
        } => {
            let mut current = current.lock().unwrap();
            if *current != Some((speaker, turn)) {
                *current = Some((speaker, turn));
                let label = format!("\n▶ {} (turn {})", speaker.display_name(), turn);
                match speaker {
                    Speaker::For => println!("{}", label.bright_cyan().bold()),
                    Speaker::Against => println!("{}", label.bright_magenta().bold()),
                }
            }
            print!("{}", delta);
            let _ = std::io::Write::flush(&mut std::io::stdout());
        }
        PipelineEvent::BlockSynthesized {
            completed,
            total,
            speaker,
            turn,
        } => {
            println!(
                "  {} {}/{} ({} turn {})",
                "synthesized".green(),
                completed,
                total,
                speaker.display_name(),
                turn
            );
        }
        PipelineEvent::Finished { .. } => {}
    })
}
