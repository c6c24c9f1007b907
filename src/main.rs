//! maestro - parse, compile and play hybrid notation
//!
//! Subcommands:
//! - `maestro parse <notation>` - parsed notes and diagnostics as JSON
//! - `maestro compile <notation>` - the executable score as JSON
//! - `maestro play <notation>` - play through a logging MIDI sink

use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use maestro::{LoggingSink, Maestro, MaestroConfig};

#[derive(Parser)]
#[command(name = "maestro")]
#[command(about = "Hybrid notation parser and MIDI event scheduler")]
#[command(version)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print parsed notes and diagnostics
    Parse(Input),

    /// Print the executable score
    Compile(Input),

    /// Play the notation and print the final status
    Play {
        #[command(flatten)]
        input: Input,

        /// Tempo when the notation has no front matter tempo
        #[arg(long)]
        bpm: Option<f64>,
    },
}

#[derive(Args)]
struct Input {
    /// Notation text
    notation: Option<String>,

    /// Read notation from a file instead
    #[arg(short, long, conflicts_with = "notation")]
    file: Option<PathBuf>,
}

impl Input {
    fn read(&self) -> Result<String, String> {
        match (&self.notation, &self.file) {
            (Some(text), _) => Ok(text.clone()),
            (None, Some(path)) => fs::read_to_string(path)
                .map_err(|e| format!("Error reading file '{}': {}", path.display(), e)),
            (None, None) => Err("No notation given; pass it inline or with --file".to_string()),
        }
    }
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("{}", message);
    process::exit(1);
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => fail(format!("Error encoding output: {}", e)),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => MaestroConfig::load(path).unwrap_or_else(|e| fail(format!("Config error: {}", e))),
        None => MaestroConfig::default(),
    };

    match cli.command {
        Commands::Parse(input) => {
            let notation = input.read().unwrap_or_else(|e| fail(e));
            match maestro::parse_hybrid_notation(&notation, &config.defaults) {
                Ok(outcome) => print_json(&outcome),
                Err(e) => fail(format!("Parse error: {}", e)),
            }
        }
        Commands::Compile(input) => {
            let notation = input.read().unwrap_or_else(|e| fail(e));
            match maestro::compile(&notation, &config.defaults) {
                Ok(score) => print_json(&score),
                Err(e) => fail(format!("Parse error: {}", e)),
            }
        }
        Commands::Play { input, bpm } => {
            let notation = input.read().unwrap_or_else(|e| fail(e));
            let mut config = config;
            if let Some(bpm) = bpm {
                config.defaults.bpm = bpm;
            }
            let score = maestro::compile(&notation, &config.defaults)
                .unwrap_or_else(|e| fail(format!("Parse error: {}", e)));

            let engine = Maestro::new(config);
            if let Err(e) = engine.initialize().await {
                fail(format!("Startup error: {}", e));
            }
            let _bridge = engine.attach_sink(Arc::new(LoggingSink));

            let id = engine
                .schedule_partitura(score)
                .unwrap_or_else(|e| fail(format!("Scheduling error: {}", e)));
            engine.wait_for(&id).await;
            print_json(&engine.status());
        }
    }
}
