//! tensorio CLI
//!
//! Inspect and convert `.npy`, `.safetensors` and GGUF tensor files.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;

use tensorio_cli::commands::{ConvertCommand, InspectCommand};
use tensorio_cli::config::{CliConfig, ConfigBuilder};

#[derive(Parser)]
#[command(name = "tensorio")]
#[command(about = "Inspect and convert npy, safetensors and GGUF tensor files")]
#[command(long_about = r#"
Reads and writes NumPy .npy arrays, .safetensors tensor maps and GGUF
containers (including Q4_0/Q4_1/Q8_0 weight repacking and dequantization of
other GGML block types).

Examples:
  # Show header, metadata and tensor index of a GGUF file
  tensorio inspect model.gguf

  # Same, as JSON
  tensorio inspect model.safetensors --json

  # Convert between formats (chosen by extension)
  tensorio convert --input model.safetensors --output model.gguf
"#)]
#[command(version)]
struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Tensor-data alignment for GGUF output
    #[arg(long, value_name = "BYTES", global = true)]
    alignment: Option<usize>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what a file contains
    #[command(alias = "info")]
    Inspect(InspectCommand),

    /// Convert between formats
    #[command(alias = "conv")]
    Convert(ConvertCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigBuilder::load(cli.config.as_deref())?
        .log_level(cli.log_level.clone())
        .alignment(cli.alignment)
        .build()
        .context("Failed to build configuration")?;

    setup_logging(&config);

    let result = match cli.command {
        Some(Commands::Inspect(cmd)) => cmd.execute(&config),
        Some(Commands::Convert(cmd)) => cmd.execute(&config),
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("Command failed: {e}");
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }

    Ok(())
}

/// `RUST_LOG` wins over the configured level.
fn setup_logging(config: &CliConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match config.logging.format.as_str() {
        "json" => subscriber.json().with_timer(tracing_subscriber::fmt::time::uptime()).init(),
        "pretty" => subscriber.pretty().init(),
        _ => subscriber.compact().init(),
    }
}
