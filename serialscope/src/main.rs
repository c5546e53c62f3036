/*!
# Serialscope

Command-line host for the `asyncframe` decoder. Decodes edge-list captures of
asynchronous serial and Qi lines into frames, and generates simulated
captures for testing.

## Features

- Standard async serial, multiprocessor addressing and Qi bi-phase decoding
- Autobaud with a single corrective rerun
- Parallel decoding of several capture files
- Simulated captures with a counting pattern
- TOML configuration file

## Usage

### Decode captures
```bash
serialscope decode capture1.json capture2.json
```

### Generate a simulated capture
```bash
serialscope simulate --samples 2000000
```

### Write a default configuration file
```bash
serialscope config --output serialscope.toml
```
*/

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod session;

use config::AppConfig;
use session::DecodeSession;

#[derive(Parser)]
#[command(name = "serialscope")]
#[command(about = "Asynchronous serial and Qi frame decoding for edge-sampled captures")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "serialscope.toml")]
    config: PathBuf,

    /// Log decoder internals (overrides RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode capture files into frames
    Decode {
        /// Capture files (JSON edge lists)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Directory for .frames.json files (default: next to each capture)
        #[arg(short, long)]
        output_dir: Option<String>,

        /// Override the configured bit rate
        #[arg(short, long)]
        bit_rate: Option<u32>,

        /// Enable autobaud
        #[arg(long)]
        autobaud: bool,

        /// Include bit and error markers in the output
        #[arg(long)]
        markers: bool,
    },

    /// Generate a simulated capture
    Simulate {
        /// Number of samples to generate
        #[arg(short = 'n', long)]
        samples: Option<u64>,

        /// Sample rate in Hz
        #[arg(short, long)]
        sample_rate: Option<u32>,

        /// Parent directory for the timestamped session folder
        #[arg(short, long)]
        output_dir: Option<String>,
    },

    /// Generate configuration file
    Config {
        /// Output path for configuration file
        #[arg(short, long, default_value = "serialscope.toml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so frame output can be piped
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    match cli.command {
        Commands::Decode { inputs, output_dir, bit_rate, autobaud, markers } => {
            let mut config = load_config(&cli.config)?;
            if let Some(output_dir) = output_dir {
                config.output.directory = output_dir;
            }
            if let Some(bit_rate) = bit_rate {
                config.decoder.bit_rate = bit_rate;
            }
            config.decoder.use_autobaud |= autobaud;
            config.output.include_markers |= markers;
            run_decode(config, inputs)
        }

        Commands::Simulate { samples, sample_rate, output_dir } => {
            let mut config = load_config(&cli.config)?;
            if let Some(samples) = samples {
                config.simulation.samples = samples;
            }
            if let Some(sample_rate) = sample_rate {
                config.simulation.sample_rate = sample_rate;
            }
            if let Some(output_dir) = output_dir {
                config.simulation.output_directory = output_dir;
            }
            let session_dir = session::run_simulation(&config)?;
            println!("✅ Simulation written to {}", session_dir.display());
            Ok(())
        }

        Commands::Config { output } => generate_config_file(output),
    }
}

/// Load the configuration file, or fall back to defaults if there is none
fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        AppConfig::load_from_file(path)
    } else {
        info!("No config file at {}, using defaults", path.display());
        Ok(AppConfig::new())
    }
}

fn run_decode(config: AppConfig, inputs: Vec<PathBuf>) -> Result<()> {
    println!(
        "🚀 Decoding {} capture(s) at {} bit/s ({:?})",
        inputs.len(),
        config.decoder.bit_rate,
        config.decoder.line_coding
    );

    let session = DecodeSession::new(config.decoder, config.output)?;

    // Set up Ctrl+C handler
    let cancel = session.cancel_token();
    ctrlc::set_handler(move || {
        eprintln!("\n🛑 Received Ctrl+C, stopping after the current frame...");
        cancel.cancel();
    })?;

    let reports = session.run(&inputs)?;
    for report in &reports {
        println!(
            "💾 {} → {} ({} frames, {} errors{})",
            report.input.display(),
            report.output.display(),
            report.frames,
            report.errors,
            if report.cancelled { ", cancelled" } else { "" }
        );
    }

    println!("✅ Decode completed");
    Ok(())
}

/// Generate a default configuration file
fn generate_config_file(output_path: PathBuf) -> Result<()> {
    let config = AppConfig::new();
    config.save_to_file(&output_path)?;

    println!("✅ Generated configuration file: {}", output_path.display());
    println!("📝 Edit the file to customize settings, then run:");
    println!("   serialscope --config {} decode <captures>", output_path.display());

    Ok(())
}
