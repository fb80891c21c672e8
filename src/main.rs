//! pix2pix image-to-image translation
//!
//! Main entry point providing CLI interface for:
//! - Training a model on a directory of paired images
//! - Testing a trained checkpoint on a dataset
//! - Exporting the generator for standalone inference

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use rust_pix2pix::{
    driver,
    utils::{Mode, Options},
};

/// Conditional adversarial networks for image-to-image translation
#[derive(Parser)]
#[command(name = "pix2pix")]
#[command(version = "0.1.0")]
#[command(about = "Train, test and export pix2pix image translation models")]
struct Cli {
    /// Verbosity level
    #[arg(short, long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model, optionally resuming from --checkpoint
    Train {
        #[command(flatten)]
        options: Options,
    },

    /// Translate every image of --input-dir with a trained checkpoint
    Test {
        #[command(flatten)]
        options: Options,
    },

    /// Export the generator of a checkpoint
    Export {
        #[command(flatten)]
        options: Options,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = match cli.verbosity.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let (mode, mut options) = match cli.command {
        Commands::Train { options } => (Mode::Train, options),
        Commands::Test { options } => (Mode::Test, options),
        Commands::Export { options } => (Mode::Export, options),
    };

    let seed = options.ensure_seed();
    tch::manual_seed(seed as i64);

    std::fs::create_dir_all(&options.output_dir)?;
    options.resolve(mode)?;
    options.log();

    let options_path = options.save_json(&options.output_dir)?;
    info!("Saved options to {}", options_path.display());

    driver::run(&options)?;
    Ok(())
}
