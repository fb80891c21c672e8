//! Standalone runner for exported generators
//!
//! Usage:
//!   cargo run --bin pix2pix_infer -- --export-dir export --request request.json
//!
//! Reads `{"key": [k], "input": [base64]}` from the request file (stdin when
//! omitted) and prints `{"key": [k], "output": [base64]}`.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use rust_pix2pix::{ExportRequest, ExportedGenerator};

/// Run an exported pix2pix generator on one image
#[derive(Parser)]
#[command(name = "pix2pix_infer")]
#[command(about = "Translate a base64 image with an exported pix2pix generator")]
struct Args {
    /// Directory holding export.json and export.ot
    #[arg(short, long)]
    export_dir: PathBuf,

    /// Request JSON file
    #[arg(short, long)]
    request: Option<PathBuf>,

    /// Use GPU if available
    #[arg(long)]
    gpu: bool,
}

fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only the response
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let device = if args.gpu && tch::Cuda::is_available() {
        info!("Using CUDA GPU");
        tch::Device::Cuda(0)
    } else {
        tch::Device::Cpu
    };

    let content = match &args.request {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading request {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    let request: ExportRequest = serde_json::from_str(&content).context("parsing request")?;

    let generator = ExportedGenerator::load(&args.export_dir, device)?;
    info!(
        "Loaded generator exported at step {}",
        generator.manifest().global_step
    );

    let response = generator.run(&request)?;
    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}
