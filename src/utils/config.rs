//! Run configuration
//!
//! `Options` is both the clap argument group shared by every mode and the
//! serde document persisted as `options.json` next to the checkpoints.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::data::CROP_SIZE;
use crate::error::{Pix2PixError, Result};

/// Name of the hyperparameter sidecar written into every output directory
pub const OPTIONS_FILE: &str = "options.json";

/// Keys restored from a checkpoint's options when testing or exporting
const ARCHITECTURE_KEYS: [&str; 5] = [
    "which_direction",
    "ngf",
    "ndf",
    "lab_colorization",
    "separable_conv",
];

/// Driver state, selected once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Train,
    Test,
    Export,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Train => "train",
            Mode::Test => "test",
            Mode::Export => "export",
        }
    }
}

/// Which half of a paired image is the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
pub enum Direction {
    #[default]
    #[value(name = "AtoB")]
    AtoB,
    #[value(name = "BtoA")]
    BtoA,
}

/// Encoding of exported output images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFiletype {
    #[default]
    Png,
    Jpeg,
}

impl FromStr for OutputFiletype {
    type Err = Pix2PixError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "png" => Ok(OutputFiletype::Png),
            "jpeg" => Ok(OutputFiletype::Jpeg),
            other => Err(Pix2PixError::InvalidFiletype(other.to_string())),
        }
    }
}

impl fmt::Display for OutputFiletype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFiletype::Png => write!(f, "png"),
            OutputFiletype::Jpeg => write!(f, "jpeg"),
        }
    }
}

/// All options of a run
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct Options {
    /// Path to folder containing images
    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    /// Where to put output files
    #[arg(long)]
    pub output_dir: PathBuf,

    /// Random seed (drawn at random when omitted)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Directory with checkpoint to resume training from or use for testing
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,

    /// Number of training steps (0 to disable)
    #[arg(long)]
    pub max_steps: Option<u64>,

    /// Number of training epochs
    #[arg(long)]
    pub max_epochs: Option<u64>,

    /// Update summaries every summary_freq steps
    #[arg(long, default_value_t = 100)]
    pub summary_freq: u64,

    /// Display progress every progress_freq steps
    #[arg(long, default_value_t = 50)]
    pub progress_freq: u64,

    /// Trace execution every trace_freq steps
    #[arg(long, default_value_t = 0)]
    pub trace_freq: u64,

    /// Write current training images every display_freq steps
    #[arg(long, default_value_t = 0)]
    pub display_freq: u64,

    /// Save model every save_freq steps, 0 to disable
    #[arg(long, default_value_t = 500)]
    pub save_freq: u64,

    /// Use separable convolutions in the generator
    #[arg(long)]
    pub separable_conv: bool,

    /// Aspect ratio of output images (width/height)
    #[arg(long, default_value_t = 1.0)]
    pub aspect_ratio: f64,

    /// Split input image into brightness (A) and color (B)
    #[arg(long)]
    pub lab_colorization: bool,

    /// Number of images in batch
    #[arg(long, default_value_t = 1)]
    pub batch_size: usize,

    #[arg(long, value_enum, default_value_t = Direction::AtoB)]
    pub which_direction: Direction,

    /// Number of generator filters in first conv layer
    #[arg(long, default_value_t = 64)]
    pub ngf: i64,

    /// Number of discriminator filters in first conv layer
    #[arg(long, default_value_t = 64)]
    pub ndf: i64,

    /// Scale images to this size before cropping to 256x256
    #[arg(long, default_value_t = 286)]
    pub scale_size: u32,

    /// Don't flip images horizontally
    #[arg(long = "no-flip", action = clap::ArgAction::SetFalse)]
    pub flip: bool,

    /// Initial learning rate for adam
    #[arg(long, default_value_t = 0.0002)]
    pub lr: f64,

    /// Momentum term of adam
    #[arg(long, default_value_t = 0.5)]
    pub beta1: f64,

    /// Weight on L1 term for generator gradient
    #[arg(long, default_value_t = 100.0)]
    pub l1_weight: f64,

    /// Weight on GAN term for generator gradient
    #[arg(long, default_value_t = 1.0)]
    pub gan_weight: f64,

    /// Export output format
    #[arg(long, value_enum, default_value_t = OutputFiletype::Png)]
    pub output_filetype: OutputFiletype,

    /// Device: "cpu" or "cuda"
    #[arg(long, default_value = "cpu")]
    pub device: String,

    #[arg(skip)]
    #[serde(default)]
    pub mode: Mode,
}

impl Options {
    /// Options with every default, writing to `output_dir`
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: None,
            output_dir: output_dir.into(),
            seed: None,
            checkpoint: None,
            max_steps: None,
            max_epochs: None,
            summary_freq: 100,
            progress_freq: 50,
            trace_freq: 0,
            display_freq: 0,
            save_freq: 500,
            separable_conv: false,
            aspect_ratio: 1.0,
            lab_colorization: false,
            batch_size: 1,
            which_direction: Direction::AtoB,
            ngf: 64,
            ndf: 64,
            scale_size: 286,
            flip: true,
            lr: 0.0002,
            beta1: 0.5,
            l1_weight: 100.0,
            gan_weight: 1.0,
            output_filetype: OutputFiletype::Png,
            device: "cpu".to_string(),
            mode: Mode::Train,
        }
    }

    /// Apply mode-specific rules before a run starts
    ///
    /// Test and export require a checkpoint, take the architecture
    /// hyperparameters recorded at training time and disable augmentation.
    pub fn resolve(&mut self, mode: Mode) -> Result<()> {
        self.mode = mode;

        if matches!(mode, Mode::Test | Mode::Export) {
            let checkpoint = self
                .checkpoint
                .clone()
                .ok_or(Pix2PixError::CheckpointRequired(mode.as_str()))?;
            self.merge_checkpoint_options(&checkpoint)?;

            self.scale_size = CROP_SIZE;
            self.flip = false;
        }

        if mode == Mode::Export && self.lab_colorization {
            return Err(Pix2PixError::ExportLabColorization);
        }

        self.validate()
    }

    /// Overwrite the architecture keys with the values stored in
    /// `<checkpoint>/options.json`
    ///
    /// A `model-<step>` directory reads the options of its run directory.
    pub fn merge_checkpoint_options(&mut self, checkpoint: &Path) -> Result<()> {
        let mut path = checkpoint.join(OPTIONS_FILE);
        if !path.is_file() {
            if let Some(run_dir) = checkpoint.parent() {
                path = run_dir.join(OPTIONS_FILE);
            }
        }
        let content = std::fs::read_to_string(path)?;
        let stored: serde_json::Value = serde_json::from_str(&content)?;

        let mut current = serde_json::to_value(&*self)?;
        for key in ARCHITECTURE_KEYS {
            if let Some(value) = stored.get(key) {
                info!("loaded {} = {}", key, value);
                current[key] = value.clone();
            }
        }

        *self = serde_json::from_value(current)?;
        Ok(())
    }

    /// Fix the seed, drawing one when none was given
    pub fn ensure_seed(&mut self) -> u64 {
        *self.seed.get_or_insert_with(|| rand::random::<u64>() & 0x7fff_ffff)
    }

    /// Number of steps to train for
    ///
    /// `max_steps` wins over `max_epochs`; with neither the budget is 2^32.
    pub fn max_steps(&self, steps_per_epoch: u64) -> u64 {
        let mut max_steps = 1u64 << 32;
        if let Some(epochs) = self.max_epochs {
            max_steps = steps_per_epoch * epochs;
        }
        if let Some(steps) = self.max_steps {
            max_steps = steps;
        }
        max_steps
    }

    /// Get device from configuration
    pub fn get_device(&self) -> tch::Device {
        match self.device.to_lowercase().as_str() {
            "cuda" | "gpu" => {
                if tch::Cuda::is_available() {
                    tch::Device::Cuda(0)
                } else {
                    warn!("CUDA requested but not available, falling back to CPU");
                    tch::Device::Cpu
                }
            }
            _ => tch::Device::Cpu,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Pix2PixError::Config("batch_size must be > 0".into()));
        }
        if self.ngf <= 0 || self.ndf <= 0 {
            return Err(Pix2PixError::Config("ngf and ndf must be > 0".into()));
        }
        if !(self.aspect_ratio.is_finite() && self.aspect_ratio > 0.0) {
            return Err(Pix2PixError::Config(format!(
                "aspect_ratio must be positive, got {}",
                self.aspect_ratio
            )));
        }
        if self.scale_size < CROP_SIZE {
            return Err(Pix2PixError::ScaleTooSmall {
                scale_size: self.scale_size,
                crop_size: CROP_SIZE,
            });
        }
        Ok(())
    }

    /// Save as pretty JSON to `<dir>/options.json`
    pub fn save_json(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(OPTIONS_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    /// Log every option, one per line
    pub fn log(&self) {
        if let Ok(serde_json::Value::Object(map)) = serde_json::to_value(self) {
            for (key, value) in map {
                info!("{} = {}", key, value);
            }
        }
    }
}
