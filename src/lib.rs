//! # pix2pix image-to-image translation
//!
//! This crate provides a conditional adversarial network that learns to
//! translate one image domain into another from paired examples, and a
//! standalone runner for exported generators.
//!
//! ## Modules
//!
//! - `data`: Paired image loading, augmentation and encoding
//! - `model`: U-Net generator and PatchGAN discriminator
//! - `training`: Training loop, losses and summaries
//! - `driver`: Train, test and export modes
//! - `utils`: Run options and checkpoints

pub mod data;
pub mod driver;
pub mod error;
pub mod model;
pub mod training;
pub mod utils;

pub use data::{DataLoader, ImageBatch, ImagePair, PairReader, CROP_SIZE};
pub use driver::{ExportRequest, ExportResponse, ExportedGenerator};
pub use error::{Pix2PixError, Result};
pub use model::{Discriminator, Generator, Pix2Pix};
pub use training::{Trainer, TrainingConfig, TrainingMetrics};
pub use utils::{load_checkpoint, save_checkpoint, Mode, Options};
