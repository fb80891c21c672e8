//! Training module for pix2pix
//!
//! This module provides:
//! - Training loop implementation
//! - Adversarial and L1 loss functions
//! - Loss tracking and the JSONL summary log

mod losses;
mod metrics;
mod summary;
mod trainer;

pub use losses::{discriminator_loss, generator_gan_loss, l1_loss, GeneratorLoss, LossWeights, EPS};
pub use metrics::{EMATracker, MetricsLog, StepLosses, TrainingMetrics};
pub use summary::{SummaryRecord, SummaryWriter, TensorStats, SUMMARY_FILE};
pub use trainer::{train_step, StepOutput, Trainer, TrainingConfig, METRICS_FILE};
