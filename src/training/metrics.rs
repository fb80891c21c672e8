//! Training metrics for monitoring pix2pix progress
//!
//! Provides structures for tracking and logging training progress.

use std::fs::{File, OpenOptions};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Smoothing factor of the reported losses (decay 0.99)
pub const LOSS_EMA_ALPHA: f64 = 0.01;

/// Loss values of a single train step
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StepLosses {
    pub discrim_loss: f64,
    pub gen_loss_gan: f64,
    pub gen_loss_l1: f64,
}

/// One row of `training_metrics.csv`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct MetricsRecord {
    step: i64,
    discrim_loss: f64,
    gen_loss_gan: f64,
    gen_loss_l1: f64,
}

/// Moving averages of the losses during training
///
/// Raw per-step values are not kept in memory; they stream into a
/// [`MetricsLog`].
#[derive(Debug)]
pub struct TrainingMetrics {
    num_steps: usize,
    latest: Option<StepLosses>,
    discrim: EMATracker,
    gen_gan: EMATracker,
    gen_l1: EMATracker,
}

impl Default for TrainingMetrics {
    fn default() -> Self {
        Self {
            num_steps: 0,
            latest: None,
            discrim: EMATracker::new(LOSS_EMA_ALPHA),
            gen_gan: EMATracker::new(LOSS_EMA_ALPHA),
            gen_l1: EMATracker::new(LOSS_EMA_ALPHA),
        }
    }
}

impl TrainingMetrics {
    /// Create new empty metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue from the smoothed losses of a restored checkpoint
    pub fn resume(smoothed: StepLosses) -> Self {
        Self {
            discrim: EMATracker::starting_at(LOSS_EMA_ALPHA, smoothed.discrim_loss),
            gen_gan: EMATracker::starting_at(LOSS_EMA_ALPHA, smoothed.gen_loss_gan),
            gen_l1: EMATracker::starting_at(LOSS_EMA_ALPHA, smoothed.gen_loss_l1),
            ..Self::default()
        }
    }

    /// Record the losses of one step and fold them into the moving averages
    pub fn record_step(&mut self, losses: StepLosses) {
        self.num_steps += 1;
        self.latest = Some(losses);
        self.discrim.update(losses.discrim_loss);
        self.gen_gan.update(losses.gen_loss_gan);
        self.gen_l1.update(losses.gen_loss_l1);
    }

    /// Get number of steps recorded by this run
    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    /// Get latest raw losses
    pub fn latest(&self) -> Option<StepLosses> {
        self.latest
    }

    /// Exponential moving averages of the three losses
    pub fn smoothed(&self) -> StepLosses {
        StepLosses {
            discrim_loss: self.discrim.value(),
            gen_loss_gan: self.gen_gan.value(),
            gen_loss_l1: self.gen_l1.value(),
        }
    }
}

/// Per-step raw losses appended to `training_metrics.csv`
///
/// An existing file is extended, so a resumed run continues the same log.
pub struct MetricsLog {
    writer: csv::Writer<File>,
}

impl MetricsLog {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let is_new = file.metadata()?.len() == 0;
        let writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);
        Ok(Self { writer })
    }

    pub fn append(&mut self, step: i64, losses: StepLosses) -> Result<()> {
        self.writer.serialize(MetricsRecord {
            step,
            discrim_loss: losses.discrim_loss,
            gen_loss_gan: losses.gen_loss_gan,
            gen_loss_l1: losses.gen_loss_l1,
        })?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Exponential moving average tracker
#[derive(Debug)]
pub struct EMATracker {
    value: f64,
    alpha: f64,
    initialized: bool,
}

impl EMATracker {
    /// Create new EMA tracker
    ///
    /// # Arguments
    ///
    /// * `alpha` - Smoothing factor (0 < alpha <= 1). Higher = more weight on recent
    pub fn new(alpha: f64) -> Self {
        Self {
            value: 0.0,
            alpha: alpha.clamp(0.001, 1.0),
            initialized: false,
        }
    }

    /// Tracker that already holds `value`
    pub fn starting_at(alpha: f64, value: f64) -> Self {
        Self {
            value,
            initialized: true,
            ..Self::new(alpha)
        }
    }

    /// Update with new value
    pub fn update(&mut self, new_value: f64) {
        if !self.initialized {
            self.value = new_value;
            self.initialized = true;
        } else {
            self.value = self.alpha * new_value + (1.0 - self.alpha) * self.value;
        }
    }

    /// Get current EMA value
    pub fn value(&self) -> f64 {
        self.value
    }
}
