//! Summary log for training runs
//!
//! Each summary is one JSON object per line in `<output_dir>/summaries.jsonl`
//! holding scalar losses, statistics of every parameter and its gradient,
//! and optionally the per-phase timings of the step.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tch::{nn::VarStore, Kind, Tensor};

use crate::error::Result;

pub const SUMMARY_FILE: &str = "summaries.jsonl";

/// Distribution summary of a tensor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TensorStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub numel: usize,
}

impl TensorStats {
    pub fn of(tensor: &Tensor) -> Self {
        let values = tensor.detach().to_kind(Kind::Float);
        Self {
            mean: values.mean(Kind::Float).double_value(&[]),
            std: values.std(false).double_value(&[]),
            min: values.min().double_value(&[]),
            max: values.max().double_value(&[]),
            numel: values.numel(),
        }
    }
}

/// One line of the summary log
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub step: i64,
    pub timestamp: String,
    pub scalars: BTreeMap<String, f64>,
    pub histograms: BTreeMap<String, TensorStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<BTreeMap<String, f64>>,
}

impl SummaryRecord {
    pub fn new(step: i64) -> Self {
        Self {
            step,
            timestamp: chrono::Utc::now().to_rfc3339(),
            ..Default::default()
        }
    }

    pub fn scalar(&mut self, name: &str, value: f64) -> &mut Self {
        self.scalars.insert(name.to_string(), value);
        self
    }

    /// Add `values` and, when present, `gradients` statistics for every
    /// trainable variable of `vs` under `<prefix>/<name>`
    pub fn variables(&mut self, prefix: &str, vs: &VarStore) -> &mut Self {
        for (name, tensor) in vs.variables() {
            // batch norm running statistics
            if !tensor.requires_grad() {
                continue;
            }
            self.histograms
                .insert(format!("{prefix}/{name}/values"), TensorStats::of(&tensor));

            let grad = tensor.grad();
            if grad.defined() {
                self.histograms
                    .insert(format!("{prefix}/{name}/gradients"), TensorStats::of(&grad));
            }
        }
        self
    }

    /// Attach phase timings in seconds
    pub fn trace(&mut self, phases: &[(&str, f64)]) -> &mut Self {
        let trace = phases
            .iter()
            .map(|(phase, secs)| (phase.to_string(), *secs))
            .collect();
        self.trace = Some(trace);
        self
    }
}

/// Appends summary records to the run's JSONL log
#[derive(Debug, Clone)]
pub struct SummaryWriter {
    path: PathBuf,
}

impl SummaryWriter {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            path: output_dir.join(SUMMARY_FILE),
        }
    }

    pub fn write(&self, record: &SummaryRecord) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, record)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Read back every record written so far
    pub fn read_all(&self) -> Result<Vec<SummaryRecord>> {
        let content = std::fs::read_to_string(&self.path)?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| Ok(serde_json::from_str(line)?))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{nn, Device};
    use tempfile::tempdir;

    #[test]
    fn test_tensor_stats() {
        let stats = TensorStats::of(&Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0]));
        assert_eq!(stats.mean, 2.5);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
        assert_eq!(stats.numel, 4);
        assert!((stats.std - 1.25f64.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_variables_include_gradients_after_backward() {
        let vs = VarStore::new(Device::Cpu);
        let linear = nn::linear(vs.root() / "fc", 2, 1, Default::default());
        let xs = Tensor::ones([3, 2], (Kind::Float, Device::Cpu));

        let mut record = SummaryRecord::new(1);
        record.variables("model", &vs);
        assert!(record.histograms.contains_key("model/fc.weight/values"));
        assert!(!record.histograms.contains_key("model/fc.weight/gradients"));

        nn::Module::forward(&linear, &xs).sum(Kind::Float).backward();
        let mut record = SummaryRecord::new(1);
        record.variables("model", &vs);
        assert!(record.histograms.contains_key("model/fc.weight/gradients"));
    }

    #[test]
    fn test_writer_appends_lines() {
        let dir = tempdir().unwrap();
        let writer = SummaryWriter::new(dir.path());

        let mut first = SummaryRecord::new(100);
        first.scalar("discriminator_loss", 1.2);
        writer.write(&first).unwrap();

        let mut second = SummaryRecord::new(200);
        second
            .scalar("generator_loss_L1", 0.3)
            .trace(&[("discriminator_update", 0.01)]);
        writer.write(&second).unwrap();

        let records = writer.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].step, 100);
        assert!(records[0].trace.is_none());
        assert_eq!(records[1].scalars["generator_loss_L1"], 0.3);
        assert!(records[1].trace.as_ref().unwrap().contains_key("discriminator_update"));
    }
}
