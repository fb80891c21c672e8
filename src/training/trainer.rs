//! Training loop implementation for pix2pix
//!
//! Provides the step loop with one discriminator update followed by one
//! generator update per batch, plus the periodic side effects: progress
//! logging, summaries, display images and checkpoints.

use std::path::PathBuf;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use tch::{nn, Tensor};
use tracing::{info, warn};

use super::losses::{discriminator_loss, GeneratorLoss, LossWeights};
use super::metrics::{MetricsLog, StepLosses, TrainingMetrics};
use super::summary::{SummaryRecord, SummaryWriter};
use crate::data::{tensor_to_array, DataLoader, ImageBatch};
use crate::driver::index::{self, IndexRow, IMAGE_DIR};
use crate::error::Result;
use crate::model::Pix2Pix;
use crate::utils::{save_checkpoint, Options};

pub const METRICS_FILE: &str = "training_metrics.csv";

/// Training configuration
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    /// Number of steps to run
    pub max_steps: u64,
    /// Steps in one pass over the dataset
    pub steps_per_epoch: u64,
    pub batch_size: usize,
    /// Adam learning rate of both networks
    pub lr: f64,
    /// Adam momentum term of both networks
    pub beta1: f64,
    pub weights: LossWeights,
    pub summary_freq: u64,
    pub progress_freq: u64,
    pub trace_freq: u64,
    pub display_freq: u64,
    pub save_freq: u64,
    /// Run directory for checkpoints, summaries and images
    pub output_dir: PathBuf,
}

impl TrainingConfig {
    pub fn from_options(options: &Options, steps_per_epoch: u64) -> Self {
        Self {
            max_steps: options.max_steps(steps_per_epoch),
            steps_per_epoch: steps_per_epoch.max(1),
            batch_size: options.batch_size,
            lr: options.lr,
            beta1: options.beta1,
            weights: LossWeights {
                gan: options.gan_weight,
                l1: options.l1_weight,
            },
            summary_freq: options.summary_freq,
            progress_freq: options.progress_freq,
            trace_freq: options.trace_freq,
            display_freq: options.display_freq,
            save_freq: options.save_freq,
            output_dir: options.output_dir.clone(),
        }
    }

    /// Whether a side effect with period `freq` fires on loop step `step`
    ///
    /// Every enabled side effect also fires on the final step.
    pub fn should(&self, freq: u64, step: u64) -> bool {
        freq > 0 && ((step + 1) % freq == 0 || step + 1 == self.max_steps)
    }

    /// (epoch, step within epoch), both 1-based, for a global step
    pub fn epoch_position(&self, global_step: i64) -> (u64, u64) {
        let global_step = global_step.max(1) as u64;
        let epoch = global_step.div_ceil(self.steps_per_epoch);
        let step = (global_step - 1) % self.steps_per_epoch + 1;
        (epoch, step)
    }
}

/// Wall time of each phase of a train step, in seconds
#[derive(Debug, Clone, Copy, Default)]
pub struct StepTiming {
    pub generator_forward: f64,
    pub discriminator_update: f64,
    pub generator_update: f64,
}

/// Result of one train step
pub struct StepOutput {
    pub losses: StepLosses,
    /// Generator outputs for the batch, detached
    pub outputs: Tensor,
    pub timing: StepTiming,
}

/// pix2pix Trainer
pub struct Trainer {
    config: TrainingConfig,
    metrics: TrainingMetrics,
    summaries: SummaryWriter,
}

impl Trainer {
    /// Create a new trainer
    pub fn new(config: TrainingConfig) -> Self {
        let summaries = SummaryWriter::new(&config.output_dir);
        Self {
            config,
            metrics: TrainingMetrics::new(),
            summaries,
        }
    }

    /// Continue the reported moving averages from a restored checkpoint
    pub fn with_smoothed_losses(mut self, losses: StepLosses) -> Self {
        self.metrics = TrainingMetrics::resume(losses);
        self
    }

    /// Train the model for `max_steps` steps
    ///
    /// # Arguments
    ///
    /// * `model` - Model to train, possibly restored from a checkpoint
    /// * `data_loader` - DataLoader providing training batches
    ///
    /// # Returns
    ///
    /// Training metrics
    pub fn train(
        &mut self,
        model: &mut Pix2Pix,
        data_loader: &mut DataLoader,
    ) -> Result<&TrainingMetrics> {
        let mut gen_opt = model.gen_optimizer(self.config.lr, self.config.beta1)?;
        let mut disc_opt = model.disc_optimizer(self.config.lr, self.config.beta1)?;

        let max_steps = self.config.max_steps;
        info!(
            "Starting training for {} steps, {} steps per epoch",
            max_steps, self.config.steps_per_epoch
        );
        std::fs::create_dir_all(&self.config.output_dir)?;
        let mut metrics_log = MetricsLog::open(&self.config.output_dir.join(METRICS_FILE))?;

        let pb = ProgressBar::new(max_steps);
        if let Ok(style) =
            ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("##-"));
        }

        let start = Instant::now();
        for step in 0..max_steps {
            let Some(batch) = data_loader.next_batch()? else {
                warn!("Dataset is empty, stopping");
                break;
            };
            let (source, target) = batch.to_tensors(model.device);

            let output = train_step(
                model,
                &source,
                &target,
                &mut gen_opt,
                &mut disc_opt,
                self.config.weights,
            );
            let global_step = model.increment_global_step();
            self.metrics.record_step(output.losses);
            metrics_log.append(global_step, output.losses)?;

            if self.config.should(self.config.summary_freq, step) {
                info!("recording summary");
                metrics_log.flush()?;
                let mut record = self.summary(model, global_step);
                if self.config.should(self.config.trace_freq, step) {
                    info!("recording trace");
                    record.trace(&timing_phases(&output.timing));
                }
                self.summaries.write(&record)?;
            } else if self.config.should(self.config.trace_freq, step) {
                info!("recording trace");
                let mut record = SummaryRecord::new(global_step);
                record.trace(&timing_phases(&output.timing));
                self.summaries.write(&record)?;
            }

            if self.config.should(self.config.display_freq, step) {
                info!("saving display images");
                self.save_display(data_loader, &batch, &output.outputs, global_step)?;
            }

            if self.config.should(self.config.progress_freq, step) {
                let (epoch, epoch_step) = self.config.epoch_position(global_step);
                let elapsed = start.elapsed().as_secs_f64().max(f64::EPSILON);
                let rate = (step + 1) as f64 * self.config.batch_size as f64 / elapsed;
                let remaining = (max_steps - step) as f64 * self.config.batch_size as f64 / rate;
                let smoothed = self.metrics.smoothed();
                info!(
                    "progress  epoch {}  step {}  image/sec {:.1}  remaining {}m",
                    epoch,
                    epoch_step,
                    rate,
                    (remaining / 60.0) as u64
                );
                info!("discrim_loss {}", smoothed.discrim_loss);
                info!("gen_loss_GAN {}", smoothed.gen_loss_gan);
                info!("gen_loss_L1 {}", smoothed.gen_loss_l1);
            }

            if self.config.should(self.config.save_freq, step) {
                info!("saving model");
                metrics_log.flush()?;
                save_checkpoint(model, self.metrics.smoothed(), &self.config.output_dir)?;
            }

            let smoothed = self.metrics.smoothed();
            pb.set_message(format!(
                "D: {:.4}, G_GAN: {:.4}, G_L1: {:.4}",
                smoothed.discrim_loss, smoothed.gen_loss_gan, smoothed.gen_loss_l1
            ));
            pb.inc(1);
        }
        pb.finish_with_message("done");
        metrics_log.flush()?;

        Ok(&self.metrics)
    }

    fn summary(&self, model: &Pix2Pix, global_step: i64) -> SummaryRecord {
        let smoothed = self.metrics.smoothed();
        let mut record = SummaryRecord::new(global_step);
        record
            .scalar("discriminator_loss", smoothed.discrim_loss)
            .scalar("generator_loss_GAN", smoothed.gen_loss_gan)
            .scalar("generator_loss_L1", smoothed.gen_loss_l1)
            .variables("generator", &model.gen_vs)
            .variables("discriminator", &model.disc_vs);
        record
    }

    /// Save inputs, outputs and targets of the batch and index them
    fn save_display(
        &self,
        data_loader: &DataLoader,
        batch: &ImageBatch,
        outputs: &Tensor,
        global_step: i64,
    ) -> Result<()> {
        let reader = data_loader.reader();
        let outputs = tensor_to_array(outputs)?;
        let output_dir = &self.config.output_dir;

        let mut rows = Vec::with_capacity(batch.len());
        for (i, path) in batch.paths.iter().enumerate() {
            let name = index::image_name(path);
            let source = batch.source(i);
            let output = outputs.index_axis(ndarray::Axis(0), i);

            let images = [
                ("inputs", reader.render_input(source.view())),
                ("outputs", reader.render_output(output, source.view())),
                ("targets", reader.render_target(batch.target(i).view())),
            ];
            for (kind, image) in &images {
                let filename = index::image_filename(&name, kind, Some(global_step));
                index::save_image(output_dir, &filename, image)?;
            }

            rows.push(IndexRow {
                step: Some(global_step),
                output: index::image_filename(&name, "outputs", Some(global_step)),
                input: format!(
                    "{IMAGE_DIR}/{}",
                    index::image_filename(&name, "inputs", Some(global_step))
                ),
                name,
            });
        }

        index::append_index(output_dir, &rows, true)?;
        Ok(())
    }
}

fn timing_phases(timing: &StepTiming) -> [(&'static str, f64); 3] {
    [
        ("generator_forward", timing.generator_forward),
        ("discriminator_update", timing.discriminator_update),
        ("generator_update", timing.generator_update),
    ]
}

/// Single training step
///
/// The discriminator is updated first on the real pair and the detached
/// fake; the generator update then scores the fake again with the updated
/// discriminator so its gradient flows back into the generator.
pub fn train_step(
    model: &mut Pix2Pix,
    source: &Tensor,
    target: &Tensor,
    gen_opt: &mut nn::Optimizer,
    disc_opt: &mut nn::Optimizer,
    weights: LossWeights,
) -> StepOutput {
    let mut timing = StepTiming::default();

    let started = Instant::now();
    let outputs = model.generator.forward_t(source, true);
    timing.generator_forward = started.elapsed().as_secs_f64();

    let started = Instant::now();
    let d_loss = update_discriminator(model, source, target, &outputs, disc_opt);
    timing.discriminator_update = started.elapsed().as_secs_f64();

    let started = Instant::now();
    let g_loss = update_generator(model, source, target, &outputs, gen_opt, weights);
    timing.generator_update = started.elapsed().as_secs_f64();

    StepOutput {
        losses: StepLosses {
            discrim_loss: d_loss.double_value(&[]),
            gen_loss_gan: g_loss.gan.double_value(&[]),
            gen_loss_l1: g_loss.l1.double_value(&[]),
        },
        outputs: outputs.detach(),
        timing,
    }
}

fn update_discriminator(
    model: &Pix2Pix,
    source: &Tensor,
    target: &Tensor,
    outputs: &Tensor,
    disc_opt: &mut nn::Optimizer,
) -> Tensor {
    let predict_real = model.discriminator.score(source, target, true);
    let predict_fake = model.discriminator.score(source, &outputs.detach(), true);
    let d_loss = discriminator_loss(&predict_real, &predict_fake);

    disc_opt.zero_grad();
    d_loss.backward();
    disc_opt.step();
    d_loss
}

/// Generator update through a fresh discriminator pass
///
/// The discriminator is frozen for the pass, so its gradients still hold
/// those of the discriminator loss afterwards.
fn update_generator(
    model: &mut Pix2Pix,
    source: &Tensor,
    target: &Tensor,
    outputs: &Tensor,
    gen_opt: &mut nn::Optimizer,
    weights: LossWeights,
) -> GeneratorLoss {
    model.disc_vs.freeze();
    let predict_fake = model.discriminator.score(source, outputs, true);
    let g_loss = GeneratorLoss::compute(&predict_fake, target, outputs, weights);

    gen_opt.zero_grad();
    g_loss.total.backward();
    gen_opt.step();
    model.disc_vs.unfreeze();
    g_loss
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DiscriminatorConfig, GeneratorConfig};
    use tch::{Device, Kind};

    fn config(max_steps: u64, steps_per_epoch: u64) -> TrainingConfig {
        let mut options = Options::new("out");
        options.max_steps = Some(max_steps);
        TrainingConfig::from_options(&options, steps_per_epoch)
    }

    #[test]
    fn test_training_config_from_options() {
        let config = config(10, 4);
        assert_eq!(config.max_steps, 10);
        assert_eq!(config.weights.l1, 100.0);
        assert_eq!(config.beta1, 0.5);
    }

    #[test]
    fn test_should_fires_on_period_and_last_step() {
        let config = config(10, 4);
        let fired: Vec<u64> = (0..10).filter(|&s| config.should(4, s)).collect();
        assert_eq!(fired, vec![3, 7, 9]);
        assert!(!(0..10).any(|s| config.should(0, s)));
    }

    #[test]
    fn test_epoch_position() {
        let config = config(10, 4);
        assert_eq!(config.epoch_position(1), (1, 1));
        assert_eq!(config.epoch_position(4), (1, 4));
        assert_eq!(config.epoch_position(5), (2, 1));
    }

    fn tiny_model() -> Pix2Pix {
        let gen_config = GeneratorConfig {
            ngf: 2,
            image_size: 32,
            ..Default::default()
        };
        let disc_config = DiscriminatorConfig {
            ndf: 2,
            ..Default::default()
        };
        Pix2Pix::new(gen_config, disc_config, Device::Cpu).unwrap()
    }

    fn random_images() -> Tensor {
        Tensor::rand([2, 3, 32, 32], (Kind::Float, Device::Cpu)) * 2.0 - 1.0
    }

    fn snapshot(tensors: impl IntoIterator<Item = Tensor>) -> Vec<Tensor> {
        tensors.into_iter().map(|t| t.detach().copy()).collect()
    }

    fn max_abs_diff(before: &[Tensor], after: &[Tensor]) -> f64 {
        before
            .iter()
            .zip(after)
            .map(|(b, a)| (b - a).abs().max().double_value(&[]))
            .fold(0.0, f64::max)
    }

    #[test]
    fn test_train_step_updates_both_networks() {
        let mut model = tiny_model();
        let mut gen_opt = model.gen_optimizer(2e-4, 0.5).unwrap();
        let mut disc_opt = model.disc_optimizer(2e-4, 0.5).unwrap();

        let gen_before = snapshot(model.gen_vs.trainable_variables());
        let disc_before = snapshot(model.disc_vs.trainable_variables());

        let (source, target) = (random_images(), random_images());
        let output = train_step(
            &mut model,
            &source,
            &target,
            &mut gen_opt,
            &mut disc_opt,
            LossWeights::default(),
        );

        assert!(output.losses.discrim_loss.is_finite());
        assert!(output.losses.gen_loss_l1 > 0.0);
        assert_eq!(output.outputs.size(), vec![2, 3, 32, 32]);

        assert!(max_abs_diff(&gen_before, &model.gen_vs.trainable_variables()) > 0.0);
        assert!(max_abs_diff(&disc_before, &model.disc_vs.trainable_variables()) > 0.0);
    }

    #[test]
    fn test_generator_update_keeps_discriminator_gradients() {
        let mut model = tiny_model();
        let mut gen_opt = model.gen_optimizer(2e-4, 0.5).unwrap();
        let mut disc_opt = model.disc_optimizer(2e-4, 0.5).unwrap();
        let (source, target) = (random_images(), random_images());

        let outputs = model.generator.forward_t(&source, true);
        update_discriminator(&model, &source, &target, &outputs, &mut disc_opt);
        let grads = |vs: &nn::VarStore| snapshot(vs.trainable_variables().iter().map(|t| t.grad()));
        let disc_grads = grads(&model.disc_vs);

        update_generator(
            &mut model,
            &source,
            &target,
            &outputs,
            &mut gen_opt,
            LossWeights::default(),
        );

        assert_eq!(max_abs_diff(&disc_grads, &grads(&model.disc_vs)), 0.0);
        assert!(model
            .disc_vs
            .trainable_variables()
            .iter()
            .all(|t| t.requires_grad()));
        assert!(model
            .gen_vs
            .trainable_variables()
            .iter()
            .all(|t| t.grad().defined()));
    }

    #[test]
    fn test_resumed_trainer_reports_restored_losses() {
        let restored = StepLosses {
            discrim_loss: 1.3,
            gen_loss_gan: 0.9,
            gen_loss_l1: 0.2,
        };
        let trainer = Trainer::new(config(10, 4)).with_smoothed_losses(restored);
        assert_eq!(trainer.metrics.smoothed(), restored);
    }
}
