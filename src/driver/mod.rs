//! Mode driver
//!
//! Runs one of the three mutually exclusive modes selected at startup:
//! training, testing a checkpoint on a dataset, or exporting its generator.

pub mod export;
pub mod index;
mod test;

use std::path::Path;

use tracing::info;

use crate::data::{list_image_files, DataLoader, PairReader};
use crate::error::{Pix2PixError, Result};
use crate::model::Pix2Pix;
use crate::training::{Trainer, TrainingConfig};
use crate::utils::{load_checkpoint, Mode, Options};

pub use export::{export_generator, ExportManifest, ExportRequest, ExportResponse, ExportedGenerator};
pub use test::run_test;

/// Run the mode recorded in `options`
///
/// `options` must already be resolved for that mode.
pub fn run(options: &Options) -> Result<()> {
    match options.mode {
        Mode::Train => run_train(options),
        Mode::Test => run_test(options).map(|_| ()),
        Mode::Export => export_generator(options).map(|_| ()),
    }
}

/// Train a new model, or resume the one in `--checkpoint`
pub fn run_train(options: &Options) -> Result<()> {
    let input_dir = required_input_dir(options)?;
    let files = list_image_files(input_dir)?;
    let reader = PairReader::new(options)?;
    let seed = options.seed.unwrap_or_default();
    let mut data_loader = DataLoader::new(files, reader, options.batch_size, true, seed);
    let steps_per_epoch = data_loader.num_batches() as u64;

    let device = options.get_device();
    let mut model = Pix2Pix::from_options(options, device)?;
    info!("parameter_count = {}", model.parameter_count());
    info!("Data count = {}", data_loader.num_samples());

    let mut trainer = Trainer::new(TrainingConfig::from_options(options, steps_per_epoch));
    if let Some(checkpoint) = &options.checkpoint {
        info!("loading model from checkpoint");
        let meta = load_checkpoint(&mut model, checkpoint)?;
        trainer = trainer.with_smoothed_losses(meta.losses);
    }

    let metrics = trainer.train(&mut model, &mut data_loader)?;
    info!(
        "Finished at step {} after {} steps",
        model.global_step(),
        metrics.num_steps()
    );
    Ok(())
}

fn required_input_dir(options: &Options) -> Result<&Path> {
    options.input_dir.as_deref().ok_or_else(|| {
        Pix2PixError::Config(format!("--input-dir is required for {} mode", options.mode.as_str()))
    })
}
