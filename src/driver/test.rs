//! Test mode: translate every input file once with a trained model

use std::path::{Path, PathBuf};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Axis;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use super::index::{self, IndexRow};
use crate::data::{list_image_files, tensor_to_array, ImageBatch, PairReader};
use crate::error::{Pix2PixError, Result};
use crate::model::Pix2Pix;
use crate::utils::{load_checkpoint, Mode, Options};

/// Write `<name>-outputs.png` for each input file and index it
///
/// # Returns
///
/// Paths of the written output images, in input order
pub fn run_test(options: &Options) -> Result<Vec<PathBuf>> {
    let input_dir = super::required_input_dir(options)?;
    let checkpoint = options
        .checkpoint
        .as_deref()
        .ok_or(Pix2PixError::CheckpointRequired(Mode::Test.as_str()))?;

    let files = list_image_files(input_dir)?;
    let device = options.get_device();
    let mut model = Pix2Pix::from_options(options, device)?;
    info!("parameter_count = {}", model.parameter_count());
    info!("Data count = {}", files.len());

    info!("loading model from checkpoint");
    load_checkpoint(&mut model, checkpoint)?;

    let reader = PairReader::new(options)?;
    let mut rng = StdRng::seed_from_u64(options.seed.unwrap_or_default());

    let pb = ProgressBar::new(files.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("{bar:40.green/blue} {pos}/{len} {msg}") {
        pb.set_style(style);
    }

    let start = Instant::now();
    let mut written = Vec::with_capacity(files.len());
    for path in &files {
        let pair = reader.read(path, &mut rng)?;
        let batch = ImageBatch::from_pairs(vec![path.clone()], std::slice::from_ref(&pair))?;
        let (source, _) = batch.to_tensors(device);

        let outputs = tensor_to_array(&model.generate(&source))?;
        let image = reader.render_output(outputs.index_axis(Axis(0), 0), pair.source.view());

        let name = index::image_name(path);
        let filename = index::image_filename(&name, "outputs", None);
        written.push(index::save_image(&options.output_dir, &filename, &image)?);
        info!("evaluated image {}", name);

        let index_path = index::append_index(
            &options.output_dir,
            &[IndexRow {
                step: None,
                name,
                output: filename,
                input: input_src(path),
            }],
            false,
        )?;
        info!("wrote index at {}", index_path.display());
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!("time: {:.3}s", start.elapsed().as_secs_f64());
    Ok(written)
}

/// The index sits in the output directory; inputs are linked one level up
fn input_src(path: &Path) -> String {
    format!("../{}", path.display())
}
