//! Generator export and standalone inference
//!
//! Export writes the generator parameters to `export.ot` next to an
//! `export.json` manifest. [`ExportedGenerator`] loads both and answers
//! requests carrying one base64-encoded image.

use std::path::{Path, PathBuf};

use base64::Engine as _;
use image::RgbImage;
use ndarray::Axis;
use serde::{Deserialize, Serialize};
use tch::{nn::VarStore, Device};
use tracing::info;

use crate::data::imaging::{
    array_to_image, decode_rgb, deprocess, encode_image, image_to_array, preprocess,
    WEB_SAFE_BASE64,
};
use crate::data::{array_to_tensor, tensor_to_array, CROP_SIZE};
use crate::error::{Pix2PixError, Result};
use crate::model::{configs_from_options, Generator, GeneratorConfig};
use crate::utils::checkpoint::{load_checkpoint_meta, resolve_checkpoint, GENERATOR_FILE};
use crate::utils::{Mode, Options, OutputFiletype};

pub const EXPORT_WEIGHTS: &str = "export.ot";
pub const EXPORT_MANIFEST: &str = "export.json";

/// Description of an exported generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportManifest {
    /// Request fields, in order
    pub inputs: Vec<String>,
    /// Response fields, in order
    pub outputs: Vec<String>,
    pub output_filetype: OutputFiletype,
    /// Side length of accepted input images
    pub image_size: u32,
    pub ngf: i64,
    pub separable_conv: bool,
    /// Train steps of the exported parameters
    pub global_step: i64,
    /// Parameter file, relative to the manifest
    pub weights: String,
}

impl ExportManifest {
    fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            ngf: self.ngf,
            image_size: self.image_size as i64,
            separable_conv: self.separable_conv,
            ..Default::default()
        }
    }
}

/// Inference request: one key and one web-safe base64 PNG or JPEG
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub key: Vec<String>,
    pub input: Vec<String>,
}

/// Inference response: the request key and the encoded output image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportResponse {
    pub key: Vec<String>,
    pub output: Vec<String>,
}

/// Restore the generator of a checkpoint and write it as an export
///
/// # Returns
///
/// Path of the written manifest
pub fn export_generator(options: &Options) -> Result<PathBuf> {
    if options.lab_colorization {
        return Err(Pix2PixError::ExportLabColorization);
    }
    let checkpoint = options
        .checkpoint
        .as_deref()
        .ok_or(Pix2PixError::CheckpointRequired(Mode::Export.as_str()))?;
    let checkpoint_dir = resolve_checkpoint(checkpoint)?;
    let meta = load_checkpoint_meta(&checkpoint_dir)?;

    let (gen_config, _) = configs_from_options(options);
    gen_config.validate()?;

    let mut vs = VarStore::new(Device::Cpu);
    Generator::new(&vs.root(), gen_config.clone());
    vs.load(checkpoint_dir.join(GENERATOR_FILE))?;

    std::fs::create_dir_all(&options.output_dir)?;
    vs.save(options.output_dir.join(EXPORT_WEIGHTS))?;

    let manifest = ExportManifest {
        inputs: vec!["key".into(), "input".into()],
        outputs: vec!["key".into(), "output".into()],
        output_filetype: options.output_filetype,
        image_size: gen_config.image_size as u32,
        ngf: gen_config.ngf,
        separable_conv: gen_config.separable_conv,
        global_step: meta.global_step,
        weights: EXPORT_WEIGHTS.to_string(),
    };
    let manifest_path = options.output_dir.join(EXPORT_MANIFEST);
    std::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)?;

    info!(
        "exported generator at step {} to {}",
        meta.global_step,
        options.output_dir.display()
    );
    Ok(manifest_path)
}

/// A generator loaded from an export directory
pub struct ExportedGenerator {
    manifest: ExportManifest,
    generator: Generator,
    // owns the generator's parameters
    _vs: VarStore,
    device: Device,
}

impl ExportedGenerator {
    pub fn load(export_dir: &Path, device: Device) -> Result<Self> {
        let content = std::fs::read_to_string(export_dir.join(EXPORT_MANIFEST))?;
        let manifest: ExportManifest = serde_json::from_str(&content)?;

        let config = manifest.generator_config();
        config.validate()?;
        let mut vs = VarStore::new(device);
        let generator = Generator::new(&vs.root(), config);
        vs.load(export_dir.join(&manifest.weights))?;

        Ok(Self {
            manifest,
            generator,
            _vs: vs,
            device,
        })
    }

    pub fn manifest(&self) -> &ExportManifest {
        &self.manifest
    }

    /// Answer a single-image request
    pub fn run(&self, request: &ExportRequest) -> Result<ExportResponse> {
        let (key, input) = match (request.key.as_slice(), request.input.as_slice()) {
            ([key], [input]) => (key, input),
            _ => {
                return Err(Pix2PixError::InvalidRequest(format!(
                    "expected exactly one key and one input, got {} and {}",
                    request.key.len(),
                    request.input.len()
                )))
            }
        };

        let bytes = WEB_SAFE_BASE64.decode(input.trim())?;
        let image = self.translate(&decode_rgb(&bytes)?)?;
        let encoded = encode_image(&image, self.manifest.output_filetype)?;

        Ok(ExportResponse {
            key: vec![key.clone()],
            output: vec![WEB_SAFE_BASE64.encode(encoded)],
        })
    }

    /// Translate one decoded image
    pub fn translate(&self, image: &RgbImage) -> Result<RgbImage> {
        let size = self.manifest.image_size;
        if image.dimensions() != (size, size) {
            let (width, height) = image.dimensions();
            return Err(Pix2PixError::InvalidRequest(format!(
                "image must be {size}x{size}, got {width}x{height}"
            )));
        }

        let source = preprocess(&image_to_array(image)).insert_axis(Axis(0));
        let input = array_to_tensor(&source).to_device(self.device);
        let output = tch::no_grad(|| self.generator.forward_t(&input, true));

        let output = tensor_to_array(&output)?;
        Ok(array_to_image(
            deprocess(output.index_axis(Axis(0), 0)).view(),
        ))
    }
}

impl Default for ExportManifest {
    fn default() -> Self {
        Self {
            inputs: vec!["key".into(), "input".into()],
            outputs: vec!["key".into(), "output".into()],
            output_filetype: OutputFiletype::Png,
            image_size: CROP_SIZE,
            ngf: 64,
            separable_conv: false,
            global_step: 0,
            weights: EXPORT_WEIGHTS.to_string(),
        }
    }
}
