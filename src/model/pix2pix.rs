//! Pix2Pix wrapper combining Generator and Discriminator
//!
//! Owns one variable store per network so that each optimizer only ever
//! sees its own parameters.

use std::path::Path;

use tch::{nn, nn::OptimizerConfig, nn::VarStore, Device, Tensor};

use super::discriminator::{Discriminator, DiscriminatorConfig};
use super::generator::{Generator, GeneratorConfig};
use crate::data::CROP_SIZE;
use crate::error::Result;
use crate::utils::Options;

/// Complete pix2pix model
pub struct Pix2Pix {
    /// Generator network
    pub generator: Generator,
    /// Discriminator network
    pub discriminator: Discriminator,
    /// Variable store for generator
    pub gen_vs: VarStore,
    /// Variable store for discriminator
    pub disc_vs: VarStore,
    /// Device (CPU/GPU)
    pub device: Device,
    /// Number of train steps applied so far
    global_step: i64,
}

impl Pix2Pix {
    /// Create a new pix2pix model
    pub fn new(
        gen_config: GeneratorConfig,
        disc_config: DiscriminatorConfig,
        device: Device,
    ) -> Result<Self> {
        gen_config.validate()?;

        let gen_vs = VarStore::new(device);
        let disc_vs = VarStore::new(device);

        let generator = Generator::new(&gen_vs.root(), gen_config);
        let discriminator = Discriminator::new(&disc_vs.root(), disc_config);

        Ok(Self {
            generator,
            discriminator,
            gen_vs,
            disc_vs,
            device,
            global_step: 0,
        })
    }

    /// Create the model described by run options
    pub fn from_options(options: &Options, device: Device) -> Result<Self> {
        let (gen_config, disc_config) = configs_from_options(options);
        Self::new(gen_config, disc_config, device)
    }

    /// Translate source images
    ///
    /// Runs without gradients but with batch statistics and dropout, the
    /// generator's behaviour at training time.
    pub fn generate(&self, source: &Tensor) -> Tensor {
        tch::no_grad(|| self.generator.forward_t(&source.to_device(self.device), true))
    }

    /// Adam over the generator parameters
    pub fn gen_optimizer(&self, lr: f64, beta1: f64) -> Result<nn::Optimizer> {
        Ok(adam(beta1).build(&self.gen_vs, lr)?)
    }

    /// Adam over the discriminator parameters
    pub fn disc_optimizer(&self, lr: f64, beta1: f64) -> Result<nn::Optimizer> {
        Ok(adam(beta1).build(&self.disc_vs, lr)?)
    }

    /// Save model parameters
    pub fn save(&self, gen_path: &Path, disc_path: &Path) -> Result<()> {
        self.gen_vs.save(gen_path)?;
        self.disc_vs.save(disc_path)?;
        Ok(())
    }

    /// Load model parameters
    pub fn load(&mut self, gen_path: &Path, disc_path: &Path) -> Result<()> {
        self.gen_vs.load(gen_path)?;
        self.disc_vs.load(disc_path)?;
        Ok(())
    }

    /// Total number of trainable parameters
    pub fn parameter_count(&self) -> i64 {
        self.gen_vs
            .trainable_variables()
            .iter()
            .chain(self.disc_vs.trainable_variables().iter())
            .map(|t| t.numel() as i64)
            .sum()
    }

    pub fn global_step(&self) -> i64 {
        self.global_step
    }

    pub fn set_global_step(&mut self, step: i64) {
        self.global_step = step;
    }

    /// Advance the step counter, returning the new value
    pub fn increment_global_step(&mut self) -> i64 {
        self.global_step += 1;
        self.global_step
    }
}

fn adam(beta1: f64) -> nn::Adam {
    nn::Adam {
        beta1,
        beta2: 0.999,
        ..Default::default()
    }
}

/// Network configurations for 3-channel `CROP_SIZE` images
pub fn configs_from_options(options: &Options) -> (GeneratorConfig, DiscriminatorConfig) {
    let gen_config = GeneratorConfig {
        in_channels: 3,
        out_channels: 3,
        ngf: options.ngf,
        image_size: CROP_SIZE as i64,
        separable_conv: options.separable_conv,
        ..Default::default()
    };
    let disc_config = DiscriminatorConfig {
        in_channels: 6,
        ndf: options.ndf,
        ..Default::default()
    };
    (gen_config, disc_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Kind;
    use tempfile::tempdir;

    fn tiny() -> Pix2Pix {
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

    #[test]
    fn test_pix2pix_generate() {
        let model = tiny();
        let source = Tensor::randn([2, 3, 32, 32], (Kind::Float, Device::Cpu));
        let output = model.generate(&source);

        assert_eq!(output.size(), vec![2, 3, 32, 32]);
        assert!(!output.requires_grad());
    }

    #[test]
    fn test_pix2pix_patch_scores() {
        let model = tiny();
        let source = Tensor::randn([1, 3, 32, 32], (Kind::Float, Device::Cpu));
        let probs = model.discriminator.score(&source, &source, true);
        assert_eq!(probs.size(), vec![1, 1, 2, 2]);
    }

    #[test]
    fn test_parameter_sets_are_disjoint() {
        let model = tiny();
        let gen_names: Vec<_> = model.gen_vs.variables().into_keys().collect();
        let disc_names: Vec<_> = model.disc_vs.variables().into_keys().collect();

        assert!(gen_names.iter().all(|n| n.starts_with("encoder") || n.starts_with("decoder")));
        assert!(disc_names.iter().all(|n| n.starts_with("layer_")));
        assert!(model.parameter_count() > 0);
    }

    #[test]
    fn test_global_step() {
        let mut model = tiny();
        assert_eq!(model.global_step(), 0);
        assert_eq!(model.increment_global_step(), 1);
        model.set_global_step(41);
        assert_eq!(model.increment_global_step(), 42);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let gen_path = dir.path().join("generator.ot");
        let disc_path = dir.path().join("discriminator.ot");

        let model = tiny();
        model.save(&gen_path, &disc_path).unwrap();

        let mut restored = tiny();
        restored.load(&gen_path, &disc_path).unwrap();

        let original = model.gen_vs.variables();
        for (name, tensor) in restored.gen_vs.variables() {
            let diff = (&tensor - &original[&name]).abs().max().double_value(&[]);
            assert_eq!(diff, 0.0, "{name} differs");
        }
    }

    #[test]
    fn test_invalid_image_size() {
        let gen_config = GeneratorConfig {
            image_size: 48,
            ..Default::default()
        };
        assert!(Pix2Pix::new(gen_config, DiscriminatorConfig::default(), Device::Cpu).is_err());
    }
}
