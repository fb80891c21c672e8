//! Discriminator network for pix2pix
//!
//! A PatchGAN: it scores overlapping patches of the (source, target) pair
//! and returns a spatial map of probabilities instead of a single scalar.

use tch::{nn, nn::Module, nn::ModuleT, Tensor};

use super::layers::{batch_norm, lrelu, patch_conv, LEAKY_SLOPE};

/// Discriminator network configuration
#[derive(Debug, Clone)]
pub struct DiscriminatorConfig {
    /// Channels of source and target together
    pub in_channels: i64,
    /// Number of filters in the first layer
    pub ndf: i64,
    /// Number of normalized layers between the first and the output layer
    pub n_layers: usize,
}

impl Default for DiscriminatorConfig {
    fn default() -> Self {
        Self {
            in_channels: 6,
            ndf: 64,
            n_layers: 3,
        }
    }
}

impl DiscriminatorConfig {
    /// Side length of the probability map produced for a square input
    ///
    /// Every stride-2 layer halves the size, the two stride-1 layers each
    /// remove one pixel.
    pub fn patch_map_size(&self, image_size: i64) -> i64 {
        let halvings = self.n_layers as u32;
        (image_size >> halvings) - 2
    }
}

#[derive(Debug)]
struct PatchLayer {
    conv: nn::Conv2D,
    bn: nn::BatchNorm,
}

/// Discriminator network
///
/// Architecture (n_layers = 3, 256x256 input):
/// 1. layer_1: conv(ndf, stride 2) + LeakyReLU            -> 128x128
/// 2. layer_2..4: conv(stride 2, 2, 1) + BatchNorm + LeakyReLU -> 64, 32, 31
/// 3. layer_5: conv(1, stride 1) + Sigmoid                -> 30x30
#[derive(Debug)]
pub struct Discriminator {
    config: DiscriminatorConfig,
    first: nn::Conv2D,
    layers: Vec<PatchLayer>,
    output: nn::Conv2D,
}

impl Discriminator {
    /// Create a new Discriminator network
    pub fn new(vs: &nn::Path, config: DiscriminatorConfig) -> Self {
        let ndf = config.ndf;
        let first = patch_conv(vs / "layer_1" / "conv", config.in_channels, ndf, 2);

        let mut layers = Vec::with_capacity(config.n_layers);
        let mut in_channels = ndf;
        for i in 0..config.n_layers {
            let path = vs / format!("layer_{}", i + 2);
            let out_channels = ndf * (1i64 << (i + 1).min(3));
            let stride = if i + 1 == config.n_layers { 1 } else { 2 };
            layers.push(PatchLayer {
                conv: patch_conv(&path / "conv", in_channels, out_channels, stride),
                bn: batch_norm(&path / "batchnorm", out_channels),
            });
            in_channels = out_channels;
        }

        let output = patch_conv(
            vs / format!("layer_{}", config.n_layers + 2) / "conv",
            in_channels,
            1,
            1,
        );

        Self {
            config,
            first,
            layers,
            output,
        }
    }

    /// Forward pass over channel-concatenated (source, target)
    ///
    /// # Returns
    ///
    /// Tensor of shape (batch_size, 1, h, w) with probabilities of being real
    pub fn forward_t(&self, input: &Tensor, train: bool) -> Tensor {
        let mut x = lrelu(&self.first.forward(input), LEAKY_SLOPE);
        for layer in &self.layers {
            let normalized = layer.bn.forward_t(&layer.conv.forward(&x), train);
            x = lrelu(&normalized, LEAKY_SLOPE);
        }
        self.output.forward(&x).sigmoid()
    }

    /// Score a (source, target) pair
    pub fn score(&self, source: &Tensor, target: &Tensor, train: bool) -> Tensor {
        self.forward_t(&Tensor::cat(&[source, target], 1), train)
    }

    /// Get configuration
    pub fn config(&self) -> &DiscriminatorConfig {
        &self.config
    }
}

impl ModuleT for Discriminator {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        Discriminator::forward_t(self, xs, train)
    }
}
