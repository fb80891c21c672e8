//! Generator network for pix2pix
//!
//! The Generator is a U-Net: an encoder that halves the spatial size down to
//! 1x1 and a mirrored decoder whose layers also see the matching encoder
//! activation through skip connections.

use tch::{nn, nn::Module, nn::ModuleT, Tensor};

use super::layers::{batch_norm, lrelu, DownConv, UpConv, LEAKY_SLOPE};
use crate::error::{Pix2PixError, Result};

/// Decoders nearest the bottleneck that apply dropout
const DROPOUT_DECODERS: usize = 3;

/// Generator network configuration
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Channels of the source image
    pub in_channels: i64,
    /// Channels of the generated image
    pub out_channels: i64,
    /// Number of filters in the first encoder layer
    pub ngf: i64,
    /// Side length of the (square) input; a power of two
    pub image_size: i64,
    /// Depthwise-separable convolutions instead of plain ones
    pub separable_conv: bool,
    /// Dropout rate of the deepest decoders
    pub dropout: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            in_channels: 3,
            out_channels: 3,
            ngf: 64,
            image_size: 256,
            separable_conv: false,
            dropout: 0.5,
        }
    }
}

impl GeneratorConfig {
    /// Number of encoder layers: one per halving of `image_size`
    pub fn num_layers(&self) -> usize {
        self.image_size.max(1).trailing_zeros() as usize
    }

    /// Output channels of each encoder layer
    pub fn encoder_channels(&self) -> Vec<i64> {
        (0..self.num_layers())
            .map(|i| self.ngf * (1i64 << i.min(3)))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        let size = self.image_size;
        if size < 2 || size & (size - 1) != 0 {
            return Err(Pix2PixError::Config(format!(
                "generator image size must be a power of two >= 2, got {size}"
            )));
        }
        if self.ngf <= 0 || self.in_channels <= 0 || self.out_channels <= 0 {
            return Err(Pix2PixError::Config(
                "generator channel counts must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct EncoderLayer {
    conv: DownConv,
    /// The first encoder has neither activation nor normalization
    bn: Option<nn::BatchNorm>,
}

#[derive(Debug)]
struct DecoderLayer {
    deconv: UpConv,
    /// The output decoder ends with tanh instead
    bn: Option<nn::BatchNorm>,
    dropout: f64,
}

/// Generator network
///
/// Architecture (256x256 input, 8 layers):
/// 1. encoder_1: conv to ngf filters
/// 2. encoder_2..8: LeakyReLU, conv, BatchNorm
/// 3. decoder_8..2: ReLU, deconv, BatchNorm, Dropout on decoder_8..6
/// 4. decoder_1: ReLU, deconv to output channels, Tanh
#[derive(Debug)]
pub struct Generator {
    config: GeneratorConfig,
    encoders: Vec<EncoderLayer>,
    decoders: Vec<DecoderLayer>,
}

impl Generator {
    /// Create a new Generator network
    pub fn new(vs: &nn::Path, config: GeneratorConfig) -> Self {
        let channels = config.encoder_channels();
        let n = channels.len();
        let separable = config.separable_conv;

        let mut encoders = Vec::with_capacity(n);
        let mut in_channels = config.in_channels;
        for (i, &out_channels) in channels.iter().enumerate() {
            let path = vs / format!("encoder_{}", i + 1);
            let conv = DownConv::new(&path, in_channels, out_channels, separable);
            let bn = (i > 0).then(|| batch_norm(&path / "batchnorm", out_channels));
            encoders.push(EncoderLayer { conv, bn });
            in_channels = out_channels;
        }

        // decoder d mirrors encoder n - 1 - d and outputs the channels of
        // encoder n - 2 - d; the last one outputs the image
        let mut decoders = Vec::with_capacity(n);
        for d in 0..n {
            let path = vs / format!("decoder_{}", n - d);
            let skip = channels[n - 1 - d];
            let in_channels = if d == 0 { skip } else { skip * 2 };

            let layer = if d + 1 < n {
                let out_channels = channels[n - 2 - d];
                DecoderLayer {
                    deconv: UpConv::new(&path, in_channels, out_channels, separable),
                    bn: Some(batch_norm(&path / "batchnorm", out_channels)),
                    dropout: if d < DROPOUT_DECODERS { config.dropout } else { 0.0 },
                }
            } else {
                DecoderLayer {
                    deconv: UpConv::new(&path, in_channels, config.out_channels, separable),
                    bn: None,
                    dropout: 0.0,
                }
            };
            decoders.push(layer);
        }

        Self {
            config,
            encoders,
            decoders,
        }
    }

    /// Forward pass
    ///
    /// # Arguments
    ///
    /// * `input` - Tensor of shape (batch_size, in_channels, image_size, image_size)
    /// * `train` - Batch statistics and dropout when true
    ///
    /// # Returns
    ///
    /// Tensor of shape (batch_size, out_channels, image_size, image_size) in [-1, 1]
    pub fn forward_t(&self, input: &Tensor, train: bool) -> Tensor {
        let mut skips: Vec<Tensor> = Vec::with_capacity(self.encoders.len());

        for layer in &self.encoders {
            let x = match skips.last() {
                None => layer.conv.forward(input),
                Some(prev) => layer.conv.forward(&lrelu(prev, LEAKY_SLOPE)),
            };
            let x = match &layer.bn {
                Some(bn) => bn.forward_t(&x, train),
                None => x,
            };
            skips.push(x);
        }

        let n = skips.len();
        let mut x = skips[n - 1].shallow_clone();
        for (d, layer) in self.decoders.iter().enumerate() {
            let input = if d == 0 {
                x
            } else {
                Tensor::cat(&[&x, &skips[n - 1 - d]], 1)
            };
            let y = layer.deconv.forward(&input.relu());
            x = match &layer.bn {
                Some(bn) => bn.forward_t(&y, train).dropout(layer.dropout, train),
                None => y.tanh(),
            };
        }
        x
    }

    /// Get configuration
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }
}

impl ModuleT for Generator {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        Generator::forward_t(self, xs, train)
    }
}
