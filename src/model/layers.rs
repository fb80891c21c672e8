//! Convolution building blocks shared by the generator and discriminator
//!
//! All weights start from N(0, 0.02); batch norm scales start from N(1, 0.02).

use tch::{nn, nn::Module, Tensor};

/// Slope of the leaky ReLU used throughout
pub const LEAKY_SLOPE: f64 = 0.2;

const KERNEL_SIZE: i64 = 4;

fn weight_init() -> nn::Init {
    nn::Init::Randn {
        mean: 0.0,
        stdev: 0.02,
    }
}

fn conv_config(stride: i64, padding: i64) -> nn::ConvConfig {
    nn::ConvConfig {
        stride,
        padding,
        ws_init: weight_init(),
        bs_init: nn::Init::Const(0.0),
        ..Default::default()
    }
}

/// Leaky ReLU written as a blend of `x` and `|x|`
pub fn lrelu(xs: &Tensor, slope: f64) -> Tensor {
    xs * (0.5 * (1.0 + slope)) + xs.abs() * (0.5 * (1.0 - slope))
}

/// Batch norm over NCHW activations
pub fn batch_norm(vs: nn::Path, channels: i64) -> nn::BatchNorm {
    nn::batch_norm2d(
        vs,
        channels,
        nn::BatchNormConfig {
            eps: 1e-5,
            momentum: 0.1,
            ws_init: nn::Init::Randn {
                mean: 1.0,
                stdev: 0.02,
            },
            bs_init: nn::Init::Const(0.0),
            ..Default::default()
        },
    )
}

/// 4x4 convolution with one pixel of zero padding on every side
pub fn patch_conv(vs: nn::Path, in_channels: i64, out_channels: i64, stride: i64) -> nn::Conv2D {
    nn::conv2d(vs, in_channels, out_channels, KERNEL_SIZE, conv_config(stride, 1))
}

/// Depthwise 4x4 convolution followed by a pointwise 1x1 convolution
#[derive(Debug)]
pub struct SeparableConv {
    depthwise: nn::Conv2D,
    pointwise: nn::Conv2D,
}

impl SeparableConv {
    /// `padding` is applied by the conv itself; callers needing asymmetric
    /// padding pass 0 and pad the input
    pub fn new(
        vs: &nn::Path,
        in_channels: i64,
        out_channels: i64,
        stride: i64,
        padding: i64,
    ) -> Self {
        let depthwise = nn::conv2d(
            vs / "depthwise",
            in_channels,
            in_channels,
            KERNEL_SIZE,
            nn::ConvConfig {
                groups: in_channels,
                bias: false,
                ..conv_config(stride, padding)
            },
        );
        let pointwise = nn::conv2d(vs / "pointwise", in_channels, out_channels, 1, conv_config(1, 0));
        Self {
            depthwise,
            pointwise,
        }
    }
}

impl Module for SeparableConv {
    fn forward(&self, xs: &Tensor) -> Tensor {
        self.pointwise.forward(&self.depthwise.forward(xs))
    }
}

/// Stride-2 downsampling used by the generator encoder
#[derive(Debug)]
pub enum DownConv {
    Plain(nn::Conv2D),
    Separable(SeparableConv),
}

impl DownConv {
    pub fn new(vs: &nn::Path, in_channels: i64, out_channels: i64, separable: bool) -> Self {
        if separable {
            DownConv::Separable(SeparableConv::new(vs, in_channels, out_channels, 2, 1))
        } else {
            DownConv::Plain(nn::conv2d(
                vs / "conv",
                in_channels,
                out_channels,
                KERNEL_SIZE,
                conv_config(2, 1),
            ))
        }
    }
}

impl Module for DownConv {
    fn forward(&self, xs: &Tensor) -> Tensor {
        match self {
            DownConv::Plain(conv) => conv.forward(xs),
            DownConv::Separable(conv) => conv.forward(xs),
        }
    }
}

/// 2x upsampling used by the generator decoder
///
/// The separable variant resizes with nearest neighbour, then applies a
/// stride-1 separable conv padded 1 before and 2 after each spatial axis.
#[derive(Debug)]
pub enum UpConv {
    Plain(nn::ConvTranspose2D),
    Separable(SeparableConv),
}

impl UpConv {
    pub fn new(vs: &nn::Path, in_channels: i64, out_channels: i64, separable: bool) -> Self {
        if separable {
            UpConv::Separable(SeparableConv::new(vs, in_channels, out_channels, 1, 0))
        } else {
            UpConv::Plain(nn::conv_transpose2d(
                vs / "deconv",
                in_channels,
                out_channels,
                KERNEL_SIZE,
                nn::ConvTransposeConfig {
                    stride: 2,
                    padding: 1,
                    ws_init: weight_init(),
                    bs_init: nn::Init::Const(0.0),
                    ..Default::default()
                },
            ))
        }
    }
}

impl Module for UpConv {
    fn forward(&self, xs: &Tensor) -> Tensor {
        match self {
            UpConv::Plain(deconv) => deconv.forward(xs),
            UpConv::Separable(conv) => {
                let size = xs.size();
                let (height, width) = (size[2], size[3]);
                let resized = xs.upsample_nearest2d([height * 2, width * 2], None, None);
                conv.forward(&resized.zero_pad2d(1, 2, 1, 2))
            }
        }
    }
}
