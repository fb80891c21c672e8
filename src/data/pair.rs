//! Paired image decoding, augmentation and rendering
//!
//! A dataset image holds A on its left half and B on its right half. With
//! lab colorization the whole image is used: A is its lightness and B its
//! full Lab encoding.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::{Array3, ArrayView3};
use rand::Rng;

use super::imaging::{apply_aspect_ratio, array_to_image, deprocess, image_to_array, preprocess};
use super::lab::{
    denormalize_chroma, denormalize_lightness, lab_to_rgb, normalize_chroma,
    normalize_lightness, rgb_to_lab,
};
use super::{ImagePair, CROP_SIZE};
use crate::error::{Pix2PixError, Result};
use crate::utils::{Direction, Options};

/// Channel layout of a network-side image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// Plain RGB
    Rgb,
    /// Normalized lightness on all three channels
    Lightness,
    /// Normalized `[L, a, b]`
    Lab,
}

/// Random augmentation applied identically to both halves of a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Augmentation {
    pub offset_x: u32,
    pub offset_y: u32,
    pub flip: bool,
}

impl Augmentation {
    /// Draw a crop offset and flip for an image scaled to `scale_size`
    pub fn sample<R: Rng>(rng: &mut R, scale_size: u32, flip: bool) -> Self {
        let slack = scale_size - CROP_SIZE;
        Self {
            offset_x: rng.gen_range(0..=slack),
            offset_y: rng.gen_range(0..=slack),
            flip: flip && rng.gen_bool(0.5),
        }
    }

    fn apply(&self, image: &RgbImage, scale_size: u32) -> RgbImage {
        let scaled = if image.dimensions() == (scale_size, scale_size) {
            image.clone()
        } else {
            imageops::resize(image, scale_size, scale_size, FilterType::Triangle)
        };
        let cropped =
            imageops::crop_imm(&scaled, self.offset_x, self.offset_y, CROP_SIZE, CROP_SIZE)
                .to_image();
        if self.flip {
            imageops::flip_horizontal(&cropped)
        } else {
            cropped
        }
    }
}

/// Turns dataset files into network-ready pairs and network outputs back
/// into images
#[derive(Debug, Clone)]
pub struct PairReader {
    direction: Direction,
    lab_colorization: bool,
    scale_size: u32,
    flip: bool,
    aspect_ratio: f64,
}

impl PairReader {
    pub fn new(options: &Options) -> Result<Self> {
        if options.scale_size < CROP_SIZE {
            return Err(Pix2PixError::ScaleTooSmall {
                scale_size: options.scale_size,
                crop_size: CROP_SIZE,
            });
        }
        Ok(Self {
            direction: options.which_direction,
            lab_colorization: options.lab_colorization,
            scale_size: options.scale_size,
            flip: options.flip,
            aspect_ratio: options.aspect_ratio,
        })
    }

    /// Read and augment one pair
    pub fn read<R: Rng>(&self, path: &Path, rng: &mut R) -> Result<ImagePair> {
        let image = image::open(path)?.to_rgb8();
        let augmentation = Augmentation::sample(rng, self.scale_size, self.flip);
        self.pair_from_image(&image, path, augmentation)
    }

    /// Build a pair from a decoded dataset image
    pub fn pair_from_image(
        &self,
        image: &RgbImage,
        path: &Path,
        augmentation: Augmentation,
    ) -> Result<ImagePair> {
        let (a, b) = if self.lab_colorization {
            let lab = self.lab_channels(&augmentation.apply(image, self.scale_size));
            let lightness = Array3::from_shape_fn(lab.raw_dim(), |(_, y, x)| lab[[0, y, x]]);
            (lightness, lab)
        } else {
            let (left, right) = split_halves(image, path)?;
            (
                preprocess(&image_to_array(&augmentation.apply(&left, self.scale_size))),
                preprocess(&image_to_array(&augmentation.apply(&right, self.scale_size))),
            )
        };

        let (source, target) = match self.direction {
            Direction::AtoB => (a, b),
            Direction::BtoA => (b, a),
        };
        Ok(ImagePair { source, target })
    }

    fn lab_channels(&self, image: &RgbImage) -> Array3<f32> {
        let rgb = image_to_array(image);
        let (_, height, width) = rgb.dim();
        let mut lab = Array3::zeros((3, height, width));
        for y in 0..height {
            for x in 0..width {
                let [l, a, b] = rgb_to_lab([rgb[[0, y, x]], rgb[[1, y, x]], rgb[[2, y, x]]]);
                lab[[0, y, x]] = normalize_lightness(l);
                lab[[1, y, x]] = normalize_chroma(a);
                lab[[2, y, x]] = normalize_chroma(b);
            }
        }
        lab
    }

    fn layouts(&self) -> (Layout, Layout) {
        match (self.lab_colorization, self.direction) {
            (false, _) => (Layout::Rgb, Layout::Rgb),
            (true, Direction::AtoB) => (Layout::Lightness, Layout::Lab),
            (true, Direction::BtoA) => (Layout::Lab, Layout::Lightness),
        }
    }

    /// Render a source image for display
    pub fn render_input(&self, source: ArrayView3<f32>) -> RgbImage {
        self.render(source, self.layouts().0, None)
    }

    /// Render a target image for display
    pub fn render_target(&self, target: ArrayView3<f32>) -> RgbImage {
        self.render(target, self.layouts().1, None)
    }

    /// Render a generator output
    ///
    /// Colorized outputs keep the lightness of their source.
    pub fn render_output(&self, output: ArrayView3<f32>, source: ArrayView3<f32>) -> RgbImage {
        self.render(output, self.layouts().1, Some(source))
    }

    fn render(
        &self,
        image: ArrayView3<f32>,
        layout: Layout,
        lightness_from: Option<ArrayView3<f32>>,
    ) -> RgbImage {
        let rgb = match layout {
            Layout::Rgb => deprocess(image),
            Layout::Lightness => Array3::from_shape_fn(image.raw_dim(), |(c, y, x)| {
                lab_to_rgb([denormalize_lightness(image[[0, y, x]]), 0.0, 0.0])[c]
            }),
            Layout::Lab => {
                let lightness = lightness_from
                    .map(|l| l.reborrow())
                    .unwrap_or_else(|| image.reborrow());
                Array3::from_shape_fn(image.raw_dim(), |(c, y, x)| {
                    let lab = [
                        denormalize_lightness(lightness[[0, y, x]]),
                        denormalize_chroma(image[[1, y, x]]),
                        denormalize_chroma(image[[2, y, x]]),
                    ];
                    lab_to_rgb(lab)[c]
                })
            }
        };
        apply_aspect_ratio(array_to_image(rgb.view()), self.aspect_ratio)
    }
}

/// Split a side-by-side image into its left and right halves
pub fn split_halves(image: &RgbImage, path: &Path) -> Result<(RgbImage, RgbImage)> {
    let (width, height) = image.dimensions();
    let half = width / 2;
    if half == 0 {
        return Err(Pix2PixError::InvalidPair(path.to_path_buf()));
    }
    let left = imageops::crop_imm(image, 0, 0, half, height).to_image();
    let right = imageops::crop_imm(image, half, 0, half, height).to_image();
    Ok((left, right))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Left half red, right half blue
    fn red_blue(size: u32) -> RgbImage {
        RgbImage::from_fn(size * 2, size, |x, _| {
            if x < size {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        })
    }

    fn test_options() -> Options {
        let mut options = Options::new("out");
        options.scale_size = CROP_SIZE;
        options.flip = false;
        options
    }

    const NO_AUGMENTATION: Augmentation = Augmentation {
        offset_x: 0,
        offset_y: 0,
        flip: false,
    };

    #[test]
    fn test_split_and_direction() {
        let image = red_blue(CROP_SIZE);
        let path = Path::new("pair.png");

        let reader = PairReader::new(&test_options()).unwrap();
        let pair = reader.pair_from_image(&image, path, NO_AUGMENTATION).unwrap();
        assert_eq!(pair.source.dim(), (3, CROP_SIZE as usize, CROP_SIZE as usize));
        assert_eq!(pair.source[[0, 10, 10]], 1.0);
        assert_eq!(pair.source[[2, 10, 10]], -1.0);
        assert_eq!(pair.target[[2, 10, 10]], 1.0);

        let mut options = test_options();
        options.which_direction = Direction::BtoA;
        let reader = PairReader::new(&options).unwrap();
        let pair = reader.pair_from_image(&image, path, NO_AUGMENTATION).unwrap();
        assert_eq!(pair.source[[2, 10, 10]], 1.0);
        assert_eq!(pair.target[[0, 10, 10]], 1.0);
    }

    #[test]
    fn test_scaling_yields_crop_size() {
        let mut options = test_options();
        options.scale_size = 286;
        let reader = PairReader::new(&options).unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        let augmentation = Augmentation::sample(&mut rng, 286, true);
        assert!(augmentation.offset_x <= 30 && augmentation.offset_y <= 30);

        let pair = reader
            .pair_from_image(&red_blue(100), Path::new("small.png"), augmentation)
            .unwrap();
        assert_eq!(pair.target.dim(), (3, 256, 256));
    }

    #[test]
    fn test_flip_mirrors_both_halves() {
        let image = RgbImage::from_fn(CROP_SIZE * 2, CROP_SIZE, |x, _| {
            if x % CROP_SIZE == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let reader = PairReader::new(&test_options()).unwrap();
        let flipped = Augmentation { flip: true, ..NO_AUGMENTATION };
        let pair = reader.pair_from_image(&image, Path::new("p.png"), flipped).unwrap();

        let last = CROP_SIZE as usize - 1;
        assert_eq!(pair.source[[0, 0, last]], 1.0);
        assert_eq!(pair.target[[0, 0, last]], 1.0);
        assert_eq!(pair.source[[0, 0, 0]], -1.0);
    }

    #[test]
    fn test_scale_smaller_than_crop_is_rejected() {
        let mut options = test_options();
        options.scale_size = 128;
        assert!(matches!(
            PairReader::new(&options),
            Err(Pix2PixError::ScaleTooSmall { .. })
        ));
    }

    #[test]
    fn test_lab_colorization_channels() {
        let mut options = test_options();
        options.lab_colorization = true;
        let reader = PairReader::new(&options).unwrap();

        let image = RgbImage::from_pixel(CROP_SIZE, CROP_SIZE, Rgb([200, 40, 40]));
        let pair = reader
            .pair_from_image(&image, Path::new("color.png"), NO_AUGMENTATION)
            .unwrap();

        // source is lightness on every channel
        assert_eq!(pair.source[[0, 5, 5]], pair.source[[1, 5, 5]]);
        assert_eq!(pair.source[[0, 5, 5]], pair.source[[2, 5, 5]]);
        assert_eq!(pair.source[[0, 5, 5]], pair.target[[0, 5, 5]]);
        // red has positive a
        assert!(pair.target[[1, 5, 5]] > 0.0);

        let rendered = reader.render_output(pair.target.view(), pair.source.view());
        let pixel = rendered.get_pixel(5, 5);
        assert!((pixel[0] as i32 - 200).abs() <= 2, "{pixel:?}");
        assert!((pixel[1] as i32 - 40).abs() <= 2, "{pixel:?}");
    }

    #[test]
    fn test_render_rgb_round_trip() {
        let reader = PairReader::new(&test_options()).unwrap();
        let image = red_blue(CROP_SIZE);
        let pair = reader
            .pair_from_image(&image, Path::new("p.png"), NO_AUGMENTATION)
            .unwrap();

        let input = reader.render_input(pair.source.view());
        assert_eq!(input.get_pixel(0, 0), &Rgb([255, 0, 0]));
        let output = reader.render_output(pair.target.view(), pair.source.view());
        assert_eq!(output.get_pixel(0, 0), &Rgb([0, 0, 255]));
    }
}
