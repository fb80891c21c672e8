//! Image <-> array conversion and image encoding
//!
//! Arrays are CHW `f32`. Pixel values are `[0, 1]` unless stated otherwise.

use std::io::Cursor;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage};
use ndarray::{Array3, ArrayView3};

use crate::error::Result;
use crate::utils::OutputFiletype;

/// JPEG quality of exported outputs
pub const JPEG_QUALITY: u8 = 80;

/// Web-safe base64: `-_` alphabet, no padding written, padding accepted
pub const WEB_SAFE_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// RGB image to a CHW array in `[0, 1]`
pub fn image_to_array(image: &RgbImage) -> Array3<f32> {
    let (width, height) = image.dimensions();
    Array3::from_shape_fn((3, height as usize, width as usize), |(c, y, x)| {
        image.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    })
}

/// CHW array in `[0, 1]` to an RGB image, saturating out-of-range values
pub fn array_to_image(array: ArrayView3<f32>) -> RgbImage {
    let (_, height, width) = array.dim();
    RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        Rgb([0usize, 1, 2].map(|c| to_u8(array[[c, y, x]])))
    })
}

fn to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// `[0, 1]` => `[-1, 1]`
pub fn preprocess(array: &Array3<f32>) -> Array3<f32> {
    array.mapv(|v| v * 2.0 - 1.0)
}

/// `[-1, 1]` => `[0, 1]`
pub fn deprocess(array: ArrayView3<f32>) -> Array3<f32> {
    array.mapv(|v| (v + 1.0) / 2.0)
}

/// Stretch an image to `round(height * aspect_ratio)` wide
pub fn apply_aspect_ratio(image: RgbImage, aspect_ratio: f64) -> RgbImage {
    if aspect_ratio == 1.0 {
        return image;
    }
    let height = image.height();
    let width = ((height as f64) * aspect_ratio).round().max(1.0) as u32;
    image::imageops::resize(&image, width, height, FilterType::CatmullRom)
}

/// Decode PNG or JPEG bytes to RGB, dropping alpha and expanding grayscale
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

/// Encode an RGB image in the given format
pub fn encode_image(image: &RgbImage, filetype: OutputFiletype) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    match filetype {
        OutputFiletype::Png => {
            PngEncoder::new(&mut buffer).write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                ExtendedColorType::Rgb8,
            )?;
        }
        OutputFiletype::Jpeg => {
            JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY).encode_image(image)?;
        }
    }
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| Rgb([(x * 8) as u8, (y * 8) as u8, 128]))
    }

    #[test]
    fn test_array_layout() {
        let image = gradient(4, 2);
        let array = image_to_array(&image);

        assert_eq!(array.dim(), (3, 2, 4));
        assert_eq!(array[[0, 1, 3]], 24.0 / 255.0);
        assert_eq!(array[[1, 1, 3]], 8.0 / 255.0);
        assert_eq!(array_to_image(array.view()), image);
    }

    #[test]
    fn test_array_to_image_saturates() {
        let array = Array3::from_elem((3, 1, 1), 1.7f32);
        assert_eq!(array_to_image(array.view()).get_pixel(0, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_preprocess_range() {
        let array = Array3::from_shape_vec((3, 1, 1), vec![0.0, 0.5, 1.0]).unwrap();
        let processed = preprocess(&array);
        assert_eq!(processed.as_slice().unwrap(), &[-1.0, 0.0, 1.0]);
        assert_eq!(deprocess(processed.view()), array);
    }

    #[test]
    fn test_aspect_ratio() {
        let image = gradient(8, 8);
        assert_eq!(apply_aspect_ratio(image.clone(), 1.0).dimensions(), (8, 8));
        assert_eq!(apply_aspect_ratio(image, 1.5).dimensions(), (12, 8));
    }

    #[test]
    fn test_png_is_lossless() {
        let image = gradient(16, 16);
        let bytes = encode_image(&image, OutputFiletype::Png).unwrap();
        assert_eq!(decode_rgb(&bytes).unwrap(), image);
    }

    #[test]
    fn test_jpeg_decodes_to_same_size() {
        let image = gradient(16, 8);
        let bytes = encode_image(&image, OutputFiletype::Jpeg).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        assert_eq!(decode_rgb(&bytes).unwrap().dimensions(), (16, 8));
    }

    #[test]
    fn test_web_safe_base64_accepts_padding() {
        let encoded = WEB_SAFE_BASE64.encode([0xfb, 0xff]);
        assert_eq!(encoded, "-_8");
        assert_eq!(WEB_SAFE_BASE64.decode("-_8=").unwrap(), vec![0xfb, 0xff]);
    }
}
