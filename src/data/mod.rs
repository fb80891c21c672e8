//! Data module for loading paired images
//!
//! This module provides:
//! - Dataset file listing
//! - Pair decoding, augmentation and Lab colorization
//! - Batching into NCHW arrays and tensors

mod files;
pub mod imaging;
pub mod lab;
mod loader;
mod pair;

use std::path::PathBuf;

use ndarray::{Array3, Array4};
use tch::{Device, Kind, Tensor};

use crate::error::Result;

pub use files::list_image_files;
pub use loader::DataLoader;
pub use pair::{split_halves, Augmentation, PairReader};

/// Side length of the square images the networks consume
pub const CROP_SIZE: u32 = 256;

/// One (source, target) example, CHW in `[-1, 1]`
#[derive(Debug, Clone)]
pub struct ImagePair {
    pub source: Array3<f32>,
    pub target: Array3<f32>,
}

/// A batch of pairs, NCHW in `[-1, 1]`
#[derive(Debug, Clone)]
pub struct ImageBatch {
    pub paths: Vec<PathBuf>,
    pub sources: Array4<f32>,
    pub targets: Array4<f32>,
}

impl ImageBatch {
    /// Move sources and targets to `device`
    pub fn to_tensors(&self, device: Device) -> (Tensor, Tensor) {
        (
            array_to_tensor(&self.sources).to_device(device),
            array_to_tensor(&self.targets).to_device(device),
        )
    }
}

/// NCHW array to a float tensor of the same shape
pub fn array_to_tensor(array: &Array4<f32>) -> Tensor {
    let shape: Vec<i64> = array.shape().iter().map(|&d| d as i64).collect();
    let values: Vec<f32> = array.iter().copied().collect();
    Tensor::from_slice(&values).view(shape.as_slice())
}

/// NCHW float tensor to an array of the same shape
pub fn tensor_to_array(tensor: &Tensor) -> Result<Array4<f32>> {
    let size = tensor.size();
    let dims: [usize; 4] = [0, 1, 2, 3].map(|i| size.get(i).copied().unwrap_or(1) as usize);
    let flat = tensor
        .detach()
        .to_device(Device::Cpu)
        .to_kind(Kind::Float)
        .contiguous()
        .flatten(0, -1);
    let values = Vec::<f32>::try_from(&flat)?;
    Ok(Array4::from_shape_vec(dims, values)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_conversion_preserves_layout() {
        let array = Array4::from_shape_fn((2, 3, 4, 5), |(n, c, y, x)| {
            (n * 1000 + c * 100 + y * 10 + x) as f32
        });
        let tensor = array_to_tensor(&array);
        assert_eq!(tensor.size(), vec![2, 3, 4, 5]);
        assert_eq!(tensor.double_value(&[1, 2, 3, 4]), 1234.0);

        let back = tensor_to_array(&tensor).unwrap();
        assert_eq!(back, array);
    }
}
