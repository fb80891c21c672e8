//! DataLoader for batching paired images
//!
//! Provides batching for pix2pix training with support for:
//! - Random shuffling, reshuffled each epoch
//! - Batches that wrap across epoch boundaries so every step sees a full batch

use std::path::PathBuf;

use ndarray::{Array3, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::pair::PairReader;
use super::{ImageBatch, ImagePair};
use crate::error::Result;

/// DataLoader over the files of a paired-image dataset
pub struct DataLoader {
    /// Dataset files
    files: Vec<PathBuf>,
    /// Decoder and augmenter
    reader: PairReader,
    /// Batch size
    batch_size: usize,
    /// Whether to shuffle data each epoch
    shuffle: bool,
    /// Current indices for iteration
    indices: Vec<usize>,
    /// Current position in iteration
    current_idx: usize,
    rng: StdRng,
}

impl DataLoader {
    /// Create a new DataLoader
    ///
    /// # Arguments
    ///
    /// * `files` - Dataset image paths
    /// * `reader` - Pair decoder configured for the run
    /// * `batch_size` - Number of pairs per batch
    /// * `shuffle` - Whether to shuffle data each epoch
    /// * `seed` - Seed for shuffling and augmentation
    pub fn new(
        files: Vec<PathBuf>,
        reader: PairReader,
        batch_size: usize,
        shuffle: bool,
        seed: u64,
    ) -> Self {
        let indices: Vec<usize> = (0..files.len()).collect();

        let mut loader = Self {
            files,
            reader,
            batch_size: batch_size.max(1),
            shuffle,
            indices,
            current_idx: 0,
            rng: StdRng::seed_from_u64(seed),
        };

        if shuffle {
            loader.shuffle_indices();
        }

        loader
    }

    /// Number of batches per epoch, counting a final partial batch
    pub fn num_batches(&self) -> usize {
        self.files.len().div_ceil(self.batch_size)
    }

    /// Get total number of samples
    pub fn num_samples(&self) -> usize {
        self.files.len()
    }

    pub fn reader(&self) -> &PairReader {
        &self.reader
    }

    /// Shuffle indices for a new epoch
    fn shuffle_indices(&mut self) {
        self.indices.shuffle(&mut self.rng);
    }

    /// Reset for new epoch
    fn reset(&mut self) {
        self.current_idx = 0;
        if self.shuffle {
            self.shuffle_indices();
        }
    }

    fn next_index(&mut self) -> usize {
        if self.current_idx >= self.indices.len() {
            self.reset();
        }
        let idx = self.indices[self.current_idx];
        self.current_idx += 1;
        idx
    }

    /// Read the next `batch_size` augmented pairs
    ///
    /// Returns `None` for an empty dataset.
    pub fn next_batch(&mut self) -> Result<Option<ImageBatch>> {
        if self.files.is_empty() {
            return Ok(None);
        }

        let mut paths = Vec::with_capacity(self.batch_size);
        let mut pairs = Vec::with_capacity(self.batch_size);
        for _ in 0..self.batch_size {
            let idx = self.next_index();
            let path = self.files[idx].clone();
            pairs.push(self.reader.read(&path, &mut self.rng)?);
            paths.push(path);
        }

        ImageBatch::from_pairs(paths, &pairs).map(Some)
    }
}

impl ImageBatch {
    /// Stack pairs into NCHW batches
    pub fn from_pairs(paths: Vec<PathBuf>, pairs: &[ImagePair]) -> Result<Self> {
        let sources: Vec<_> = pairs.iter().map(|p| p.source.view()).collect();
        let targets: Vec<_> = pairs.iter().map(|p| p.target.view()).collect();
        Ok(Self {
            paths,
            sources: ndarray::stack(Axis(0), &sources)?,
            targets: ndarray::stack(Axis(0), &targets)?,
        })
    }

    /// Number of pairs in the batch
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Source image `i` in CHW layout
    pub fn source(&self, i: usize) -> Array3<f32> {
        self.sources.index_axis(Axis(0), i).to_owned()
    }

    /// Target image `i` in CHW layout
    pub fn target(&self, i: usize) -> Array3<f32> {
        self.targets.index_axis(Axis(0), i).to_owned()
    }
}
