//! Error types for the pix2pix library

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Pix2PixError>;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Pix2PixError {
    /// Test and export need trained parameters
    #[error("checkpoint required for {0} mode")]
    CheckpointRequired(&'static str),

    /// Checkpoint directory holds no saved model
    #[error("no checkpoint found in {}", .0.display())]
    CheckpointNotFound(PathBuf),

    /// Export output format is neither png nor jpeg
    #[error("invalid filetype: {0}")]
    InvalidFiletype(String),

    /// Lab colorization models cannot be exported
    #[error("export not supported for lab_colorization")]
    ExportLabColorization,

    /// Augmentation would crop outside the scaled image
    #[error("scale size {scale_size} cannot be less than crop size {crop_size}")]
    ScaleTooSmall { scale_size: u32, crop_size: u32 },

    /// Input directory does not exist
    #[error("input_dir does not exist: {}", .0.display())]
    InputDirMissing(PathBuf),

    /// Input directory holds no usable images
    #[error("input_dir contains no image files: {}", .0.display())]
    EmptyDataset(PathBuf),

    /// Paired image cannot be split into two halves
    #[error("image {} is too narrow to split into a pair", .0.display())]
    InvalidPair(PathBuf),

    /// Malformed export request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Image decode/encode error
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Base64 decode error
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Tensor backend error
    #[error("torch error: {0}")]
    Torch(#[from] tch::TchError),

    /// Array shape error
    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}
