//! Utility module with helper functions
//!
//! This module provides:
//! - Run options shared by every mode
//! - Checkpoint save/load utilities

pub mod checkpoint;
mod config;

pub use checkpoint::{
    find_latest_checkpoint, load_checkpoint, load_checkpoint_meta, save_checkpoint, CheckpointMeta,
};
pub use config::{Direction, Mode, Options, OutputFiletype, OPTIONS_FILE};
