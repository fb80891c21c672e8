//! Model module containing pix2pix architecture components
//!
//! This module provides:
//! - U-Net Generator translating source images into targets
//! - PatchGAN Discriminator scoring (source, target) pairs
//! - Pix2Pix wrapper combining both networks

mod discriminator;
mod generator;
mod layers;
mod pix2pix;

pub use discriminator::{Discriminator, DiscriminatorConfig};
pub use generator::{Generator, GeneratorConfig};
pub use pix2pix::{configs_from_options, Pix2Pix};
