//! Dataset file listing

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Pix2PixError, Result};

/// List the images of a dataset directory
///
/// Takes every `*.jpg`, falling back to `*.png` when there are none. Names
/// are sorted numerically when every file stem is an integer.
pub fn list_image_files(input_dir: &Path) -> Result<Vec<PathBuf>> {
    if !input_dir.is_dir() {
        return Err(Pix2PixError::InputDirMissing(input_dir.to_path_buf()));
    }

    let mut files = files_with_extension(input_dir, "jpg")?;
    if files.is_empty() {
        files = files_with_extension(input_dir, "png")?;
    }
    if files.is_empty() {
        return Err(Pix2PixError::EmptyDataset(input_dir.to_path_buf()));
    }

    sort_files(&mut files);
    debug!("found {} images in {}", files.len(), input_dir.display());
    Ok(files)
}

fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(extension))
            .unwrap_or(false);
        if matches && path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

fn numeric_stem(path: &Path) -> Option<u64> {
    path.file_stem()?.to_str()?.parse().ok()
}

fn sort_files(files: &mut [PathBuf]) {
    if files.iter().all(|p| numeric_stem(p).is_some()) {
        files.sort_by_key(|p| numeric_stem(p));
    } else {
        files.sort();
    }
}
