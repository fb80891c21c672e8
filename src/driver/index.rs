//! Saved images and the HTML index that lists them

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::error::Result;

pub const INDEX_FILE: &str = "index.html";
pub const IMAGE_DIR: &str = "images";

/// One table row of the index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRow {
    /// Global step for display images, `None` for test outputs
    pub step: Option<i64>,
    pub name: String,
    /// File name of the generated image inside `images/`
    pub output: String,
    /// `src` of the input image, relative to the index
    pub input: String,
}

/// File stem used to name every image derived from `path`
pub fn image_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `<name>-<kind>.png`, prefixed with the zero-padded step when given
pub fn image_filename(name: &str, kind: &str, step: Option<i64>) -> String {
    match step {
        Some(step) => format!("{step:08}-{name}-{kind}.png"),
        None => format!("{name}-{kind}.png"),
    }
}

/// Write `image` as `<output_dir>/images/<filename>`
pub fn save_image(output_dir: &Path, filename: &str, image: &RgbImage) -> Result<PathBuf> {
    let image_dir = output_dir.join(IMAGE_DIR);
    std::fs::create_dir_all(&image_dir)?;
    let path = image_dir.join(filename);
    image.save(&path)?;
    Ok(path)
}

/// Append rows to `<output_dir>/index.html`, writing the table header when
/// the file is new
///
/// The header gets a step column when `with_step` is set; rows appended
/// later to an existing index do not change it.
pub fn append_index(output_dir: &Path, rows: &[IndexRow], with_step: bool) -> Result<PathBuf> {
    let index_path = output_dir.join(INDEX_FILE);
    let is_new = !index_path.exists();
    let mut index = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&index_path)?;

    if is_new {
        index.write_all(b"<html><body><table><tr>")?;
        if with_step {
            index.write_all(b"<th>step</th>")?;
        }
        index.write_all(b"<th>name</th><th>output</th><th>input</th></tr>")?;
    }

    for row in rows {
        let mut html = String::from("<tr>");
        if with_step {
            if let Some(step) = row.step {
                html.push_str(&format!("<td>{step}</td>"));
            }
        }
        html.push_str(&format!("<td>{}</td>", escape_html(&row.name)));
        html.push_str(&format!(
            "<td><img src='{IMAGE_DIR}/{}'></td>",
            escape_html(&row.output)
        ));
        html.push_str(&format!("<td><img src='{}'></td>", escape_html(&row.input)));
        html.push_str("</tr>");
        index.write_all(html.as_bytes())?;
    }

    Ok(index_path)
}

/// Escape text for element content and quoted attribute values
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
