use crate::error::{Error, Result};
use image::ImageFormat;
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::xxh3_128;

const FILE_PREFIX: &str = "happy_place_img_";

fn supported_format(path: &Path) -> Result<ImageFormat> {
    let format = ImageFormat::from_path(path)?;
    match format {
        ImageFormat::Jpeg
        | ImageFormat::Png
        | ImageFormat::Gif
        | ImageFormat::WebP
        | ImageFormat::Bmp
        | ImageFormat::Tiff => Ok(format),
        other => Err(Error::Validation(format!(
            "unsupported image format {other:?} for {}",
            path.display()
        ))),
    }
}

pub fn is_supported_image(path: &Path) -> bool {
    supported_format(path).is_ok()
}

/// Copies a chosen image into the library directory and returns the stored
/// path. Files are named by content, so importing the same picture twice
/// yields the same path.
pub fn copy_into_library(source: &Path, images_dir: &Path) -> Result<PathBuf> {
    let format = supported_format(source)?;
    let data = std::fs::read(source)?;
    let ext = format.extensions_str().first().copied().unwrap_or("img");
    let file_name = format!("{FILE_PREFIX}{:x}.{ext}", xxh3_128(&data));

    std::fs::create_dir_all(images_dir)?;
    let output = images_dir.join(file_name);
    if output.exists() {
        log::debug!("Image already in library: {}", output.display());
    } else {
        std::fs::write(&output, &data)?;
        log::debug!("File saved successfully: {}", output.display());
    }
    Ok(std::fs::canonicalize(&output)?)
}

/// [`copy_into_library`] on the blocking pool.
pub async fn import_image(source: PathBuf, images_dir: PathBuf) -> Result<PathBuf> {
    tokio::task::spawn_blocking(move || copy_into_library(&source, &images_dir)).await?
}
