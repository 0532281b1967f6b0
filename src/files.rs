use std::path::{Path, PathBuf};

use crate::error::ImageError;

pub const IMAGE_EXTS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tga"];

fn has_extension(path: &Path, exts: &[&str]) -> bool {
    let Some(ext) = path.extension().map(|e| e.to_string_lossy()) else {
        return false;
    };
    exts.iter().any(|known| ext.eq_ignore_ascii_case(known))
}

pub fn is_supported_image(path: &Path) -> bool {
    has_extension(path, IMAGE_EXTS)
}

/// Supported image files directly inside `dir`, sorted by path.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, ImageError> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_supported_image(p))
        .collect();
    files.sort();
    Ok(files)
}

/// `<stem>_<suffix>.<ext>` next to `path`.
pub fn output_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}_{}", stem, suffix),
    };
    path.with_file_name(name)
}
