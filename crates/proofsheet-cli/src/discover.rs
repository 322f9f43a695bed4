//! Input file discovery.
//!
//! Directories are scanned one level deep; files passed explicitly are taken
//! as-is if their extension is a supported image type.

use anyhow::{Context, Result};
use proofsheet_core::SourceFile;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "gif", "tif", "tiff", "heic", "avif",
];

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Expand `paths` into image files. Directory entries are sorted by name so
/// uploads happen in a stable order; duplicates are dropped.
pub fn discover_images(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();

    for path in paths {
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        if metadata.is_dir() {
            let mut entries = Vec::new();
            for entry in std::fs::read_dir(path)
                .with_context(|| format!("Failed to list directory {}", path.display()))?
            {
                let entry = entry
                    .with_context(|| format!("Failed to list directory {}", path.display()))?;
                let entry_path = entry.path();
                if entry_path.is_file() && is_supported_image(&entry_path) {
                    entries.push(entry_path);
                }
            }
            entries.sort();
            found.extend(entries);
        } else if is_supported_image(path) {
            found.push(path.clone());
        } else {
            tracing::warn!(path = %path.display(), "Skipping unsupported file");
        }
    }

    let mut seen = std::collections::HashSet::new();
    found.retain(|p| seen.insert(p.clone()));
    Ok(found)
}

/// Stat every file. Contents are read by the pipeline once an item is
/// admitted, so a large batch never sits in memory.
pub async fn open_sources(paths: &[PathBuf]) -> Result<Vec<SourceFile>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let file = SourceFile::open(path)
            .await
            .with_context(|| format!("Failed to open file: {}", path.display()))?;
        files.push(file);
    }
    Ok(files)
}
