use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::{Config, ScanConfig};
use crate::container::{self, ImageFormat};

/// What an image currently carries.
///
/// # Example
///
/// ```rust,no_run
/// use xmp_caption::pipeline::read_image;
///
/// let report = read_image("photo.webp".as_ref()).unwrap();
/// println!("{} ({}): {}", report.path.display(), report.format, report.description);
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ImageReport {
    pub path: PathBuf,
    pub format: ImageFormat,
    /// `dc:description`, empty when absent.
    pub description: String,
    /// The raw embedded XMP packet, if any.
    pub xmp: Option<String>,
}

/// The result of writing a description to a single image.
///
/// # Example
///
/// ```rust,no_run
/// use xmp_caption::config::Config;
/// use xmp_caption::pipeline::write_image;
///
/// let result = write_image("photo.jpg".as_ref(), "Harbour at dawn", &Config::default());
/// if result.error.is_none() {
///     println!("Was: {:?}", result.previous_description);
///     if let Some(ref backup) = result.backup_path {
///         println!("Backup: {}", backup.display());
///     }
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub path: PathBuf,
    /// The format the file was handled as.
    pub format: Option<ImageFormat>,
    /// The description before the write.
    pub previous_description: Option<String>,
    /// `false` for dry runs and failures.
    pub description_written: bool,
    pub backup_path: Option<PathBuf>,
    pub error: Option<String>,
}

/// Collect supported image files from the given paths.
///
/// Accepts a mix of file paths and directory paths. Only files whose
/// extension maps to an [`ImageFormat`] are included.
///
/// # Example
///
/// ```rust,no_run
/// use xmp_caption::config::ScanConfig;
/// use xmp_caption::pipeline::collect_images;
/// use std::path::PathBuf;
///
/// let images = collect_images(
///     &[
///         PathBuf::from("photo.jpg"),  // single file
///         PathBuf::from("./photos/"),  // entire directory
///     ],
///     &ScanConfig::default(),
/// );
/// println!("Found {} images", images.len());
/// ```
pub fn collect_images(paths: &[PathBuf], scan: &ScanConfig) -> Vec<PathBuf> {
    let mut images = Vec::new();

    for path in paths {
        if path.is_file() {
            if is_supported_image(path) {
                images.push(path.clone());
            } else {
                log::warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            let mut walker = WalkDir::new(path).follow_links(scan.follow_links).sort_by_file_name();
            if !scan.recursive {
                walker = walker.max_depth(1);
            }
            for entry in walker.into_iter().filter_map(|e| e.ok()) {
                let p = entry.path();
                if p.is_file() && is_supported_image(p) {
                    images.push(p.to_path_buf());
                }
            }
        } else {
            log::warn!("Path does not exist: {}", path.display());
        }
    }

    images
}

/// Check if a file has a supported image extension.
fn is_supported_image(path: &Path) -> bool {
    ImageFormat::from_path(path).is_some()
}

/// Create a backup of the original file, once.
fn backup_file(path: &Path) -> Result<PathBuf> {
    let backup_path = path.with_extension(format!(
        "{}.bak",
        path.extension().unwrap_or_default().to_string_lossy()
    ));

    if !backup_path.exists() {
        std::fs::copy(path, &backup_path).context("Failed to create backup")?;
        log::debug!("Backup created: {}", backup_path.display());
    }

    Ok(backup_path)
}

/// Magic bytes win over the extension, so a mislabelled file is still handled.
fn resolve_format(path: &Path, bytes: &[u8]) -> Option<ImageFormat> {
    let detected = ImageFormat::detect(bytes);
    let by_name = ImageFormat::from_path(path);
    if let (Some(detected), Some(by_name)) = (detected, by_name) {
        if detected != by_name {
            log::warn!(
                "{} looks like {detected}, not {by_name}; using {detected}",
                path.display()
            );
        }
    }
    detected.or(by_name)
}

/// Read the description and raw XMP of an image file.
pub fn read_image(path: &Path) -> Result<ImageReport> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let format = resolve_format(path, &bytes)
        .with_context(|| format!("Unsupported image format: {}", path.display()))?;

    let xmp = format.read_xmp(&bytes);
    let description = xmp
        .as_deref()
        .map(crate::xmp::extract_description)
        .unwrap_or_default();

    Ok(ImageReport {
        path: path.to_path_buf(),
        format,
        description,
        xmp,
    })
}

/// Write `description` into an image file.
///
/// The file is read fresh, so concurrent edits by other tools between calls
/// are merged rather than overwritten. Failures are reported in
/// [`ProcessResult::error`].
pub fn write_image(path: &Path, description: &str, config: &Config) -> ProcessResult {
    let mut result = ProcessResult {
        path: path.to_path_buf(),
        format: None,
        previous_description: None,
        description_written: false,
        backup_path: None,
        error: None,
    };

    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            result.error = Some(format!("Failed to read file: {e}"));
            return result;
        }
    };

    let Some(format) = resolve_format(path, &bytes) else {
        result.error = Some("Unsupported image format".to_string());
        return result;
    };
    result.format = Some(format);
    result.previous_description = Some(container::read_description(&bytes, format));

    let updated = match container::write_description(&bytes, format, description) {
        Ok(updated) => updated,
        Err(e) => {
            result.error = Some(format!("Failed to write metadata: {e}"));
            return result;
        }
    };

    if config.output.dry_run {
        log::info!("[dry run] would write {} bytes to {}", updated.len(), path.display());
        return result;
    }

    if config.output.backup_originals {
        match backup_file(path) {
            Ok(backup) => result.backup_path = Some(backup),
            Err(e) => {
                result.error = Some(format!("{e:#}"));
                return result;
            }
        }
    }

    match std::fs::write(path, &updated) {
        Ok(()) => {
            log::info!("Description written to {}", path.display());
            result.description_written = true;
        }
        Err(e) => result.error = Some(format!("Failed to write file: {e}")),
    }

    result
}
