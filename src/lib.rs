//! # xmp-caption
//!
//! Read and write the XMP `dc:description` (caption) of JPEG, PNG and WebP
//! images, without re-encoding pixels and without disturbing any other
//! metadata in the file.
//!
//! ## Quick Start
//!
//! The description API works on in-memory files. Writes return a new buffer
//! and leave the input untouched:
//!
//! ```rust,no_run
//! use xmp_caption::{read_description, write_description, ImageFormat};
//!
//! fn main() -> anyhow::Result<()> {
//!     let bytes = std::fs::read("photo.jpg")?;
//!     let format = ImageFormat::detect(&bytes).unwrap_or(ImageFormat::Jpeg);
//!
//!     println!("Current: {:?}", read_description(&bytes, format));
//!
//!     let updated = write_description(&bytes, format, "Harbour at dawn")?;
//!     std::fs::write("photo.jpg", updated)?;
//!     Ok(())
//! }
//! ```
//!
//! ## File Pipeline
//!
//! For batches of files on disk, the pipeline module handles collection,
//! dry runs and backups:
//!
//! ```rust,no_run
//! use xmp_caption::config::Config;
//! use xmp_caption::pipeline::{collect_images, write_image};
//! use std::path::PathBuf;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load(Some("config.json".as_ref()))?;
//!     let images = collect_images(&[PathBuf::from("./photos")], &config.scan);
//!
//!     for path in &images {
//!         let result = write_image(path, "Holiday 2024", &config);
//!         if let Some(ref err) = result.error {
//!             eprintln!("Error processing {}: {err}", path.display());
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Formats
//!
//! | Format | XMP carrier |
//! |--------|-------------|
//! | JPEG (`.jpg`, `.jpeg`) | APP1 segment, packet up to [`container::jpeg::MAX_XMP_LEN`] bytes |
//! | PNG (`.png`) | Uncompressed `iTXt` chunk keyed `XML:com.adobe.xmp` |
//! | WebP (`.webp`) | `XMP ` chunk; simple files are promoted to the extended (`VP8X`) layout |
//!
//! ## Modules
//!
//! - [`container`]: per-format framing and raw XMP packet access
//! - [`xmp`]: `dc:description` extraction and packet merging
//! - [`error`]: typed errors of the codec core
//! - [`config`]: configuration types and loading/saving
//! - [`pipeline`]: image collection and file-level read/write

pub mod config;
pub mod container;
pub mod error;
pub mod pipeline;
pub mod xmp;

pub use container::{read_description, write_description, ImageFormat, XmpCodec};
pub use error::{Error, ParseError, Result};
pub use xmp::{build_xmp_xml, extract_description};
