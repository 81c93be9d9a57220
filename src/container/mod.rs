//! Container formats that can carry an XMP packet.
//!
//! Every codec is a pure transform over an in-memory file: reads borrow the
//! buffer, writes return a new one and never touch the input.
//!
//! | Format | Carrier |
//! |--------|---------|
//! | JPEG | APP1 segment prefixed with `http://ns.adobe.com/xap/1.0/\0` |
//! | PNG | `iTXt` chunk keyed `XML:com.adobe.xmp` |
//! | WebP | `XMP ` RIFF chunk, announced by a `VP8X` header |

pub(crate) mod cursor;
pub mod jpeg;
pub mod png;
pub mod webp;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::Result;
use crate::xmp;

pub use jpeg::JpegCodec;
pub use png::PngCodec;
pub use webp::WebPCodec;

/// Reads and writes the raw XMP packet of one container format.
pub trait XmpCodec {
    /// Short format name for logs and messages.
    fn name(&self) -> &'static str;

    /// The embedded XMP packet, or `None` when absent or unreadable.
    fn read_xmp(&self, buf: &[u8]) -> Option<String>;

    /// A copy of `buf` whose XMP packet is `xmp`, replacing any existing one.
    fn write_xmp(&self, buf: &[u8], xmp: &str) -> Result<Vec<u8>>;
}

/// Image formats with native XMP support.
///
/// ```rust
/// use xmp_caption::ImageFormat;
/// use std::path::Path;
///
/// assert_eq!(ImageFormat::from_path(Path::new("photo.JPG")), Some(ImageFormat::Jpeg));
/// assert_eq!(ImageFormat::detect(b"\x89PNG\r\n\x1a\n"), Some(ImageFormat::Png));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    WebP,
}

impl ImageFormat {
    /// Identify a buffer by its magic signature.
    pub fn detect(buf: &[u8]) -> Option<Self> {
        if buf.starts_with(&[0xFF, 0xD8]) {
            Some(Self::Jpeg)
        } else if buf.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(Self::Png)
        } else if buf.len() >= 12 && buf.starts_with(b"RIFF") && &buf[8..12] == b"WEBP" {
            Some(Self::WebP)
        } else {
            None
        }
    }

    /// Determine the format from a file path extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
        }
    }

    pub fn codec(&self) -> &'static dyn XmpCodec {
        match self {
            Self::Jpeg => &JpegCodec,
            Self::Png => &PngCodec,
            Self::WebP => &WebPCodec,
        }
    }

    pub fn read_xmp(&self, buf: &[u8]) -> Option<String> {
        self.codec().read_xmp(buf)
    }

    pub fn write_xmp(&self, buf: &[u8], xmp: &str) -> Result<Vec<u8>> {
        self.codec().write_xmp(buf, xmp)
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.codec().name())
    }
}

/// The `dc:description` of an image, or an empty string when it has none.
pub fn read_description(buf: &[u8], format: ImageFormat) -> String {
    format
        .read_xmp(buf)
        .map(|packet| xmp::extract_description(&packet))
        .unwrap_or_default()
}

/// A copy of `buf` whose `dc:description` is `description`.
///
/// The current packet is re-read from `buf` and merged, so unrelated XMP
/// properties survive the edit.
pub fn write_description(buf: &[u8], format: ImageFormat, description: &str) -> Result<Vec<u8>> {
    let existing = format.read_xmp(buf);
    let packet = xmp::build_xmp_xml(existing.as_deref(), description);
    format.write_xmp(buf, &packet)
}
