//! XMP in JPEG APP1 segments.
//!
//! After the SOI marker a JPEG is a run of `0xFF xx` markers. Most carry a
//! big-endian length that counts itself; `0xFF` fill bytes and the
//! standalone markers `0xD0..=0xD9` carry none. Entropy-coded data follows
//! SOS, so the scan stops there.

use super::cursor::{be_u16, splice, Cursor, Framing, Record, Step};
use super::{ImageFormat, XmpCodec};
use crate::error::{Error, ParseError, Result};

const SOI: [u8; 2] = [0xFF, 0xD8];
const MARKER_APP1: u8 = 0xE1;
const MARKER_SOS: u8 = 0xDA;

/// Namespace signature (with its NUL) that opens an XMP APP1 payload.
pub const XMP_HEADER: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";

/// Largest value of the 16-bit segment length field.
const MAX_SEGMENT_LEN: usize = u16::MAX as usize;

/// Largest XMP packet, in UTF-8 bytes, that fits one APP1 segment.
pub const MAX_XMP_LEN: usize = MAX_SEGMENT_LEN - 2 - XMP_HEADER.len();

pub(crate) struct JpegFraming;

impl Framing for JpegFraming {
    type Kind = u8;
    const START: usize = SOI.len();

    fn step(buf: &[u8], pos: usize) -> std::result::Result<Step<u8>, ParseError> {
        let lead = *buf.get(pos).ok_or(ParseError::Truncated { offset: pos })?;
        if lead != 0xFF {
            return Err(ParseError::BadMarker { offset: pos, byte: lead });
        }
        let marker = *buf.get(pos + 1).ok_or(ParseError::Truncated { offset: pos })?;

        match marker {
            // Fill byte: the next 0xFF starts the real marker.
            0xFF => Ok(Step::Skip(pos + 1)),
            0xD0..=0xD9 => Ok(Step::Skip(pos + 2)),
            MARKER_SOS => Ok(Step::End),
            _ => {
                let length =
                    be_u16(buf, pos + 2).ok_or(ParseError::Truncated { offset: pos })? as usize;
                if length < 2 {
                    return Err(ParseError::BadLength { offset: pos, length });
                }
                let end = pos + 2 + length;
                if end > buf.len() {
                    return Err(ParseError::Truncated { offset: pos });
                }
                Ok(Step::Record(Record {
                    kind: marker,
                    span: pos..end,
                    payload: pos + 4..end,
                }))
            }
        }
    }
}

/// JPEG implementation of [`XmpCodec`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegCodec;

impl XmpCodec for JpegCodec {
    fn name(&self) -> &'static str {
        "JPEG"
    }

    fn read_xmp(&self, buf: &[u8]) -> Option<String> {
        read_xmp(buf)
    }

    fn write_xmp(&self, buf: &[u8], xmp: &str) -> Result<Vec<u8>> {
        write_xmp(buf, xmp)
    }
}

fn is_jpeg(buf: &[u8]) -> bool {
    buf.starts_with(&SOI)
}

/// First APP1 segment whose payload opens with [`XMP_HEADER`].
fn find_xmp_segment(buf: &[u8]) -> Option<Record<u8>> {
    Cursor::<JpegFraming>::new(buf).find(|record| {
        record.kind == MARKER_APP1 && buf[record.payload.clone()].starts_with(XMP_HEADER)
    })
}

/// Read the XMP packet of a JPEG, if it has one.
pub fn read_xmp(buf: &[u8]) -> Option<String> {
    if !is_jpeg(buf) {
        return None;
    }
    let segment = find_xmp_segment(buf)?;
    let packet = &buf[segment.payload.start + XMP_HEADER.len()..segment.payload.end];
    Some(String::from_utf8_lossy(packet).into_owned())
}

/// Build a complete APP1 segment carrying `xmp`.
fn build_segment(xmp: &str) -> Result<Vec<u8>> {
    let length = 2 + XMP_HEADER.len() + xmp.len();
    if length > MAX_SEGMENT_LEN {
        return Err(Error::CapacityExceeded {
            format: ImageFormat::Jpeg,
            size: length,
            limit: MAX_SEGMENT_LEN,
        });
    }

    let mut segment = Vec::with_capacity(2 + length);
    segment.extend_from_slice(&[0xFF, MARKER_APP1]);
    segment.extend_from_slice(&(length as u16).to_be_bytes());
    segment.extend_from_slice(XMP_HEADER);
    segment.extend_from_slice(xmp.as_bytes());
    Ok(segment)
}

/// Return a copy of `buf` carrying `xmp` in its XMP APP1 segment.
///
/// An existing XMP segment is replaced where it stands; otherwise the new
/// segment becomes the first one after SOI.
pub fn write_xmp(buf: &[u8], xmp: &str) -> Result<Vec<u8>> {
    if !is_jpeg(buf) {
        return Err(Error::FormatMismatch {
            format: ImageFormat::Jpeg,
        });
    }
    let segment = build_segment(xmp)?;

    let target = match find_xmp_segment(buf) {
        Some(existing) => existing.span,
        None => SOI.len()..SOI.len(),
    };
    Ok(splice(buf, target, &segment))
}
