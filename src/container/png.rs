//! XMP in a PNG `iTXt` chunk.
//!
//! Chunks are `length (BE u32) | type | data | CRC-32(type + data)`. XMP is
//! carried uncompressed in an `iTXt` chunk keyed `XML:com.adobe.xmp`:
//!
//! ```text
//! keyword \0 | compression flag | compression method | language \0 | translated keyword \0 | text
//! ```

use crc32fast::Hasher;

use super::cursor::{be_u32, fourcc, splice, Cursor, Framing, Record, Step, Stop};
use super::{ImageFormat, XmpCodec};
use crate::error::{Error, ParseError, Result};

const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

const ITXT: [u8; 4] = *b"iTXt";
const IDAT: [u8; 4] = *b"IDAT";
const IEND: [u8; 4] = *b"IEND";

/// Reserved `iTXt` keyword for XMP packets.
pub const XMP_KEYWORD: &str = "XML:com.adobe.xmp";

/// Chunk lengths are limited to 2^31 - 1.
const MAX_CHUNK_LEN: usize = i32::MAX as usize;

pub(crate) struct PngFraming;

impl Framing for PngFraming {
    type Kind = [u8; 4];
    const START: usize = SIGNATURE.len();

    fn step(buf: &[u8], pos: usize) -> std::result::Result<Step<[u8; 4]>, ParseError> {
        let length = be_u32(buf, pos).ok_or(ParseError::Truncated { offset: pos })? as usize;
        let kind = fourcc(buf, pos + 4).ok_or(ParseError::Truncated { offset: pos })?;
        if kind == IEND {
            return Ok(Step::End);
        }

        let data_start = pos + 8;
        let data_end = data_start
            .checked_add(length)
            .ok_or(ParseError::BadLength { offset: pos, length })?;
        let end = data_end + 4;
        if end > buf.len() {
            return Err(ParseError::Truncated { offset: pos });
        }
        Ok(Step::Record(Record {
            kind,
            span: pos..end,
            payload: data_start..data_end,
        }))
    }
}

/// PNG implementation of [`XmpCodec`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PngCodec;

impl XmpCodec for PngCodec {
    fn name(&self) -> &'static str {
        "PNG"
    }

    fn read_xmp(&self, buf: &[u8]) -> Option<String> {
        read_xmp(buf)
    }

    fn write_xmp(&self, buf: &[u8], xmp: &str) -> Result<Vec<u8>> {
        write_xmp(buf, xmp)
    }
}

fn is_png(buf: &[u8]) -> bool {
    buf.starts_with(&SIGNATURE)
}

/// Split at the first NUL, dropping it.
fn split_nul(data: &[u8]) -> Option<(&[u8], &[u8])> {
    let nul = data.iter().position(|&b| b == 0)?;
    Some((&data[..nul], &data[nul + 1..]))
}

/// The keyword of an `iTXt` chunk. Keywords are Latin-1.
fn itxt_keyword(data: &[u8]) -> Option<String> {
    let (keyword, _) = split_nul(data)?;
    Some(keyword.iter().copied().map(char::from).collect())
}

fn is_xmp_chunk(buf: &[u8], record: &Record<[u8; 4]>) -> bool {
    record.kind == ITXT
        && itxt_keyword(&buf[record.payload.clone()]).as_deref() == Some(XMP_KEYWORD)
}

/// The text field of an uncompressed `iTXt` chunk.
fn itxt_text(data: &[u8]) -> Option<&[u8]> {
    let (_, rest) = split_nul(data)?;
    let [flag, _method, rest @ ..] = rest else {
        log::debug!("iTXt chunk ends inside its compression fields");
        return None;
    };
    if *flag != 0 {
        log::debug!("compressed XMP iTXt chunks are not supported");
        return None;
    }
    let (_language, rest) = split_nul(rest)?;
    let (_translated, text) = split_nul(rest)?;
    Some(text)
}

/// Read the XMP packet of a PNG, if it has one.
pub fn read_xmp(buf: &[u8]) -> Option<String> {
    if !is_png(buf) {
        return None;
    }
    let chunk = Cursor::<PngFraming>::new(buf).find(|record| is_xmp_chunk(buf, record))?;
    let text = itxt_text(&buf[chunk.payload])?;
    Some(String::from_utf8_lossy(text).into_owned())
}

/// CRC-32 (IEEE, reflected `0xEDB88320`) over chunk type and data.
pub(crate) fn chunk_crc(kind: [u8; 4], data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&kind);
    hasher.update(data);
    hasher.finalize()
}

/// Frame `data` as a complete chunk with a fresh CRC.
pub(crate) fn chunk(kind: [u8; 4], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() > MAX_CHUNK_LEN {
        return Err(Error::CapacityExceeded {
            format: ImageFormat::Png,
            size: data.len(),
            limit: MAX_CHUNK_LEN,
        });
    }
    let mut out = Vec::with_capacity(12 + data.len());
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(&kind);
    out.extend_from_slice(data);
    out.extend_from_slice(&chunk_crc(kind, data).to_be_bytes());
    Ok(out)
}

fn build_chunk(xmp: &str) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(XMP_KEYWORD.len() + 5 + xmp.len());
    data.extend_from_slice(XMP_KEYWORD.as_bytes());
    // Keyword terminator, uncompressed, method 0, empty language, empty translation.
    data.extend_from_slice(&[0, 0, 0, 0, 0]);
    data.extend_from_slice(xmp.as_bytes());
    chunk(ITXT, &data)
}

/// Return a copy of `buf` carrying `xmp` in its XMP `iTXt` chunk.
///
/// An existing XMP chunk is replaced where it stands. Otherwise the new chunk
/// goes before the first `IDAT`, or where the scan stopped (normally `IEND`).
pub fn write_xmp(buf: &[u8], xmp: &str) -> Result<Vec<u8>> {
    if !is_png(buf) {
        return Err(Error::FormatMismatch {
            format: ImageFormat::Png,
        });
    }
    let new_chunk = build_chunk(xmp)?;

    let mut cursor = Cursor::<PngFraming>::new(buf);
    let mut first_idat = None;
    let mut existing = None;
    for record in cursor.by_ref() {
        if is_xmp_chunk(buf, &record) {
            existing = Some(record.span);
            break;
        }
        if record.kind == IDAT && first_idat.is_none() {
            first_idat = Some(record.span.start);
        }
    }

    let target = match existing {
        Some(span) => span,
        None => {
            if let Some(Stop::Malformed(err)) = cursor.stop() {
                log::debug!(
                    "PNG chunk stream is damaged ({err}); inserting XMP at offset {}",
                    cursor.position()
                );
            }
            let at = first_idat.unwrap_or_else(|| cursor.position());
            at..at
        }
    };
    Ok(splice(buf, target, &new_chunk))
}
