//! XMP in a WebP `XMP ` RIFF chunk.
//!
//! A WebP file is `RIFF | size (LE u32) | WEBP` followed by chunks of
//! `FourCC | size (LE u32) | data`, each padded to an even length. Readers
//! only honour an `XMP ` chunk when a `VP8X` header declares it, so a simple
//! lossy (`VP8 `) or lossless (`VP8L`) file gains a synthesized `VP8X` first.

use super::cursor::{fourcc, le_u16, le_u32, splice, Cursor, Framing, Record, Step, Stop};
use super::{ImageFormat, XmpCodec};
use crate::error::{Error, ParseError, Result};

const RIFF: &[u8; 4] = b"RIFF";
const WEBP: &[u8; 4] = b"WEBP";
const HEADER_LEN: usize = 12;

const XMP: [u8; 4] = *b"XMP ";
const VP8X: [u8; 4] = *b"VP8X";
const VP8: [u8; 4] = *b"VP8 ";
const VP8L: [u8; 4] = *b"VP8L";

/// `VP8X` flags bit announcing XMP metadata.
pub const XMP_FLAG: u8 = 0x04;

const VP8X_DATA_LEN: usize = 10;
const VP8_START_CODE: [u8; 3] = [0x9D, 0x01, 0x2A];
const VP8L_SIGNATURE: u8 = 0x2F;

pub(crate) struct WebPFraming;

impl Framing for WebPFraming {
    type Kind = [u8; 4];
    const START: usize = HEADER_LEN;

    fn step(buf: &[u8], pos: usize) -> std::result::Result<Step<[u8; 4]>, ParseError> {
        let kind = fourcc(buf, pos).ok_or(ParseError::Truncated { offset: pos })?;
        let size = le_u32(buf, pos + 4).ok_or(ParseError::Truncated { offset: pos })? as usize;

        let data_start = pos + 8;
        let data_end = data_start
            .checked_add(size)
            .ok_or(ParseError::BadLength { offset: pos, length: size })?;
        if data_end > buf.len() {
            return Err(ParseError::Truncated { offset: pos });
        }
        // A missing pad byte at the very end of the file is tolerated.
        let end = (data_end + (size & 1)).min(buf.len());
        Ok(Step::Record(Record {
            kind,
            span: pos..end,
            payload: data_start..data_end,
        }))
    }
}

/// WebP implementation of [`XmpCodec`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WebPCodec;

impl XmpCodec for WebPCodec {
    fn name(&self) -> &'static str {
        "WebP"
    }

    fn read_xmp(&self, buf: &[u8]) -> Option<String> {
        read_xmp(buf)
    }

    fn write_xmp(&self, buf: &[u8], xmp: &str) -> Result<Vec<u8>> {
        write_xmp(buf, xmp)
    }
}

fn is_webp(buf: &[u8]) -> bool {
    buf.len() >= HEADER_LEN && buf.starts_with(RIFF) && &buf[8..12] == WEBP
}

/// Read the XMP packet of a WebP, if it has one.
pub fn read_xmp(buf: &[u8]) -> Option<String> {
    if !is_webp(buf) {
        return None;
    }
    let chunk = Cursor::<WebPFraming>::new(buf).find(|record| record.kind == XMP)?;
    Some(String::from_utf8_lossy(&buf[chunk.payload]).into_owned())
}

/// Frame `data` as a RIFF chunk, padded to even length.
fn riff_chunk(kind: [u8; 4], data: &[u8]) -> Result<Vec<u8>> {
    let size = u32::try_from(data.len()).map_err(|_| Error::CapacityExceeded {
        format: ImageFormat::WebP,
        size: data.len(),
        limit: u32::MAX as usize,
    })?;
    let mut out = Vec::with_capacity(8 + data.len() + 1);
    out.extend_from_slice(&kind);
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(data);
    if data.len() % 2 == 1 {
        out.push(0);
    }
    Ok(out)
}

/// Canvas size of a bare `VP8 ` or `VP8L` bitstream chunk.
fn canvas_size(buf: &[u8], record: &Record<[u8; 4]>) -> Option<(u32, u32)> {
    let data = &buf[record.payload.clone()];
    match record.kind {
        VP8 => {
            // 3-byte frame tag, 3-byte start code, then 14-bit width and height.
            if data.get(3..6) != Some(&VP8_START_CODE[..]) {
                log::debug!(
                    "VP8 frame header has no start code; reading dimensions at fixed offsets"
                );
            }
            let width = le_u16(data, 6)? & 0x3FFF;
            let height = le_u16(data, 8)? & 0x3FFF;
            Some((u32::from(width), u32::from(height)))
        }
        VP8L => {
            if data.first() != Some(&VP8L_SIGNATURE) {
                log::debug!("VP8L chunk lacks its 0x2F signature; reading dimensions anyway");
            }
            // 14 bits width - 1, 14 bits height - 1, alpha hint, 3-bit version.
            let bits = le_u32(data, 1)?;
            Some(((bits & 0x3FFF) + 1, ((bits >> 14) & 0x3FFF) + 1))
        }
        _ => None,
    }
}

/// `VP8X` payload declaring XMP and the given canvas.
fn vp8x_data(width: u32, height: u32) -> [u8; VP8X_DATA_LEN] {
    let mut data = [0u8; VP8X_DATA_LEN];
    data[0] = XMP_FLAG;
    data[4..7].copy_from_slice(&width.saturating_sub(1).to_le_bytes()[..3]);
    data[7..10].copy_from_slice(&height.saturating_sub(1).to_le_bytes()[..3]);
    data
}

/// Rewrite the RIFF size and force the XMP flag on the first `VP8X`.
fn finalize(out: &mut [u8]) -> Result<()> {
    let riff_size = u32::try_from(out.len() - 8).map_err(|_| Error::CapacityExceeded {
        format: ImageFormat::WebP,
        size: out.len() - 8,
        limit: u32::MAX as usize,
    })?;
    out[4..8].copy_from_slice(&riff_size.to_le_bytes());

    let flags_at = Cursor::<WebPFraming>::new(out)
        .find(|record| record.kind == VP8X && !record.payload.is_empty())
        .map(|record| record.payload.start);
    if let Some(at) = flags_at {
        out[at] |= XMP_FLAG;
    }
    Ok(())
}

/// Return a copy of `buf` carrying `xmp` in its `XMP ` chunk.
///
/// An existing `XMP ` chunk is replaced where it stands. Otherwise the chunk
/// is appended, after synthesizing a `VP8X` header for simple files that
/// have none. The RIFF size and the `VP8X` XMP flag are fixed up either way.
pub fn write_xmp(buf: &[u8], xmp: &str) -> Result<Vec<u8>> {
    if !is_webp(buf) {
        return Err(Error::FormatMismatch {
            format: ImageFormat::WebP,
        });
    }
    let xmp_chunk = riff_chunk(XMP, xmp.as_bytes())?;

    let mut existing = None;
    let mut has_vp8x = false;
    let mut bitstream = None;
    let mut cursor = Cursor::<WebPFraming>::new(buf);
    for record in cursor.by_ref() {
        match record.kind {
            XMP if existing.is_none() => existing = Some(record.span),
            VP8X => has_vp8x = true,
            VP8 | VP8L if bitstream.is_none() => bitstream = Some(record),
            _ => {}
        }
    }
    // End of the last complete chunk; a damaged tail stays behind the new chunk.
    let end = cursor.position();
    if let Some(Stop::Malformed(err)) = cursor.stop() {
        log::debug!("WebP is damaged after offset {end} ({err}); new chunks go before it");
    }

    let mut out = match (existing, has_vp8x) {
        (Some(span), _) => splice(buf, span, &xmp_chunk),
        (None, true) => insert_chunk(buf, end, &xmp_chunk),
        (None, false) => {
            let bitstream = bitstream.ok_or(Error::MissingBitstream)?;
            let (width, height) = canvas_size(buf, &bitstream).ok_or(Error::MissingBitstream)?;
            log::debug!("synthesizing VP8X header for a {width}x{height} canvas");
            let vp8x = riff_chunk(VP8X, &vp8x_data(width, height))?;
            let with_header = splice(buf, HEADER_LEN..HEADER_LEN, &vp8x);
            insert_chunk(&with_header, end + vp8x.len(), &xmp_chunk)
        }
    };

    finalize(&mut out)?;
    Ok(out)
}

/// Insert a chunk at a chunk boundary. At end of file a missing trailing pad
/// byte is restored first.
fn insert_chunk(buf: &[u8], at: usize, chunk: &[u8]) -> Vec<u8> {
    if at < buf.len() {
        return splice(buf, at..at, chunk);
    }
    let mut out = Vec::with_capacity(buf.len() + chunk.len() + 1);
    out.extend_from_slice(buf);
    if out.len() % 2 == 1 {
        out.push(0);
    }
    out.extend_from_slice(chunk);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webp(chunks: &[Vec<u8>]) -> Vec<u8> {
        let body: Vec<u8> = chunks.concat();
        let mut out = RIFF.to_vec();
        out.extend_from_slice(&((body.len() + 4) as u32).to_le_bytes());
        out.extend_from_slice(WEBP);
        out.extend(body);
        out
    }

    /// `VP8L` chunk for a `width` x `height` canvas with a dummy bitstream.
    fn vp8l(width: u32, height: u32) -> Vec<u8> {
        let bits = (width - 1) | ((height - 1) << 14);
        let mut data = vec![VP8L_SIGNATURE];
        data.extend_from_slice(&bits.to_le_bytes());
        data.extend_from_slice(&[0x00, 0x11, 0x22]);
        riff_chunk(VP8L, &data).unwrap()
    }

    /// `VP8 ` chunk for a `width` x `height` key frame with a dummy partition.
    fn vp8(width: u16, height: u16) -> Vec<u8> {
        let mut data = vec![0x30, 0x01, 0x00];
        data.extend_from_slice(&VP8_START_CODE);
        data.extend_from_slice(&width.to_le_bytes());
        data.extend_from_slice(&height.to_le_bytes());
        data.extend_from_slice(&[0xAA; 7]);
        riff_chunk(VP8, &data).unwrap()
    }

    fn records(buf: &[u8]) -> Vec<Record<[u8; 4]>> {
        Cursor::<WebPFraming>::new(buf).collect()
    }

    fn le_u24(bytes: &[u8]) -> u32 {
        u32::from(bytes[0]) | u32::from(bytes[1]) << 8 | u32::from(bytes[2]) << 16
    }

    fn riff_size(buf: &[u8]) -> usize {
        u32::from_le_bytes(buf[4..8].try_into().unwrap()) as usize
    }

    #[test]
    fn lossless_file_gains_vp8x_header() {
        let original = webp(&[vp8l(100, 50)]);
        let out = write_xmp(&original, "<x/>").unwrap();

        let found = records(&out);
        let kinds: Vec<[u8; 4]> = found.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![VP8X, VP8L, XMP]);

        let vp8x = &out[found[0].payload.clone()];
        assert_eq!(vp8x.len(), VP8X_DATA_LEN);
        assert_eq!(vp8x[0] & XMP_FLAG, XMP_FLAG);
        assert_eq!(le_u24(&vp8x[4..7]), 99);
        assert_eq!(le_u24(&vp8x[7..10]), 49);

        assert_eq!(riff_size(&out), out.len() - 8);
        assert_eq!(read_xmp(&out).as_deref(), Some("<x/>"));
        // Original image chunk is untouched.
        assert_eq!(&out[found[1].span.clone()], &original[HEADER_LEN..]);
    }

    #[test]
    fn lossy_file_dimensions_come_from_frame_header() {
        let out = write_xmp(&webp(&[vp8(640, 480)]), "<x/>").unwrap();
        let found = records(&out);
        let vp8x = &out[found[0].payload.clone()];
        assert_eq!(found[0].kind, VP8X);
        assert_eq!(le_u24(&vp8x[4..7]), 639);
        assert_eq!(le_u24(&vp8x[7..10]), 479);
    }

    #[test]
    fn lossy_dimension_fields_are_masked_to_14_bits() {
        // Upper two bits hold the scaling code.
        let out = write_xmp(&webp(&[vp8(0xC000 | 320, 0x4000 | 200)]), "<x/>").unwrap();
        let found = records(&out);
        let vp8x = &out[found[0].payload.clone()];
        assert_eq!(le_u24(&vp8x[4..7]), 319);
        assert_eq!(le_u24(&vp8x[7..10]), 199);
    }

    #[test]
    fn lossy_dimensions_are_read_without_start_code() {
        let mut data = vec![0x30, 0x01, 0x00, 0x00, 0x00, 0x00];
        data.extend_from_slice(&(0xC000 | 321u16).to_le_bytes());
        data.extend_from_slice(&(0x4000 | 201u16).to_le_bytes());
        data.extend_from_slice(&[0xAA; 7]);
        let chunk = riff_chunk(VP8, &data).unwrap();

        let out = write_xmp(&webp(&[chunk.clone()]), "<x/>").unwrap();
        let found = records(&out);
        let vp8x = &out[found[0].payload.clone()];
        assert_eq!(found[0].kind, VP8X);
        assert_eq!(le_u24(&vp8x[4..7]), 320);
        assert_eq!(le_u24(&vp8x[7..10]), 200);
        assert_eq!(&out[found[1].span.clone()], &chunk[..]);
        assert_eq!(read_xmp(&out).as_deref(), Some("<x/>"));
    }

    #[test]
    fn extended_file_gets_chunk_appended_and_flag_forced() {
        let mut header = [0u8; VP8X_DATA_LEN];
        header[0] = 0x10; // alpha
        let original = webp(&[
            riff_chunk(VP8X, &header).unwrap(),
            riff_chunk(*b"ALPH", &[1, 2, 3]).unwrap(),
            vp8(16, 16),
        ]);

        let out = write_xmp(&original, "<odd>").unwrap();
        assert_eq!(out[HEADER_LEN + 8], 0x10 | XMP_FLAG);
        assert_eq!(&out[HEADER_LEN + 9..original.len()], &original[HEADER_LEN + 9..]);

        let found = records(&out);
        let last = found.last().unwrap();
        assert_eq!(last.kind, XMP);
        assert_eq!(last.payload.len(), 5);
        assert_eq!(last.span.len(), 8 + 6);
        assert_eq!(riff_size(&out), out.len() - 8);
    }

    #[test]
    fn existing_chunk_is_replaced_not_duplicated() {
        let original = webp(&[vp8l(8, 8)]);
        let first = write_xmp(&original, "<first/>").unwrap();
        let second = write_xmp(&first, "<the second packet/>").unwrap();

        let xmp_count = records(&second).iter().filter(|r| r.kind == XMP).count();
        let vp8x_count = records(&second).iter().filter(|r| r.kind == VP8X).count();
        assert_eq!(xmp_count, 1);
        assert_eq!(vp8x_count, 1);
        assert_eq!(read_xmp(&second).as_deref(), Some("<the second packet/>"));
        assert_eq!(riff_size(&second), second.len() - 8);
    }

    #[test]
    fn replacement_keeps_surrounding_chunks() {
        let original = webp(&[
            riff_chunk(VP8X, &vp8x_data(8, 8)).unwrap(),
            riff_chunk(XMP, b"<old/>").unwrap(),
            riff_chunk(*b"EXIF", b"II*\0").unwrap(),
            vp8l(8, 8),
        ]);
        let out = write_xmp(&original, "<new/>").unwrap();
        let kinds: Vec<[u8; 4]> = records(&out).iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![VP8X, XMP, *b"EXIF", VP8L]);
    }

    #[test]
    fn file_without_bitstream_cannot_gain_vp8x() {
        let original = webp(&[riff_chunk(*b"ICCP", &[0; 4]).unwrap()]);
        assert_eq!(write_xmp(&original, "<x/>"), Err(Error::MissingBitstream));
    }

    #[test]
    fn non_webp_input_fails_closed() {
        let riff_wave = b"RIFF\x04\0\0\0WAVE";
        assert_eq!(read_xmp(riff_wave), None);
        assert_eq!(
            write_xmp(riff_wave, "<x/>"),
            Err(Error::FormatMismatch {
                format: ImageFormat::WebP
            })
        );
        assert_eq!(read_xmp(b"RIFF"), None);
    }

    #[test]
    fn truncated_final_chunk_reads_as_none() {
        let mut buf = webp(&[vp8l(4, 4)]);
        buf.extend_from_slice(b"XMP ");
        buf.extend_from_slice(&100u32.to_le_bytes());
        buf.extend_from_slice(b"<x:xmpmeta");
        assert_eq!(read_xmp(&buf), None);
    }

    #[test]
    fn write_after_truncated_chunk_stays_readable() {
        let mut buf = webp(&[vp8l(4, 4)]);
        buf.extend_from_slice(b"ICCP");
        buf.extend_from_slice(&100u32.to_le_bytes());
        buf.extend_from_slice(b"partial");

        let out = write_xmp(&buf, "<x/>").unwrap();
        assert_eq!(read_xmp(&out).as_deref(), Some("<x/>"));
        assert!(out.ends_with(b"partial"));
        assert_eq!(riff_size(&out), out.len() - 8);
    }

    #[test]
    fn vp8x_payload_layout() {
        let data = vp8x_data(1, 0x1_0000);
        assert_eq!(data[0], XMP_FLAG);
        assert_eq!(&data[1..4], &[0, 0, 0]);
        assert_eq!(&data[4..7], &[0, 0, 0]);
        assert_eq!(&data[7..10], &[0xFF, 0xFF, 0x00]);
    }
}
