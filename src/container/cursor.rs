//! Shared scanning over segment/chunk framed containers.
//!
//! Each format describes how one record header is laid out by implementing
//! [`Framing`]; [`Cursor`] drives that description over a buffer and yields
//! [`Record`]s (offsets only, payloads are never copied). Bounds checks live
//! here and in the byte readers below, so every format stops cleanly on a
//! truncated or malformed trailer instead of reading past the buffer.

use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::ops::Range;

use crate::error::ParseError;

/// One framed segment or chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Record<K> {
    pub kind: K,
    /// The whole record: header, payload and any trailer or padding.
    pub span: Range<usize>,
    pub payload: Range<usize>,
}

/// Outcome of decoding the header at one offset.
#[derive(Debug)]
pub(crate) enum Step<K> {
    Record(Record<K>),
    /// Move to this offset without yielding (fill bytes, standalone markers).
    Skip(usize),
    /// End-of-metadata marker at the current offset.
    End,
}

/// Per-format header grammar.
pub(crate) trait Framing {
    type Kind: Copy + PartialEq;

    /// Offset of the first record, just past the file signature.
    const START: usize;

    /// Decode the header at `pos`. Called only with `pos < buf.len()`.
    fn step(buf: &[u8], pos: usize) -> Result<Step<Self::Kind>, ParseError>;
}

/// Why a scan ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Stop {
    /// Terminal marker reached, or the buffer was exhausted on a record boundary.
    Complete,
    /// A record could not be decoded; nothing after it was scanned.
    Malformed(ParseError),
}

/// Lazy, single-pass iterator over the records of one buffer.
pub(crate) struct Cursor<'a, F: Framing> {
    buf: &'a [u8],
    pos: usize,
    stop: Option<Stop>,
    framing: PhantomData<F>,
}

impl<'a, F: Framing> Cursor<'a, F> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: F::START.min(buf.len()),
            stop: None,
            framing: PhantomData,
        }
    }

    /// Offset of the next unread byte; once the scan is over, where it stopped.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn stop(&self) -> Option<&Stop> {
        self.stop.as_ref()
    }

    fn halt(&mut self, err: ParseError) {
        log::debug!("container scan stopped early: {err}");
        self.stop = Some(Stop::Malformed(err));
    }
}

impl<F: Framing> Iterator for Cursor<'_, F> {
    type Item = Record<F::Kind>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.stop.is_none() {
            if self.pos >= self.buf.len() {
                self.stop = Some(Stop::Complete);
                break;
            }
            match F::step(self.buf, self.pos) {
                Ok(Step::Record(record)) => {
                    if record.span.end <= self.pos || record.span.end > self.buf.len() {
                        self.halt(ParseError::Truncated { offset: self.pos });
                        break;
                    }
                    self.pos = record.span.end;
                    return Some(record);
                }
                Ok(Step::Skip(next)) if next > self.pos => self.pos = next.min(self.buf.len()),
                Ok(Step::Skip(_)) => self.halt(ParseError::Truncated { offset: self.pos }),
                Ok(Step::End) => self.stop = Some(Stop::Complete),
                Err(err) => self.halt(err),
            }
        }
        None
    }
}

impl<F: Framing> FusedIterator for Cursor<'_, F> {}

fn bytes<const N: usize>(buf: &[u8], at: usize) -> Option<[u8; N]> {
    buf.get(at..at.checked_add(N)?)?.try_into().ok()
}

pub(crate) fn fourcc(buf: &[u8], at: usize) -> Option<[u8; 4]> {
    bytes(buf, at)
}

pub(crate) fn be_u16(buf: &[u8], at: usize) -> Option<u16> {
    bytes(buf, at).map(u16::from_be_bytes)
}

pub(crate) fn be_u32(buf: &[u8], at: usize) -> Option<u32> {
    bytes(buf, at).map(u32::from_be_bytes)
}

pub(crate) fn le_u16(buf: &[u8], at: usize) -> Option<u16> {
    bytes(buf, at).map(u16::from_le_bytes)
}

pub(crate) fn le_u32(buf: &[u8], at: usize) -> Option<u32> {
    bytes(buf, at).map(u32::from_le_bytes)
}

/// Copy of `buf` with `range` replaced by `insert`. An empty range inserts.
pub(crate) fn splice(buf: &[u8], range: Range<usize>, insert: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(buf.len() - range.len() + insert.len());
    out.extend_from_slice(&buf[..range.start]);
    out.extend_from_slice(insert);
    out.extend_from_slice(&buf[range.end..]);
    out
}
