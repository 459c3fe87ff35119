//! Stream framing for response bytes
//!
//! A serial read returns whatever happens to be buffered, which may be half
//! a frame, two frames, or line noise. The assembler buffers the stream,
//! discards bytes until a `50 03` header is found, and cuts candidate frames
//! using the declared length byte. Each complete candidate is validated with
//! [`parse_response`]; one that fails gives up only its first byte, and the
//! scan for the next header resumes from there.
//!
//! A header whose declared length has not arrived yet is not allowed to hold
//! back frames behind it: if a later header already starts a complete frame
//! with a valid checksum, the bytes in front of it are skipped.

use thiserror::Error;
use tracing::trace;

use crate::checksum::verify_checksum;
use crate::frame::{parse_response, ParseError, DEVICE_ID, FRAME_OVERHEAD, READ_REGISTERS};

const SYNC_PATTERN: [u8; 2] = [DEVICE_ID, READ_REGISTERS];

/// Largest buffered backlog before the buffer is dropped
pub const MAX_BUFFERED: usize = 1024;

/// A complete candidate that failed validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{error}")]
pub struct RejectedFrame {
    /// Candidate bytes as cut by the declared length
    pub bytes: Vec<u8>,
    pub error: ParseError,
}

/// Accumulates link bytes and yields validated response frames
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buffer: Vec<u8>,
    skipped: usize,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes received from the link.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
        if self.buffer.len() > MAX_BUFFERED {
            trace!("Assembler overflow, dropping {} bytes", self.buffer.len());
            self.skipped += self.buffer.len();
            self.buffer.clear();
        }
    }

    /// Cut the next candidate out of the buffer, if one is complete.
    ///
    /// Returns `Ok` with a frame that passed [`parse_response`], or `Err`
    /// with a rejected candidate. A rejected candidate stays in the buffer
    /// minus its first byte, so frames overlapping it are still found.
    pub fn next_frame(&mut self) -> Option<Result<Vec<u8>, RejectedFrame>> {
        self.resync();

        let frame_len = match candidate_len(&self.buffer) {
            Some(len) if len <= self.buffer.len() => len,
            _ => {
                // Head candidate incomplete; a verified frame behind it wins
                let start = self.find_verified_frame()?;
                trace!("Assembler skipping {start} bytes of a stalled header");
                self.skipped += start;
                self.buffer.drain(..start);
                candidate_len(&self.buffer)?
            }
        };

        match parse_response(&self.buffer[..frame_len]) {
            Ok(_) => Some(Ok(self.buffer.drain(..frame_len).collect())),
            Err(error) => {
                let bytes = self.buffer[..frame_len].to_vec();
                self.skipped += 1;
                self.buffer.remove(0);
                Some(Err(RejectedFrame { bytes, error }))
            }
        }
    }

    /// Number of bytes currently buffered
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes discarded while searching for a header
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Discard everything buffered.
    pub fn clear(&mut self) {
        self.skipped += self.buffer.len();
        self.buffer.clear();
    }

    fn resync(&mut self) {
        let start = find_sync(&self.buffer).unwrap_or_else(|| {
            // Keep a trailing device id, it may be the first half of a header
            match self.buffer.last() {
                Some(&DEVICE_ID) => self.buffer.len() - 1,
                _ => self.buffer.len(),
            }
        });

        if start > 0 {
            trace!("Assembler skipping {start} bytes: {:02x?}", &self.buffer[..start]);
            self.skipped += start;
            self.buffer.drain(..start);
        }
    }

    /// Offset of the first header past the head that starts a complete
    /// frame with a valid checksum
    fn find_verified_frame(&self) -> Option<usize> {
        let mut from = 1;
        while let Some(offset) = self.buffer.get(from..).and_then(find_sync) {
            let start = from + offset;
            let rest = &self.buffer[start..];
            if let Some(len) = candidate_len(rest) {
                if len <= rest.len() && verify_checksum(&rest[..len]) {
                    return Some(start);
                }
            }
            from = start + 1;
        }
        None
    }
}

/// Search for the `50 03` header
fn find_sync(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == SYNC_PATTERN)
}

/// Frame size declared by a header at the start of `data`
fn candidate_len(data: &[u8]) -> Option<usize> {
    data.get(2).map(|&len| len as usize + FRAME_OVERHEAD)
}
