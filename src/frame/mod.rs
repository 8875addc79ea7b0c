//! JPEG frame extraction from the camera byte stream
//!
//! The printer sends concatenated JPEG images with no length prefix or other
//! framing. Frames are recovered by scanning the accumulated bytes for a start
//! marker (`FF D8 FF E0`) followed by an end marker (`FF D9`).

mod jpeg;

pub use jpeg::{validate_jpeg, JpegInfo, JpegParseError};

use bytes::{Buf, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// SOI followed by the APP0 marker, as emitted by the printer
pub const START_MARKER: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xE0];

/// EOI marker
pub const END_MARKER: [u8; 2] = [0xFF, 0xD9];

/// Default cap on buffered, not yet extracted bytes (8 MiB)
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 8 * 1024 * 1024;

/// How many frames are taken out of the buffer after each read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractPolicy {
    /// At most one frame per read; any further complete frame waits for the
    /// next read.
    #[default]
    OnePerRead,

    /// Every complete frame in the buffer is extracted after each read
    Drain,
}

/// Accumulates stream bytes and cuts complete JPEG frames out of them
#[derive(Debug)]
pub struct FrameExtractor {
    buffer: BytesMut,
    max_buffer_bytes: usize,
    bytes_discarded: u64,
}

impl FrameExtractor {
    /// Creates an empty extractor
    ///
    /// `max_buffer_bytes` bounds the receive buffer. A zero value falls back
    /// to [`DEFAULT_MAX_BUFFER_BYTES`].
    pub fn new(max_buffer_bytes: usize) -> Self {
        let max_buffer_bytes = if max_buffer_bytes == 0 {
            DEFAULT_MAX_BUFFER_BYTES
        } else {
            max_buffer_bytes
        };

        Self {
            buffer: BytesMut::new(),
            max_buffer_bytes,
            bytes_discarded: 0,
        }
    }

    /// Appends a chunk read from the transport
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Removes and returns the first complete frame, if any
    ///
    /// The frame spans from the first start marker through the first end
    /// marker after it, both included. Bytes in front of the start marker
    /// are dropped together with the frame.
    pub fn extract(&mut self) -> Option<Bytes> {
        let start = find(&self.buffer, &START_MARKER)?;
        let search_from = start + START_MARKER.len();
        let end = find(&self.buffer[search_from..], &END_MARKER)? + search_from + END_MARKER.len();

        let mut consumed = self.buffer.split_to(end);
        let frame = consumed.split_off(start).freeze();

        debug!(
            bytes = frame.len(),
            skipped = start,
            remaining = self.buffer.len(),
            "Extracted JPEG frame"
        );

        Some(frame)
    }

    /// Pushes a chunk and extracts frames according to `policy`
    pub fn ingest(&mut self, chunk: &[u8], policy: ExtractPolicy) -> Vec<Bytes> {
        self.push(chunk);

        let frames = match policy {
            ExtractPolicy::OnePerRead => self.extract().into_iter().collect(),
            ExtractPolicy::Drain => std::iter::from_fn(|| self.extract()).collect(),
        };

        self.enforce_limit();
        frames
    }

    /// Number of bytes waiting in the receive buffer
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes dropped by buffer compaction
    pub fn bytes_discarded(&self) -> u64 {
        self.bytes_discarded
    }

    pub fn max_buffer_bytes(&self) -> usize {
        self.max_buffer_bytes
    }

    /// Drops everything buffered
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// True if [`Self::extract`] would return a frame
    pub fn has_complete_frame(&self) -> bool {
        find(&self.buffer, &START_MARKER).is_some_and(|start| {
            find(&self.buffer[start + START_MARKER.len()..], &END_MARKER).is_some()
        })
    }

    /// Compacts the buffer once it grows past the cap
    ///
    /// Only applies while no complete frame is queued, so a backlog left by
    /// [`ExtractPolicy::OnePerRead`] may hold the buffer over the cap until
    /// it is consumed. Keeps the tail starting at the last start marker when
    /// that tail fits, otherwise only the last few bytes that could begin a
    /// split marker.
    fn enforce_limit(&mut self) {
        let len = self.buffer.len();
        if len <= self.max_buffer_bytes {
            return;
        }

        if self.has_complete_frame() {
            debug!(
                buffered = len,
                limit = self.max_buffer_bytes,
                "Receive buffer over limit with frames queued"
            );
            return;
        }

        let keep_from = match rfind(&self.buffer, &START_MARKER) {
            Some(pos) if pos > 0 && len - pos <= self.max_buffer_bytes => pos,
            _ => len.saturating_sub(START_MARKER.len() - 1),
        };

        self.buffer.advance(keep_from);
        self.bytes_discarded += keep_from as u64;

        warn!(
            discarded = keep_from,
            kept = self.buffer.len(),
            limit = self.max_buffer_bytes,
            "Receive buffer over limit without a complete frame, discarding bytes"
        );
    }
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFER_BYTES)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}
