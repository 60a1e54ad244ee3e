//! Demultiplexing of the Engine API raw stream.
//!
//! Without a TTY, attached exec output arrives as frames of
//! `[stream type, 0, 0, 0, length (u32 BE)]` followed by `length` bytes.

use bytes::{Buf, Bytes, BytesMut};
use vprobe_core::{Error, Result};

/// Size of a frame header.
pub const HEADER_LEN: usize = 8;

/// Source stream of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Standard input echoed back by the daemon.
    Stdin,
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl StreamKind {
    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(Self::Stdin),
            1 => Ok(Self::Stdout),
            2 => Ok(Self::Stderr),
            other => Err(Error::ParseError(format!("unknown stream type {other}"))),
        }
    }
}

/// Incremental frame decoder fed with arbitrary body chunks.
#[derive(Debug, Default)]
pub struct StreamDemuxer {
    buf: BytesMut,
}

impl StreamDemuxer {
    /// Create an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of the response body.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete frame, if buffered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ParseError`] on an unknown stream type.
    pub fn next_frame(&mut self) -> Result<Option<(StreamKind, Bytes)>> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let kind = StreamKind::from_byte(self.buf[0])?;
        let len = u32::from_be_bytes([self.buf[4], self.buf[5], self.buf[6], self.buf[7]]) as usize;
        if self.buf.len() < HEADER_LEN + len {
            return Ok(None);
        }
        self.buf.advance(HEADER_LEN);
        Ok(Some((kind, self.buf.split_to(len).freeze())))
    }

    /// Check that the body ended on a frame boundary.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ParseError`] if a partial frame is left over.
    pub fn finish(&self) -> Result<()> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(Error::ParseError(format!(
                "exec stream truncated with {} bytes pending",
                self.buf.len()
            )))
        }
    }
}

/// Encode one frame, as the daemon does.
#[must_use]
pub fn encode_frame(kind: StreamKind, payload: &[u8]) -> Vec<u8> {
    let tag = match kind {
        StreamKind::Stdin => 0,
        StreamKind::Stdout => 1,
        StreamKind::Stderr => 2,
    };
    let len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&[tag, 0, 0, 0]);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}
