use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::pin::Pin;

use crate::error::WireError;

type ByteSource = Pin<Box<dyn Stream<Item = Result<Bytes, WireError>> + Send>>;

/// Incremental reader for `data:`-framed event streams.
///
/// Bytes are buffered across chunks and split on `\n`; only terminated lines
/// are surfaced, so a frame spanning any number of chunks is reassembled
/// intact and the trailing unterminated fragment is never misread as a frame.
/// Splitting at `0x0A` is UTF-8-safe: that byte cannot occur inside a
/// multi-byte sequence, so multi-byte characters broken across chunk
/// boundaries survive reassembly.
///
/// The reader stays policy-free: it yields raw payload strings (including the
/// `[DONE]` marker) and leaves JSON decoding to its consumers, which differ on
/// how they treat undecodable payloads.
pub struct SseLineReader {
    source: Option<ByteSource>,
    buffer: Vec<u8>,
}

impl SseLineReader {
    pub fn new<S, E>(source: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            source: Some(Box::pin(
                source.map(|result| result.map_err(WireError::transport)),
            )),
            buffer: Vec::new(),
        }
    }

    /// Pull the next `data:` payload.
    ///
    /// Returns `Ok(None)` when the source is exhausted or has been released.
    /// A source error releases the byte source before being surfaced.
    pub async fn next_payload(&mut self) -> Result<Option<String>, WireError> {
        loop {
            while let Some(line) = self.take_line()? {
                if let Some(payload) = data_payload(&line) {
                    return Ok(Some(payload.to_string()));
                }
            }

            let Some(source) = self.source.as_mut() else {
                return Ok(None);
            };
            match source.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(err)) => {
                    self.release();
                    return Err(err);
                }
                None => {
                    // Source ended; an unterminated tail is discarded rather
                    // than interpreted as a frame.
                    self.release();
                    return Ok(None);
                }
            }
        }
    }

    /// Drop the byte source and any buffered bytes.
    ///
    /// Idempotent; called on every termination path so the source is released
    /// exactly once even when the consumer stops pulling early.
    pub fn release(&mut self) {
        self.source = None;
        self.buffer.clear();
    }

    fn take_line(&mut self) -> Result<Option<String>, WireError> {
        let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') else {
            return Ok(None);
        };
        let mut line_bytes: Vec<u8> = self.buffer.drain(..=pos).collect();
        line_bytes.pop();
        if line_bytes.last() == Some(&b'\r') {
            line_bytes.pop();
        }
        Ok(Some(String::from_utf8(line_bytes)?))
    }
}

/// Extract the payload of a `data:` line; blank lines, comments and other
/// SSE fields (`event:`, `id:`, `retry:`) yield nothing.
fn data_payload(line: &str) -> Option<&str> {
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let payload = line.strip_prefix("data:")?.trim_start();
    (!payload.is_empty()).then_some(payload)
}
