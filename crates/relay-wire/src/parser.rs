use bytes::Bytes;
use futures_util::Stream;
use serde::Deserialize;

use crate::error::WireError;
use crate::frame::{DONE_MARKER, FunctionCallSummary};
use crate::sse::SseLineReader;

/// A single event surfaced by [`DeltaParser`]
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// An incremental fragment of assistant text
    Delta(String),
    /// Function-call metadata, surfaced at most once per stream
    FunctionCalls(FunctionCallSummary),
}

/// Loose decode target for one frame payload.
///
/// Covers both relay-produced frames (top-level `finish_reason`) and
/// provider-native chunks (`finish_reason` inside the choice), so the decode
/// path is uniform regardless of which layer produced the frame.
#[derive(Debug, Default, Deserialize)]
struct FramePayload {
    #[serde(default)]
    choices: Vec<FrameChoice>,

    #[serde(default)]
    finish_reason: Option<String>,

    #[serde(default, rename = "functionCalls")]
    function_calls: Option<FunctionCallSummary>,
}

#[derive(Debug, Default, Deserialize)]
struct FrameChoice {
    #[serde(default)]
    delta: FrameDelta,

    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FrameDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Pull-based parser for the relay stream format.
///
/// Consumes raw bytes as they arrive and surfaces content deltas in arrival
/// order plus at most one function-call summary. The sequence is finite and
/// not restartable; a fresh parse requires a fresh byte source.
///
/// Termination (sentinel, non-null finish reason, source exhaustion or a
/// transport error, whichever comes first) releases the underlying byte
/// source; later pulls return `Ok(None)` without touching it. Dropping the
/// parser mid-stream releases the source as well.
pub struct DeltaParser {
    reader: SseLineReader,
    metadata_seen: bool,
    finished: bool,
    finish_pending: bool,
}

impl DeltaParser {
    pub fn new<S, E>(source: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            reader: SseLineReader::new(source),
            metadata_seen: false,
            finished: false,
            finish_pending: false,
        }
    }

    /// Pull the next stream event.
    ///
    /// Returns `Ok(None)` once the stream has terminated. A transport error is
    /// surfaced once; the stream counts as terminated afterwards and whatever
    /// was already yielded stands (the response may have been truncated).
    pub async fn next_event(&mut self) -> Result<Option<StreamEvent>, WireError> {
        if self.finished {
            return Ok(None);
        }
        if self.finish_pending {
            self.finish();
            return Ok(None);
        }

        loop {
            let payload = match self.reader.next_payload().await {
                Ok(Some(payload)) => payload,
                Ok(None) => {
                    self.finish();
                    return Ok(None);
                }
                // A mangled line is skipped like any other undecodable frame.
                Err(WireError::Utf8(err)) => {
                    tracing::debug!(error = %err, "skipping non-UTF-8 stream line");
                    continue;
                }
                Err(err) => {
                    self.finish();
                    return Err(err);
                }
            };

            if payload == DONE_MARKER {
                self.finish();
                return Ok(None);
            }

            let frame: FramePayload = match serde_json::from_str(&payload) {
                Ok(frame) => frame,
                Err(err) => {
                    tracing::debug!(error = %err, "skipping undecodable frame");
                    continue;
                }
            };

            if let Some(summary) = frame.function_calls {
                if self.metadata_seen {
                    continue;
                }
                self.metadata_seen = true;
                return Ok(Some(StreamEvent::FunctionCalls(summary)));
            }

            let finish = frame
                .finish_reason
                .or_else(|| frame.choices.first().and_then(|c| c.finish_reason.clone()));
            let delta = frame
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.content)
                .filter(|content| !content.is_empty());

            match (delta, finish) {
                (Some(text), Some(_)) => {
                    // The delta still counts; the finish reason takes effect
                    // on the next pull.
                    self.finish_pending = true;
                    return Ok(Some(StreamEvent::Delta(text)));
                }
                (Some(text), None) => return Ok(Some(StreamEvent::Delta(text))),
                (None, Some(_)) => {
                    self.finish();
                    return Ok(None);
                }
                (None, None) => continue,
            }
        }
    }

    /// Whether a termination signal has been observed
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn finish(&mut self) {
        self.finished = true;
        self.reader.release();
    }
}
