//! Wire framing contract and stream pipeline for the chat relay
//!
//! This crate owns both halves of the relay's streaming pipeline:
//! - the server-side re-framer, which turns a provider-neutral stream of
//!   completion events into `data: …\n\n` framed bytes terminated by the
//!   `[DONE]` sentinel, with an optional function-call metadata frame before
//!   the terminator, and
//! - the client-side parser, which consumes those bytes incrementally
//!   (frames may be split at any byte boundary) and surfaces content deltas
//!   plus at most one function-call summary.
//!
//! # Example
//!
//! ```rust,no_run
//! use futures_util::{StreamExt, stream};
//! use relay_wire::{CompletionEvent, DeltaParser, StreamEvent, reframe};
//!
//! # async fn demo() -> Result<(), relay_wire::WireError> {
//! let events = stream::iter(vec![
//!     Ok::<_, std::io::Error>(CompletionEvent::delta("4")),
//!     Ok(CompletionEvent::finished("stop")),
//! ]);
//! let frames = reframe(events, "req-1".to_string(), || None);
//!
//! let mut parser = DeltaParser::new(frames.map(Ok::<_, std::io::Error>));
//! while let Some(event) = parser.next_event().await? {
//!     if let StreamEvent::Delta(text) = event {
//!         print!("{text}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod frame;
pub mod message;
pub mod parser;
pub mod reframe;
pub mod sse;

// Re-export main types
pub use error::WireError;
pub use frame::{
    ChunkChoice, ChunkDelta, ErrorFrame, FunctionCallRecord, FunctionCallSummary,
    FunctionCallsFrame, StreamChunk,
};
pub use message::{ChatMessage, ChatRequestBody, Role};
pub use parser::{DeltaParser, StreamEvent};
pub use reframe::{CompletionEvent, reframe};
pub use sse::SseLineReader;
