//! Azure OpenAI chat client for the relay
//!
//! This crate provides the upstream half of the relay pipeline:
//! - a streaming and non-streaming Chat Completions client addressed by
//!   deployment,
//! - a tool registry with the demonstration plugin (clock read, arithmetic,
//!   usage stats),
//! - a per-exchange function-call tracker, and
//! - the orchestrator that runs automatic function calling and emits the
//!   provider-neutral completion events the re-framer consumes.
//!
//! # Example
//!
//! ```rust,no_run
//! use relay_azure::{AzureChat, ChatOrchestrator, GenerationSettings, Message, ToolRegistry};
//!
//! # async fn demo() -> Result<(), relay_azure::AzureRequestError> {
//! let client = AzureChat::from_env()?;
//! let orchestrator = ChatOrchestrator::new(client, ToolRegistry::demo());
//!
//! let outcome = orchestrator
//!     .complete(
//!         vec![Message::user("What's 2+2?")],
//!         GenerationSettings::default(),
//!     )
//!     .await?;
//! println!("{}", outcome.text);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod message;
pub mod orchestrator;
pub mod request;
pub mod response;
pub mod tools;
pub mod tracker;

// Re-export main types
pub use client::{AzureChat, ChunkStream};
pub use error::AzureRequestError;
pub use message::{FunctionCall, Message, Role, ToolCall};
pub use orchestrator::{
    ChatExchange, ChatOrchestrator, ChatOutcome, FunctionCallHandle, GenerationSettings,
};
pub use request::ChatRequest;
pub use response::{ChatChunk, ChatResponse, Choice, MessageDelta, ToolCallDelta, Usage};
pub use tools::{ChatTool, Tool, ToolFunction, ToolRegistry};
pub use tracker::FunctionCallTracker;
