use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::WireError;

/// Prefix of every framed event line
pub const DATA_PREFIX: &str = "data: ";

/// Terminal sentinel payload. Never valid JSON, so it is matched before any
/// decode attempt.
pub const DONE_MARKER: &str = "[DONE]";

/// One content chunk in the relay wire format.
///
/// The shape mirrors the upstream streaming protocol so a client decodes
/// relay-produced and provider-produced frames through the same path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub choices: Vec<ChunkChoice>,

    /// Always present (null while content is flowing) per the wire contract
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub delta: ChunkDelta,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl StreamChunk {
    /// Build a content frame payload for one incremental text delta
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            choices: vec![ChunkChoice {
                delta: ChunkDelta {
                    content: Some(text.into()),
                    role: Some("assistant".to_string()),
                },
            }],
            finish_reason: None,
        }
    }
}

/// Record of one function invocation performed while generating a reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallRecord {
    pub plugin_name: String,
    pub function_name: String,

    /// Wall-clock execution time in seconds
    pub execution_time: f64,
}

/// Summary of all function invocations for one exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallSummary {
    pub total_function_calls: usize,
    pub function_calls: Vec<FunctionCallRecord>,
}

/// Extension frame payload carrying function-call metadata.
///
/// Distinguishable from content frames by its top-level `functionCalls` key;
/// emitted at most once, after the last content frame and before the sentinel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallsFrame {
    #[serde(rename = "functionCalls")]
    pub function_calls: FunctionCallSummary,
}

/// In-band error payload sent when a stream fails after frames already went out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub error: String,
    pub detail: String,
    pub request_id: String,
}

/// Encode a payload as one framed event: `data: <json>\n\n`
pub fn encode<T: Serialize>(payload: &T) -> Result<Bytes, WireError> {
    let json = serde_json::to_string(payload)?;
    Ok(Bytes::from(format!("{DATA_PREFIX}{json}\n\n")))
}

/// The terminal sentinel frame
pub fn done() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}
