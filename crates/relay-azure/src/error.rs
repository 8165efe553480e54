use serde::Deserialize;
use thiserror::Error;

/// Azure OpenAI API error details
#[derive(Debug, Deserialize)]
struct AzureApiErrorPayload {
    error: Option<AzureApiError>,
}

/// Specific error information from the Azure OpenAI API
#[derive(Debug, Deserialize)]
struct AzureApiError {
    message: String,
    r#type: Option<String>,
    code: Option<String>,
}

/// Errors that can occur when talking to the Azure OpenAI API
#[derive(Debug, Error)]
pub enum AzureRequestError {
    /// HTTP client errors
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),

    /// Failures while reading the upstream event stream
    #[error(transparent)]
    Wire(#[from] relay_wire::WireError),

    /// Invalid request errors from the API
    #[error("Invalid request error: {message}")]
    InvalidRequestError {
        code: Option<String>,
        message: String,
        r#type: Option<String>,
    },

    /// Unexpected response from the API
    #[error("Unexpected response from API: {0}")]
    UnexpectedResponse(String),

    /// Invalid event data in stream
    #[error("Invalid event data: {0}")]
    InvalidEventData(String),

    /// Missing required environment variable
    #[error("Missing environment variable {0}")]
    MissingEnv(&'static str),

    /// The model asked for a function nobody registered
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// The function-calling loop did not converge
    #[error("Function-calling loop exceeded {0} rounds")]
    ToolLoopLimit(usize),
}

/// Parse an error response from the Azure OpenAI API
pub(crate) fn parse_error_response(
    status: reqwest::StatusCode,
    bytes: bytes::Bytes,
) -> AzureRequestError {
    // Try to parse as a structured API error first
    if let Ok(payload) = serde_json::from_slice::<AzureApiErrorPayload>(&bytes) {
        if let Some(error) = payload.error {
            return AzureRequestError::InvalidRequestError {
                code: error.code,
                message: error.message,
                r#type: error.r#type,
            };
        }
    }

    // Fall back to text
    let error_text = String::from_utf8_lossy(&bytes).to_string();
    AzureRequestError::UnexpectedResponse(format!(
        "HTTP status {}: {}",
        status.as_u16(),
        error_text
    ))
}
