use bon::Builder;
use futures_util::stream::BoxStream;
use std::time::Duration;

use relay_wire::SseLineReader;
use relay_wire::frame::DONE_MARKER;

use crate::{AzureRequestError, ChatChunk, ChatRequest, ChatResponse, error::parse_error_response};

const DEFAULT_API_VERSION: &str = "2024-05-01-preview";

/// Azure OpenAI chat completion client.
///
/// Built once at process start and shared read-only between requests; the
/// deployment name is part of every request URL, not of the request body.
#[derive(Debug, Clone, Builder)]
pub struct AzureChat {
    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`
    #[builder(into)]
    endpoint: String,

    /// API key for the resource
    #[builder(into)]
    api_key: String,

    /// Deployment (model) name addressed by every request
    #[builder(into)]
    deployment: String,

    /// API version query parameter
    #[builder(default = DEFAULT_API_VERSION.to_string(), into)]
    api_version: String,

    /// HTTP client for making requests
    #[builder(skip)]
    client: reqwest::Client,
}

impl AzureChat {
    /// Create a new client for the given resource and deployment
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        deployment: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            endpoint: trim_endpoint(endpoint.into()),
            api_key: api_key.into(),
            deployment: deployment.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            client,
        }
    }

    /// Create a new client from environment variables.
    ///
    /// `AZURE_OPENAI_ENDPOINT`, `AZURE_OPENAI_API_KEY` and
    /// `AZURE_OPENAI_DEPLOYMENT` are required; `AZURE_OPENAI_API_VERSION`
    /// falls back to the default.
    pub fn from_env() -> Result<Self, AzureRequestError> {
        let endpoint = require_env("AZURE_OPENAI_ENDPOINT")?;
        let api_key = require_env("AZURE_OPENAI_API_KEY")?;
        let deployment = require_env("AZURE_OPENAI_DEPLOYMENT")?;

        let mut client = Self::new(endpoint, api_key, deployment);
        if let Ok(version) = std::env::var("AZURE_OPENAI_API_VERSION") {
            if !version.is_empty() {
                client.api_version = version;
            }
        }
        Ok(client)
    }

    /// Create a chat request builder
    pub fn chat(&self) -> crate::request::ChatRequestBuilder {
        ChatRequest::builder()
    }

    /// The configured resource endpoint
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The configured deployment name
    pub fn deployment(&self) -> &str {
        &self.deployment
    }

    /// The configured API version
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, self.deployment, self.api_version
        )
    }

    /// Send a chat request and get a full response
    pub async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, AzureRequestError> {
        let response = self
            .client
            .post(self.completions_url())
            .header("api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response.json::<ChatResponse>().await?)
        } else {
            let status = response.status();
            let bytes = response.bytes().await?;
            Err(parse_error_response(status, bytes))
        }
    }

    /// Open a streaming completion.
    ///
    /// The HTTP request is performed here: a stream is only handed back once
    /// the upstream accepted the request, so authentication, rate-limit and
    /// validation failures surface as structured errors before any event has
    /// been produced.
    pub async fn open_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<ChunkStream, AzureRequestError> {
        let mut request = request.clone();
        request.stream = Some(true);

        let response = self
            .client
            .post(self.completions_url())
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let bytes = response.bytes().await?;
            return Err(parse_error_response(status, bytes));
        }

        Ok(ChunkStream::new(response))
    }

    /// Send a chat request and get a lazy stream of chunks
    pub fn stream(
        &self,
        request: &ChatRequest,
    ) -> BoxStream<'static, Result<ChatChunk, AzureRequestError>> {
        use async_stream::try_stream;

        let this = self.clone();
        let request = request.clone();

        Box::pin(try_stream! {
            let mut chunks = this.open_stream(&request).await?;
            while let Some(chunk) = chunks.next_chunk().await? {
                yield chunk;
            }
        })
    }
}

/// Decoded chunk stream over one upstream completion.
///
/// Unlike the relay's client-side parser, an undecodable upstream payload is
/// fatal here: the provider is expected to speak its own protocol correctly.
pub struct ChunkStream {
    reader: SseLineReader,
    done: bool,
}

impl std::fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStream")
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl ChunkStream {
    fn new(response: reqwest::Response) -> Self {
        Self {
            reader: SseLineReader::new(response.bytes_stream()),
            done: false,
        }
    }

    /// Next decoded chunk; `None` after the sentinel or source end
    pub async fn next_chunk(&mut self) -> Result<Option<ChatChunk>, AzureRequestError> {
        if self.done {
            return Ok(None);
        }

        let Some(payload) = self.reader.next_payload().await? else {
            self.done = true;
            return Ok(None);
        };
        if payload == DONE_MARKER {
            self.done = true;
            self.reader.release();
            return Ok(None);
        }

        let chunk = serde_json::from_str::<ChatChunk>(&payload)
            .map_err(|err| AzureRequestError::InvalidEventData(format!("chunk decode failed: {err}")))?;
        Ok(Some(chunk))
    }
}

fn trim_endpoint(endpoint: String) -> String {
    endpoint.trim_end_matches('/').to_string()
}

fn require_env(name: &'static str) -> Result<String, AzureRequestError> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(AzureRequestError::MissingEnv(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_contains_deployment_and_api_version() {
        let client = AzureChat::new("https://unit.openai.azure.com/", "key", "gpt-4o");
        assert_eq!(
            client.completions_url(),
            "https://unit.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-05-01-preview"
        );
    }

    #[test]
    fn builder_overrides_api_version() {
        let client = AzureChat::builder()
            .endpoint("https://unit.openai.azure.com")
            .api_key("key")
            .deployment("gpt-4o")
            .api_version("2024-10-21")
            .build();
        assert_eq!(client.api_version(), "2024-10-21");
    }
}
