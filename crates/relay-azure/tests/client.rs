use futures_util::StreamExt;
use relay_azure::{AzureChat, AzureRequestError, ChatRequest};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COMPLETIONS_PATH: &str = "/openai/deployments/test-deploy/chat/completions";

fn client_for(server: &MockServer) -> AzureChat {
    AzureChat::new(server.uri(), "test-key", "test-deploy")
}

fn simple_request() -> ChatRequest {
    ChatRequest::builder()
        .user_message("Say hello")
        .max_tokens(16)
        .temperature(0.0)
        .build()
}

#[tokio::test]
async fn send_returns_parsed_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(query_param("api-version", "2024-05-01-preview"))
        .and(header("api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1700000000u64,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello!"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}
        })))
        .mount(&server)
        .await;

    let response = client_for(&server).send(&simple_request()).await.unwrap();
    assert_eq!(response.content(), Some("Hello!"));
    assert_eq!(response.finish_reason(), Some("stop"));
    assert_eq!(response.usage.unwrap().total_tokens, 7);
}

#[tokio::test]
async fn stream_yields_chunks_until_sentinel() {
    let body = concat!(
        "data: {\"id\":\"1\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"finish_reason\":null}]}\n\n",
        "data: {\"id\":\"1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"},\"finish_reason\":null}]}\n\n",
        "data: {\"id\":\"1\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let chunks: Vec<_> = client
        .stream(&simple_request())
        .map(|chunk| chunk.unwrap())
        .collect()
        .await;

    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].content(), Some("Hel"));
    assert_eq!(chunks[1].content(), Some("lo"));
    assert_eq!(chunks[2].finish_reason(), Some("stop"));
}

#[tokio::test]
async fn open_stream_fails_eagerly_on_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": {
                "message": "Access denied due to invalid subscription key.",
                "type": "invalid_request_error",
                "code": "401"
            }
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .open_stream(&simple_request())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AzureRequestError::InvalidRequestError { ref message, .. }
            if message.contains("Access denied")
    ));
}

#[tokio::test]
async fn undecodable_upstream_chunk_is_fatal() {
    let body = "data: {broken\n\ndata: [DONE]\n\n";
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let mut chunks = client_for(&server)
        .open_stream(&simple_request())
        .await
        .unwrap();
    assert!(matches!(
        chunks.next_chunk().await,
        Err(AzureRequestError::InvalidEventData(_))
    ));
}

#[tokio::test]
async fn request_body_carries_messages_and_settings() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(wiremock::matchers::body_partial_json(serde_json::json!({
            "messages": [{"role": "user", "content": "Say hello"}],
            "max_tokens": 16,
            "temperature": 0.0
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "chatcmpl-2",
            "object": "chat.completion",
            "created": 1700000000u64,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "hi"},
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server).send(&simple_request()).await.unwrap();
}

#[tokio::test]
async fn from_env_requires_configuration() {
    // Serialize env mutation against other tests in this binary.
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    let _guard = ENV_LOCK.lock().unwrap();

    unsafe {
        std::env::remove_var("AZURE_OPENAI_ENDPOINT");
        std::env::remove_var("AZURE_OPENAI_API_KEY");
        std::env::remove_var("AZURE_OPENAI_DEPLOYMENT");
    }
    assert!(matches!(
        AzureChat::from_env(),
        Err(AzureRequestError::MissingEnv("AZURE_OPENAI_ENDPOINT"))
    ));
}
