use futures_util::StreamExt;
use relay_azure::{
    AzureChat, AzureRequestError, ChatOrchestrator, GenerationSettings, Message, ToolRegistry,
};
use relay_wire::CompletionEvent;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COMPLETIONS_PATH: &str = "/openai/deployments/test-deploy/chat/completions";

fn orchestrator_for(server: &MockServer) -> ChatOrchestrator {
    let client = AzureChat::new(server.uri(), "test-key", "test-deploy");
    ChatOrchestrator::new(client, ToolRegistry::demo())
}

fn settings() -> GenerationSettings {
    GenerationSettings {
        max_tokens: 64,
        temperature: 0.0,
    }
}

/// First round: the model hands generation over to the calculator, with the
/// argument JSON split across two chunks.
fn tool_call_round_body() -> &'static str {
    concat!(
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"type\":\"function\",\"function\":{\"name\":\"calculate_simple_math\",\"arguments\":\"{\\\"operation\\\":\\\"add\\\",\"}}]},\"finish_reason\":null}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"\\\"first_number\\\":2,\\\"second_number\\\":2}\"}}]},\"finish_reason\":null}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\n",
        "data: [DONE]\n\n",
    )
}

/// Second round: the model answers with the tool result folded in.
fn answer_round_body() -> &'static str {
    concat!(
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"The answer is \"},\"finish_reason\":null}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"4\"},\"finish_reason\":null}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    )
}

#[tokio::test]
async fn streaming_exchange_runs_the_tool_loop() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(tool_call_round_body(), "text/event-stream"),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(answer_round_body(), "text/event-stream"),
        )
        .mount(&server)
        .await;

    let orchestrator = orchestrator_for(&server);
    let exchange = orchestrator
        .start_stream(vec![Message::user("What's 2+2?")], settings())
        .await
        .unwrap();

    let events: Vec<CompletionEvent> = exchange
        .events
        .map(|event| event.unwrap())
        .collect()
        .await;
    let deltas: Vec<&str> = events
        .iter()
        .filter_map(|event| event.delta.as_deref())
        .collect();
    assert_eq!(deltas, vec!["The answer is ", "4"]);
    assert_eq!(
        events.last().and_then(|event| event.finish_reason.as_deref()),
        Some("stop")
    );

    let summary = exchange.function_calls.summary().unwrap();
    assert_eq!(summary.total_function_calls, 1);
    assert_eq!(summary.function_calls[0].plugin_name, "TestPlugin");
    assert_eq!(
        summary.function_calls[0].function_name,
        "calculate_simple_math"
    );
    assert!(summary.function_calls[0].execution_time >= 0.0);
}

#[tokio::test]
async fn plain_streaming_exchange_reports_no_function_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(answer_round_body(), "text/event-stream"),
        )
        .mount(&server)
        .await;

    let orchestrator = orchestrator_for(&server);
    let exchange = orchestrator
        .start_stream(vec![Message::user("hi")], settings())
        .await
        .unwrap();
    let events: Vec<CompletionEvent> = exchange
        .events
        .map(|event| event.unwrap())
        .collect()
        .await;

    assert!(events.iter().any(|event| event.delta.is_some()));
    assert!(exchange.function_calls.summary().is_none());
}

#[tokio::test]
async fn start_stream_surfaces_upstream_rejection_before_streaming() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "error": {"message": "Requests to the ChatCompletions_Create Operation have exceeded call rate limit.", "code": "429"}
        })))
        .mount(&server)
        .await;

    let orchestrator = orchestrator_for(&server);
    let err = orchestrator
        .start_stream(vec![Message::user("hi")], settings())
        .await
        .unwrap_err();
    assert!(matches!(err, AzureRequestError::InvalidRequestError { .. }));
}

#[tokio::test]
async fn complete_runs_the_tool_loop_without_streaming() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1700000000u64,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "calculate_simple_math",
                            "arguments": "{\"operation\":\"add\",\"first_number\":2,\"second_number\":2}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "chatcmpl-2",
            "object": "chat.completion",
            "created": 1700000001u64,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "2 + 2 = 4"},
                "finish_reason": "stop"
            }]
        })))
        .mount(&server)
        .await;

    let orchestrator = orchestrator_for(&server);
    let outcome = orchestrator
        .complete(vec![Message::user("What's 2+2?")], settings())
        .await
        .unwrap();

    assert_eq!(outcome.text, "2 + 2 = 4");
    let summary = outcome.function_calls.unwrap();
    assert_eq!(summary.total_function_calls, 1);
    assert_eq!(
        summary.function_calls[0].function_name,
        "calculate_simple_math"
    );
}

#[tokio::test]
async fn unknown_tool_request_is_reported_back_to_the_model() {
    // Round 1 asks for a function nobody registered; the loop should feed the
    // error string back and still converge on round 2.
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1700000000u64,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "launch_rockets", "arguments": "{}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(wiremock::matchers::body_string_contains("Unknown tool"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "chatcmpl-2",
            "object": "chat.completion",
            "created": 1700000001u64,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "I cannot do that."},
                "finish_reason": "stop"
            }]
        })))
        .mount(&server)
        .await;

    let orchestrator = orchestrator_for(&server);
    let outcome = orchestrator
        .complete(vec![Message::user("fire!")], settings())
        .await
        .unwrap();
    assert_eq!(outcome.text, "I cannot do that.");
}
