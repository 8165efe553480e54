use async_stream::stream;
use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use chrono::Utc;
use futures_util::StreamExt;
use serde_json::json;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use relay_azure::{GenerationSettings, Message};
use relay_wire::{ChatRequestBody, reframe};

use crate::error::ApiError;
use crate::log_store::{RequestRecord, ResponseRecord};
use crate::middleware::request_id_from;
use crate::AppState;

/// Chat endpoint: streams the reply as server-sent events, or returns one
/// JSON body when the caller asked for a non-streaming exchange.
pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChatRequestBody>,
) -> Result<Response, ApiError> {
    if body.messages.is_empty() {
        return Err(ApiError::bad_request("Messages array is required"));
    }

    let request_id = request_id_from(&headers);
    let settings = GenerationSettings {
        max_tokens: body.max_tokens,
        temperature: body.temperature,
    };

    if let Err(err) = state
        .log_store
        .log_request(RequestRecord {
            request_id: request_id.clone(),
            messages: body.messages.clone(),
            max_tokens: body.max_tokens,
            temperature: body.temperature,
            streaming: body.stream,
            timestamp: Utc::now(),
        })
        .await
    {
        tracing::warn!(request_id = %request_id, error = %err, "failed to record chat request");
    }

    let conversation: Vec<Message> = body.messages.into_iter().map(Message::from).collect();

    if body.stream {
        stream_reply(state, request_id, conversation, settings).await
    } else {
        complete_reply(state, request_id, conversation, settings).await
    }
}

async fn complete_reply(
    state: AppState,
    request_id: String,
    conversation: Vec<Message>,
    settings: GenerationSettings,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let outcome = state
        .orchestrator
        .complete(conversation, settings)
        .await
        .map_err(|err| {
            tracing::error!(request_id = %request_id, error = %err, "completion failed");
            ApiError::internal(err.to_string())
        })?;

    record_response(
        &state,
        ResponseRecord {
            request_id: request_id.clone(),
            content: outcome.text.clone(),
            processing_time: started.elapsed().as_secs_f64(),
            chunk_count: None,
            function_calls: outcome.function_calls,
            streaming: false,
            timestamp: Utc::now(),
        },
    )
    .await;

    tracing::info!(
        request_id = %request_id,
        response_length = outcome.text.len(),
        "completion finished"
    );
    Ok(Json(json!({ "response": outcome.text })).into_response())
}

async fn stream_reply(
    state: AppState,
    request_id: String,
    conversation: Vec<Message>,
    settings: GenerationSettings,
) -> Result<Response, ApiError> {
    let started = Instant::now();

    // The first upstream request happens before the response is committed, so
    // auth/rate-limit/validation failures are structured errors, not a broken
    // event stream.
    let exchange = state
        .orchestrator
        .start_stream(conversation, settings)
        .await
        .map_err(|err| {
            tracing::error!(request_id = %request_id, error = %err, "upstream refused the stream");
            ApiError::internal(err.to_string())
        })?;

    let function_calls = exchange.function_calls.clone();
    let summary_source = exchange.function_calls;

    // Tap the deltas on their way through so the completed exchange can be
    // recorded once the stream ends.
    let transcript: Arc<Mutex<(String, usize)>> = Arc::new(Mutex::new((String::new(), 0)));
    let tap = transcript.clone();
    let events = exchange.events.inspect(move |event| {
        if let Ok(event) = event {
            if let Some(delta) = event.delta.as_deref() {
                if let Ok(mut guard) = tap.lock() {
                    guard.0.push_str(delta);
                    guard.1 += 1;
                }
            }
        }
    });

    let frames = reframe(events, request_id.clone(), move || function_calls.summary());

    let body = {
        let state = state.clone();
        stream! {
            let mut frames = Box::pin(frames);
            while let Some(frame) = frames.next().await {
                yield Ok::<Bytes, Infallible>(frame);
            }

            let (content, chunk_count) = transcript
                .lock()
                .map(|mut guard| (std::mem::take(&mut guard.0), guard.1))
                .unwrap_or_default();
            tracing::info!(
                request_id = %request_id,
                chunks = chunk_count,
                response_length = content.len(),
                "stream finished"
            );
            record_response(
                &state,
                ResponseRecord {
                    request_id: request_id.clone(),
                    content,
                    processing_time: started.elapsed().as_secs_f64(),
                    chunk_count: Some(chunk_count),
                    function_calls: summary_source.summary(),
                    streaming: true,
                    timestamp: Utc::now(),
                },
            )
            .await;
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(body))
        .map_err(|err| ApiError::internal(err.to_string()))
}

async fn record_response(state: &AppState, record: ResponseRecord) {
    let request_id = record.request_id.clone();
    if let Err(err) = state.log_store.log_response(record).await {
        tracing::warn!(request_id = %request_id, error = %err, "failed to record chat response");
    }
}
