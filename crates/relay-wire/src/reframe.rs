use async_stream::stream;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::frame::{self, FunctionCallSummary, FunctionCallsFrame, StreamChunk};

/// A provider-neutral completion event.
///
/// The re-framer only needs "something that produces a sequence of optional
/// deltas and an optional finish reason", so it is written against this type
/// rather than any provider SDK's chunk shape and can be driven by a fake
/// producer in tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionEvent {
    /// Incremental text, if this event carried any
    pub delta: Option<String>,

    /// Why generation stopped, when the provider declared it
    pub finish_reason: Option<String>,
}

impl CompletionEvent {
    /// An event carrying one incremental text fragment
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            delta: Some(text.into()),
            finish_reason: None,
        }
    }

    /// An event declaring the end of generation
    pub fn finished(reason: impl Into<String>) -> Self {
        Self {
            delta: None,
            finish_reason: Some(reason.into()),
        }
    }
}

/// Re-frame a completion event stream as relay wire frames.
///
/// Every non-empty delta becomes one content frame, in order. The first
/// finish reason stops forwarding; anything the upstream might send after it
/// is ignored. The stream then closes with the function-call extension frame
/// (iff `function_calls` reports any) followed by the sentinel. An upstream
/// error after frames have gone out becomes one in-band error frame followed
/// by the sentinel, so the connection is never left without a terminator.
///
/// Failures before any frame exists are the caller's problem: open the
/// upstream stream first and fail the whole request on error, then re-frame.
pub fn reframe<S, E, F>(
    events: S,
    request_id: String,
    function_calls: F,
) -> impl Stream<Item = Bytes> + Send
where
    S: Stream<Item = Result<CompletionEvent, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
    F: FnOnce() -> Option<FunctionCallSummary> + Send + 'static,
{
    stream! {
        let mut events = Box::pin(events);
        while let Some(next) = events.next().await {
            match next {
                Ok(event) => {
                    if let Some(text) = event.delta.filter(|t| !t.is_empty()) {
                        match frame::encode(&StreamChunk::content(text)) {
                            Ok(bytes) => yield bytes,
                            Err(err) => {
                                tracing::error!(request_id = %request_id, error = %err, "frame encoding failed mid-stream");
                                yield error_frame(&request_id, &err.to_string());
                                yield frame::done();
                                return;
                            }
                        }
                    }
                    if event.finish_reason.is_some() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::error!(request_id = %request_id, error = %err, "upstream failed mid-stream");
                    yield error_frame(&request_id, &err.to_string());
                    yield frame::done();
                    return;
                }
            }
        }

        // Upstream is done (or cut off past its last delta); release it before
        // the terminator goes out.
        drop(events);

        if let Some(summary) = function_calls() {
            match frame::encode(&FunctionCallsFrame { function_calls: summary }) {
                Ok(bytes) => yield bytes,
                Err(err) => {
                    tracing::error!(request_id = %request_id, error = %err, "function-call frame encoding failed");
                }
            }
        }
        yield frame::done();
    }
}

fn error_frame(request_id: &str, detail: &str) -> Bytes {
    let payload = serde_json::json!({
        "error": "Streaming failed",
        "detail": detail,
        "request_id": request_id,
    });
    Bytes::from(format!("{}{}\n\n", frame::DATA_PREFIX, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FunctionCallRecord;
    use futures_util::stream;
    use std::convert::Infallible;

    async fn collect_text(frames: impl Stream<Item = Bytes>) -> String {
        let chunks: Vec<Bytes> = frames.collect().await;
        chunks
            .iter()
            .map(|b| std::str::from_utf8(b).unwrap())
            .collect()
    }

    fn ok_events(events: Vec<CompletionEvent>) -> impl Stream<Item = Result<CompletionEvent, Infallible>> {
        stream::iter(events.into_iter().map(Ok))
    }

    #[tokio::test]
    async fn frames_deltas_then_sentinel() {
        let frames = reframe(
            ok_events(vec![
                CompletionEvent::delta("Hel"),
                CompletionEvent::delta("lo"),
                CompletionEvent::finished("stop"),
            ]),
            "req-1".to_string(),
            || None,
        );
        let text = collect_text(frames).await;
        assert_eq!(
            text,
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\",\"role\":\"assistant\"}}],\"finish_reason\":null}\n\n\
             data: {\"choices\":[{\"delta\":{\"content\":\"lo\",\"role\":\"assistant\"}}],\"finish_reason\":null}\n\n\
             data: [DONE]\n\n"
        );
    }

    #[tokio::test]
    async fn nothing_forwarded_after_finish_reason() {
        let frames = reframe(
            ok_events(vec![
                CompletionEvent::delta("early"),
                CompletionEvent::finished("stop"),
                CompletionEvent::delta("late"),
            ]),
            "req-2".to_string(),
            || None,
        );
        let text = collect_text(frames).await;
        assert!(!text.contains("late"));
        assert!(text.ends_with("data: [DONE]\n\n"));
    }

    #[tokio::test]
    async fn function_call_frame_between_content_and_sentinel() {
        let frames = reframe(
            ok_events(vec![
                CompletionEvent::delta("4"),
                CompletionEvent::finished("stop"),
            ]),
            "req-3".to_string(),
            || {
                Some(FunctionCallSummary {
                    total_function_calls: 1,
                    function_calls: vec![FunctionCallRecord {
                        plugin_name: "TestPlugin".to_string(),
                        function_name: "calculate_simple_math".to_string(),
                        execution_time: 0.002,
                    }],
                })
            },
        );
        let text = collect_text(frames).await;
        let content_at = text.find("\"content\":\"4\"").unwrap();
        let calls_at = text.find("\"functionCalls\"").unwrap();
        let done_at = text.find("data: [DONE]").unwrap();
        assert!(content_at < calls_at && calls_at < done_at);
    }

    #[tokio::test]
    async fn upstream_error_becomes_error_frame_then_sentinel() {
        let events = stream::iter(vec![
            Ok(CompletionEvent::delta("partial")),
            Err(std::io::Error::other("connection reset")),
        ]);
        let frames = reframe(events, "req-4".to_string(), || None);
        let text = collect_text(frames).await;
        assert!(text.contains("\"error\":\"Streaming failed\""));
        assert!(text.contains("connection reset"));
        assert!(text.contains("\"request_id\":\"req-4\""));
        assert!(text.ends_with("data: [DONE]\n\n"));
    }

    #[tokio::test]
    async fn exhausted_upstream_still_gets_terminator() {
        let frames = reframe(ok_events(vec![CompletionEvent::delta("tail")]), "req-5".to_string(), || None);
        let text = collect_text(frames).await;
        assert!(text.ends_with("data: [DONE]\n\n"));
    }
}
