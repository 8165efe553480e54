use async_stream::try_stream;
use futures_util::stream::BoxStream;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use relay_wire::{CompletionEvent, FunctionCallSummary};

use crate::{
    AzureChat, AzureRequestError, ChatRequest, FunctionCallTracker, Message, ToolRegistry,
    message::{FunctionCall, ToolCall},
    response::ToolCallDelta,
};

/// How many tool rounds one exchange may take before it is considered stuck
const MAX_TOOL_ROUNDS: usize = 8;

/// Generation settings for one exchange
#[derive(Debug, Clone, Copy)]
pub struct GenerationSettings {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_tokens: 1000,
            temperature: 0.7,
        }
    }
}

/// Shared handle to an exchange's function-call records.
///
/// The summary is meaningful once the event stream has completed; the
/// re-framer reads it right before emitting the terminator.
#[derive(Debug, Clone, Default)]
pub struct FunctionCallHandle(Arc<Mutex<FunctionCallTracker>>);

impl FunctionCallHandle {
    pub fn summary(&self) -> Option<FunctionCallSummary> {
        self.0.lock().ok().and_then(|tracker| tracker.summary())
    }
}

/// One in-flight streaming exchange: neutral completion events plus the
/// function-call metadata side channel
pub struct ChatExchange {
    pub events: BoxStream<'static, Result<CompletionEvent, AzureRequestError>>,
    pub function_calls: FunctionCallHandle,
}

impl std::fmt::Debug for ChatExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatExchange")
            .field("events", &"<stream>")
            .field("function_calls", &self.function_calls)
            .finish()
    }
}

/// Outcome of a non-streaming exchange
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub text: String,
    pub function_calls: Option<FunctionCallSummary>,
}

/// Drives chat completions with automatic function calling.
///
/// Content deltas are forwarded as neutral events while `tool_calls` fragments
/// are accumulated on the side; when the provider hands generation over to
/// tools, the requested functions are invoked through the registry, their
/// results appended to the conversation, and a follow-up completion issued.
/// Each exchange owns its conversation and tracker; the only state shared
/// between concurrent exchanges is the read-only client and registry.
pub struct ChatOrchestrator {
    client: AzureChat,
    tools: Arc<ToolRegistry>,
    max_tool_rounds: usize,
}

impl ChatOrchestrator {
    pub fn new(client: AzureChat, tools: ToolRegistry) -> Self {
        Self {
            client,
            tools: Arc::new(tools),
            max_tool_rounds: MAX_TOOL_ROUNDS,
        }
    }

    pub fn client(&self) -> &AzureChat {
        &self.client
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Start a streaming exchange.
    ///
    /// The first upstream request happens here: failures before anything was
    /// streamed fail the whole call instead of producing a broken stream.
    /// Follow-up tool rounds run inside the returned stream; their failures
    /// surface as stream errors for the re-framer to report in-band.
    pub async fn start_stream(
        &self,
        messages: Vec<Message>,
        settings: GenerationSettings,
    ) -> Result<ChatExchange, AzureRequestError> {
        let tracker = Arc::new(Mutex::new(FunctionCallTracker::new()));
        let handle = FunctionCallHandle(tracker.clone());

        let client = self.client.clone();
        let tools = self.tools.clone();
        let max_rounds = self.max_tool_rounds;
        let mut conversation = messages;

        let first = client
            .open_stream(&build_request(&tools, &conversation, settings))
            .await?;

        let events = try_stream! {
            let mut open = Some(first);
            for _round in 0..max_rounds {
                let mut chunks = match open.take() {
                    Some(chunks) => chunks,
                    None => {
                        client
                            .open_stream(&build_request(&tools, &conversation, settings))
                            .await?
                    }
                };

                let mut pending = ToolCallAccumulator::default();
                let mut finish: Option<String> = None;

                while let Some(chunk) = chunks.next_chunk().await? {
                    let Some(choice) = chunk.choices.into_iter().next() else {
                        continue;
                    };
                    if let Some(content) = choice.delta.content {
                        if !content.is_empty() {
                            yield CompletionEvent::delta(content);
                        }
                    }
                    if let Some(fragments) = choice.delta.tool_calls {
                        pending.extend(fragments);
                    }
                    if let Some(reason) = choice.finish_reason {
                        // Nothing past the finish signal is forwarded.
                        finish = Some(reason);
                        break;
                    }
                }

                let requested = pending.into_calls();
                match finish.as_deref() {
                    Some("tool_calls") if !requested.is_empty() => {
                        conversation.push(Message::assistant_tool_calls(requested.clone()));
                        for call in requested {
                            let result = run_tool(&tools, &tracker, &call);
                            conversation.push(Message::tool(call.id, result));
                        }
                    }
                    Some(reason) => {
                        yield CompletionEvent::finished(reason);
                        return;
                    }
                    // Upstream ended without declaring a finish; the
                    // re-framer still terminates the wire stream.
                    None => return,
                }
            }

            Err(AzureRequestError::ToolLoopLimit(max_rounds))?;
        };

        Ok(ChatExchange {
            events: Box::pin(events),
            function_calls: handle,
        })
    }

    /// Run a full exchange without streaming and return the final text
    pub async fn complete(
        &self,
        messages: Vec<Message>,
        settings: GenerationSettings,
    ) -> Result<ChatOutcome, AzureRequestError> {
        let mut tracker = FunctionCallTracker::new();
        let mut conversation = messages;

        for _round in 0..self.max_tool_rounds {
            let response = self
                .client
                .send(&build_request(&self.tools, &conversation, settings))
                .await?;

            let Some(choice) = response.choices.into_iter().next() else {
                return Ok(ChatOutcome {
                    text: String::new(),
                    function_calls: tracker.summary(),
                });
            };

            let requested = choice.message.tool_calls.clone().unwrap_or_default();
            if choice.finish_reason.as_deref() == Some("tool_calls") && !requested.is_empty() {
                conversation.push(choice.message);
                for call in requested {
                    let started = Instant::now();
                    let result = invoke_or_report(&self.tools, &call);
                    tracker.record(self.tools.plugin_name(), &call.function.name, started.elapsed());
                    conversation.push(Message::tool(call.id, result));
                }
                continue;
            }

            return Ok(ChatOutcome {
                text: choice.message.content.unwrap_or_default(),
                function_calls: tracker.summary(),
            });
        }

        Err(AzureRequestError::ToolLoopLimit(self.max_tool_rounds))
    }
}

fn build_request(
    tools: &ToolRegistry,
    conversation: &[Message],
    settings: GenerationSettings,
) -> ChatRequest {
    let builder = ChatRequest::builder()
        .max_tokens(settings.max_tokens)
        .temperature(settings.temperature)
        .tools(tools.definitions());
    conversation
        .iter()
        .cloned()
        .fold(builder, |builder, message| builder.message(message))
        .build()
}

fn run_tool(
    tools: &ToolRegistry,
    tracker: &Arc<Mutex<FunctionCallTracker>>,
    call: &ToolCall,
) -> String {
    let started = Instant::now();
    let result = invoke_or_report(tools, call);
    if let Ok(mut tracker) = tracker.lock() {
        tracker.record(tools.plugin_name(), &call.function.name, started.elapsed());
    }
    result
}

/// Invoke a requested tool; failures become strings the model can read
fn invoke_or_report(tools: &ToolRegistry, call: &ToolCall) -> String {
    let args: Value = serde_json::from_str(&call.function.arguments).unwrap_or_else(|_| json!({}));
    match tools.invoke(&call.function.name, &args) {
        Ok(result) => result,
        Err(err) => format!("Error: {err}"),
    }
}

/// Reassembles streamed tool-call fragments, keyed by their choice index
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    calls: BTreeMap<u32, PartialToolCall>,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl ToolCallAccumulator {
    fn extend(&mut self, fragments: Vec<ToolCallDelta>) {
        for fragment in fragments {
            let partial = self.calls.entry(fragment.index).or_default();
            if let Some(id) = fragment.id {
                partial.id = Some(id);
            }
            if let Some(function) = fragment.function {
                if let Some(name) = function.name {
                    partial.name = Some(name);
                }
                if let Some(arguments) = function.arguments {
                    partial.arguments.push_str(&arguments);
                }
            }
        }
    }

    /// Completed calls in index order; fragments that never got an id or a
    /// name are dropped
    fn into_calls(self) -> Vec<ToolCall> {
        self.calls
            .into_values()
            .filter_map(|partial| {
                Some(ToolCall {
                    id: partial.id?,
                    r#type: "function".to_string(),
                    function: FunctionCall {
                        name: partial.name?,
                        arguments: partial.arguments,
                    },
                })
            })
            .collect()
    }
}
