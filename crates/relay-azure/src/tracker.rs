use std::time::Duration;

use relay_wire::{FunctionCallRecord, FunctionCallSummary};

/// Records the function invocations made while serving one exchange.
///
/// One tracker per exchange: concurrent requests never share one, so records
/// cannot interleave across conversations.
#[derive(Debug, Default)]
pub struct FunctionCallTracker {
    calls: Vec<FunctionCallRecord>,
}

impl FunctionCallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed invocation
    pub fn record(&mut self, plugin_name: &str, function_name: &str, elapsed: Duration) {
        self.calls.push(FunctionCallRecord {
            plugin_name: plugin_name.to_string(),
            function_name: function_name.to_string(),
            execution_time: elapsed.as_secs_f64(),
        });
        tracing::info!(
            plugin = plugin_name,
            function = function_name,
            call_order = self.calls.len(),
            "function call recorded"
        );
    }

    pub fn has_calls(&self) -> bool {
        !self.calls.is_empty()
    }

    /// Summary for the metadata frame; `None` when no functions ran, so the
    /// frame is emitted exactly when there is something to report
    pub fn summary(&self) -> Option<FunctionCallSummary> {
        if self.calls.is_empty() {
            return None;
        }
        Some(FunctionCallSummary {
            total_function_calls: self.calls.len(),
            function_calls: self.calls.clone(),
        })
    }
}
