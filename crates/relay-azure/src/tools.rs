use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::AzureRequestError;

/// A tool definition in the provider's wire shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// The type of tool (always "function")
    pub r#type: String,

    /// Function declaration
    pub function: ToolFunction,
}

/// Function declaration advertised to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolFunction {
    /// Name of the function
    pub name: String,

    /// What the function does and when the model should call it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON schema for the function's input parameters
    pub parameters: Value,
}

/// A function the model may invoke while generating a reply.
///
/// Invocation failures are reported as strings the model can read and recover
/// from, never as errors that abort the exchange.
pub trait ChatTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object
    fn parameters(&self) -> Value;

    fn invoke(&self, args: &Value) -> String;
}

/// Named collection of tools exposed to the model as one plugin.
///
/// Dispatch is by function name; the registry also counts invocations so the
/// status endpoint can report usage.
pub struct ToolRegistry {
    plugin_name: String,
    tools: Vec<Arc<dyn ChatTool>>,
    invocations: Arc<AtomicUsize>,
}

impl ToolRegistry {
    /// Create an empty registry published under the given plugin name
    pub fn new(plugin_name: impl Into<String>) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            tools: Vec::new(),
            invocations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The registry with the three demonstration tools registered
    pub fn demo() -> Self {
        let mut registry = Self::new("TestPlugin");
        let counter = registry.invocations.clone();
        registry.register(CurrentTime);
        registry.register(SimpleMath);
        registry.register(PluginStats { counter });
        registry
    }

    /// Register a tool
    pub fn register(&mut self, tool: impl ChatTool + 'static) {
        self.tools.push(Arc::new(tool));
    }

    /// The plugin name recorded for every invocation
    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    /// Names of all registered tools
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// How many invocations this registry has dispatched
    pub fn invocation_count(&self) -> usize {
        self.invocations.load(Ordering::Relaxed)
    }

    /// Tool definitions in the provider's wire shape
    pub fn definitions(&self) -> Vec<Tool> {
        self.tools
            .iter()
            .map(|tool| Tool {
                r#type: "function".to_string(),
                function: ToolFunction {
                    name: tool.name().to_string(),
                    description: Some(tool.description().to_string()),
                    parameters: tool.parameters(),
                },
            })
            .collect()
    }

    /// Dispatch an invocation to the named tool
    pub fn invoke(&self, name: &str, args: &Value) -> Result<String, AzureRequestError> {
        let tool = self
            .tools
            .iter()
            .find(|tool| tool.name() == name)
            .ok_or_else(|| AzureRequestError::UnknownTool(name.to_string()))?;

        self.invocations.fetch_add(1, Ordering::Relaxed);
        let result = tool.invoke(args);
        tracing::info!(
            plugin = %self.plugin_name,
            function = name,
            "tool invoked"
        );
        Ok(result)
    }
}

/// Reads the current date and time in a handful of formats
struct CurrentTime;

impl ChatTool for CurrentTime {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time. Use this when users ask about the current time, date, or when something happened."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "format_type": {
                    "type": "string",
                    "enum": ["full", "date", "time", "timestamp"],
                    "description": "Format type: 'full', 'date', 'time', or 'timestamp'"
                }
            }
        })
    }

    fn invoke(&self, args: &Value) -> String {
        let format_type = args
            .get("format_type")
            .and_then(Value::as_str)
            .unwrap_or("full");
        let now = chrono::Local::now();

        let result = match format_type {
            "date" => now.format("%Y-%m-%d").to_string(),
            "time" => now.format("%H:%M:%S").to_string(),
            "timestamp" => now.timestamp().to_string(),
            _ => now.format("%Y-%m-%d %H:%M:%S").to_string(),
        };
        format!("Current {format_type}: {result}")
    }
}

/// Four-function calculator
struct SimpleMath;

impl ChatTool for SimpleMath {
    fn name(&self) -> &str {
        "calculate_simple_math"
    }

    fn description(&self) -> &str {
        "Perform simple mathematical calculations. Use this when users ask for basic math operations like addition, subtraction, multiplication, or division."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["add", "subtract", "multiply", "divide"],
                    "description": "Math operation: 'add', 'subtract', 'multiply', 'divide'"
                },
                "first_number": {
                    "type": "number",
                    "description": "First number in the calculation"
                },
                "second_number": {
                    "type": "number",
                    "description": "Second number in the calculation"
                }
            },
            "required": ["operation", "first_number", "second_number"]
        })
    }

    fn invoke(&self, args: &Value) -> String {
        let operation = args.get("operation").and_then(Value::as_str).unwrap_or("");
        let Some(first) = args.get("first_number").and_then(Value::as_f64) else {
            return "Error: first_number must be a number".to_string();
        };
        let Some(second) = args.get("second_number").and_then(Value::as_f64) else {
            return "Error: second_number must be a number".to_string();
        };

        let result = match operation {
            "add" => first + second,
            "subtract" => first - second,
            "multiply" => first * second,
            "divide" => {
                if second == 0.0 {
                    return "Error: Cannot divide by zero".to_string();
                }
                first / second
            }
            other => {
                return format!(
                    "Error: Unknown operation '{other}'. Use: add, subtract, multiply, divide"
                );
            }
        };
        format!("{first} {operation} {second} = {result}")
    }
}

/// Reports how often the plugin's functions have been used
struct PluginStats {
    counter: Arc<AtomicUsize>,
}

impl ChatTool for PluginStats {
    fn name(&self) -> &str {
        "get_plugin_stats"
    }

    fn description(&self) -> &str {
        "Get statistics about how many times this test plugin has been used. Use this when users ask about plugin usage or test function statistics."
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn invoke(&self, _args: &Value) -> String {
        let stats = json!({
            "total_calls": self.counter.load(Ordering::Relaxed),
            "plugin_name": "TestPlugin",
            "available_functions": [
                "get_current_time",
                "calculate_simple_math",
                "get_plugin_stats"
            ],
            "status": "active"
        });
        stats.to_string()
    }
}
