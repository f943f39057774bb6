//! Tool registry
//!
//! Adapters expose their operations as named tools taking JSON arguments.
//! Each tool declares a typed argument struct; the registry erases the type,
//! deserializes arguments on dispatch and routes calls by name.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::{Error, Result};

static TOOL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid tool name regex"));

/// A question put to the caller mid-operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElicitPrompt {
    /// Human-readable question
    pub message: String,
    /// Argument the answer fills in
    pub field: String,
    /// Accepted answers; empty means free-form
    pub options: Vec<String>,
}

/// The caller's answer
#[derive(Debug, Clone, PartialEq)]
pub enum Elicitation {
    /// Answer given
    Accepted(Value),
    /// Caller declined to answer
    Declined,
}

/// Asks the caller for missing input
#[async_trait]
pub trait Elicitor: Send + Sync {
    /// Ask `prompt`
    async fn elicit(&self, prompt: ElicitPrompt) -> Result<Elicitation>;
}

/// Elicitor for non-interactive callers: declines everything
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclineAll;

#[async_trait]
impl Elicitor for DeclineAll {
    async fn elicit(&self, prompt: ElicitPrompt) -> Result<Elicitation> {
        debug!(field = %prompt.field, "Declining elicitation (non-interactive)");
        Ok(Elicitation::Declined)
    }
}

/// A named operation with typed arguments
#[async_trait]
pub trait Tool: Send + Sync + 'static {
    /// Argument type, deserialized from the call's JSON arguments
    type Args: DeserializeOwned + Send;

    /// Registry name (`^[a-z][a-z0-9_]*$`)
    fn name(&self) -> &'static str;

    /// One-line description
    fn description(&self) -> &'static str;

    /// Run the tool
    async fn call(&self, args: Self::Args, elicitor: &dyn Elicitor) -> Result<Value>;
}

#[async_trait]
trait DynTool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    async fn call_json(&self, args: Value, elicitor: &dyn Elicitor) -> Result<Value>;
}

#[async_trait]
impl<T: Tool> DynTool for T {
    fn name(&self) -> &'static str {
        Tool::name(self)
    }

    fn description(&self) -> &'static str {
        Tool::description(self)
    }

    async fn call_json(&self, args: Value, elicitor: &dyn Elicitor) -> Result<Value> {
        let args = if args.is_null() {
            Value::Object(Map::new())
        } else {
            args
        };
        let typed: T::Args = serde_json::from_value(args)
            .map_err(|e| Error::InvalidArguments(format!("{}: {e}", Tool::name(self))))?;
        self.call(typed, elicitor).await
    }
}

/// Name and description of a registered tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolInfo {
    /// Tool name
    pub name: &'static str,
    /// Description
    pub description: &'static str,
}

/// Registered tools, by name
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, Arc<dyn DynTool>>,
}

impl ToolRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for a malformed or duplicate name.
    pub fn register<T: Tool>(&mut self, tool: T) -> Result<()> {
        let name = Tool::name(&tool);
        if !TOOL_NAME.is_match(name) {
            return Err(Error::Config(format!("Invalid tool name: {name}")));
        }
        if self.tools.contains_key(name) {
            return Err(Error::Config(format!("Duplicate tool name: {name}")));
        }
        self.tools.insert(name, Arc::new(tool));
        Ok(())
    }

    /// Registered tools, sorted by name
    #[must_use]
    pub fn list(&self) -> Vec<ToolInfo> {
        self.tools
            .values()
            .map(|t| ToolInfo {
                name: t.name(),
                description: t.description(),
            })
            .collect()
    }

    /// Whether `name` is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Number of tools
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tool is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Dispatch a call.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown tool,
    /// [`Error::InvalidArguments`] when `args` do not fit the tool, or the
    /// tool's own error.
    pub async fn call(&self, name: &str, args: Value, elicitor: &dyn Elicitor) -> Result<Value> {
        let tool = self
            .tools
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("tool {name}")))?;

        let started = Instant::now();
        let result = tool.call_json(args, elicitor).await;
        let elapsed_ms = started.elapsed().as_millis();

        match &result {
            Ok(_) => debug!(tool = name, elapsed_ms, "Tool call succeeded"),
            Err(e) => warn!(tool = name, elapsed_ms, kind = %e.kind(), error = %e, "Tool call failed"),
        }
        result
    }
}

/// Serialize a tool result
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::Internal(format!("serialize result: {e}")))
}

/// Structured error payload for callers
#[must_use]
pub fn error_payload(error: &Error) -> Value {
    json!({
        "error": {
            "kind": error.kind(),
            "code": error.to_rpc_code(),
            "status": error.status(),
            "message": error.to_string(),
        }
    })
}
