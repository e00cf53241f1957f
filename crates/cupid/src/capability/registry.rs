use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::{Capability, CapabilityError, CapabilityKind, CapabilityResult};
use crate::llm::{ToolCall, ToolDefinition};

/// Name to handler table.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Arc<dyn Capability>>,
}

/// Outcome of dispatching one tool call.
#[derive(Debug)]
pub struct Invocation {
    pub call_id: String,
    pub name: String,
    /// `None` when no capability is registered under `name`.
    pub kind: Option<CapabilityKind>,
    /// Arguments as relayed downstream (possibly rewritten by the capability).
    pub arguments: Value,
    pub outcome: Result<CapabilityResult, CapabilityError>,
}

impl Invocation {
    /// Text returned to the model. Failures are reported inline.
    pub fn tool_result_text(&self) -> String {
        match &self.outcome {
            Ok(result) => result.content.clone(),
            Err(e) => format!("Error: {e}"),
        }
    }
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, capability: Arc<dyn Capability>) -> Self {
        self.capabilities
            .insert(capability.name().to_string(), capability);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Capability>> {
        self.capabilities.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Tool declarations, ordered by name so prompts are stable.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut names: Vec<_> = self.capabilities.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| self.capabilities[name].definition())
            .collect()
    }

    /// Run the capability named by `call`.
    ///
    /// Never fails: unknown names and handler errors come back in `outcome`.
    pub async fn dispatch(&self, call: &ToolCall) -> Invocation {
        let name = call.function.name.clone();
        let arguments = parse_arguments(&name, &call.function.arguments);

        let Some(capability) = self.capabilities.get(&name) else {
            warn!(capability = %name, "model requested an unknown capability");
            return Invocation {
                call_id: call.id.clone(),
                outcome: Err(CapabilityError::NotFound(name.clone())),
                name,
                kind: None,
                arguments,
            };
        };

        debug!(capability = %name, "invoking capability");
        let outcome = capability.invoke(&arguments).await;
        if let Err(e) = &outcome {
            warn!(capability = %name, error = %e, "capability failed");
        }

        let relayed = outcome
            .as_ref()
            .ok()
            .and_then(|r| r.relayed_arguments.clone())
            .unwrap_or(arguments);

        Invocation {
            call_id: call.id.clone(),
            kind: Some(capability.kind()),
            name,
            arguments: relayed,
            outcome,
        }
    }
}

/// Decode model-produced arguments; malformed JSON becomes an empty object.
fn parse_arguments(name: &str, raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }

    serde_json::from_str(raw).unwrap_or_else(|e| {
        let excerpt: String = raw.chars().take(200).collect();
        warn!(capability = %name, error = %e, raw = %excerpt, "malformed capability arguments");
        Value::Object(Default::default())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Capability for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn kind(&self) -> CapabilityKind {
            CapabilityKind::Search
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition::function("echo", "Echo arguments", json!({"type": "object"}))
        }

        async fn invoke(&self, arguments: &Value) -> Result<CapabilityResult, CapabilityError> {
            match arguments.get("fail") {
                Some(_) => Err(CapabilityError::Failed("asked to fail".to_string())),
                None => Ok(CapabilityResult::text(arguments.to_string())),
            }
        }
    }

    fn registry() -> CapabilityRegistry {
        CapabilityRegistry::new().register(Arc::new(Echo))
    }

    #[tokio::test]
    async fn dispatches_by_name() {
        let invocation = registry()
            .dispatch(&ToolCall::new("c1", "echo", r#"{"q":"x"}"#))
            .await;
        assert_eq!(invocation.kind, Some(CapabilityKind::Search));
        assert_eq!(invocation.arguments, json!({"q": "x"}));
        assert_eq!(invocation.tool_result_text(), r#"{"q":"x"}"#);
    }

    #[tokio::test]
    async fn unknown_capability_is_inline_error() {
        let invocation = registry().dispatch(&ToolCall::new("c1", "nope", "{}")).await;
        assert!(invocation.kind.is_none());
        assert!(matches!(invocation.outcome, Err(CapabilityError::NotFound(_))));
        assert!(invocation.tool_result_text().starts_with("Error:"));
    }

    #[tokio::test]
    async fn handler_failure_is_inline_error() {
        let invocation = registry()
            .dispatch(&ToolCall::new("c1", "echo", r#"{"fail":true}"#))
            .await;
        assert!(invocation.outcome.is_err());
        assert_eq!(invocation.arguments, json!({"fail": true}));
    }

    #[tokio::test]
    async fn malformed_arguments_become_empty_object() {
        let invocation = registry().dispatch(&ToolCall::new("c1", "echo", "{oops")).await;
        assert_eq!(invocation.arguments, json!({}));
    }

    #[test]
    fn definitions_are_sorted() {
        let defs = registry().definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].function.name, "echo");
    }
}
