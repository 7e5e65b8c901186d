//! Agent handlers and the registry that dispatches to them.
//!
//! Every agent implements one capability: given structured input, produce
//! text output within a deadline. A handler owns its model id and the
//! instruction it builds from the request payload; the registry owns the
//! single downstream call and the deadline. Adding an agent means
//! registering a new handler, never touching the dispatcher.
//!
//! Handlers never retry. Retry policy belongs to the client.

pub mod upstream;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

pub use upstream::{Completion, CompletionsClient, UpstreamError};

/// One unit of fulfillment work: builds the instruction the backend executes.
pub trait AgentHandler: Send + Sync {
    /// Model id sent to the completions backend.
    fn model(&self) -> &str;

    /// Task-specific instruction derived from the request payload.
    fn instruction(&self, payload: &Value) -> String;
}

/// Successful handler output.
#[derive(Debug, Clone)]
pub struct AgentOutput {
    pub text: String,
    pub model: String,
    pub tokens_used: u64,
}

/// Handler failure, split so callers can tell a deadline miss from an
/// upstream fault.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Handler timed out after {0:?}")]
    Timeout(Duration),
    #[error("Upstream call failed: {0}")]
    Upstream(#[from] UpstreamError),
}

fn field<'a>(payload: &'a Value, key: &str) -> &'a str {
    payload.get(key).and_then(Value::as_str).unwrap_or("")
}

fn field_or<'a>(payload: &'a Value, key: &str, default: &'a str) -> &'a str {
    match payload.get(key).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => s,
        _ => default,
    }
}

macro_rules! agent_handler {
    ($name:ident, $model:expr, |$payload:ident| $build:expr) => {
        struct $name;

        impl AgentHandler for $name {
            fn model(&self) -> &str {
                $model
            }

            fn instruction(&self, $payload: &Value) -> String {
                $build
            }
        }
    };
}

agent_handler!(Architect, "qwen3-max-2026-01-23", |payload| format!(
    "As a systems architect, design the technical architecture for the \
     following requirements:\n\n{}\n\nProvide: 1. technology stack \
     2. architecture 3. database design 4. API design",
    field(payload, "requirements")
));

agent_handler!(CodeGen, "qwen3-coder-plus", |payload| format!(
    "Write {} code for: {}\n\nRequirements: idiomatic style, commented, runnable",
    field_or(payload, "language", "Python"),
    field(payload, "description")
));

agent_handler!(CodeAudit, "qwen3-coder-next", |payload| format!(
    "Audit the following code:\n\n{}\n\nCheck for: security vulnerabilities, \
     performance problems, style issues",
    field(payload, "code")
));

agent_handler!(Logic, "qwen3.5-plus", |payload| format!(
    "Analyze the problem: {}\n\nProvide: analysis, reasoning steps, conclusion",
    field(payload, "problem")
));

agent_handler!(Translate, "glm-4.7", |payload| format!(
    "Translate: {}\nFrom {} to {}",
    field(payload, "text"),
    field_or(payload, "source_lang", "English"),
    field_or(payload, "target_lang", "Chinese")
));

agent_handler!(LongText, "kimi-k2.5", |payload| format!(
    "Analyze the text: {}\nTask: {}",
    field(payload, "text"),
    field_or(payload, "task", "summary")
));

agent_handler!(Crawl, "qwen3-coder-plus", |payload| format!(
    "Design a crawler for: {}\nTask: {}",
    field(payload, "url"),
    field_or(payload, "task", "extract")
));

agent_handler!(Vision, "qwen3-max-2026-01-23", |payload| format!(
    "Analyze the image: {}\nTask: {}",
    field(payload, "image_url"),
    field_or(payload, "task", "describe")
));

/// Maps agent identifiers to handlers and runs dispatches under a deadline.
pub struct AgentRegistry {
    handlers: HashMap<String, Arc<dyn AgentHandler>>,
    upstream: CompletionsClient,
    deadline: Duration,
}

impl AgentRegistry {
    /// Registry with the eight built-in agents.
    pub fn builtin(upstream: CompletionsClient, deadline: Duration) -> Self {
        let mut registry = Self {
            handlers: HashMap::new(),
            upstream,
            deadline,
        };
        registry.register("architect", Architect);
        registry.register("code-gen", CodeGen);
        registry.register("code-audit", CodeAudit);
        registry.register("logic", Logic);
        registry.register("translate", Translate);
        registry.register("long-text", LongText);
        registry.register("crawl", Crawl);
        registry.register("vision", Vision);
        registry
    }

    pub fn register<H: AgentHandler + 'static>(&mut self, id: &str, handler: H) {
        self.handlers.insert(id.to_string(), Arc::new(handler));
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn AgentHandler>> {
        self.handlers.get(id).cloned()
    }

    /// Builds the instruction and performs exactly one bounded downstream
    /// call. A deadline miss cancels the in-flight request.
    #[instrument(skip(self, handler, payload), fields(model = handler.model()))]
    pub async fn dispatch(
        &self,
        handler: &dyn AgentHandler,
        payload: &Value,
    ) -> Result<AgentOutput, HandlerError> {
        let model = handler.model().to_string();
        let instruction = handler.instruction(payload);
        let call = self.upstream.complete(&model, &instruction);
        let completion = tokio::time::timeout(self.deadline, call)
            .await
            .map_err(|_| HandlerError::Timeout(self.deadline))??;
        Ok(AgentOutput {
            text: completion.text,
            model,
            tokens_used: completion.tokens_used,
        })
    }
}
