//! Natural-Language Router
//!
//! Asks the reasoning engine whether free-form input is conversation or a
//! task, and how to recover from a failed command. Never fails: transport and
//! parse problems degrade to a chat reply. Never executes anything.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::llm_client::LlmClient;
use crate::prompts::{replan_prompt, route_prompt, REPLAN_SYSTEM_PROMPT, ROUTER_SYSTEM_PROMPT};

/// Reply used when the reasoning engine cannot be reached
pub const THINKING_TROUBLE: &str = "I'm having trouble thinking right now.";

/// Longest raw model text echoed back as a chat reply
const FALLBACK_MAX_CHARS: usize = 300;

/// Captured output beyond this is cut before it is sent for replanning
const REPLAN_ERROR_MAX_CHARS: usize = 4000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Chat {
        response: String,
    },
    /// Ordered shell commands, run strictly in sequence
    Task {
        commands: Vec<String>,
        explanation: Option<String>,
    },
}

pub struct NlRouter {
    llm: Arc<dyn LlmClient>,
}

impl NlRouter {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Classify `user_text`; `context` is recent conversation, possibly empty
    pub async fn route(&self, user_text: &str, context: &str) -> RouteDecision {
        info!("Routing text: {}", user_text);
        self.ask(ROUTER_SYSTEM_PROMPT, &route_prompt(user_text, context))
            .await
    }

    /// Ask how to recover from `command` failing with `error`
    pub async fn replan(&self, command: &str, error: &str) -> RouteDecision {
        info!("Replanning after failure of '{}'", command);
        let error = truncate_chars(error, REPLAN_ERROR_MAX_CHARS);
        self.ask(REPLAN_SYSTEM_PROMPT, &replan_prompt(command, &error))
            .await
    }

    async fn ask(&self, system_prompt: &str, user_prompt: &str) -> RouteDecision {
        match self.llm.call(system_prompt, user_prompt).await {
            Ok(raw) => {
                debug!("Raw LLM output: {}", raw);
                parse_decision(&raw)
            }
            Err(e) => {
                warn!("LLM request failed: {}", e);
                RouteDecision::Chat {
                    response: THINKING_TROUBLE.to_string(),
                }
            }
        }
    }
}

/// Interpret raw model output; anything malformed becomes a chat reply
pub fn parse_decision(raw: &str) -> RouteDecision {
    let body = strip_code_fence(raw.trim());

    let decision = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => match map.get("type").and_then(Value::as_str) {
            Some("chat") => map
                .get("response")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(|r| RouteDecision::Chat {
                    response: r.to_string(),
                }),
            Some("task") => task_from(&map),
            _ => None,
        },
        _ => None,
    };

    decision.unwrap_or_else(|| {
        warn!("Invalid routing JSON from LLM, falling back to chat");
        RouteDecision::Chat {
            response: clean_fallback(raw),
        }
    })
}

fn task_from(map: &serde_json::Map<String, Value>) -> Option<RouteDecision> {
    let items = map.get("commands")?.as_array()?;
    let mut commands = Vec::with_capacity(items.len());
    for item in items {
        // A plan with a non-string step is not a plan
        let cmd = item.as_str()?.trim();
        if !cmd.is_empty() {
            commands.push(cmd.to_string());
        }
    }
    let explanation = map
        .get("explanation")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string);
    Some(RouteDecision::Task {
        commands,
        explanation,
    })
}

/// Make raw model text fit to be spoken
pub fn clean_fallback(text: &str) -> String {
    let text = text.trim();
    let mut out = truncate_chars(text, FALLBACK_MAX_CHARS);
    out.retain(|c| !matches!(c, '{' | '}' | '[' | ']' | '`'));
    let out = out.trim();
    if out.is_empty() {
        "Okay.".to_string()
    } else {
        out.to_string()
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
