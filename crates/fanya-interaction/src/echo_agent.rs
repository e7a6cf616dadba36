//! EchoAgent - local stand-in for the remote agent.

use async_trait::async_trait;
use fanya_core::agent::{AgentEndpoint, AgentRequest};
use fanya_core::error::Result;
use fanya_core::message::payload::RESPOND_ACTION;
use serde_json::{Value, json};

/// Replies with the user's own text in the webhook's response shape.
#[derive(Debug, Clone)]
pub struct EchoAgent {
    prefix: String,
}

impl EchoAgent {
    pub fn new() -> Self {
        Self {
            prefix: "Echo: ".to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn reply_text(&self, request: &AgentRequest) -> String {
        let pinned = request
            .context_input
            .as_deref()
            .and_then(|encoded| serde_json::from_str::<Vec<Value>>(encoded).ok())
            .map_or(0, |context| context.len());

        if pinned == 0 {
            format!("{}{}", self.prefix, request.chat_input)
        } else {
            format!(
                "{}{} (with {} pinned message{})",
                self.prefix,
                request.chat_input,
                pinned,
                if pinned == 1 { "" } else { "s" }
            )
        }
    }
}

impl Default for EchoAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentEndpoint for EchoAgent {
    async fn send(&self, request: &AgentRequest) -> Result<Value> {
        Ok(json!([{
            "output": {
                "action_type": RESPOND_ACTION,
                "response_content": {
                    "content": self.reply_text(request),
                    "type": "text",
                },
            },
        }]))
    }
}
