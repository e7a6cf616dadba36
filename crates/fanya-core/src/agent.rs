//! External agent port.
//!
//! The engine sends one request per user message and parses the reply with
//! [`parse_agent_reply`](crate::message::parse_agent_reply).

use crate::error::Result;
use crate::message::ContextMessage;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Body sent to the agent endpoint.
///
/// `contextInput` is a JSON-encoded array of `{role, content}` and is omitted
/// when no messages are pinned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentRequest {
    #[serde(rename = "chatInput")]
    pub chat_input: String,
    pub session_id: String,
    pub user_id: String,
    #[serde(rename = "contextInput", skip_serializing_if = "Option::is_none")]
    pub context_input: Option<String>,
}

impl AgentRequest {
    pub fn new(
        chat_input: impl Into<String>,
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        context: &[ContextMessage],
    ) -> Result<Self> {
        let context_input = if context.is_empty() {
            None
        } else {
            Some(serde_json::to_string(context)?)
        };

        Ok(Self {
            chat_input: chat_input.into(),
            session_id: session_id.into(),
            user_id: user_id.into(),
            context_input,
        })
    }
}

/// The external automated responder.
#[async_trait]
pub trait AgentEndpoint: Send + Sync {
    /// Sends the request and returns the decoded response body.
    ///
    /// A transport failure or non-2xx status is reported as
    /// [`FanyaError::Transport`](crate::FanyaError::Transport); the body's
    /// shape is not validated here.
    async fn send(&self, request: &AgentRequest) -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::SenderRole;
    use serde_json::json;

    #[test]
    fn test_request_without_context_omits_field() {
        let request = AgentRequest::new("hello", "s-1", "u-1", &[]).unwrap();
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"chatInput": "hello", "session_id": "s-1", "user_id": "u-1"})
        );
    }

    #[test]
    fn test_request_context_is_json_encoded_string() {
        let context = vec![
            ContextMessage {
                role: SenderRole::User,
                content: "earlier".to_string(),
            },
            ContextMessage {
                role: SenderRole::Agent,
                content: "reply".to_string(),
            },
        ];
        let request = AgentRequest::new("next", "s-1", "u-1", &context).unwrap();
        let encoded = request.context_input.expect("context should be present");
        let decoded: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(
            decoded,
            json!([{"role": "user", "content": "earlier"}, {"role": "agent", "content": "reply"}])
        );
    }
}
