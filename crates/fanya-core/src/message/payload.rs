//! Payload parsing for stored records and agent replies.
//!
//! The `chat_messages.message` column holds one of two loosely-typed shapes
//! written by different producers:
//!
//! ```text
//! {"type": "human", "content": "hello"}
//! {"type": "ai",    "content": "{\"output\":{\"response_content\":{\"content\":\"hi\"}}}"}
//! ```
//!
//! Both the column itself and the `ai` content may arrive JSON-encoded as a
//! string or already decoded. Parsing is total: every failure becomes a
//! visible fallback message that keeps the record's id.

use super::model::{Message, MessageId, RawStoredRecord, SenderRole};
use serde_json::{Value, json};

/// Shown when an `ai` payload decodes but has no `output.response_content.content`.
pub const AI_CONTENT_MISSING: &str = "The agent response did not include any content.";
/// Shown when the `ai` payload's inner content is not valid JSON.
pub const AI_CONTENT_UNREADABLE: &str = "The agent response could not be read.";
/// Shown for payloads whose `type` is neither `human` nor `ai`.
pub const UNKNOWN_MESSAGE_TYPE: &str = "Unknown message type.";

/// Shown when the agent endpoint returns an empty or missing list.
pub const REPLY_EMPTY: &str = "The agent did not send a reply.";
/// Shown when the agent reply has no `output.response_content.content`.
pub const REPLY_CONTENT_MISSING: &str = "The agent reply was missing its content.";
/// Shown when the agent reply element is a string that is not valid JSON.
pub const REPLY_UNREADABLE: &str = "The agent reply could not be read.";

/// The only `action_type` whose content is rendered as a reply.
pub const RESPOND_ACTION: &str = "respond";

/// Text of the system message rendered in place of an undecodable record.
pub fn unreadable_record_text(id: i64) -> String {
    format!("Message {} could not be displayed: its payload is not valid JSON.", id)
}

/// Text of the reply rendered when the agent asks for an action the client does not support.
pub fn unsupported_action_text(action: &str) -> String {
    format!("The agent requested an unsupported action: {}.", action)
}

/// Content extracted from an `ai` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentContent {
    Text(String),
    /// The inner value decoded but the content path is absent.
    Missing,
    /// The inner value was a string that failed to decode.
    Unreadable,
}

/// The tagged union stored in `chat_messages.message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredPayload {
    Human { content: String },
    Ai { content: AgentContent },
    /// Any other or missing `type`; rendered as an agent message.
    Unrecognized { kind: Option<String> },
}

impl StoredPayload {
    /// Classifies an already-decoded payload value.
    pub fn from_value(value: &Value) -> Self {
        match value.get("type").and_then(Value::as_str) {
            Some("human") => Self::Human {
                content: text_of(value.get("content")),
            },
            Some("ai") => Self::Ai {
                content: agent_content(value.get("content")),
            },
            other => Self::Unrecognized {
                kind: other.map(str::to_string),
            },
        }
    }

    /// The payload written for a message typed by the user.
    pub fn human_value(content: &str) -> Value {
        json!({ "type": "human", "content": content })
    }

    /// Role and display text for this payload.
    pub fn into_parts(self) -> (SenderRole, String) {
        match self {
            Self::Human { content } => (SenderRole::User, content),
            Self::Ai { content } => {
                let text = match content {
                    AgentContent::Text(text) => text,
                    AgentContent::Missing => AI_CONTENT_MISSING.to_string(),
                    AgentContent::Unreadable => AI_CONTENT_UNREADABLE.to_string(),
                };
                (SenderRole::Agent, text)
            }
            Self::Unrecognized { .. } => (SenderRole::Agent, UNKNOWN_MESSAGE_TYPE.to_string()),
        }
    }
}

/// Normalizes one stored record. Never fails.
///
/// A `message` column that is a string failing to decode yields a `system`
/// message whose text embeds the record id; everything else is classified by
/// [`StoredPayload::from_value`].
pub fn parse_record(raw: &RawStoredRecord) -> Message {
    let (sender_role, content) = match decode_if_string(&raw.message) {
        Ok(value) => StoredPayload::from_value(&value).into_parts(),
        Err(_) => (SenderRole::System, unreadable_record_text(raw.id)),
    };

    Message {
        id: MessageId::Server(raw.id),
        session_id: raw.session_id.clone(),
        sender_role,
        content,
    }
}

/// Extracts the reply text from the agent endpoint's response body.
///
/// The body is expected to be a list whose first element has the shape
/// `{output: {action_type, response_content: {content, type}}}`. An empty or
/// absent list, a missing field, or a non-`respond` action each produce a
/// fixed fallback text instead of an error.
pub fn parse_agent_reply(body: &Value) -> String {
    let Some(first) = body.as_array().and_then(|items| items.first()) else {
        return REPLY_EMPTY.to_string();
    };

    let Ok(first) = decode_if_string(first) else {
        return REPLY_UNREADABLE.to_string();
    };

    let output = first.get("output");
    if let Some(action) = output
        .and_then(|o| o.get("action_type"))
        .and_then(Value::as_str)
        && action != RESPOND_ACTION
    {
        return unsupported_action_text(action);
    }

    response_text(&first).unwrap_or_else(|| REPLY_CONTENT_MISSING.to_string())
}

fn agent_content(content: Option<&Value>) -> AgentContent {
    let Some(content) = content else {
        return AgentContent::Missing;
    };
    match decode_if_string(content) {
        Ok(inner) => response_text(&inner)
            .map(AgentContent::Text)
            .unwrap_or(AgentContent::Missing),
        Err(_) => AgentContent::Unreadable,
    }
}

/// Reads `output.response_content.content` as a string.
fn response_text(value: &Value) -> Option<String> {
    value
        .get("output")?
        .get("response_content")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

/// Decodes `value` when it is a JSON-encoded string, otherwise clones it.
fn decode_if_string(value: &Value) -> Result<Value, serde_json::Error> {
    match value {
        Value::String(encoded) => serde_json::from_str(encoded),
        other => Ok(other.clone()),
    }
}

fn text_of(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}
