use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event sent by the chat host as soon as the connection is open.
pub const TOPIC_HELLO: &str = "chat.hello";
/// Event sent by the chat host once the bot is logged in.
pub const TOPIC_READY: &str = "system.ready";
/// Event sent whenever the host observes a user typing.
pub const TOPIC_TYPING: &str = "chat.typing";
/// Event sent for every message posted in a watched channel.
pub const TOPIC_MESSAGE: &str = "chat.message";

pub const METHOD_INIT: &str = "bot.init";
pub const METHOD_SUBSCRIBE: &str = "event.subscribe";
pub const METHOD_SEND: &str = "chat.send";
pub const METHOD_STOP: &str = "bot.stop";

/// Error code used for requests naming a method the receiver does not know.
pub const UNKNOWN_METHOD: i32 = -32601;

/// Kind of envelope used in the JSON protocol.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Request,
    Response,
    Event,
}

/// Standard RPC style error object.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

/// Top level envelope exchanged between the bot and its chat host.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Envelope {
    pub id: Option<String>,
    pub kind: Kind,
    pub method: Option<String>,
    pub params: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<RpcError>,
    pub topic: Option<String>,
    pub payload: Option<Value>,
}

impl Envelope {
    /// Build a request carrying `params`.
    pub fn request(id: impl Into<String>, method: &str, params: Value) -> Self {
        Self {
            id: Some(id.into()),
            kind: Kind::Request,
            method: Some(method.to_string()),
            params: Some(params),
            result: None,
            error: None,
            topic: None,
            payload: None,
        }
    }

    /// Build a successful response to the request with the given id.
    pub fn response(id: Option<String>, result: Value) -> Self {
        Self {
            id,
            kind: Kind::Response,
            method: None,
            params: None,
            result: Some(result),
            error: None,
            topic: None,
            payload: None,
        }
    }

    /// Build an error response to the request with the given id.
    pub fn error_response(id: Option<String>, code: i32, message: impl Into<String>) -> Self {
        Self {
            id,
            kind: Kind::Response,
            method: None,
            params: None,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
            topic: None,
            payload: None,
        }
    }

    /// Build an event on `topic`.
    pub fn event(topic: &str, payload: Option<Value>) -> Self {
        Self {
            id: None,
            kind: Kind::Event,
            method: None,
            params: None,
            result: None,
            error: None,
            topic: Some(topic.to_string()),
            payload,
        }
    }

    /// Whether this envelope is an event on `topic`.
    pub fn is_event(&self, topic: &str) -> bool {
        self.kind == Kind::Event && self.topic.as_deref() == Some(topic)
    }
}

/// Metadata the bot provides during the init phase.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub needs: Vec<String>,
}

/// A chat account, identified by display name plus discriminator.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct ChatUser {
    pub name: String,
    pub discriminator: String,
}

impl std::fmt::Display for ChatUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.name, self.discriminator)
    }
}

/// Payload of `chat.typing`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TypingPayload {
    pub channel_id: String,
    pub user: ChatUser,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<DateTime<FixedOffset>>,
}

/// Payload of `chat.message`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MessagePayload {
    pub channel_id: String,
    pub author: ChatUser,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<DateTime<FixedOffset>>,
}

/// Payload of `system.ready`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ReadyPayload {
    #[serde(default)]
    pub user: Option<ChatUser>,
}

/// Parameters of the `chat.send` request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SendParams {
    pub channel_id: String,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrip() {
        let env = Envelope::request(
            "1",
            METHOD_SEND,
            serde_json::json!({"channel_id":"general","text":"Stop."}),
        );
        let s = serde_json::to_string(&env).unwrap();
        let de: Envelope = serde_json::from_str(&s).unwrap();
        assert_eq!(env, de);
    }

    #[test]
    fn typing_payload_without_timestamp() {
        let payload: TypingPayload = serde_json::from_value(serde_json::json!({
            "channel_id": "general",
            "user": {"name": "juan", "discriminator": "0420"}
        }))
        .unwrap();
        assert_eq!(payload.user.to_string(), "juan#0420");
        assert!(payload.at.is_none());
    }

    #[test]
    fn message_payload_parses_rfc3339_timestamp() {
        let payload: MessagePayload = serde_json::from_value(serde_json::json!({
            "channel_id": "general",
            "author": {"name": "juan", "discriminator": "0420"},
            "content": "hi",
            "at": "2024-03-01T12:00:40-05:00"
        }))
        .unwrap();
        let at = payload.at.unwrap();
        assert_eq!(at.offset().local_minus_utc(), -5 * 3600);
        assert_eq!(payload.content, "hi");
    }

    #[test]
    fn event_helper_matches_topic() {
        let env = Envelope::event(TOPIC_READY, None);
        assert!(env.is_event(TOPIC_READY));
        assert!(!env.is_event(TOPIC_TYPING));
    }
}
