use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use singing_core::SubscriptionId;
use uuid::Uuid;

/// Rendered message content, produced by a composer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Transport address (e-mail address for the plain text composer).
    pub recipient: String,
    pub subject: String,
    pub body: String,
    /// Media type of `body`, e.g. `text/plain`.
    pub content_type: String,
}

/// Delivery state of a queued message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Rendered, never attempted.
    New,
    /// Handed to the transport successfully.
    Sent,
    /// Delivery failed; kept for inspection.
    Error,
    /// Delivery failed transiently; picked up again on the next dispatch.
    Retry,
}

impl MessageStatus {
    pub const ALL: [MessageStatus; 4] = [
        MessageStatus::New,
        MessageStatus::Sent,
        MessageStatus::Error,
        MessageStatus::Retry,
    ];
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageStatus::New => "new",
            MessageStatus::Sent => "sent",
            MessageStatus::Error => "error",
            MessageStatus::Retry => "retry",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "new" => Ok(MessageStatus::New),
            "sent" => Ok(MessageStatus::Sent),
            "error" => Ok(MessageStatus::Error),
            "retry" => Ok(MessageStatus::Retry),
            other => Err(format!("unknown message status: {other}")),
        }
    }
}

/// Outcome reported by a dispatcher: the `(status, detail)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub status: MessageStatus,
    pub detail: Option<String>,
}

impl Delivery {
    pub fn sent() -> Self {
        Self {
            status: MessageStatus::Sent,
            detail: None,
        }
    }

    pub fn retry(detail: impl Into<String>) -> Self {
        Self {
            status: MessageStatus::Retry,
            detail: Some(detail.into()),
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            status: MessageStatus::Error,
            detail: Some(detail.into()),
        }
    }
}

/// A rendered payload bound to the subscription it was rendered for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub payload: Payload,
    pub subscription: SubscriptionId,
    pub status: MessageStatus,
    /// Detail of the most recent status change (dispatcher message or error text).
    pub status_message: Option<String>,
    pub status_changed: DateTime<Utc>,
}

impl Message {
    pub fn new(payload: Payload, subscription: SubscriptionId) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            payload,
            subscription,
            status: MessageStatus::New,
            status_message: None,
            status_changed: Utc::now(),
        }
    }

    pub fn set_status(&mut self, status: MessageStatus, detail: Option<String>) {
        self.status = status;
        self.status_message = detail;
        self.status_changed = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_its_display_form() {
        for status in MessageStatus::ALL {
            let parsed: MessageStatus = status.to_string().parse().expect("parse failed");
            assert_eq!(parsed, status);
        }
        assert!("bounced".parse::<MessageStatus>().is_err());
    }

    #[test]
    fn new_message_starts_new() {
        let payload = Payload {
            recipient: "a@example.org".into(),
            subject: "hi".into(),
            body: "body".into(),
            content_type: "text/plain".into(),
        };
        let mut msg = Message::new(payload, SubscriptionId::from("s1"));
        assert_eq!(msg.status, MessageStatus::New);
        let before = msg.status_changed;

        msg.set_status(MessageStatus::Sent, Some("250 OK".into()));
        assert_eq!(msg.status, MessageStatus::Sent);
        assert_eq!(msg.status_message.as_deref(), Some("250 OK"));
        assert!(msg.status_changed >= before);
    }
}
