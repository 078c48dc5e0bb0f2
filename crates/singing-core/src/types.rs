use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque resumption token handed out by a collector and fed back on the
/// next call. The assembler never inspects it.
pub type Cue = serde_json::Value;

/// Unique identifier for a subscription (UUIDv7, so ids sort by creation time).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for SubscriptionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SubscriptionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Request-scoped context passed to formatters, transforms and composers.
///
/// `locale` selects locale-specific formatters; `now` is the instant the
/// current assembly started, so every message of one run agrees on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderContext {
    pub locale: Option<String>,
    pub now: DateTime<Utc>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self {
            locale: None,
            now: Utc::now(),
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(SubscriptionId::new(), SubscriptionId::new());
    }

    #[test]
    fn id_displays_inner_string() {
        let id = SubscriptionId::from("sub-1");
        assert_eq!(id.to_string(), "sub-1");
        assert_eq!(id.as_str(), "sub-1");
    }

    #[test]
    fn context_builder_sets_locale() {
        let ctx = RenderContext::new().with_locale("de");
        assert_eq!(ctx.locale.as_deref(), Some("de"));
    }
}
