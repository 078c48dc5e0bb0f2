use serde::{Deserialize, Serialize};
use serde_json::Value;
use singing_core::RenderContext;
use singing_dispatch::Payload;
use thiserror::Error;

use crate::{
    item::{FormattedItem, TEXT_PLAIN},
    subscription::{Data, Subscription},
};

/// A composer could not render a message.
#[derive(Debug, Error)]
#[error("composer {composer} failed: {reason}")]
pub struct ComposerError {
    pub composer: String,
    pub reason: String,
}

impl ComposerError {
    pub fn new(composer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            composer: composer.into(),
            reason: reason.into(),
        }
    }
}

/// One field a composer asks for at subscribe time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub required: bool,
    pub description: String,
}

impl FieldSpec {
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
            description: description.into(),
        }
    }

    pub fn optional(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            description: description.into(),
        }
    }
}

/// The subscriber data a composer needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposerSchema {
    /// Field whose value identifies the subscriber within a channel.
    pub key_field: String,
    pub fields: Vec<FieldSpec>,
}

impl ComposerSchema {
    /// Returns the name of the first required field that is missing or blank.
    pub fn missing_field(&self, data: &Data) -> Option<&str> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .find(|f| match data.get(&f.name) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(_) => false,
            })
            .map(|f| f.name.as_str())
    }

    /// The subscriber key in `data`, as a string.
    pub fn key(&self, data: &Data) -> Option<String> {
        match data.get(&self.key_field)? {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

/// Renders one subscription's formatted units into a message payload.
pub trait Composer: Send + Sync {
    fn name(&self) -> &str;

    fn schema(&self) -> &ComposerSchema;

    /// `vars` override composer defaults for this run (e.g. `subject`).
    fn render(
        &self,
        subscription: &Subscription,
        items: &[FormattedItem],
        vars: &Data,
        ctx: &RenderContext,
    ) -> Result<Payload, ComposerError>;
}

/// E-mail style composer producing a `text/plain` body.
///
/// Needs an `email`; greets by `name` when one was given.
pub struct PlainTextComposer {
    title: String,
    schema: ComposerSchema,
}

impl PlainTextComposer {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            schema: ComposerSchema {
                key_field: "email".to_string(),
                fields: vec![
                    FieldSpec::required("email", "Address messages are sent to"),
                    FieldSpec::optional("name", "How to address the subscriber"),
                ],
            },
        }
    }
}

impl Composer for PlainTextComposer {
    fn name(&self) -> &str {
        "plain"
    }

    fn schema(&self) -> &ComposerSchema {
        &self.schema
    }

    fn render(
        &self,
        subscription: &Subscription,
        items: &[FormattedItem],
        vars: &Data,
        ctx: &RenderContext,
    ) -> Result<Payload, ComposerError> {
        let recipient = subscription
            .composer_str("email")
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| ComposerError::new(self.name(), "subscription has no email"))?;

        let subject = match vars.get("subject").and_then(Value::as_str) {
            Some(s) => s.to_string(),
            None => format!("{} ({})", self.title, ctx.now.format("%Y-%m-%d")),
        };

        let mut body = String::new();
        if let Some(name) = subscription.composer_str("name").filter(|n| !n.is_empty()) {
            body.push_str(&format!("Hello {name},\n\n"));
        }
        if let Some(intro) = vars.get("intro").and_then(Value::as_str) {
            body.push_str(intro);
            body.push_str("\n\n");
        }
        let units: Vec<&str> = items.iter().map(|i| i.text.as_str()).collect();
        body.push_str(&units.join("\n\n"));

        Ok(Payload {
            recipient: recipient.to_string(),
            subject,
            body,
            content_type: TEXT_PLAIN.to_string(),
        })
    }
}
