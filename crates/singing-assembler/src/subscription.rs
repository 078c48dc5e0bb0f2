use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;
use singing_core::{Cue, SubscriptionId};
use tracing::info;

use crate::error::{AssembleError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Free-form field data supplied at subscribe time.
pub type Data = Map<String, Value>;

/// Delivery bookkeeping attached to a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Name of the composer that renders this subscription's messages.
    pub format: String,
    /// While true nothing is sent (e.g. awaiting confirmation).
    pub pending: bool,
    /// Resumption token from the last collector call.
    pub cue: Option<Cue>,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub extra: Data,
}

impl Metadata {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            pending: false,
            cue: None,
            created: Utc::now(),
            extra: Data::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    /// Value of the composer schema's key field (e.g. the e-mail address).
    pub key: String,
    /// Token for confirm/unsubscribe links.
    pub secret: String,
    pub composer_data: Data,
    pub collector_data: Data,
    pub metadata: Metadata,
}

impl Subscription {
    pub fn new(
        key: impl Into<String>,
        secret: impl Into<String>,
        format: impl Into<String>,
        composer_data: Data,
        collector_data: Data,
    ) -> Self {
        Self {
            id: SubscriptionId::new(),
            key: key.into(),
            secret: secret.into(),
            composer_data,
            collector_data,
            metadata: Metadata::new(format),
        }
    }

    pub fn pending(mut self, pending: bool) -> Self {
        self.metadata.pending = pending;
        self
    }

    /// Look `name` up in composer data, then collector data.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.composer_data
            .get(name)
            .or_else(|| self.collector_data.get(name))
    }

    pub fn composer_str(&self, name: &str) -> Option<&str> {
        self.composer_data.get(name).and_then(Value::as_str)
    }

    fn matches_text(&self, needle: &str) -> bool {
        self.key.to_lowercase().contains(needle)
            || self.composer_data.values().any(|v| match v {
                Value::String(s) => s.to_lowercase().contains(needle),
                other => other.to_string().to_lowercase().contains(needle),
            })
    }
}

/// Derive the confirm/unsubscribe secret for `key` in `channel`.
///
/// Deterministic, so re-subscribing the same address yields the same link.
pub fn subscription_secret(salt: &str, channel: &str, key: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(salt.as_bytes())
        .map_err(|_| AssembleError::Internal("invalid HMAC key length".to_string()))?;
    mac.update(channel.as_bytes());
    mac.update(b"\0");
    mac.update(key.to_lowercase().as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Insertion-ordered collection of a channel's subscriptions.
///
/// Keys are unique per channel, compared case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct Subscriptions {
    items: Vec<Subscription>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, subscription: Subscription) -> Result<&Subscription> {
        if self.by_key(&subscription.key).is_some() {
            return Err(AssembleError::AlreadySubscribed {
                key: subscription.key,
            });
        }
        info!(subscription = %subscription.id, key = %subscription.key, "subscription added");
        self.items.push(subscription);
        let last = self.items.len() - 1;
        Ok(&self.items[last])
    }

    pub fn remove(&mut self, id: &SubscriptionId) -> Result<Subscription> {
        let pos = self
            .items
            .iter()
            .position(|s| &s.id == id)
            .ok_or_else(|| AssembleError::SubscriptionNotFound { id: id.to_string() })?;
        info!(subscription = %id, "subscription removed");
        Ok(self.items.remove(pos))
    }

    pub fn remove_by_secret(&mut self, secret: &str) -> Result<Subscription> {
        let id = self
            .by_secret(secret)
            .map(|s| s.id.clone())
            .ok_or(AssembleError::InvalidSecret)?;
        self.remove(&id)
    }

    /// Clear the pending flag of the subscription owning `secret`.
    pub fn confirm(&mut self, secret: &str) -> Result<&Subscription> {
        let sub = self
            .items
            .iter_mut()
            .find(|s| s.secret == secret)
            .ok_or(AssembleError::InvalidSecret)?;
        if sub.metadata.pending {
            sub.metadata.pending = false;
            info!(subscription = %sub.id, "subscription confirmed");
        }
        Ok(sub)
    }

    pub fn get(&self, id: &SubscriptionId) -> Option<&Subscription> {
        self.items.iter().find(|s| &s.id == id)
    }

    pub fn get_mut(&mut self, id: &SubscriptionId) -> Option<&mut Subscription> {
        self.items.iter_mut().find(|s| &s.id == id)
    }

    /// Case-insensitive lookup, folded the same way as [`subscription_secret`].
    pub fn by_key(&self, key: &str) -> Option<&Subscription> {
        let key = key.to_lowercase();
        self.items.iter().find(|s| s.key.to_lowercase() == key)
    }

    pub fn by_secret(&self, secret: &str) -> Option<&Subscription> {
        self.items.iter().find(|s| s.secret == secret)
    }

    /// Subscriptions whose composer or collector data has `field == value`.
    pub fn query(&self, field: &str, value: &Value) -> Vec<&Subscription> {
        self.items
            .iter()
            .filter(|s| s.field(field) == Some(value))
            .collect()
    }

    /// Case-insensitive substring search over keys and composer data.
    pub fn search(&self, text: &str) -> Vec<&Subscription> {
        let needle = text.to_lowercase();
        self.items.iter().filter(|s| s.matches_text(&needle)).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Subscription> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Subscription> {
        self.items.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<Subscription> for Subscriptions {
    fn from_iter<I: IntoIterator<Item = Subscription>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Subscriptions {
    type Item = &'a Subscription;
    type IntoIter = std::slice::Iter<'a, Subscription>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> Data {
        value.as_object().cloned().unwrap_or_default()
    }

    fn sub(email: &str, name: &str) -> Subscription {
        let secret = subscription_secret("salt", "news", email).expect("secret");
        Subscription::new(
            email,
            secret,
            "plain",
            data(json!({ "email": email, "name": name })),
            data(json!({ "topics": ["rust"] })),
        )
    }

    #[test]
    fn secret_is_stable_and_scoped() {
        let a = subscription_secret("salt", "news", "Ann@example.org").expect("secret");
        let b = subscription_secret("salt", "news", "ann@example.org").expect("secret");
        let other_channel = subscription_secret("salt", "alerts", "ann@example.org").expect("secret");
        let other_salt = subscription_secret("pepper", "news", "ann@example.org").expect("secret");
        assert_eq!(a, b);
        assert_ne!(a, other_channel);
        assert_ne!(a, other_salt);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let mut subs = Subscriptions::new();
        subs.add(sub("ann@example.org", "Ann")).expect("first add");
        let err = subs.add(sub("ANN@example.org", "Ann again")).unwrap_err();
        assert!(matches!(err, AssembleError::AlreadySubscribed { .. }));
        assert_eq!(subs.len(), 1);
    }

    #[test]
    fn duplicate_non_ascii_key_is_rejected() {
        let mut subs = Subscriptions::new();
        subs.add(sub("Émile@example.org", "Émile")).expect("first add");
        let err = subs.add(sub("émile@example.org", "Émile")).unwrap_err();
        assert!(matches!(err, AssembleError::AlreadySubscribed { .. }));
        assert_eq!(subs.len(), 1);
        assert!(subs.by_key("ÉMILE@EXAMPLE.ORG").is_some());
    }

    #[test]
    fn query_matches_composer_and_collector_fields() {
        let mut subs = Subscriptions::new();
        subs.add(sub("ann@example.org", "Ann")).expect("add");
        subs.add(sub("bob@example.org", "Bob")).expect("add");

        let hits = subs.query("name", &json!("Bob"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, "bob@example.org");

        assert_eq!(subs.query("topics", &json!(["rust"])).len(), 2);
        assert!(subs.query("name", &json!("Carol")).is_empty());
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let mut subs = Subscriptions::new();
        subs.add(sub("ann@example.org", "Ann Smith")).expect("add");
        subs.add(sub("bob@other.net", "Bob")).expect("add");

        assert_eq!(subs.search("SMITH").len(), 1);
        assert_eq!(subs.search("example").len(), 1);
        assert_eq!(subs.search("@").len(), 2);
        assert!(subs.search("zzz").is_empty());
    }

    #[test]
    fn confirm_clears_pending() {
        let mut subs = Subscriptions::new();
        let secret = subs
            .add(sub("ann@example.org", "Ann").pending(true))
            .expect("add")
            .secret
            .clone();

        assert!(matches!(subs.confirm("nope"), Err(AssembleError::InvalidSecret)));
        let confirmed = subs.confirm(&secret).expect("confirm");
        assert!(!confirmed.metadata.pending);
    }

    #[test]
    fn remove_by_secret_and_id() {
        let mut subs = Subscriptions::new();
        let ann_secret = subs.add(sub("ann@example.org", "Ann")).expect("add").secret.clone();
        let bob_id = subs.add(sub("bob@example.org", "Bob")).expect("add").id.clone();

        let removed = subs.remove_by_secret(&ann_secret).expect("remove");
        assert_eq!(removed.key, "ann@example.org");
        subs.remove(&bob_id).expect("remove");
        assert!(subs.is_empty());
        assert!(matches!(
            subs.remove(&bob_id),
            Err(AssembleError::SubscriptionNotFound { .. })
        ));
    }

    #[test]
    fn iteration_keeps_insertion_order() {
        let subs: Subscriptions = ["c@x.org", "a@x.org", "b@x.org"]
            .into_iter()
            .map(|e| sub(e, e))
            .collect();
        let keys: Vec<&str> = subs.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["c@x.org", "a@x.org", "b@x.org"]);
    }
}
