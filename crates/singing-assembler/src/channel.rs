use std::collections::HashMap;
use std::sync::Arc;

use singing_dispatch::MessageQueues;
use tracing::info;

use crate::{
    collector::Collector,
    composer::Composer,
    error::{AssembleError, Result},
    subscription::{subscription_secret, Data, Subscription, Subscriptions},
};

/// A newsletter: its composers by format, its subscribers, an optional
/// collector, and the outbox of rendered messages.
pub struct Channel {
    pub name: String,
    pub title: String,
    composers: HashMap<String, Arc<dyn Composer>>,
    collector: Option<Arc<dyn Collector>>,
    pub subscriptions: Subscriptions,
    pub queue: MessageQueues,
}

impl Channel {
    pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            composers: HashMap::new(),
            collector: None,
            subscriptions: Subscriptions::new(),
            queue: MessageQueues::new(),
        }
    }

    pub fn with_composer(mut self, format: impl Into<String>, composer: Arc<dyn Composer>) -> Self {
        self.composers.insert(format.into(), composer);
        self
    }

    pub fn with_collector(mut self, collector: Arc<dyn Collector>) -> Self {
        self.collector = Some(collector);
        self
    }

    pub fn set_collector(&mut self, collector: Option<Arc<dyn Collector>>) {
        self.collector = collector;
    }

    pub fn composer(&self, format: &str) -> Option<&Arc<dyn Composer>> {
        self.composers.get(format)
    }

    pub fn collector(&self) -> Option<&Arc<dyn Collector>> {
        self.collector.as_ref()
    }

    /// Format names, sorted.
    pub fn formats(&self) -> Vec<&str> {
        let mut formats: Vec<&str> = self.composers.keys().map(String::as_str).collect();
        formats.sort_unstable();
        formats
    }

    pub(crate) fn composers(&self) -> &HashMap<String, Arc<dyn Composer>> {
        &self.composers
    }

    /// Validate `composer_data` against the format's composer schema and add
    /// a new subscription.
    pub fn subscribe(
        &mut self,
        format: &str,
        composer_data: Data,
        collector_data: Data,
        salt: &str,
        pending: bool,
    ) -> Result<&Subscription> {
        let composer = self
            .composers
            .get(format)
            .ok_or_else(|| AssembleError::NoSuchFormat {
                channel: self.name.clone(),
                format: format.to_string(),
            })?;
        let schema = composer.schema();
        if let Some(field) = schema.missing_field(&composer_data) {
            return Err(AssembleError::MissingField {
                field: field.to_string(),
            });
        }
        let key = schema
            .key(&composer_data)
            .ok_or_else(|| AssembleError::MissingField {
                field: schema.key_field.clone(),
            })?;

        let secret = subscription_secret(salt, &self.name, &key)?;
        let subscription =
            Subscription::new(key, secret, format, composer_data, collector_data).pending(pending);
        info!(channel = %self.name, %format, pending, "new subscription");
        self.subscriptions.add(subscription)
    }

    pub fn confirm(&mut self, secret: &str) -> Result<&Subscription> {
        self.subscriptions.confirm(secret)
    }

    pub fn unsubscribe(&mut self, secret: &str) -> Result<Subscription> {
        let removed = self.subscriptions.remove_by_secret(secret)?;
        info!(channel = %self.name, subscription = %removed.id, "unsubscribed");
        Ok(removed)
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("formats", &self.formats())
            .field("collector", &self.collector.as_ref().map(|c| c.name()))
            .field("subscriptions", &self.subscriptions.len())
            .field("queue", &self.queue)
            .finish()
    }
}
