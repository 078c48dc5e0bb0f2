use std::sync::Arc;

use singing_assembler::{collect_feed, feed_cue, Collector, CollectorError, Item, Subscription};
use singing_core::Cue;

use crate::store::SubscriptionDb;

/// Collector over the entries published to one channel's stored feed.
pub struct StoredFeed {
    db: Arc<SubscriptionDb>,
    channel: String,
    name: String,
}

impl StoredFeed {
    pub fn new(db: Arc<SubscriptionDb>, channel: impl Into<String>) -> Self {
        let channel = channel.into();
        Self {
            db,
            name: format!("feed:{channel}"),
            channel,
        }
    }
}

impl Collector for StoredFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_items(
        &self,
        cue: Option<&Cue>,
        subscription: &Subscription,
    ) -> Result<(Vec<Item>, Option<Cue>), CollectorError> {
        let after = feed_cue(&self.name, cue)?;
        let entries = self
            .db
            .feed_entries(&self.channel, after)
            .map_err(|e| CollectorError::new(&self.name, e.to_string()))?;
        collect_feed(&self.name, &entries, cue, subscription)
    }
}

impl std::fmt::Debug for StoredFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredFeed")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}
