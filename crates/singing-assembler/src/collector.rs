use std::fmt;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value;
use singing_core::Cue;
use thiserror::Error;

use crate::{item::Item, subscription::Subscription};

/// A collector could not produce items.
#[derive(Debug, Error)]
#[error("collector {collector} failed: {reason}")]
pub struct CollectorError {
    pub collector: String,
    pub reason: String,
}

impl CollectorError {
    pub fn new(collector: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            collector: collector.into(),
            reason: reason.into(),
        }
    }
}

/// Gathers the content items a subscription has not seen yet.
pub trait Collector: Send + Sync {
    fn name(&self) -> &str;

    /// Return the items after `cue` plus the cue to pass next time.
    ///
    /// `cue` is `None` on a subscription's first run or when the caller
    /// asks for everything.
    fn get_items(
        &self,
        cue: Option<&Cue>,
        subscription: &Subscription,
    ) -> Result<(Vec<Item>, Option<Cue>), CollectorError>;
}

/// One published entry of a feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    /// Grows with every publish to the feed. Cues refer to it.
    pub seq: u64,
    pub published: DateTime<Utc>,
    pub title: String,
    pub topic: Option<String>,
}

impl fmt::Display for FeedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title)
    }
}

/// Decode a feed cue: the highest entry `seq` already handed out.
pub fn feed_cue(collector: &str, cue: Option<&Cue>) -> Result<Option<u64>, CollectorError> {
    match cue {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_u64().map(Some).ok_or_else(|| {
            CollectorError::new(
                collector,
                format!("cue must be an entry sequence, got {value}"),
            )
        }),
    }
}

/// Entries published after `cue` that `subscription` wants, ordered by
/// publication time, plus the cue for the next call.
///
/// The cue moves past every newer entry, including ones filtered out by topic.
/// With nothing new the given cue is handed back unchanged.
pub fn collect_feed(
    collector: &str,
    entries: &[FeedEntry],
    cue: Option<&Cue>,
    subscription: &Subscription,
) -> Result<(Vec<Item>, Option<Cue>), CollectorError> {
    let since = feed_cue(collector, cue)?;
    let mut newer: Vec<&FeedEntry> = entries
        .iter()
        .filter(|e| since.map_or(true, |s| e.seq > s))
        .collect();

    let next_cue = match newer.iter().map(|e| e.seq).max() {
        Some(seq) => Some(Value::from(seq)),
        None => cue.cloned(),
    };

    newer.sort_by_key(|e| (e.published, e.seq));
    let items = newer
        .into_iter()
        .filter(|e| wants(subscription, e))
        .cloned()
        .map(Item::new)
        .collect();
    Ok((items, next_cue))
}

fn wants(subscription: &Subscription, entry: &FeedEntry) -> bool {
    let Some(topics) = subscription
        .collector_data
        .get("topics")
        .and_then(Value::as_array)
    else {
        return true;
    };
    match &entry.topic {
        None => true,
        Some(topic) => topics.iter().any(|t| t.as_str() == Some(topic.as_str())),
    }
}

/// In-memory feed that hands out entries the subscription has not seen.
///
/// The cue is the sequence number of the last entry handed out, so entries
/// sharing a timestamp, or published late with an older one, are never
/// skipped. A subscription with a `topics` list in its collector data only
/// receives entries tagged with one of those topics (untagged entries go to
/// everyone).
pub struct FeedCollector {
    name: String,
    entries: RwLock<Vec<FeedEntry>>,
}

impl FeedCollector {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Append an entry and return its sequence number.
    pub fn publish(
        &self,
        published: DateTime<Utc>,
        title: impl Into<String>,
        topic: Option<&str>,
    ) -> u64 {
        let mut entries = self.entries.write().expect("feed entries poisoned");
        let seq = entries.len() as u64 + 1;
        entries.push(FeedEntry {
            seq,
            published,
            title: title.into(),
            topic: topic.map(str::to_string),
        });
        seq
    }
}

impl Collector for FeedCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_items(
        &self,
        cue: Option<&Cue>,
        subscription: &Subscription,
    ) -> Result<(Vec<Item>, Option<Cue>), CollectorError> {
        let entries = self.entries.read().expect("feed entries poisoned");
        collect_feed(&self.name, &entries, cue, subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::Data;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
            .single()
            .expect("valid date")
    }

    fn reader(topics: Option<Value>) -> Subscription {
        let mut collector_data = Data::new();
        if let Some(t) = topics {
            collector_data.insert("topics".into(), t);
        }
        Subscription::new("r@x.org", "s", "plain", Data::new(), collector_data)
    }

    fn titles(items: &[Item]) -> Vec<String> {
        items.iter().map(Item::text).collect()
    }

    #[test]
    fn first_call_returns_everything() {
        let feed = FeedCollector::new("feed");
        feed.publish(t0() + Duration::hours(2), "second", None);
        feed.publish(t0() + Duration::hours(1), "first", None);

        let (items, cue) = feed.get_items(None, &reader(None)).expect("items");
        assert_eq!(titles(&items), vec!["first", "second"]);
        assert_eq!(cue, Some(json!(2)));
    }

    #[test]
    fn cue_skips_delivered_entries() {
        let feed = FeedCollector::new("feed");
        feed.publish(t0(), "old", None);
        let (_, cue) = feed.get_items(None, &reader(None)).expect("items");

        feed.publish(t0() + Duration::days(1), "new", None);
        let (items, next) = feed.get_items(cue.as_ref(), &reader(None)).expect("items");
        assert_eq!(titles(&items), vec!["new"]);
        assert_ne!(next, cue);
    }

    #[test]
    fn nothing_new_keeps_cue() {
        let feed = FeedCollector::new("feed");
        feed.publish(t0(), "only", None);
        let (_, cue) = feed.get_items(None, &reader(None)).expect("items");
        let (items, again) = feed.get_items(cue.as_ref(), &reader(None)).expect("items");
        assert!(items.is_empty());
        assert_eq!(again, cue);
    }

    #[test]
    fn topics_filter_tagged_entries() {
        let feed = FeedCollector::new("feed");
        feed.publish(t0(), "rust news", Some("rust"));
        feed.publish(t0() + Duration::hours(1), "go news", Some("go"));
        feed.publish(t0() + Duration::hours(2), "site notice", None);

        let (items, _) = feed
            .get_items(None, &reader(Some(json!(["rust"]))))
            .expect("items");
        assert_eq!(titles(&items), vec!["rust news", "site notice"]);
    }

    #[test]
    fn late_entry_with_same_timestamp_is_delivered() {
        let feed = FeedCollector::new("feed");
        feed.publish(t0(), "morning edition", None);
        let (_, cue) = feed.get_items(None, &reader(None)).expect("items");

        feed.publish(t0(), "correction", None);
        feed.publish(t0() - Duration::hours(1), "backdated", None);
        let (items, next) = feed.get_items(cue.as_ref(), &reader(None)).expect("items");
        assert_eq!(titles(&items), vec!["backdated", "correction"]);
        assert_eq!(next, Some(json!(3)));
    }

    #[test]
    fn filtered_entries_still_advance_the_cue() {
        let feed = FeedCollector::new("feed");
        feed.publish(t0(), "go news", Some("go"));

        let (items, cue) = feed
            .get_items(None, &reader(Some(json!(["rust"]))))
            .expect("items");
        assert!(items.is_empty());
        assert_eq!(cue, Some(json!(1)));
    }

    #[test]
    fn malformed_cue_is_an_error() {
        let feed = FeedCollector::new("feed");
        let err = feed
            .get_items(Some(&json!("yesterday")), &reader(None))
            .unwrap_err();
        assert_eq!(err.collector, "feed");
        assert!(feed.get_items(Some(&json!(-1)), &reader(None)).is_err());
        assert!(feed.get_items(Some(&Value::Null), &reader(None)).is_ok());
    }
}
