use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use singing_assembler::{Data, Item};
use singing_core::config::SchedulerKindConfig;

/// Scheduling policy of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    /// Only fires when triggered explicitly.
    Manual,
    /// Fires when a day has passed since the last fire.
    Daily,
    /// Fires when seven days have passed since the last fire.
    Weekly,
    /// Fires for queued items whose time has come.
    Timed,
}

impl std::fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SchedulerKind::Manual => "manual",
            SchedulerKind::Daily => "daily",
            SchedulerKind::Weekly => "weekly",
            SchedulerKind::Timed => "timed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for SchedulerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "manual" => Ok(SchedulerKind::Manual),
            "daily" => Ok(SchedulerKind::Daily),
            "weekly" => Ok(SchedulerKind::Weekly),
            "timed" => Ok(SchedulerKind::Timed),
            other => Err(format!("unknown scheduler kind: {other}")),
        }
    }
}

impl From<SchedulerKindConfig> for SchedulerKind {
    fn from(kind: SchedulerKindConfig) -> Self {
        match kind {
            SchedulerKindConfig::Manual => SchedulerKind::Manual,
            SchedulerKindConfig::Daily => SchedulerKind::Daily,
            SchedulerKindConfig::Weekly => SchedulerKind::Weekly,
            SchedulerKindConfig::Timed => SchedulerKind::Timed,
        }
    }
}

/// Produces the content of a timed send when its time comes.
pub trait ContentSource: Send + Sync {
    fn content(&self) -> Item;
}

impl<F> ContentSource for F
where
    F: Fn() -> Item + Send + Sync,
{
    fn content(&self) -> Item {
        self()
    }
}

/// One queued send of a timed scheduler.
///
/// The content source is held weakly: if its owner dropped it before the
/// send time, the item still fires but contributes no content.
#[derive(Debug, Clone)]
pub struct TimedItem {
    pub at: DateTime<Utc>,
    /// `None` means "send whatever the collector has".
    pub content: Option<Weak<dyn ContentSource>>,
    /// Merged into the composer override vars of the send.
    pub extra: Data,
}

impl TimedItem {
    pub fn new(at: DateTime<Utc>, content: Option<&Arc<dyn ContentSource>>, extra: Data) -> Self {
        Self {
            at,
            content: content.map(Arc::downgrade),
            extra,
        }
    }

    /// The item's content, if it has a source that is still alive.
    pub fn resolve(&self) -> Option<Item> {
        let source = self.content.as_ref()?.upgrade()?;
        Some(source.content())
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.at <= now
    }
}

/// Persistable part of a scheduler (timed items hold live references and
/// are not included).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerState {
    pub kind: SchedulerKind,
    pub active: bool,
    pub triggered_last: Option<DateTime<Utc>>,
}
