use std::sync::Arc;

use chrono::{DateTime, Utc};
use singing_assembler::{AssembleRequest, Assembler, Channel, Data, Item};
use singing_core::RenderContext;
use tracing::{debug, info};

use crate::{
    error::Result,
    schedule::{next_fire, periodic_due},
    types::{ContentSource, SchedulerKind, SchedulerState, TimedItem},
};

/// Decides when a channel's messages are assembled.
///
/// `tick` fires only when the policy says so and the scheduler is active;
/// `trigger` always fires. A fire that fails leaves the scheduler exactly
/// as it was: `triggered_last` keeps its value and no timed item is consumed.
#[derive(Debug, Clone)]
pub struct Scheduler {
    kind: SchedulerKind,
    active: bool,
    /// Last successful fire; only ever moves forward.
    triggered_last: Option<DateTime<Utc>>,
    /// Timed policy queue, in scheduling order.
    items: Vec<TimedItem>,
}

impl Scheduler {
    pub fn new(kind: SchedulerKind) -> Self {
        Self {
            kind,
            active: true,
            triggered_last: None,
            items: Vec::new(),
        }
    }

    pub fn manual() -> Self {
        Self::new(SchedulerKind::Manual)
    }

    pub fn daily() -> Self {
        Self::new(SchedulerKind::Daily)
    }

    pub fn weekly() -> Self {
        Self::new(SchedulerKind::Weekly)
    }

    pub fn timed() -> Self {
        Self::new(SchedulerKind::Timed)
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn from_state(state: &SchedulerState) -> Self {
        Self {
            kind: state.kind,
            active: state.active,
            triggered_last: state.triggered_last,
            items: Vec::new(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        SchedulerState {
            kind: self.kind,
            active: self.active,
            triggered_last: self.triggered_last,
        }
    }

    pub fn kind(&self) -> SchedulerKind {
        self.kind
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn triggered_last(&self) -> Option<DateTime<Utc>> {
        self.triggered_last
    }

    pub fn items(&self) -> &[TimedItem] {
        &self.items
    }

    /// Queue a timed send. `content: None` sends the collector's items.
    ///
    /// Only a timed scheduler ever consumes the queue.
    pub fn schedule(
        &mut self,
        at: DateTime<Utc>,
        content: Option<&Arc<dyn ContentSource>>,
        extra: Data,
    ) {
        debug!(kind = %self.kind, %at, has_content = content.is_some(), "timed item queued");
        self.items.push(TimedItem::new(at, content, extra));
    }

    /// Earliest instant a tick could fire.
    pub fn next_fire(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.active {
            return None;
        }
        next_fire(self.kind, self.triggered_last, &self.items, now)
    }

    pub fn tick(
        &mut self,
        assembler: &Assembler,
        channel: &mut Channel,
        ctx: &RenderContext,
    ) -> Result<Option<usize>> {
        self.tick_at(Utc::now(), assembler, channel, ctx)
    }

    /// Fire if the policy is due at `now`.
    ///
    /// Returns `None` when nothing fired. A timed scheduler answers
    /// `Some(0)` when none of its items is due yet.
    pub fn tick_at(
        &mut self,
        now: DateTime<Utc>,
        assembler: &Assembler,
        channel: &mut Channel,
        ctx: &RenderContext,
    ) -> Result<Option<usize>> {
        if !self.active {
            debug!(channel = %channel.name, kind = %self.kind, "scheduler inactive, tick ignored");
            return Ok(None);
        }

        match self.kind {
            SchedulerKind::Manual => Ok(None),
            SchedulerKind::Daily | SchedulerKind::Weekly => {
                if !periodic_due(self.kind, self.triggered_last, now) {
                    return Ok(None);
                }
                let count = assembler.assemble(ctx, channel, &AssembleRequest::new())?;
                self.record_fire(now, &channel.name, count);
                Ok(Some(count))
            }
            SchedulerKind::Timed => self.tick_timed(now, assembler, channel, ctx).map(Some),
        }
    }

    pub fn trigger(
        &mut self,
        assembler: &Assembler,
        channel: &mut Channel,
        ctx: &RenderContext,
    ) -> Result<usize> {
        self.trigger_at(Utc::now(), assembler, channel, ctx)
    }

    /// Fire now, whatever the policy, activity flag or elapsed time.
    ///
    /// A timed scheduler sends every queued item, due or not.
    pub fn trigger_at(
        &mut self,
        now: DateTime<Utc>,
        assembler: &Assembler,
        channel: &mut Channel,
        ctx: &RenderContext,
    ) -> Result<usize> {
        self.trigger_with_items(now, assembler, channel, ctx, Vec::new())
    }

    /// Like [`Scheduler::trigger_at`], with `items` sent after everything else.
    pub fn trigger_with_items(
        &mut self,
        now: DateTime<Utc>,
        assembler: &Assembler,
        channel: &mut Channel,
        ctx: &RenderContext,
        items: Vec<Item>,
    ) -> Result<usize> {
        let mut request = if self.kind == SchedulerKind::Timed && !self.items.is_empty() {
            timed_request(self.items.iter())
        } else {
            AssembleRequest::new()
        };
        request.extra_items.extend(items);
        let count = assembler.assemble(ctx, channel, &request)?;
        if self.kind == SchedulerKind::Timed {
            self.items.clear();
        }
        self.record_fire(now, &channel.name, count);
        Ok(count)
    }

    fn tick_timed(
        &mut self,
        now: DateTime<Utc>,
        assembler: &Assembler,
        channel: &mut Channel,
        ctx: &RenderContext,
    ) -> Result<usize> {
        if !self.items.iter().any(|i| i.is_due(now)) {
            return Ok(0);
        }
        let request = timed_request(self.items.iter().filter(|i| i.is_due(now)));
        let count = assembler.assemble(ctx, channel, &request)?;

        let before = self.items.len();
        self.items.retain(|i| !i.is_due(now));
        debug!(
            channel = %channel.name,
            consumed = before - self.items.len(),
            remaining = self.items.len(),
            "timed items consumed"
        );
        self.record_fire(now, &channel.name, count);
        Ok(count)
    }

    fn record_fire(&mut self, now: DateTime<Utc>, channel: &str, count: usize) {
        if self.triggered_last.map_or(true, |last| now > last) {
            self.triggered_last = Some(now);
        }
        info!(channel, kind = %self.kind, count, "scheduler fired");
    }
}

/// Schedulers compare by policy and configuration, not by runtime state.
impl PartialEq for Scheduler {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.active == other.active
    }
}

impl Eq for Scheduler {}

/// One assembly request covering several timed items.
///
/// The collector runs if any item asked for it (no content reference);
/// items whose source has been dropped add nothing.
fn timed_request<'a>(items: impl Iterator<Item = &'a TimedItem>) -> AssembleRequest {
    let mut use_collector = false;
    let mut contents = Vec::new();
    let mut vars = Data::new();

    for item in items {
        match &item.content {
            None => use_collector = true,
            Some(_) => contents.extend(item.resolve()),
        }
        vars.extend(item.extra.clone());
    }

    AssembleRequest::new()
        .use_collector(use_collector)
        .with_items(contents)
        .with_vars(vars)
}
