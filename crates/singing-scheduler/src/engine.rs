use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use singing_assembler::{Assembler, Channel, Item};
use singing_core::{RenderContext, SingingConfig};
use singing_dispatch::Dispatch;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::{
    error::{Result, SchedulerError},
    scheduler::Scheduler,
    store::ChannelStore,
};

/// A channel together with the scheduler that decides when it is assembled.
#[derive(Debug)]
pub struct ScheduledChannel {
    pub channel: Channel,
    pub scheduler: Scheduler,
}

/// Outcome of one [`SchedulerEngine::tick_all`] round.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Channels whose scheduler fired.
    pub fired: usize,
    /// Messages queued by those fires.
    pub assembled: usize,
    pub sent: usize,
    pub failed: usize,
    /// Channels whose fire failed.
    pub errors: usize,
}

/// Periodic caller that ticks every channel's scheduler and drains the
/// resulting message queues through a [`Dispatch`].
///
/// With a [`ChannelStore`] attached, subscriptions are reloaded before each
/// channel is ticked or triggered and cues plus scheduler state are saved
/// after each fire.
pub struct SchedulerEngine {
    channels: Vec<ScheduledChannel>,
    assembler: Arc<Assembler>,
    dispatcher: Arc<dyn Dispatch>,
    store: Option<Arc<dyn ChannelStore>>,
    flush_finished: bool,
    tick_interval: Duration,
    locale: Option<String>,
}

impl SchedulerEngine {
    pub fn new(assembler: Arc<Assembler>, dispatcher: Arc<dyn Dispatch>) -> Self {
        Self {
            channels: Vec::new(),
            assembler,
            dispatcher,
            store: None,
            flush_finished: true,
            tick_interval: Duration::from_secs(singing_core::config::DEFAULT_TICK_INTERVAL_SECS),
            locale: None,
        }
    }

    pub fn from_config(
        config: &SingingConfig,
        assembler: Arc<Assembler>,
        dispatcher: Arc<dyn Dispatch>,
    ) -> Self {
        let mut engine = Self::new(assembler, dispatcher);
        engine.flush_finished = config.dispatch.flush_finished;
        engine.tick_interval = Duration::from_secs(config.scheduler.tick_interval_secs.max(1));
        engine
    }

    pub fn with_tick_interval(mut self, every: Duration) -> Self {
        self.tick_interval = every;
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ChannelStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn add_channel(&mut self, channel: Channel, scheduler: Scheduler) -> Result<()> {
        if self.channel(&channel.name).is_some() {
            return Err(SchedulerError::DuplicateChannel { name: channel.name });
        }
        info!(
            channel = %channel.name,
            kind = %scheduler.kind(),
            active = scheduler.is_active(),
            "channel registered"
        );
        self.channels.push(ScheduledChannel { channel, scheduler });
        Ok(())
    }

    pub fn channel(&self, name: &str) -> Option<&ScheduledChannel> {
        self.channels.iter().find(|c| c.channel.name == name)
    }

    pub fn channel_mut(&mut self, name: &str) -> Option<&mut ScheduledChannel> {
        self.channels.iter_mut().find(|c| c.channel.name == name)
    }

    pub fn channels(&self) -> &[ScheduledChannel] {
        &self.channels
    }

    pub fn into_channels(self) -> Vec<ScheduledChannel> {
        self.channels
    }

    /// Tick every scheduler once, then dispatch what was queued.
    ///
    /// A failing channel is logged and counted; the others still run.
    pub fn tick_all(&mut self, now: DateTime<Utc>) -> TickReport {
        let ctx = self.context(now);
        let mut report = TickReport::default();

        for entry in &mut self.channels {
            if let Some(store) = &self.store {
                if let Err(e) = store.refresh(&mut entry.channel) {
                    report.errors += 1;
                    error!(channel = %entry.channel.name, error = %e, "channel refresh failed");
                    continue;
                }
            }
            match entry
                .scheduler
                .tick_at(now, &self.assembler, &mut entry.channel, &ctx)
            {
                Ok(Some(count)) => {
                    report.fired += 1;
                    report.assembled += count;
                    if let Err(e) = Self::persist(self.store.as_deref(), entry) {
                        report.errors += 1;
                        error!(channel = %entry.channel.name, error = %e, "channel persist failed");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    report.errors += 1;
                    error!(channel = %entry.channel.name, error = %e, "scheduler tick failed");
                }
            }
        }

        let (sent, failed) = self.dispatch_all();
        report.sent = sent;
        report.failed = failed;
        report
    }

    /// Fire one channel now, ignoring its policy, then dispatch its queue.
    pub fn trigger(&mut self, name: &str, now: DateTime<Utc>) -> Result<usize> {
        self.trigger_with_items(name, Vec::new(), now)
    }

    /// Fire one channel now with explicit extra items.
    pub fn trigger_with_items(
        &mut self,
        name: &str,
        items: Vec<Item>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let ctx = self.context(now);
        let entry = self
            .channels
            .iter_mut()
            .find(|c| c.channel.name == name)
            .ok_or_else(|| SchedulerError::ChannelNotFound {
                name: name.to_string(),
            })?;

        if let Some(store) = &self.store {
            store.refresh(&mut entry.channel)?;
        }
        let count = entry
            .scheduler
            .trigger_with_items(now, &self.assembler, &mut entry.channel, &ctx, items)?;
        Self::persist(self.store.as_deref(), entry)?;
        Self::dispatch_channel(self.dispatcher.as_ref(), self.flush_finished, &entry.channel);
        Ok(count)
    }

    /// Dispatch every channel queue. Returns `(sent, failed)` totals.
    pub fn dispatch_all(&self) -> (usize, usize) {
        self.channels.iter().fold((0, 0), |(sent, failed), entry| {
            let (s, f) =
                Self::dispatch_channel(self.dispatcher.as_ref(), self.flush_finished, &entry.channel);
            (sent + s, failed + f)
        })
    }

    /// Main loop. Ticks every `tick_interval` until `shutdown` broadcasts `true`
    /// or its sender goes away. Returns the engine so state can be persisted.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Self {
        info!(
            channels = self.channels.len(),
            interval_secs = self.tick_interval.as_secs(),
            "scheduler engine started"
        );

        let mut interval = tokio::time::interval(self.tick_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.tick_all(Utc::now());
                    if report.errors > 0 {
                        warn!(errors = report.errors, "tick finished with failures");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
        self
    }

    // --- private helpers ---------------------------------------------------

    fn context(&self, now: DateTime<Utc>) -> RenderContext {
        let ctx = RenderContext::new().at(now);
        match &self.locale {
            Some(locale) => ctx.with_locale(locale.clone()),
            None => ctx,
        }
    }

    fn persist(store: Option<&dyn ChannelStore>, entry: &ScheduledChannel) -> Result<()> {
        match store {
            Some(store) => store.persist(&entry.channel, &entry.scheduler),
            None => Ok(()),
        }
    }

    fn dispatch_channel(
        dispatcher: &dyn Dispatch,
        flush_finished: bool,
        channel: &Channel,
    ) -> (usize, usize) {
        if channel.queue.is_empty() {
            return (0, 0);
        }
        let (sent, failed) = channel.queue.dispatch(dispatcher);
        if flush_finished {
            channel.queue.flush_finished();
        }
        if sent + failed > 0 {
            info!(channel = %channel.name, sent, failed, "channel dispatched");
        }
        (sent, failed)
    }
}

impl std::fmt::Debug for SchedulerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerEngine")
            .field("channels", &self.channels.len())
            .field("dispatcher", &self.dispatcher.name())
            .field("store", &self.store.is_some())
            .field("flush_finished", &self.flush_finished)
            .field("tick_interval", &self.tick_interval)
            .finish()
    }
}
