use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use singing_assembler::{
    Assembler, Channel, FormatterRegistry, PlainTextComposer, Subscriptions, TransformRegistry,
};
use singing_core::{
    config::{ChannelConfig, SchedulerKindConfig},
    SingingConfig,
};
use singing_dispatch::{Dispatch, LogDispatch};
use singing_scheduler::{ChannelStore, Scheduler, SchedulerEngine};
use singing_store::{StoredFeed, SubscriptionDb};
use tracing::info;

/// Shared state for one CLI invocation.
pub struct App {
    pub config: SingingConfig,
    pub db: Arc<SubscriptionDb>,
    assembler: Arc<Assembler>,
    dispatcher: Arc<dyn Dispatch>,
}

impl App {
    pub fn open(config: SingingConfig) -> anyhow::Result<Self> {
        let db_path = &config.database.path;
        ensure_parent_dir(db_path);
        info!(path = %db_path, "opening SQLite database");

        let conn = rusqlite::Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let db = SubscriptionDb::new(conn)?;

        let assembler = Assembler::from_config(
            &config.assembler,
            Arc::new(FormatterRegistry::new()),
            Arc::new(TransformRegistry::new()),
        );

        Ok(Self {
            config,
            db: Arc::new(db),
            assembler: Arc::new(assembler),
            dispatcher: Arc::new(LogDispatch),
        })
    }

    pub fn channel_config(&self, name: &str) -> anyhow::Result<&ChannelConfig> {
        self.config
            .channel(name)
            .ok_or_else(|| anyhow!("no channel named '{name}' in config"))
    }

    /// Build a channel from config with its stored subscriptions, collecting
    /// from the channel's stored feed.
    pub fn load_channel(&self, name: &str) -> anyhow::Result<Channel> {
        let cfg = self.channel_config(name)?;
        let title = if cfg.title.is_empty() {
            cfg.name.clone()
        } else {
            cfg.title.clone()
        };

        let feed = StoredFeed::new(Arc::clone(&self.db), &cfg.name);
        let mut channel = Channel::new(&cfg.name, &title).with_collector(Arc::new(feed));
        for format in &cfg.formats {
            channel = channel.with_composer(format, Arc::new(PlainTextComposer::new(&title)));
        }
        channel.subscriptions = self
            .db
            .load_channel(&cfg.name)
            .with_context(|| format!("loading subscriptions of '{name}'"))?
            .into_iter()
            .collect::<Subscriptions>();
        Ok(channel)
    }

    /// Scheduler for `cfg`, resuming from stored state when its policy
    /// has not changed in config.
    ///
    /// `timed` is refused: its items are live in-process content references
    /// and nothing on the command line can queue them.
    pub fn load_scheduler(&self, cfg: &ChannelConfig) -> anyhow::Result<Scheduler> {
        if cfg.scheduler == SchedulerKindConfig::Timed {
            bail!(
                "channel '{}': scheduler \"timed\" is not available from the command line; \
                 use manual, daily or weekly",
                cfg.name
            );
        }
        let configured = Scheduler::new(cfg.scheduler.into()).with_active(cfg.active);
        match self.db.load_state(&cfg.name)? {
            Some(state) if Scheduler::from_state(&state) == configured => {
                Ok(Scheduler::from_state(&state))
            }
            _ => Ok(configured),
        }
    }

    /// Engine holding `names`, or every configured channel when empty.
    ///
    /// The engine reads and writes subscriptions and scheduler state through
    /// the database on every tick, so commands run meanwhile are seen.
    pub fn engine(&self, names: &[&str]) -> anyhow::Result<SchedulerEngine> {
        let mut engine = SchedulerEngine::from_config(
            &self.config,
            Arc::clone(&self.assembler),
            Arc::clone(&self.dispatcher),
        )
        .with_store(Arc::clone(&self.db) as Arc<dyn ChannelStore>);
        let selected: Vec<&ChannelConfig> = if names.is_empty() {
            self.config.channels.iter().collect()
        } else {
            names
                .iter()
                .map(|n| self.channel_config(n))
                .collect::<anyhow::Result<_>>()?
        };
        for cfg in selected {
            let channel = self.load_channel(&cfg.name)?;
            let scheduler = self.load_scheduler(cfg)?;
            engine.add_channel(channel, scheduler)?;
        }
        Ok(engine)
    }
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
