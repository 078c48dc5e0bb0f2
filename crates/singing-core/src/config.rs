use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_FORMAT: &str = "plain";

/// Top-level config (singing.toml + SINGING_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SingingConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub assembler: AssemblerConfig,
    #[serde(default)]
    pub subscriptions: SubscriptionsConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often the engine ticks every channel scheduler.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: DEFAULT_TICK_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssemblerConfig {
    /// When true, a collector or composer failure skips only the affected
    /// subscription instead of failing the whole assembly.
    #[serde(default)]
    pub isolate_failures: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionsConfig {
    /// Salt mixed into confirmation/unsubscribe secrets.
    #[serde(default = "default_salt")]
    pub secret_salt: String,
    /// New subscriptions start pending until confirmed.
    #[serde(default = "bool_true")]
    pub require_confirmation: bool,
}

impl Default for SubscriptionsConfig {
    fn default() -> Self {
        Self {
            secret_salt: default_salt(),
            require_confirmation: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Drop sent and failed messages from the queue after each dispatch round.
    #[serde(default = "bool_true")]
    pub flush_finished: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            flush_finished: true,
        }
    }
}

/// Scheduling policy name as written in config files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKindConfig {
    #[default]
    Manual,
    Daily,
    Weekly,
    Timed,
}

/// One newsletter channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    #[serde(default)]
    pub title: String,
    /// Format names; each gets the built-in plain text composer.
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,
    #[serde(default)]
    pub scheduler: SchedulerKindConfig,
    #[serde(default = "bool_true")]
    pub active: bool,
}

fn bool_true() -> bool {
    true
}
fn default_tick_interval() -> u64 {
    DEFAULT_TICK_INTERVAL_SECS
}
fn default_formats() -> Vec<String> {
    vec![DEFAULT_FORMAT.to_string()]
}
fn default_salt() -> String {
    "change-me".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.singing/singing.db", home)
}

impl SingingConfig {
    /// Load config from a TOML file with SINGING_* env var overrides.
    /// Nested keys are separated by `__`: `SINGING_SCHEDULER__TICK_INTERVAL_SECS`.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.singing/singing.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: SingingConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("SINGING_").split("__"))
            .extract()
            .map_err(|e| crate::error::SingingError::Config(e.to_string()))?;

        Ok(config)
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelConfig> {
        self.channels.iter().find(|c| c.name == name)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.singing/singing.toml", home)
}
