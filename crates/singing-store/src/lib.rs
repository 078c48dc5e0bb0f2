//! `singing-store` — SQLite persistence for subscriptions and scheduler state.
//!
//! Subscriptions are stored per channel with their composer data, collector
//! data and delivery metadata (format, pending flag, cue) as JSON columns.
//! Published feed entries live alongside them and are served to channels by
//! the [`StoredFeed`] collector.
//! Scheduler state keeps the policy, the active flag and `triggered_last`;
//! timed items hold live content references and are never persisted.

pub mod db;
pub mod error;
pub mod feed;
pub mod store;

pub use db::init_db;
pub use error::{Result, StoreError};
pub use feed::StoredFeed;
pub use store::SubscriptionDb;
