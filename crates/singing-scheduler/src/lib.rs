//! `singing-scheduler` — decides when a channel's messages are assembled.
//!
//! # Overview
//!
//! Each channel has a [`Scheduler`]. An external periodic caller (the
//! [`SchedulerEngine`] in this crate) invokes `tick`; the scheduler decides
//! whether to fire and, if so, runs the [`singing_assembler::Assembler`] for
//! its channel. `trigger` fires regardless of policy.
//!
//! # Policies
//!
//! | Kind     | `tick` fires when                                     |
//! |----------|-------------------------------------------------------|
//! | `Manual` | never                                                 |
//! | `Daily`  | never fired, or a day passed since `triggered_last`   |
//! | `Weekly` | never fired, or seven days passed                     |
//! | `Timed`  | one or more queued items have reached their time      |
//!
//! An inactive scheduler never fires on `tick`.
//!
//! # Persistence
//!
//! An engine given a [`ChannelStore`] reloads each channel's subscriptions
//! before ticking it and saves cues plus scheduler state after every fire.

pub mod engine;
pub mod error;
pub mod schedule;
pub mod scheduler;
pub mod store;
pub mod types;

pub use engine::{ScheduledChannel, SchedulerEngine, TickReport};
pub use error::{Result, SchedulerError};
pub use scheduler::Scheduler;
pub use store::ChannelStore;
pub use types::{ContentSource, SchedulerKind, SchedulerState, TimedItem};
