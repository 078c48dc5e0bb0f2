//! `singing-core` — shared identifiers, render context, configuration and
//! errors for the newsletter workspace.

pub mod config;
pub mod error;
pub mod types;

pub use config::SingingConfig;
pub use error::{Result, SingingError};
pub use types::{Cue, RenderContext, SubscriptionId};
