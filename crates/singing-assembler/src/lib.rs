//! `singing-assembler` — turns channel content into per-subscriber messages.
//!
//! A [`Channel`] owns composers (one per format), subscriptions and an
//! optional [`Collector`]. The [`Assembler`] pulls items for every
//! subscription, formats them through the [`FormatterRegistry`], rewrites
//! them through the [`TransformRegistry`] and renders one message per
//! subscription with its composer.

pub mod assembler;
pub mod channel;
pub mod collector;
pub mod composer;
pub mod error;
pub mod formatter;
pub mod item;
pub mod subscription;
pub mod transform;

pub use assembler::{AssembleRequest, Assembler};
pub use channel::Channel;
pub use collector::{collect_feed, feed_cue, Collector, CollectorError, FeedCollector, FeedEntry};
pub use composer::{Composer, ComposerError, ComposerSchema, FieldSpec, PlainTextComposer};
pub use error::{AssembleError, Result};
pub use formatter::FormatterRegistry;
pub use item::{ContentItem, FormattedItem, Item, TEXT_HTML, TEXT_PLAIN};
pub use subscription::{subscription_secret, Data, Metadata, Subscription, Subscriptions};
pub use transform::{FnTransform, Transform, TransformCache, TransformRegistry, ANY_KIND};
