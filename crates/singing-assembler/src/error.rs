use singing_core::SubscriptionId;
use thiserror::Error;

use crate::{collector::CollectorError, composer::ComposerError};

/// Errors raised while managing subscriptions or assembling messages.
#[derive(Debug, Error)]
pub enum AssembleError {
    /// The subscription names a format with no composer in its channel.
    /// Always a configuration error.
    #[error("Unknown format {format:?} for subscription {subscription} in channel {channel}")]
    UnknownFormat {
        channel: String,
        subscription: SubscriptionId,
        format: String,
    },

    /// Subscribe attempt with a format the channel does not offer.
    #[error("Channel {channel} has no format {format:?}")]
    NoSuchFormat { channel: String, format: String },

    #[error("Collector failed for subscription {subscription}: {source}")]
    Collector {
        subscription: SubscriptionId,
        #[source]
        source: CollectorError,
    },

    #[error("Composer failed for subscription {subscription}: {source}")]
    Composer {
        subscription: SubscriptionId,
        #[source]
        source: ComposerError,
    },

    #[error("Already subscribed: {key}")]
    AlreadySubscribed { key: String },

    #[error("Subscription not found: {id}")]
    SubscriptionNotFound { id: String },

    #[error("No subscription matches the given secret")]
    InvalidSecret,

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AssembleError {
    /// Collaborator failures that can be confined to one subscription.
    pub fn is_isolatable(&self) -> bool {
        matches!(
            self,
            AssembleError::Collector { .. } | AssembleError::Composer { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AssembleError>;
