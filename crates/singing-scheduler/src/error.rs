use singing_assembler::AssembleError;
use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The assembly run behind a fire failed; the fire did not happen.
    #[error("Assembly failed: {0}")]
    Assemble(#[from] AssembleError),

    /// No channel with the given name is registered with the engine.
    #[error("Channel not found: {name}")]
    ChannelNotFound { name: String },

    /// A channel with this name is already registered.
    #[error("Channel already registered: {name}")]
    DuplicateChannel { name: String },

    /// Loading or saving channel state through a [`crate::ChannelStore`] failed.
    #[error("Channel store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
