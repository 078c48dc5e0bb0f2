use thiserror::Error;

/// Errors a dispatcher can report for a single message.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The message could not be handed to the transport.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// The recipient address is missing or malformed.
    #[error("Invalid recipient: {0:?}")]
    InvalidRecipient(String),
}
