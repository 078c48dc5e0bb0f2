use tracing::{error, info};

use crate::{
    error::DispatchError,
    types::{Delivery, Message, MessageStatus, Payload},
};

/// Delivery boundary: hands one rendered payload to a transport.
///
/// Implementations are called synchronously from the dispatch loop and
/// must not assume any other message is in flight.
pub trait Dispatch: Send + Sync {
    /// Stable identifier used in log fields.
    fn name(&self) -> &str;

    fn send(&self, payload: &Payload) -> Result<Delivery, DispatchError>;
}

/// Send `message` through `dispatcher` and record the outcome on it.
///
/// A dispatcher error becomes status `Error` with the error text as detail.
pub fn dispatch_message(dispatcher: &dyn Dispatch, message: &mut Message) -> MessageStatus {
    let delivery = match dispatcher.send(&message.payload) {
        Ok(d) => d,
        Err(e) => {
            error!(
                dispatcher = dispatcher.name(),
                message_id = %message.id,
                error = %e,
                "error while dispatching message"
            );
            Delivery::error(e.to_string())
        }
    };
    message.set_status(delivery.status, delivery.detail);
    message.status
}

/// Dispatcher that only writes the payload to the log. Used for dry runs.
#[derive(Debug, Default)]
pub struct LogDispatch;

impl Dispatch for LogDispatch {
    fn name(&self) -> &str {
        "log"
    }

    fn send(&self, payload: &Payload) -> Result<Delivery, DispatchError> {
        if payload.recipient.trim().is_empty() {
            return Err(DispatchError::InvalidRecipient(payload.recipient.clone()));
        }
        info!(
            recipient = %payload.recipient,
            subject = %payload.subject,
            bytes = payload.body.len(),
            "message dispatched"
        );
        Ok(Delivery::sent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use singing_core::SubscriptionId;

    struct Failing;

    impl Dispatch for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn send(&self, _payload: &Payload) -> Result<Delivery, DispatchError> {
            Err(DispatchError::SendFailed("connection refused".into()))
        }
    }

    fn message(recipient: &str) -> Message {
        Message::new(
            Payload {
                recipient: recipient.into(),
                subject: "s".into(),
                body: "b".into(),
                content_type: "text/plain".into(),
            },
            SubscriptionId::from("sub"),
        )
    }

    #[test]
    fn log_dispatch_reports_sent() {
        let mut msg = message("reader@example.org");
        assert_eq!(dispatch_message(&LogDispatch, &mut msg), MessageStatus::Sent);
        assert!(msg.status_message.is_none());
    }

    #[test]
    fn log_dispatch_rejects_blank_recipient() {
        let mut msg = message("  ");
        assert_eq!(dispatch_message(&LogDispatch, &mut msg), MessageStatus::Error);
    }

    #[test]
    fn dispatcher_error_becomes_error_status() {
        let mut msg = message("reader@example.org");
        assert_eq!(dispatch_message(&Failing, &mut msg), MessageStatus::Error);
        let detail = msg.status_message.expect("detail missing");
        assert!(detail.contains("connection refused"));
    }
}
