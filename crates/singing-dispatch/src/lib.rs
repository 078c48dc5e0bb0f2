pub mod dispatch;
pub mod error;
pub mod queue;
pub mod types;

pub use dispatch::{dispatch_message, Dispatch, LogDispatch};
pub use error::DispatchError;
pub use queue::MessageQueues;
pub use types::{Delivery, Message, MessageStatus, Payload};
