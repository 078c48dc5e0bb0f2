use singing_assembler::Channel;

use crate::{error::Result, scheduler::Scheduler};

/// Durable home of channel subscriptions and scheduler state, shared with
/// whoever else edits them (subscribe/confirm/unsubscribe commands).
pub trait ChannelStore: Send + Sync {
    /// Replace `channel.subscriptions` with the stored set.
    fn refresh(&self, channel: &mut Channel) -> Result<()>;

    /// Record what a fire changed: subscription cues and the scheduler state.
    ///
    /// Subscriptions removed from the store since the last refresh stay removed.
    fn persist(&self, channel: &Channel, scheduler: &Scheduler) -> Result<()>;
}
