use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, TryLockError};

use tracing::{debug, info};

use crate::{
    dispatch::{dispatch_message, Dispatch},
    types::{Message, MessageStatus},
};

/// Statuses drained by [`MessageQueues::dispatch`], in order.
const DISPATCHABLE: [MessageStatus; 2] = [MessageStatus::New, MessageStatus::Retry];

/// Per-channel outbox: one FIFO per [`MessageStatus`].
///
/// Messages are filed under their current status. A dispatch round drains
/// `new` and then `retry`, and refiles every message under the status the
/// dispatcher reported, so a message that comes back as `retry` waits for the
/// next round instead of spinning in the current one.
pub struct MessageQueues {
    queues: Mutex<HashMap<MessageStatus, VecDeque<Message>>>,
    /// Held for the whole of a dispatch round; a second caller backs off.
    dispatching: Mutex<()>,
    messages_sent: AtomicU64,
}

impl MessageQueues {
    pub fn new() -> Self {
        let queues = MessageStatus::ALL
            .into_iter()
            .map(|s| (s, VecDeque::new()))
            .collect();
        Self {
            queues: Mutex::new(queues),
            dispatching: Mutex::new(()),
            messages_sent: AtomicU64::new(0),
        }
    }

    /// File `message` at the back of the queue for its current status.
    pub fn push(&self, message: Message) {
        let mut queues = self.queues.lock().expect("message queues poisoned");
        queues.entry(message.status).or_default().push_back(message);
    }

    pub fn len(&self, status: MessageStatus) -> usize {
        let queues = self.queues.lock().expect("message queues poisoned");
        queues.get(&status).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        let queues = self.queues.lock().expect("message queues poisoned");
        queues.values().all(VecDeque::is_empty)
    }

    /// Copy of the messages currently filed under `status`, oldest first.
    pub fn messages(&self, status: MessageStatus) -> Vec<Message> {
        let queues = self.queues.lock().expect("message queues poisoned");
        queues
            .get(&status)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Total number of messages successfully sent through these queues.
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    /// Send every `new` and `retry` message. Returns `(sent, failed)`.
    ///
    /// Returns `(0, 0)` without touching the queues when another dispatch
    /// round is already running.
    pub fn dispatch(&self, dispatcher: &dyn Dispatch) -> (usize, usize) {
        let _guard = match self.dispatching.try_lock() {
            Ok(g) => g,
            Err(TryLockError::WouldBlock) => {
                info!("dispatching is locked by another caller");
                return (0, 0);
            }
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
        };

        let mut sent = 0;
        let mut failed = 0;

        // Both batches are taken up front so nothing refiled this round is sent twice.
        let batches: Vec<VecDeque<Message>> = {
            let mut queues = self.queues.lock().expect("message queues poisoned");
            DISPATCHABLE
                .iter()
                .map(|s| std::mem::take(queues.entry(*s).or_default()))
                .collect()
        };
        for mut message in batches.into_iter().flatten() {
            match dispatch_message(dispatcher, &mut message) {
                MessageStatus::Sent => sent += 1,
                _ => failed += 1,
            }
            self.push(message);
        }

        self.messages_sent.fetch_add(sent as u64, Ordering::Relaxed);
        debug!(dispatcher = dispatcher.name(), sent, failed, "dispatch round complete");
        (sent, failed)
    }

    /// Empty the named queues, returning how many messages were dropped.
    pub fn flush(&self, statuses: &[MessageStatus]) -> usize {
        let mut queues = self.queues.lock().expect("message queues poisoned");
        let mut dropped = 0;
        for status in statuses {
            if let Some(queue) = queues.get_mut(status) {
                dropped += queue.len();
                queue.clear();
            }
        }
        if dropped > 0 {
            debug!(dropped, "message queues flushed");
        }
        dropped
    }

    /// Flush the `error` and `sent` queues.
    pub fn flush_finished(&self) -> usize {
        self.flush(&[MessageStatus::Error, MessageStatus::Sent])
    }
}

impl Default for MessageQueues {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MessageQueues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("MessageQueues");
        for status in MessageStatus::ALL {
            s.field(&status.to_string(), &self.len(status));
        }
        s.field("messages_sent", &self.messages_sent()).finish()
    }
}
