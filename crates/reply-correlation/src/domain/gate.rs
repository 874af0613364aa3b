//! One-shot release gate with a reply slot.
//!
//! The monitor publishes the reply into the slot and then releases the gate.
//! The waiting requester blocks on [`ReplyGate::wait`] and takes the reply
//! once released. A gate is released at most once.

use parking_lot::Mutex;
use shared_types::Exchange;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Wake-up signal for a single waiting request.
#[derive(Debug, Default)]
pub struct ReplyGate {
    reply: Mutex<Option<Exchange>>,
    released: AtomicBool,
    notify: Notify,
}

impl ReplyGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place `reply` in the slot.
    ///
    /// Fails, handing the reply back, when the slot already holds one.
    pub fn publish(&self, reply: Exchange) -> Result<(), Exchange> {
        let mut slot = self.reply.lock();
        if slot.is_some() {
            return Err(reply);
        }
        *slot = Some(reply);
        Ok(())
    }

    /// Open the gate. Returns `true` only for the call that opened it.
    pub fn release(&self) -> bool {
        let first = !self.released.swap(true, Ordering::AcqRel);
        if first {
            self.notify.notify_waiters();
        }
        first
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Wait until the gate is released. Returns immediately if it already is.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register interest before checking the flag so a release between
            // the check and the await is not lost.
            notified.as_mut().enable();
            if self.is_released() {
                return;
            }
            notified.await;
        }
    }

    /// Take the published reply out of the slot.
    pub fn take_reply(&self) -> Option<Exchange> {
        self.reply.lock().take()
    }

    pub fn has_reply(&self) -> bool {
        self.reply.lock().is_some()
    }
}
