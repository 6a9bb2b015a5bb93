//! The three command sources the main loop dequeues from (spec.md §4.7.1):
//! a bounded `user_commands` FIFO and two single-slot latest-wins poll
//! slots.

use std::sync::Mutex;
use std::time::Instant;
use tokio::sync::Notify;

/// Capacity of the user-issued command queue. Offers past this are
/// rejected with [`crate::RuntimeError::QueueFull`]; the UI must surface
/// that rather than silently drop the command.
pub const USER_COMMAND_CAPACITY: usize = 64;

/// A single-slot mailbox that coalesces repeated offers: a new token
/// replaces whatever was there, it never queues up a backlog. Used for both
/// the state poller and the frame poller (spec.md §4.7.1).
pub struct PollSlot {
    slot: Mutex<Option<Instant>>,
    notify: Notify,
}

impl Default for PollSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl PollSlot {
    pub fn new() -> Self {
        Self { slot: Mutex::new(None), notify: Notify::new() }
    }

    /// Inserts `queued_at`, replacing any token already waiting to be
    /// picked up.
    pub fn offer(&self, queued_at: Instant) {
        *self.slot.lock().unwrap() = Some(queued_at);
        self.notify.notify_one();
    }

    /// Takes the current token without blocking, or `None` if empty.
    pub fn try_take(&self) -> Option<Instant> {
        self.slot.lock().unwrap().take()
    }

    /// Resolves once `offer` has been called since the last `notified`
    /// call returned (or immediately, if a prior offer's wakeup is still
    /// outstanding). Callers must still `try_take` afterwards — the slot
    /// may have been drained by a concurrent taker.
    pub async fn notified(&self) {
        self.notify.notified().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesces_repeated_offers_into_one_token() {
        let slot = PollSlot::new();
        let t1 = Instant::now();
        let t2 = t1 + std::time::Duration::from_millis(5);
        slot.offer(t1);
        slot.offer(t2);
        assert_eq!(slot.try_take(), Some(t2));
        assert_eq!(slot.try_take(), None);
    }
}
