//! Errors the runtime returns directly to a command issuer (spec.md §7:
//! "Policy errors are not emitted as events"). Per-device protocol failures
//! never surface here — they become `DeviceError` events instead (spec.md
//! §4.7.6).

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// `user_commands` is at capacity (spec.md §4.7.1).
    #[error("command queue is full")]
    QueueFull,
    /// The runtime's main loop has already shut down.
    #[error("runtime has shut down")]
    ShutDown,
}
