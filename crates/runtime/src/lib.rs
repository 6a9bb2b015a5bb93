//! The multi-device cooperative runtime (spec.md §4.7): a single-threaded
//! main loop per process that dispatches user commands and poll ticks
//! across every connected device, enforces the command guard, and emits the
//! [`scopehost_store::Event`] stream external consumers build their own
//! store projection from.

mod clock;
mod command;
mod error;
mod queues;
mod retry;
mod saved_ports;
mod scheduler;
mod settings;
mod snapshot_sink;

pub use clock::{Clock, FakeClock, SystemClock};
pub use command::{Command, PollKind, PollTick, Targets};
pub use error::RuntimeError;
pub use saved_ports::{InMemorySavedPortsStore, SavedPort, SavedPortsStore};
pub use scheduler::{Runtime, RuntimeHandle};
pub use settings::{InMemorySettingsStore, SerialConfigDto, Settings, SettingsLoad, SettingsStore, SnapshotGcDays};
pub use snapshot_sink::{InMemorySnapshotSink, SnapshotMeta, SnapshotRecord, SnapshotSink};
