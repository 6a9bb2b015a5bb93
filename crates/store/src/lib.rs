//! In-memory device state: the pure reducer, cross-device consensus, and
//! the command guard built on top of it (spec.md §4.7). No I/O, no tokio —
//! the runtime owns the event loop and calls into this crate for every
//! decision that doesn't need to talk to a device.

pub mod consensus;
pub mod event;
pub mod model;
pub mod policy;
pub mod reducer;

pub use consensus::{derive as derive_consensus, Consensus, FieldConsensus, StaticInfoConsensus};
pub use event::Event;
pub use model::{Catalog, CatalogList, ConnectionStatus, DeviceErrorKind, DeviceSnapshot};
pub use policy::{guard, ControlMode, CommandDecision, CommandKind, GuardError, SkipReason};
pub use reducer::apply as apply_event;
