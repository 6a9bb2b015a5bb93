//! The command taxonomy the main loop dequeues and dispatches (spec.md
//! §4.7.3). Lifecycle and mutating-protocol commands share one queue;
//! pollers are emitted only by the runtime's own tickers and never
//! constructed by a caller.

use scopehost_transport::SerialConfig;
use scopehost_wire::model::{DeviceState, TriggerMode};
use std::time::Instant;

/// `None` means "every connected device"; `Some` restricts to a subset.
pub type Targets = Option<Vec<String>>;

#[derive(Debug, Clone)]
pub enum Command {
    Connect {
        path: String,
        config: SerialConfig,
    },
    Disconnect {
        path: String,
    },
    SetState {
        state: DeviceState,
        targets: Targets,
    },
    Trigger {
        targets: Targets,
    },
    SetTiming {
        divider: u32,
        pre_trig: u32,
        targets: Targets,
    },
    SetChannelMap {
        channel_idx: u8,
        catalog_idx: u8,
        targets: Targets,
    },
    SetTrigger {
        threshold: f32,
        channel: u8,
        mode: TriggerMode,
        targets: Targets,
    },
    SetRtBuffer {
        index: u8,
        value: f32,
        targets: Targets,
    },
    /// Not named in spec.md §4.7.3's taxonomy, but the snapshot downloader
    /// (spec.md §4.8) needs to run under the same "one outstanding
    /// operation per device" discipline as everything else (spec.md §5),
    /// so it is routed through the same queue rather than bypassing it.
    /// Recorded as an open-question resolution in DESIGN.md.
    DownloadSnapshot {
        path: String,
    },
}

impl Command {
    /// The store's [`scopehost_store::policy::CommandKind`] this command
    /// maps to, or `None` for commands the guard doesn't apply to
    /// (lifecycle commands, and the snapshot download).
    pub fn policy_kind(&self) -> Option<scopehost_store::policy::CommandKind> {
        use scopehost_store::policy::CommandKind;
        match self {
            Command::SetState { state, .. } => Some(CommandKind::SetState(*state)),
            Command::Trigger { .. } => Some(CommandKind::Trigger),
            Command::SetTiming { .. } => Some(CommandKind::SetTiming),
            Command::SetChannelMap { .. } => Some(CommandKind::SetChannelMap),
            Command::SetTrigger { .. } => Some(CommandKind::SetTrigger),
            Command::SetRtBuffer { .. } => Some(CommandKind::SetRtBuffer),
            Command::Connect { .. } | Command::Disconnect { .. } | Command::DownloadSnapshot { .. } => None,
        }
    }

    pub fn targets(&self) -> Option<&[String]> {
        match self {
            Command::SetState { targets, .. }
            | Command::Trigger { targets }
            | Command::SetTiming { targets, .. }
            | Command::SetChannelMap { targets, .. }
            | Command::SetTrigger { targets, .. }
            | Command::SetRtBuffer { targets, .. } => targets.as_deref(),
            Command::Connect { .. } | Command::Disconnect { .. } | Command::DownloadSnapshot { .. } => None,
        }
    }

    /// Returns a copy of `self` with its targets narrowed to exactly
    /// `paths` (the eligible subset the guard computed). No-op for
    /// commands without a target set.
    pub fn with_targets(&self, paths: Vec<String>) -> Command {
        match self.clone() {
            Command::SetState { state, .. } => Command::SetState { state, targets: Some(paths) },
            Command::Trigger { .. } => Command::Trigger { targets: Some(paths) },
            Command::SetTiming { divider, pre_trig, .. } => {
                Command::SetTiming { divider, pre_trig, targets: Some(paths) }
            }
            Command::SetChannelMap { channel_idx, catalog_idx, .. } => {
                Command::SetChannelMap { channel_idx, catalog_idx, targets: Some(paths) }
            }
            Command::SetTrigger { threshold, channel, mode, .. } => {
                Command::SetTrigger { threshold, channel, mode, targets: Some(paths) }
            }
            Command::SetRtBuffer { index, value, .. } => {
                Command::SetRtBuffer { index, value, targets: Some(paths) }
            }
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollKind {
    State,
    Frame,
}

#[derive(Debug, Clone, Copy)]
pub struct PollTick {
    pub kind: PollKind,
    pub queued_at: Instant,
}
