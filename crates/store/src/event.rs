//! The event stream the runtime emits (spec.md §4.7.7) and the store
//! consumes. Every variant except `FrameTick` carries the `path` of the
//! device it's about.

use crate::model::DeviceErrorKind;
use scopehost_wire::model::{ChannelMap, DeviceInfo, DeviceState, NameListPage, SnapshotHeader, TimingConfig, TriggerConfig};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    DeviceConnected { path: String, info: DeviceInfo },
    DeviceDisconnected { path: String },
    DeviceError { path: String, error: DeviceErrorKind },
    StateUpdated { path: String, state: DeviceState },
    TimingUpdated { path: String, timing: TimingConfig },
    TriggerUpdated { path: String, trigger: TriggerConfig },
    ChannelMapUpdated { path: String, channel_map: ChannelMap },
    FrameUpdated { path: String, frame: Vec<f32> },
    FrameCleared { path: String },
    /// Not routed to any one snapshot — drives the live-plot redraw clock
    /// directly. The reducer treats it as a no-op (spec.md §4.7.8).
    FrameTick { tick_id: u64 },
    RtBufferUpdated { path: String, index: u8, value: f32 },
    VarListPageUpdated { path: String, page: NameListPage },
    RtLabelsPageUpdated { path: String, page: NameListPage },
    SnapshotHeaderUpdated { path: String, header: SnapshotHeader },
    SnapshotChunk { path: String, start: u16, samples: Vec<Vec<f32>> },
}

impl Event {
    /// The device this event is about, or `None` for `FrameTick`.
    pub fn path(&self) -> Option<&str> {
        match self {
            Event::DeviceConnected { path, .. }
            | Event::DeviceDisconnected { path }
            | Event::DeviceError { path, .. }
            | Event::StateUpdated { path, .. }
            | Event::TimingUpdated { path, .. }
            | Event::TriggerUpdated { path, .. }
            | Event::ChannelMapUpdated { path, .. }
            | Event::FrameUpdated { path, .. }
            | Event::FrameCleared { path }
            | Event::RtBufferUpdated { path, .. }
            | Event::VarListPageUpdated { path, .. }
            | Event::RtLabelsPageUpdated { path, .. }
            | Event::SnapshotHeaderUpdated { path, .. }
            | Event::SnapshotChunk { path, .. } => Some(path),
            Event::FrameTick { .. } => None,
        }
    }
}
