//! The store-side device record (spec.md §3 `DeviceSnapshot`) and the small
//! local error taxonomy events carry. Pure data: no I/O, no transport types.

use scopehost_wire::model::{ChannelMap, DeviceInfo, DeviceState, ErrorCode, SnapshotHeader, TimingConfig, TriggerConfig};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// A flattened view of spec.md §7's error taxonomy, small enough for the
/// store to carry without depending on `scopehost-transport`/`-session` —
/// the runtime maps its richer error types down into this on the way in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorKind {
    Timeout,
    CrcMismatch,
    PortBusy,
    Disconnected,
    InvalidHandle,
    IoError,
    Decode,
    UnexpectedResponseType,
    Device(ErrorCode),
    /// Supplement beyond spec.md §7's flat taxonomy: the snapshot
    /// downloader's `ChunkFailure` (spec.md §4.8) has no wire-level or
    /// transport-level counterpart, so the runtime maps it here rather
    /// than inventing a new event kind.
    SnapshotDownloadFailed,
}

/// One page's worth of a paginated name list, applied into [`CatalogList`]
/// at `start_idx`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogList {
    pub total_count: Option<u8>,
    /// `entries[i]` is the name at catalog index `i`, or `None` if no page
    /// covering it has arrived yet.
    pub entries: Vec<Option<String>>,
}

impl CatalogList {
    /// `true` once every index `0..total_count` has a name, i.e. every page
    /// has been seen.
    pub fn is_ready(&self) -> bool {
        match self.total_count {
            Some(total) if total as usize <= self.entries.len() => {
                self.entries[..total as usize].iter().all(Option::is_some)
            }
            _ => false,
        }
    }

    fn apply_page(&mut self, total_count: u8, start_idx: u8, names: &[String]) {
        self.total_count = Some(total_count);
        let end = start_idx as usize + names.len();
        if self.entries.len() < end {
            self.entries.resize(end, None);
        }
        for (offset, name) in names.iter().enumerate() {
            self.entries[start_idx as usize + offset] = Some(name.clone());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pub var_list: CatalogList,
    pub rt_labels: CatalogList,
}

/// One per known port (spec.md §3). Lives for as long as the path is saved;
/// on disconnect its dynamic fields are cleared but the record itself stays
/// so a reconnect (or a UI list of saved ports) has somewhere to land.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSnapshot {
    pub path: String,
    pub status: ConnectionStatus,
    pub info: Option<DeviceInfo>,
    pub state: Option<DeviceState>,
    pub timing: Option<TimingConfig>,
    pub trigger: Option<TriggerConfig>,
    pub channel_map: Option<ChannelMap>,
    pub latest_frame: Option<Vec<f32>>,
    pub rt_buffers: BTreeMap<u8, f32>,
    pub catalog: Catalog,
    pub last_error: Option<DeviceErrorKind>,
    /// Most recent post-trigger snapshot header, if one has been fetched.
    /// Not enumerated as its own field in spec.md §3, but spec.md §4.7.7
    /// names `SnapshotHeaderUpdated`/`SnapshotChunk` as events the store
    /// must be able to react to, so a place to land them is implied.
    pub snapshot_header: Option<SnapshotHeader>,
    /// Chunks received so far for an in-progress snapshot download, keyed
    /// by starting sample index.
    pub snapshot_chunks: BTreeMap<u16, Vec<Vec<f32>>>,
}

impl DeviceSnapshot {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status: ConnectionStatus::Disconnected,
            info: None,
            state: None,
            timing: None,
            trigger: None,
            channel_map: None,
            latest_frame: None,
            rt_buffers: BTreeMap::new(),
            catalog: Catalog::default(),
            last_error: None,
            snapshot_header: None,
            snapshot_chunks: BTreeMap::new(),
        }
    }
}

impl CatalogList {
    pub(crate) fn apply(&mut self, total_count: u8, start_idx: u8, names: &[String]) {
        self.apply_page(total_count, start_idx, names)
    }
}
