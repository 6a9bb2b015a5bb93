//! The snapshot sink collaborator (spec.md §6): persistent storage of
//! downloaded post-trigger buffers, owned entirely outside the core. The
//! runtime only ever calls `persist` after a [`scopehost_snapshot`]
//! download completes; everything else is UI-driven bookkeeping.

use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotMeta {
    pub id: u64,
    pub path: String,
    pub name: String,
    pub num_channels: u8,
    pub sample_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRecord {
    pub meta: SnapshotMeta,
    pub samples: Vec<Vec<f32>>,
}

pub trait SnapshotSink: Send + Sync {
    fn persist(&self, path: &str, samples: Vec<Vec<f32>>) -> u64;
    fn load_meta(&self) -> Vec<SnapshotMeta>;
    fn load_samples(&self, id: u64) -> Option<Vec<Vec<f32>>>;
    fn delete(&self, id: u64);
    fn rename(&self, id: u64, name: &str);
}

#[derive(Default)]
pub struct InMemorySnapshotSink {
    next_id: Mutex<u64>,
    records: Mutex<BTreeMap<u64, SnapshotRecord>>,
}

impl InMemorySnapshotSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotSink for InMemorySnapshotSink {
    fn persist(&self, path: &str, samples: Vec<Vec<f32>>) -> u64 {
        let mut next_id = self.next_id.lock().unwrap();
        let id = *next_id;
        *next_id += 1;
        let num_channels = samples.first().map(Vec::len).unwrap_or(0) as u8;
        let meta = SnapshotMeta {
            id,
            path: path.to_string(),
            name: format!("snapshot-{id}"),
            num_channels,
            sample_count: samples.len(),
        };
        self.records.lock().unwrap().insert(id, SnapshotRecord { meta, samples });
        id
    }

    fn load_meta(&self) -> Vec<SnapshotMeta> {
        self.records.lock().unwrap().values().map(|r| r.meta.clone()).collect()
    }

    fn load_samples(&self, id: u64) -> Option<Vec<Vec<f32>>> {
        self.records.lock().unwrap().get(&id).map(|r| r.samples.clone())
    }

    fn delete(&self, id: u64) {
        self.records.lock().unwrap().remove(&id);
    }

    fn rename(&self, id: u64, name: &str) {
        if let Some(record) = self.records.lock().unwrap().get_mut(&id) {
            record.meta.name = name.to_string();
        }
    }
}
