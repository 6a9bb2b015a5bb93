//! Scopehost
//!
//! The host-side runtime for a debug/telemetry link to one or more
//! virtual-oscilloscope microcontrollers (spec.md §1). This crate is a thin
//! facade over the seven library crates beneath it — `scopehost-wire`
//! through `scopehost-runtime` — so an embedder depends on one crate rather
//! than wiring up the dependency graph from spec.md §2 by hand, the same
//! role `firecracker-sdk`'s crate root plays over its own `api`/`builder`/
//! `dto`/`firecracker` modules.
//!
//! [`Scopehost::new`] wires a [`scopehost_manager::DeviceManager`] and a
//! [`scopehost_runtime::Runtime`] together and hands back a cloneable
//! handle, the runtime's own event stream, and the main-loop future for the
//! embedder to spawn on whatever executor it's already running.

pub use scopehost_manager::{ConnectedDevice, DeviceManager, ManagerError, PortOpener};
pub use scopehost_runtime::{
    Clock, Command, FakeClock, InMemorySavedPortsStore, InMemorySettingsStore, InMemorySnapshotSink,
    PollKind, RuntimeError, SavedPort, SavedPortsStore, Settings, SettingsLoad, SettingsStore,
    SnapshotGcDays, SnapshotMeta, SnapshotRecord, SnapshotSink, SystemClock, Targets,
};
pub use scopehost_session::{DeviceSession, SessionError};
pub use scopehost_snapshot::{download_snapshot, max_chunk_size, DownloadError};
pub use scopehost_store::{
    apply_event, derive_consensus, guard, policy, ConnectionStatus, Consensus, ControlMode,
    CommandDecision, CommandKind, DeviceErrorKind, DeviceSnapshot, Event, FieldConsensus,
    GuardError, SkipReason, StaticInfoConsensus,
};
pub use scopehost_transport::{
    DataBits, InMemoryPortCatalog, Parity, PortCatalog, PortFilter, PortInfo, PortKind, SerialConfig,
    SerialPort, StopBits, Transport, TransportError,
};
pub use scopehost_wire as wire;
pub use scopehost_wire::model::{
    ChannelMap, DeviceInfo, DeviceState, ErrorCode, FrameSample, MessageType, NameListPage,
    SnapshotHeader, TimingConfig, TriggerConfig, TriggerMode,
};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Re-exported so embedders constructing a [`Scopehost`] don't need a direct
/// dependency on `scopehost-runtime` just for the type name.
pub use scopehost_runtime::{Runtime, RuntimeHandle};

/// Everything [`Scopehost::new`] wires together: a handle to submit commands
/// and poll ticks through, the raw event stream external consumers build
/// their own projection from (or just call [`scopehost_store::apply_event`]
/// directly), and the main-loop future the caller must `tokio::spawn`.
pub struct Scopehost<S: SerialPort, O: PortOpener<S>> {
    pub handle: RuntimeHandle<S, O>,
    pub settings: Arc<dyn SettingsStore>,
    pub saved_ports: Arc<dyn SavedPortsStore>,
    pub snapshot_sink: Arc<dyn SnapshotSink>,
    shutdown_tx: watch::Sender<bool>,
}

impl<S: SerialPort + 'static, O: PortOpener<S> + 'static> Scopehost<S, O> {
    /// Builds the device manager and runtime, but does not start the main
    /// loop — the returned future must be spawned by the caller (spec.md §9:
    /// "a single-threaded implementation with explicit I/O suspension is
    /// equally acceptable", so this crate never assumes a particular
    /// executor).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        opener: O,
        request_timeout: Duration,
        settings: Arc<dyn SettingsStore>,
        saved_ports: Arc<dyn SavedPortsStore>,
        snapshot_sink: Arc<dyn SnapshotSink>,
        clock: Arc<dyn Clock>,
    ) -> (Self, impl std::future::Future<Output = ()>, mpsc::UnboundedReceiver<Event>) {
        let manager = Arc::new(DeviceManager::new(opener, request_timeout));
        let (runtime, handle, events) = Runtime::new(manager, settings.clone(), clock);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let main_loop = runtime.run(shutdown_rx);
        (Self { handle, settings, saved_ports, snapshot_sink, shutdown_tx }, main_loop, events)
    }

    /// Signals the main loop to drain pending work and return (spec.md §5:
    /// "Runtime shutdown disconnects all sessions and drains pending
    /// events"). Idempotent; dropping every clone of the returned future's
    /// `JoinHandle` without calling this leaves the loop running.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Flattens a device's downloaded snapshot chunks (spec.md §4.8: ordered by
/// starting sample index, each chunk already sample-major) into one
/// contiguous buffer and hands it to a [`SnapshotSink`]. Bridges the
/// runtime's `SnapshotChunk` events — which the embedder's store projection
/// has accumulated into [`DeviceSnapshot::snapshot_chunks`] — to the
/// persistent-storage collaborator spec.md §1 keeps out of the core.
pub fn persist_snapshot(sink: &dyn SnapshotSink, snapshot: &DeviceSnapshot) -> Option<u64> {
    if snapshot.snapshot_chunks.is_empty() {
        return None;
    }
    let mut samples = Vec::new();
    for chunk in snapshot.snapshot_chunks.values() {
        samples.extend(chunk.iter().cloned());
    }
    Some(sink.persist(&snapshot.path, samples))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scopehost_transport::fake::FakeSerialPort;
    use scopehost_wire::framer::encode_frame;
    use std::sync::Mutex;

    fn get_info_frame() -> Vec<u8> {
        let payload = vec![0x02, 0x40, 0x00, 0x14, 0x00, 0x00, 0x00, 0x00, 0x04, 0x00, b'D', b'U', b'T', 0];
        encode_frame(MessageType::GetInfo.as_u8(), &payload).unwrap()
    }

    struct ScriptedOpener;
    impl PortOpener<FakeSerialPort> for ScriptedOpener {
        async fn open(&self, _path: &str, _config: SerialConfig) -> std::io::Result<FakeSerialPort> {
            Ok(FakeSerialPort::scripted(vec![get_info_frame()]))
        }
    }

    #[tokio::test]
    async fn wiring_connects_a_device_and_reports_its_snapshot() {
        let settings: Arc<dyn SettingsStore> = Arc::new(InMemorySettingsStore::default());
        let saved_ports: Arc<dyn SavedPortsStore> = Arc::new(InMemorySavedPortsStore::default());
        let snapshot_sink: Arc<dyn SnapshotSink> = Arc::new(InMemorySnapshotSink::default());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let (host, main_loop, mut events) =
            Scopehost::new(ScriptedOpener, Duration::from_millis(200), settings, saved_ports, snapshot_sink, clock);
        let loop_task = tokio::spawn(main_loop);

        host.handle
            .submit(Command::Connect { path: "/dev/ttyUSB0".into(), config: SerialConfig::default() })
            .unwrap();

        let mut connected = false;
        for _ in 0..10 {
            match tokio::time::timeout(Duration::from_millis(300), events.recv()).await {
                Ok(Some(Event::DeviceConnected { .. })) => {
                    connected = true;
                    break;
                }
                Ok(Some(_)) => {}
                _ => break,
            }
        }
        assert!(connected);
        host.shutdown();
        let _ = loop_task.await;
    }

    #[test]
    fn persist_snapshot_flattens_chunks_in_offset_order() {
        let sink = InMemorySnapshotSink::new();
        let mut snap = DeviceSnapshot::new("/dev/ttyUSB0");
        snap.snapshot_chunks.insert(2, vec![vec![4.0], vec![5.0]]);
        snap.snapshot_chunks.insert(0, vec![vec![1.0], vec![2.0]]);
        let id = persist_snapshot(&sink, &snap).unwrap();
        assert_eq!(sink.load_samples(id).unwrap(), vec![vec![1.0], vec![2.0], vec![4.0], vec![5.0]]);
    }

    #[test]
    fn persist_snapshot_is_none_when_nothing_downloaded_yet() {
        let sink = InMemorySnapshotSink::new();
        let snap = DeviceSnapshot::new("/dev/ttyUSB0");
        assert!(persist_snapshot(&sink, &snap).is_none());
        let _ = Mutex::new(());
    }
}
