//! The cooperative scheduler (spec.md §4.7): one main loop per runtime that
//! interleaves user commands with two poller streams across every
//! connected device, applies the per-error-kind retry policy, isolates
//! per-device failures, and emits the typed event stream.

use crate::clock::Clock;
use crate::command::{Command, PollKind};
use crate::error::RuntimeError;
use crate::queues::{PollSlot, USER_COMMAND_CAPACITY};
use crate::retry::with_crc_retry;
use crate::settings::SettingsStore;
use futures::future::join_all;
use scopehost_manager::{ConnectedDevice, DeviceManager, PortOpener};
use scopehost_session::SessionError;
use scopehost_snapshot::{download_snapshot, DownloadError};
use scopehost_store::model::DeviceErrorKind;
use scopehost_store::policy::CommandDecision;
use scopehost_store::{apply_event as apply_store_event, DeviceSnapshot, Event};
use scopehost_transport::{SerialConfig, SerialPort, TransportError};
use scopehost_wire::model::{DeviceState, TimingConfig, TriggerConfig};
use scopehost_wire::{framer::MAX_PAYLOAD, ErrorCode, WireError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

/// A device whose last this-many consecutive operations all timed out is
/// treated as gone (spec.md §4.7.6: "a small integer like 3 is
/// acceptable").
const CONSECUTIVE_TIMEOUT_DISCONNECT_THRESHOLD: u32 = 3;

fn classify(err: &SessionError) -> DeviceErrorKind {
    match err {
        SessionError::Transport(TransportError::Timeout) => DeviceErrorKind::Timeout,
        SessionError::Transport(TransportError::CrcMismatch) => DeviceErrorKind::CrcMismatch,
        SessionError::Transport(TransportError::PortBusy) => DeviceErrorKind::PortBusy,
        SessionError::Transport(TransportError::Disconnected) => DeviceErrorKind::Disconnected,
        SessionError::Transport(TransportError::InvalidHandle) => DeviceErrorKind::InvalidHandle,
        SessionError::Transport(TransportError::IoError(_)) => DeviceErrorKind::IoError,
        SessionError::Wire(WireError::Device(code)) => DeviceErrorKind::Device(*code),
        SessionError::Wire(_) => DeviceErrorKind::Decode,
        SessionError::UnexpectedResponseType { .. } => DeviceErrorKind::UnexpectedResponseType,
    }
}

/// Everything the main loop and every per-device task need shared, mutable
/// access to. Kept behind `&self` + interior mutability so device tasks can
/// run with unbounded concurrency (spec.md §4.7.4) without fighting the
/// borrow checker over a `&mut Runtime`.
struct Inner<S: SerialPort, O: PortOpener<S>> {
    manager: Arc<DeviceManager<S, O>>,
    events_tx: mpsc::UnboundedSender<Event>,
    snapshots: Mutex<HashMap<String, DeviceSnapshot>>,
    timeout_streaks: Mutex<HashMap<String, u32>>,
    settings: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    tick_counter: AtomicU64,
}

impl<S: SerialPort, O: PortOpener<S>> Inner<S, O> {
    fn snapshot_list(&self) -> Vec<DeviceSnapshot> {
        self.snapshots.lock().unwrap().values().cloned().collect()
    }

    /// Applies `event` to the internal store projection (used by the guard)
    /// and forwards it to external subscribers. This is the only place
    /// events leave the scheduler.
    fn emit(&self, event: Event) {
        if let Some(path) = event.path() {
            let mut snapshots = self.snapshots.lock().unwrap();
            let current = snapshots.remove(path).unwrap_or_else(|| DeviceSnapshot::new(path));
            snapshots.insert(path.to_string(), apply_store_event(current, &event));
        }
        // The receiving end may have been dropped (runtime shutting down);
        // there's nothing useful to do about a send failure here.
        let _ = self.events_tx.send(event);
    }

    fn note_success(&self, path: &str) {
        self.timeout_streaks.lock().unwrap().remove(path);
    }

    async fn record_device_error(&self, path: &str, kind: DeviceErrorKind) {
        self.emit(Event::DeviceError { path: path.to_string(), error: kind });
        let should_disconnect = {
            let mut streaks = self.timeout_streaks.lock().unwrap();
            if matches!(kind, DeviceErrorKind::Timeout) {
                let streak = streaks.entry(path.to_string()).or_insert(0);
                *streak += 1;
                *streak >= CONSECUTIVE_TIMEOUT_DISCONNECT_THRESHOLD
            } else {
                streaks.remove(path);
                false
            }
        };
        if should_disconnect {
            tracing::warn!(path, "disconnecting after repeated timeouts");
            self.manager.disconnect(path).await;
            self.timeout_streaks.lock().unwrap().remove(path);
            self.emit(Event::DeviceDisconnected { path: path.to_string() });
        }
    }

    async fn record_error(&self, path: &str, err: &SessionError) {
        self.record_device_error(path, classify(err)).await;
    }

    fn crc_retry_attempts(&self) -> u32 {
        self.settings.get().crc_retry_attempts
    }

    async fn handle_connect(&self, path: String, config: SerialConfig) {
        match self.manager.connect(&path, config).await {
            Ok(connected) => {
                self.note_success(&path);
                self.emit(Event::DeviceConnected { path: path.clone(), info: connected.info.clone() });
                self.prime_session(&connected).await;
            }
            Err(err) => {
                tracing::warn!(path, error = %err, "connect failed");
            }
        }
    }

    /// spec.md §4.7.3 "Connect handling": issue `GET_STATE`, then — unless
    /// the device reports `Misconfigured` — `GET_TIMING`, `GET_TRIGGER`,
    /// `GET_CHANNEL_MAP`, paginated catalogs, and every RT buffer value.
    async fn prime_session(&self, connected: &ConnectedDevice<S>) {
        let path = connected.path.clone();
        let state = {
            let mut session = connected.session.lock().await;
            session.get_state().await
        };
        let state = match state {
            Ok(state) => {
                self.emit(Event::StateUpdated { path: path.clone(), state });
                state
            }
            Err(err) => {
                self.record_error(&path, &err).await;
                return;
            }
        };
        if state == DeviceState::Misconfigured {
            return;
        }

        {
            let result = {
                let mut session = connected.session.lock().await;
                session.get_timing().await
            };
            match result {
                Ok(timing) => self.emit(Event::TimingUpdated { path: path.clone(), timing }),
                Err(err) => self.record_error(&path, &err).await,
            }
        }
        {
            let result = {
                let mut session = connected.session.lock().await;
                session.get_trigger().await
            };
            match result {
                Ok(trigger) => self.emit(Event::TriggerUpdated { path: path.clone(), trigger }),
                Err(err) => self.record_error(&path, &err).await,
            }
        }
        {
            let result = {
                let mut session = connected.session.lock().await;
                session.get_channel_map().await
            };
            match result {
                Ok(channel_map) => self.emit(Event::ChannelMapUpdated { path: path.clone(), channel_map }),
                Err(err) => self.record_error(&path, &err).await,
            }
        }

        self.paginate_catalog(connected, Catalog::VarList).await;
        self.paginate_catalog(connected, Catalog::RtLabels).await;

        for index in 0..connected.info.rt_count {
            let result = {
                let mut session = connected.session.lock().await;
                session.get_rt_buffer(index).await
            };
            match result {
                Ok(value) => self.emit(Event::RtBufferUpdated { path: path.clone(), index, value }),
                Err(err) => self.record_error(&path, &err).await,
            }
        }
    }

    async fn paginate_catalog(&self, connected: &ConnectedDevice<S>, which: Catalog) {
        let path = connected.path.clone();
        let name_len = (connected.info.name_len as usize).max(1);
        // spec.md §8 scenario 6: max = floor((252 - 3) / name_len).
        let max = (((MAX_PAYLOAD - 3) / name_len).clamp(1, u8::MAX as usize)) as u8;
        let mut start: u8 = 0;
        loop {
            let page = {
                let mut session = connected.session.lock().await;
                match which {
                    Catalog::VarList => session.get_var_list_page(start, max).await,
                    Catalog::RtLabels => session.get_rt_labels_page(start, max).await,
                }
            };
            let page = match page {
                Ok(page) => page,
                Err(err) => {
                    self.record_error(&path, &err).await;
                    return;
                }
            };
            let advanced = page.entries.len();
            let total_count = page.total_count;
            match which {
                Catalog::VarList => self.emit(Event::VarListPageUpdated { path: path.clone(), page }),
                Catalog::RtLabels => self.emit(Event::RtLabelsPageUpdated { path: path.clone(), page }),
            }
            if advanced == 0 {
                break;
            }
            start = start.saturating_add(advanced as u8);
            if start as usize >= total_count as usize {
                break;
            }
        }
    }

    async fn handle_disconnect(&self, path: String) {
        self.manager.disconnect(&path).await;
        self.timeout_streaks.lock().unwrap().remove(&path);
        self.emit(Event::DeviceDisconnected { path });
    }

    async fn handle_download_snapshot(&self, path: String) {
        let Some(connected) = self.manager.get(&path).await else {
            tracing::warn!(path, "snapshot download requested for an unconnected device");
            return;
        };
        let header = {
            let mut session = connected.session.lock().await;
            session.get_snapshot_header().await
        };
        let header = match header {
            Ok(header) => header,
            Err(err) => {
                self.record_error(&path, &err).await;
                return;
            }
        };
        self.emit(Event::SnapshotHeaderUpdated { path: path.clone(), header });

        let buffer_size = connected.info.buffer_size;
        let mut session = connected.session.lock().await;
        let result = download_snapshot(&mut session, buffer_size, |start, samples| {
            self.emit(Event::SnapshotChunk { path: path.clone(), start, samples: samples.to_vec() });
        })
        .await;
        drop(session);

        match result {
            Ok(_) => self.note_success(&path),
            Err(DownloadError::NotReady) => {
                self.record_device_error(&path, DeviceErrorKind::Device(ErrorCode::NotReady)).await;
            }
            Err(DownloadError::ChunkFailure) => {
                self.record_device_error(&path, DeviceErrorKind::SnapshotDownloadFailed).await;
            }
            Err(DownloadError::Session(err)) => self.record_error(&path, &err).await,
        }
    }

    /// `SET <field>` immediately followed by `GET <field>`: the `GET`
    /// result is what populates the event, never the local intent (spec.md
    /// §4.7.4).
    async fn dispatch_one(&self, path: &str, cmd: &Command, attempts: u32) {
        let Some(connected) = self.manager.get(path).await else {
            return;
        };
        let outcome = match cmd {
            Command::SetState { state, .. } => {
                let result = with_crc_retry(attempts, || async {
                    let mut session = connected.session.lock().await;
                    session.set_state(*state).await
                })
                .await;
                match result {
                    Ok(_) => with_crc_retry(attempts, || async {
                        let mut session = connected.session.lock().await;
                        session.get_state().await
                    })
                    .await
                    .map(|state| Event::StateUpdated { path: path.to_string(), state }),
                    Err(err) => Err(err),
                }
            }
            Command::Trigger { .. } => {
                let result = with_crc_retry(attempts, || async {
                    let mut session = connected.session.lock().await;
                    session.trigger().await
                })
                .await;
                match result {
                    // TRIGGER has no mirror payload; re-read state so an
                    // ensuing Halted -> Acquiring transition shows up.
                    Ok(()) => with_crc_retry(attempts, || async {
                        let mut session = connected.session.lock().await;
                        session.get_state().await
                    })
                    .await
                    .map(|state| Event::StateUpdated { path: path.to_string(), state }),
                    Err(err) => Err(err),
                }
            }
            Command::SetTiming { divider, pre_trig, .. } => {
                let cfg = TimingConfig { divider: *divider, pre_trig: *pre_trig };
                let result = with_crc_retry(attempts, || async {
                    let mut session = connected.session.lock().await;
                    session.set_timing(cfg).await
                })
                .await;
                match result {
                    Ok(_) => with_crc_retry(attempts, || async {
                        let mut session = connected.session.lock().await;
                        session.get_timing().await
                    })
                    .await
                    .map(|timing| Event::TimingUpdated { path: path.to_string(), timing }),
                    Err(err) => Err(err),
                }
            }
            Command::SetChannelMap { channel_idx, catalog_idx, .. } => {
                let result = with_crc_retry(attempts, || async {
                    let mut session = connected.session.lock().await;
                    session.set_channel_map_entry(*channel_idx, *catalog_idx).await
                })
                .await;
                match result {
                    Ok(_) => with_crc_retry(attempts, || async {
                        let mut session = connected.session.lock().await;
                        session.get_channel_map().await
                    })
                    .await
                    .map(|channel_map| Event::ChannelMapUpdated { path: path.to_string(), channel_map }),
                    Err(err) => Err(err),
                }
            }
            Command::SetTrigger { threshold, channel, mode, .. } => {
                let cfg = TriggerConfig { threshold: *threshold, channel: *channel, mode: *mode };
                let result = with_crc_retry(attempts, || async {
                    let mut session = connected.session.lock().await;
                    session.set_trigger(cfg).await
                })
                .await;
                match result {
                    Ok(_) => with_crc_retry(attempts, || async {
                        let mut session = connected.session.lock().await;
                        session.get_trigger().await
                    })
                    .await
                    .map(|trigger| Event::TriggerUpdated { path: path.to_string(), trigger }),
                    Err(err) => Err(err),
                }
            }
            Command::SetRtBuffer { index, value, .. } => {
                let result = with_crc_retry(attempts, || async {
                    let mut session = connected.session.lock().await;
                    session.set_rt_buffer(*index, *value).await
                })
                .await;
                match result {
                    Ok(_) => with_crc_retry(attempts, || async {
                        let mut session = connected.session.lock().await;
                        session.get_rt_buffer(*index).await
                    })
                    .await
                    .map(|value| Event::RtBufferUpdated { path: path.to_string(), index: *index, value }),
                    Err(err) => Err(err),
                }
            }
            Command::Connect { .. } | Command::Disconnect { .. } | Command::DownloadSnapshot { .. } => {
                unreachable!("lifecycle/download commands are dispatched before reaching dispatch_one")
            }
        };
        match outcome {
            Ok(event) => {
                self.note_success(path);
                self.emit(event);
            }
            Err(err) => self.record_error(path, &err).await,
        }
    }

    async fn handle_mutating(&self, cmd: Command) {
        let targets: Vec<String> = match cmd.targets() {
            Some(paths) => paths.to_vec(),
            None => self.manager.get_active().await.into_iter().map(|c| c.path).collect(),
        };
        let attempts = self.crc_retry_attempts();
        let tasks = targets.iter().map(|path| self.dispatch_one(path, &cmd, attempts));
        join_all(tasks).await;
    }

    async fn handle_poll_state(&self) {
        let attempts = self.crc_retry_attempts();
        let devices = self.manager.get_active().await;
        let tasks = devices.into_iter().map(|connected| {
            let path = connected.path.clone();
            async move {
                let result = with_crc_retry(attempts, || async {
                    let mut session = connected.session.lock().await;
                    session.get_state().await
                })
                .await;
                (path, result)
            }
        });
        for (path, result) in join_all(tasks).await {
            match result {
                Ok(state) => {
                    self.note_success(&path);
                    self.emit(Event::StateUpdated { path, state });
                }
                Err(err) => self.record_error(&path, &err).await,
            }
        }
    }

    /// spec.md §4.7.4: a stale tick clears every connected device's frame
    /// without touching the wire; otherwise issue `GET_FRAME` with no
    /// retries (`CrcMismatch` silently drops that device's frame for the
    /// tick). `FrameTick` always precedes the `FrameUpdated`/`FrameCleared`
    /// it caused (spec.md §5).
    async fn handle_poll_frame(&self, queued_at: Instant) {
        let tick_id = self.tick_counter.fetch_add(1, Ordering::SeqCst);
        self.emit(Event::FrameTick { tick_id });

        let devices = self.manager.get_active().await;
        let frame_timeout = Duration::from_millis(self.settings.get().frame_timeout_ms);
        if self.clock.now().saturating_duration_since(queued_at) > frame_timeout {
            for connected in &devices {
                self.emit(Event::FrameCleared { path: connected.path.clone() });
            }
            return;
        }

        let tasks = devices.into_iter().map(|connected| {
            let path = connected.path.clone();
            async move {
                let mut session = connected.session.lock().await;
                (path, session.get_frame().await)
            }
        });
        for (path, result) in join_all(tasks).await {
            match result {
                Ok(frame) => {
                    self.note_success(&path);
                    self.emit(Event::FrameUpdated { path, frame });
                }
                Err(SessionError::Transport(TransportError::CrcMismatch)) => {}
                Err(err) => self.record_error(&path, &err).await,
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Catalog {
    VarList,
    RtLabels,
}

/// The handle a caller submits commands and poll ticks through. Cheaply
/// cloneable; every clone shares the same queues.
pub struct RuntimeHandle<S: SerialPort, O: PortOpener<S>> {
    inner: Arc<Inner<S, O>>,
    commands_tx: mpsc::Sender<Command>,
    state_slot: Arc<PollSlot>,
    frame_slot: Arc<PollSlot>,
}

impl<S: SerialPort, O: PortOpener<S>> Clone for RuntimeHandle<S, O> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            commands_tx: self.commands_tx.clone(),
            state_slot: self.state_slot.clone(),
            frame_slot: self.frame_slot.clone(),
        }
    }
}

fn map_send_err<T>(err: mpsc::error::TrySendError<T>) -> RuntimeError {
    match err {
        mpsc::error::TrySendError::Full(_) => RuntimeError::QueueFull,
        mpsc::error::TrySendError::Closed(_) => RuntimeError::ShutDown,
    }
}

impl<S: SerialPort, O: PortOpener<S>> RuntimeHandle<S, O> {
    /// Applies the command guard (spec.md §4.7.10) to mutating commands
    /// before queueing them, narrowing `targets` to the eligible subset.
    /// Lifecycle and snapshot-download commands bypass the guard entirely
    /// and are always queued (subject only to queue capacity).
    pub fn submit(&self, cmd: Command) -> Result<CommandDecision, RuntimeError> {
        match cmd.policy_kind() {
            None => {
                self.commands_tx.try_send(cmd).map_err(map_send_err)?;
                Ok(CommandDecision { allowed: true, target_paths: Vec::new(), skipped: Vec::new(), reason: None })
            }
            Some(kind) => {
                let snapshots = self.inner.snapshot_list();
                let decision = scopehost_store::guard(kind, cmd.targets(), &snapshots);
                if decision.allowed {
                    let narrowed = cmd.with_targets(decision.target_paths.clone());
                    self.commands_tx.try_send(narrowed).map_err(map_send_err)?;
                }
                Ok(decision)
            }
        }
    }

    pub fn offer_state_poll(&self) {
        self.state_slot.offer(self.inner.clock.now());
    }

    pub fn offer_frame_poll(&self) {
        self.frame_slot.offer(self.inner.clock.now());
    }

    /// A read-only snapshot of what the runtime currently knows, suitable
    /// for a caller to derive consensus/policy from directly (see
    /// `scopehost_store::derive_consensus`).
    pub fn snapshots(&self) -> Vec<DeviceSnapshot> {
        self.inner.snapshot_list()
    }
}

enum Work {
    User(Command),
    Poll(PollKind, Instant),
}

/// Owns the main loop (spec.md §4.7.2). Not `Clone` — there is exactly one
/// loop per runtime; everything else talks to it through a
/// [`RuntimeHandle`].
pub struct Runtime<S: SerialPort, O: PortOpener<S>> {
    inner: Arc<Inner<S, O>>,
    commands_rx: mpsc::Receiver<Command>,
    state_slot: Arc<PollSlot>,
    frame_slot: Arc<PollSlot>,
    poll_turn: PollKind,
}

impl<S: SerialPort + 'static, O: PortOpener<S> + 'static> Runtime<S, O> {
    pub fn new(
        manager: Arc<DeviceManager<S, O>>,
        settings: Arc<dyn SettingsStore>,
        clock: Arc<dyn Clock>,
    ) -> (Self, RuntimeHandle<S, O>, mpsc::UnboundedReceiver<Event>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::channel(USER_COMMAND_CAPACITY);
        let state_slot = Arc::new(PollSlot::new());
        let frame_slot = Arc::new(PollSlot::new());
        let inner = Arc::new(Inner {
            manager,
            events_tx,
            snapshots: Mutex::new(HashMap::new()),
            timeout_streaks: Mutex::new(HashMap::new()),
            settings,
            clock,
            tick_counter: AtomicU64::new(0),
        });
        let runtime = Runtime {
            inner: inner.clone(),
            commands_rx,
            state_slot: state_slot.clone(),
            frame_slot: frame_slot.clone(),
            poll_turn: PollKind::State,
        };
        let handle = RuntimeHandle { inner, commands_tx, state_slot, frame_slot };
        (runtime, handle, events_rx)
    }

    /// The main loop (spec.md §4.7.2): user commands first, then a
    /// round-robin pick between the two poll slots, then block on whichever
    /// source becomes ready first. Returns once `shutdown` is set and no
    /// more work is pending.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        while let Some(work) = self.next_work(&mut shutdown).await {
            match work {
                Work::User(Command::Connect { path, config }) => self.inner.handle_connect(path, config).await,
                Work::User(Command::Disconnect { path }) => self.inner.handle_disconnect(path).await,
                Work::User(Command::DownloadSnapshot { path }) => self.inner.handle_download_snapshot(path).await,
                Work::User(cmd) => self.inner.handle_mutating(cmd).await,
                Work::Poll(PollKind::State, _) => self.inner.handle_poll_state().await,
                Work::Poll(PollKind::Frame, queued_at) => self.inner.handle_poll_frame(queued_at).await,
            }
        }
        self.inner.manager.disconnect_all().await;
    }

    async fn next_work(&mut self, shutdown: &mut watch::Receiver<bool>) -> Option<Work> {
        loop {
            if *shutdown.borrow() {
                return None;
            }
            if let Ok(cmd) = self.commands_rx.try_recv() {
                return Some(Work::User(cmd));
            }
            let order = match self.poll_turn {
                PollKind::State => [PollKind::State, PollKind::Frame],
                PollKind::Frame => [PollKind::Frame, PollKind::State],
            };
            for kind in order {
                let slot = match kind {
                    PollKind::State => &self.state_slot,
                    PollKind::Frame => &self.frame_slot,
                };
                if let Some(queued_at) = slot.try_take() {
                    self.poll_turn = match kind {
                        PollKind::State => PollKind::Frame,
                        PollKind::Frame => PollKind::State,
                    };
                    return Some(Work::Poll(kind, queued_at));
                }
            }
            tokio::select! {
                biased;
                _ = shutdown.changed() => {}
                cmd = self.commands_rx.recv() => {
                    if let Some(cmd) = cmd {
                        return Some(Work::User(cmd));
                    }
                }
                _ = self.state_slot.notified() => {}
                _ = self.frame_slot.notified() => {}
            }
        }
    }
}
