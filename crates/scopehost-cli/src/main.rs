//! Demonstration binary: wires a simulated multi-device rig through the
//! real runtime and prints events and cross-device consensus as they
//! happen. No real serial port is opened — [`SimDevice`] stands in for
//! firmware the way `FakeSerialPort` stands in for hardware in the library
//! crates' own tests.

use clap::Parser;
use scopehost::{
    wire::bytes, wire::codec, wire::model::MessageType, wire::Endianness, Command, Clock,
    DeviceState, InMemorySavedPortsStore, InMemorySettingsStore, InMemorySnapshotSink, PortOpener,
    SerialConfig, SystemClock, TriggerConfig, TriggerMode,
};
use scopehost_transport::fake::FakeSerialPort;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(about = "Runs a simulated oscilloscope rig through the scopehost runtime")]
struct Args {
    /// Number of simulated devices to connect.
    #[arg(long, default_value_t = 2)]
    devices: u8,

    /// How long to let the rig run before shutting down, in seconds.
    #[arg(long, default_value_t = 4)]
    run_secs: u64,
}

/// A minimal in-process stand-in for firmware: enough state to answer every
/// request the priming sequence and a handful of live commands make, with
/// no labeled-variable catalog (`var_count`/`rt_count` are both zero, same
/// as the fixtures the library crates' own tests use).
struct SimDevice {
    num_channels: u8,
    name: String,
    state: DeviceState,
    timing: scopehost::wire::model::TimingConfig,
    trigger: TriggerConfig,
    channel_map: Vec<u8>,
    frame_tick: u32,
}

impl SimDevice {
    fn new(name: String, num_channels: u8) -> Self {
        Self {
            num_channels,
            name,
            state: DeviceState::Halted,
            timing: scopehost::wire::model::TimingConfig { divider: 1, pre_trig: 0 },
            trigger: TriggerConfig { threshold: 1.5, channel: 0, mode: TriggerMode::Disabled },
            channel_map: (0..num_channels).collect(),
            frame_tick: 0,
        }
    }

    fn info_payload(&self) -> Vec<u8> {
        let name_len = 12u8;
        let mut buf = vec![self.num_channels];
        buf.extend_from_slice(&1000u16.to_le_bytes());
        buf.extend_from_slice(&200u16.to_le_bytes());
        buf.push(0); // var_count
        buf.push(0); // rt_count
        buf.push(0); // rt_buffer_len
        buf.push(name_len);
        buf.push(0); // little-endian
        let mut name_bytes = self.name.clone().into_bytes();
        name_bytes.resize(name_len as usize, 0);
        buf.extend_from_slice(&name_bytes);
        buf
    }

    /// Answers one request frame with one response frame. `written` is the
    /// exact byte sequence the transport just wrote, `SYNC|LEN|TYPE|...`.
    fn respond(&mut self, written: &[u8]) -> Vec<u8> {
        let msg_type = written[2];
        let payload_len = written[1] as usize - 2;
        let req = &written[3..3 + payload_len];
        let frame = |ty: MessageType, payload: &[u8]| {
            scopehost::wire::encode_frame(ty.as_u8(), payload).unwrap_or_default()
        };

        match MessageType::from_u8(msg_type) {
            Some(MessageType::GetInfo) => frame(MessageType::GetInfo, &self.info_payload()),
            Some(MessageType::GetState) => frame(MessageType::GetState, &[self.state.as_u8()]),
            Some(MessageType::SetState) => {
                if let Some(state) = DeviceState::from_u8(req[0]) {
                    self.state = state;
                }
                frame(MessageType::SetState, &[self.state.as_u8()])
            }
            Some(MessageType::GetTiming) => {
                frame(MessageType::GetTiming, &codec::encode_set_timing(&self.timing, Endianness::Little).unwrap())
            }
            Some(MessageType::SetTiming) => {
                if let Ok(cfg) = codec::decode_timing_response(req, Endianness::Little) {
                    if cfg.divider > 0 {
                        self.timing = cfg;
                    }
                }
                frame(MessageType::SetTiming, &codec::encode_set_timing(&self.timing, Endianness::Little).unwrap())
            }
            Some(MessageType::GetTrigger) => {
                frame(MessageType::GetTrigger, &codec::encode_set_trigger(&self.trigger, Endianness::Little).unwrap())
            }
            Some(MessageType::SetTrigger) => {
                if let Ok(cfg) = codec::decode_trigger_response(req, Endianness::Little) {
                    self.trigger = cfg;
                }
                frame(MessageType::SetTrigger, &codec::encode_set_trigger(&self.trigger, Endianness::Little).unwrap())
            }
            Some(MessageType::GetChannelMap) => frame(MessageType::GetChannelMap, &self.channel_map),
            Some(MessageType::SetChannelMap) => {
                let (idx, val) = (req[0], req[1]);
                if let Some(slot) = self.channel_map.get_mut(idx as usize) {
                    *slot = val;
                }
                frame(MessageType::SetChannelMap, &[idx, val])
            }
            Some(MessageType::GetVarList) | Some(MessageType::GetRtLabels) => {
                frame(MessageType::from_u8(msg_type).unwrap(), &[0, 0, 0])
            }
            Some(MessageType::GetRtBuffer) => {
                frame(MessageType::GetRtBuffer, &0.0f32.to_le_bytes())
            }
            Some(MessageType::SetRtBuffer) => {
                let value = bytes::read_f32(req, 1, Endianness::Little).unwrap_or(0.0);
                frame(MessageType::SetRtBuffer, &value.to_le_bytes())
            }
            Some(MessageType::Trigger) => {
                self.state = DeviceState::Halted;
                self.frame_tick = self.frame_tick.wrapping_add(1);
                frame(MessageType::Trigger, &[])
            }
            Some(MessageType::GetFrame) => {
                self.frame_tick = self.frame_tick.wrapping_add(1);
                let mut payload = Vec::with_capacity(self.num_channels as usize * 4);
                for ch in 0..self.num_channels {
                    let value = (self.frame_tick as f32 * 0.1 + ch as f32).sin();
                    payload.extend_from_slice(&value.to_le_bytes());
                }
                frame(MessageType::GetFrame, &payload)
            }
            Some(MessageType::GetSnapshotHeader) => {
                let mut payload = self.channel_map.clone();
                payload.extend_from_slice(&self.timing.divider.to_le_bytes());
                payload.extend_from_slice(&self.timing.pre_trig.to_le_bytes());
                payload.extend_from_slice(&self.trigger.threshold.to_le_bytes());
                payload.push(self.trigger.channel);
                payload.push(self.trigger.mode.as_u8());
                frame(MessageType::GetSnapshotHeader, &payload)
            }
            Some(MessageType::GetSnapshotData) => {
                let start = u16::from_le_bytes([req[0], req[1]]);
                let count = req[2] as usize;
                let mut payload = Vec::with_capacity(count * self.num_channels as usize * 4);
                for i in 0..count {
                    for ch in 0..self.num_channels {
                        let value = (start as usize + i) as f32 + ch as f32 * 0.01;
                        payload.extend_from_slice(&value.to_le_bytes());
                    }
                }
                frame(MessageType::GetSnapshotData, &payload)
            }
            _ => Vec::new(),
        }
    }
}

struct DemoOpener {
    num_channels: u8,
}

impl PortOpener<FakeSerialPort> for DemoOpener {
    async fn open(&self, path: &str, _config: SerialConfig) -> std::io::Result<FakeSerialPort> {
        let mut device = SimDevice::new(path.trim_start_matches("/dev/").to_string(), self.num_channels);
        Ok(FakeSerialPort::empty().with_responder(move |written| device.respond(written)))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let settings = Arc::new(InMemorySettingsStore::default());
    let saved_ports = Arc::new(InMemorySavedPortsStore::default());
    let snapshot_sink = Arc::new(InMemorySnapshotSink::default());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (host, main_loop, mut events) = scopehost::Scopehost::new(
        DemoOpener { num_channels: 4 },
        Duration::from_millis(250),
        settings,
        saved_ports,
        snapshot_sink.clone(),
        clock,
    );
    let loop_task = tokio::spawn(main_loop);

    let paths: Vec<String> = (0..args.devices).map(|i| format!("/dev/sim{i}")).collect();
    for path in &paths {
        host.handle.submit(Command::Connect { path: path.clone(), config: SerialConfig::default() })?;
    }

    let event_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            tracing::info!(?event, "runtime event");
        }
    });

    tokio::time::sleep(Duration::from_millis(300)).await;

    host.handle.submit(Command::SetState { state: DeviceState::Running, targets: None })?;

    if let Some(first) = paths.first() {
        host.handle.submit(Command::Trigger { targets: Some(vec![first.clone()]) })?;
        tokio::time::sleep(Duration::from_millis(100)).await;
        host.handle.submit(Command::DownloadSnapshot { path: first.clone() })?;
    }

    let poll_interval = Duration::from_millis(50);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(args.run_secs);
    while tokio::time::Instant::now() < deadline {
        host.handle.offer_state_poll();
        host.handle.offer_frame_poll();
        tokio::time::sleep(poll_interval).await;
    }

    let snapshots = host.handle.snapshots();
    let consensus = scopehost::derive_consensus(&snapshots);
    tracing::info!(?consensus, "final consensus across connected devices");

    for snapshot in &snapshots {
        if let Some(id) = scopehost::persist_snapshot(snapshot_sink.as_ref(), snapshot) {
            tracing::info!(path = %snapshot.path, snapshot_id = id, "persisted downloaded snapshot");
        }
    }

    host.shutdown();
    drop(host);
    let _ = loop_task.await;
    event_task.abort();

    Ok(())
}
