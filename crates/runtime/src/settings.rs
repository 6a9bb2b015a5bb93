//! The settings collaborator (spec.md §6): a small fixed schema the core
//! reads at startup and writes only through documented commands. Out of
//! scope per spec.md §1 is *persistent* storage; this module defines the
//! trait plus an in-memory reference implementation used by tests and the
//! demonstration binary.

use scopehost_transport::SerialConfig;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotGcDays {
    Never,
    Days(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub default_serial_cfg: SerialConfigDto,
    pub state_polling_hz: f32,
    pub frame_polling_hz: f32,
    pub frame_timeout_ms: u64,
    pub crc_retry_attempts: u32,
    pub live_buffer_duration_s: f32,
    pub snapshot_auto_save: bool,
    pub snapshot_gc_days: SnapshotGcDays,
}

/// A serde-friendly mirror of [`SerialConfig`] — the wire-facing struct
/// itself has no derives, matching `firecracker-sdk::dto`'s convention of
/// keeping transport-shape types separate from the serializable settings
/// shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfigDto {
    pub baud: u32,
    pub read_timeout_ms: u32,
}

impl From<SerialConfigDto> for SerialConfig {
    fn from(dto: SerialConfigDto) -> Self {
        SerialConfig { baud: dto.baud, read_timeout_ms: dto.read_timeout_ms, ..SerialConfig::default() }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_serial_cfg: SerialConfigDto { baud: 115_200, read_timeout_ms: 200 },
            state_polling_hz: 5.0,
            frame_polling_hz: 20.0,
            frame_timeout_ms: 250,
            crc_retry_attempts: 3,
            live_buffer_duration_s: 10.0,
            snapshot_auto_save: false,
            snapshot_gc_days: SnapshotGcDays::Days(30),
        }
    }
}

/// Result of loading settings: whether the stored value had to be reset to
/// defaults because it was malformed (spec.md §6: "reset to defaults and
/// raise a one-shot 'settings were recovered' flag").
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsLoad {
    pub settings: Settings,
    pub recovered: bool,
}

pub trait SettingsStore: Send + Sync {
    fn get(&self) -> Settings;
    fn set(&self, settings: Settings);
}

/// In-memory reference implementation. A real embedder supplies one backed
/// by a file or OS-level settings store (spec.md §9: "treated as services
/// passed to the core at construction, not as static globals").
pub struct InMemorySettingsStore {
    current: Mutex<Settings>,
}

impl InMemorySettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self { current: Mutex::new(settings) }
    }

    /// Parses `json` as [`Settings`]; on any malformed input, falls back to
    /// defaults and reports `recovered = true` rather than failing to
    /// start (spec.md §6).
    pub fn from_json(json: &str) -> (Self, SettingsLoad) {
        match serde_json::from_str::<Settings>(json) {
            Ok(settings) => {
                let load = SettingsLoad { settings: settings.clone(), recovered: false };
                (Self::new(settings), load)
            }
            Err(_) => {
                let settings = Settings::default();
                let load = SettingsLoad { settings: settings.clone(), recovered: true };
                (Self::new(settings), load)
            }
        }
    }
}

impl Default for InMemorySettingsStore {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl SettingsStore for InMemorySettingsStore {
    fn get(&self) -> Settings {
        self.current.lock().unwrap().clone()
    }

    fn set(&self, settings: Settings) {
        *self.current.lock().unwrap() = settings;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_json_falls_back_to_defaults_and_flags_recovery() {
        let (store, load) = InMemorySettingsStore::from_json("{ not json");
        assert!(load.recovered);
        assert_eq!(load.settings, Settings::default());
        assert_eq!(store.get(), Settings::default());
    }

    #[test]
    fn valid_json_round_trips_without_recovery_flag() {
        let settings = Settings { state_polling_hz: 2.0, ..Settings::default() };
        let json = serde_json::to_string(&settings).unwrap();
        let (store, load) = InMemorySettingsStore::from_json(&json);
        assert!(!load.recovered);
        assert_eq!(store.get().state_polling_hz, 2.0);
    }
}
