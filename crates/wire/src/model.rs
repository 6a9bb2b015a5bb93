//! The device data model: types populated from the wire protocol, plus the
//! message-type table itself. Pure data — no I/O, no encode/decode logic
//! (that lives in [`crate::codec`]).

pub use crate::bytes::Endianness;

/// One frame family on the wire, keyed by its request byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    GetInfo = 0x01,
    GetTiming = 0x02,
    SetTiming = 0x03,
    GetState = 0x04,
    SetState = 0x05,
    Trigger = 0x06,
    GetFrame = 0x07,
    GetSnapshotHeader = 0x08,
    GetSnapshotData = 0x09,
    GetVarList = 0x0A,
    GetChannelMap = 0x0B,
    SetChannelMap = 0x0C,
    GetRtLabels = 0x0D,
    GetRtBuffer = 0x0E,
    SetRtBuffer = 0x0F,
    GetTrigger = 0x10,
    SetTrigger = 0x11,
    Error = 0xFF,
}

impl MessageType {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0x01 => Self::GetInfo,
            0x02 => Self::GetTiming,
            0x03 => Self::SetTiming,
            0x04 => Self::GetState,
            0x05 => Self::SetState,
            0x06 => Self::Trigger,
            0x07 => Self::GetFrame,
            0x08 => Self::GetSnapshotHeader,
            0x09 => Self::GetSnapshotData,
            0x0A => Self::GetVarList,
            0x0B => Self::GetChannelMap,
            0x0C => Self::SetChannelMap,
            0x0D => Self::GetRtLabels,
            0x0E => Self::GetRtBuffer,
            0x0F => Self::SetRtBuffer,
            0x10 => Self::GetTrigger,
            0x11 => Self::SetTrigger,
            0xFF => Self::Error,
            _ => return None,
        })
    }
}

/// Error codes carried in the first payload byte of an `0xFF ERROR` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    BadLen = 1,
    BadParam = 2,
    Range = 4,
    NotReady = 5,
}

impl ErrorCode {
    pub fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            1 => Self::BadLen,
            2 => Self::BadParam,
            4 => Self::Range,
            5 => Self::NotReady,
            _ => return None,
        })
    }
}

/// Everything `GET_INFO` reports about a device. Immutable for the life of
/// a session once populated — see `scopehost_session::DeviceSession::open`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub num_channels: u8,
    pub buffer_size: u16,
    pub isr_khz: u16,
    pub var_count: u8,
    pub rt_count: u8,
    pub rt_buffer_len: u8,
    pub name_len: u8,
    pub endianness: Endianness,
    pub device_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Halted,
    Running,
    Acquiring,
    Misconfigured,
}

impl DeviceState {
    pub fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::Halted,
            1 => Self::Running,
            2 => Self::Acquiring,
            3 => Self::Misconfigured,
            _ => return None,
        })
    }

    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Halted => 0,
            Self::Running => 1,
            Self::Acquiring => 2,
            Self::Misconfigured => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    Disabled,
    Rising,
    Falling,
    Both,
}

impl TriggerMode {
    pub fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::Disabled,
            1 => Self::Rising,
            2 => Self::Falling,
            3 => Self::Both,
            _ => return None,
        })
    }

    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Disabled => 0,
            Self::Rising => 1,
            Self::Falling => 2,
            Self::Both => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingConfig {
    pub divider: u32,
    pub pre_trig: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerConfig {
    pub threshold: f32,
    pub channel: u8,
    pub mode: TriggerMode,
}

/// Assignment from each of `num_channels` capture slots to a variable
/// catalog index.
pub type ChannelMap = Vec<u8>;

pub type FrameSample = Vec<f32>;

/// One page of a paginated name list (`GET_VAR_LIST` / `GET_RT_LABELS`).
/// Reassembly into the full catalog is the runtime's job, not the codec's.
#[derive(Debug, Clone, PartialEq)]
pub struct NameListPage {
    pub total_count: u8,
    pub start_idx: u8,
    pub entries: Vec<String>,
}

pub type VarListPage = NameListPage;
pub type RtLabelsPage = NameListPage;

/// The post-trigger capture header, valid only after `Acquiring -> Halted`.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotHeader {
    pub channel_map: ChannelMap,
    pub divider: u32,
    pub pre_trig: u32,
    pub trigger_threshold: f32,
    pub trigger_channel: u8,
    pub trigger_mode: TriggerMode,
    pub rt_values: Vec<f32>,
}
