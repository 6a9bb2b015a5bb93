//! Byte-level encode/decode for the oscilloscope serial protocol: frame
//! syncing, CRC-8 verification, and per-message-family payload shapes.
//! Pure and synchronous — no I/O. Transports and sessions build on this.

pub mod bytes;
pub mod codec;
pub mod crc;
pub mod error;
pub mod framer;
pub mod model;

pub use bytes::Endianness;
pub use error::WireError;
pub use framer::{encode_frame, Framer, ParseEvent, MAX_PAYLOAD, SYNC};
pub use model::{
    ChannelMap, DeviceInfo, DeviceState, ErrorCode, FrameSample, MessageType, NameListPage,
    RtLabelsPage, SnapshotHeader, TimingConfig, TriggerConfig, TriggerMode, VarListPage,
};
