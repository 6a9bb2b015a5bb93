//! The per-session request/response engine: one blocking-shaped round trip
//! over an opaque serial handle, with frame resync and response-type
//! checking. Builds on [`scopehost_wire`]; knows nothing about devices,
//! sessions, or the runtime above it.

pub mod catalog;
#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub use catalog::{InMemoryPortCatalog, PortCatalog, PortFilter, PortInfo, PortKind};
use scopehost_wire::framer::{encode_frame, Framer, ParseEvent};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Data bits per character, mirroring what a UART actually supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

/// Parameters passed to [`SerialPort::open`]-shaped collaborators. The core
/// never opens a port itself (spec.md §6 keeps port enumeration/open out of
/// scope); this is just the shape a real opener is handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialConfig {
    pub baud: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub read_timeout_ms: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud: 115_200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            read_timeout_ms: 200,
        }
    }
}

/// The only serial-facing surface the core consumes (spec.md §6). A real
/// implementation wraps an OS serial handle; the core never interprets its
/// bits, never enumerates ports, and never opens one itself.
pub trait SerialPort: Send {
    /// Writes `bytes` in one call. A short write is a bug in the
    /// implementation, not something the core retries around.
    fn write(&mut self, bytes: &[u8]) -> impl Future<Output = std::io::Result<()>> + Send;

    /// Reads whatever is available into `buf`, returning immediately with
    /// zero once `deadline` passes rather than blocking past it. Zero means
    /// "nothing arrived before the deadline", not EOF.
    fn read(
        &mut self,
        buf: &mut [u8],
        deadline: Instant,
    ) -> impl Future<Output = std::io::Result<usize>> + Send;

    /// Discards any bytes currently buffered but not yet read.
    fn flush_input(&mut self) -> impl Future<Output = std::io::Result<()>> + Send;
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("frame failed CRC check")]
    CrcMismatch,
    #[error("port is busy")]
    PortBusy,
    #[error("device disconnected")]
    Disconnected,
    #[error("serial handle is no longer valid")]
    InvalidHandle,
    #[error("serial I/O error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::IoError(err.to_string())
    }
}

/// A raw response frame: `TYPE || INNER`, handed back to the caller so it
/// can dispatch to the matching decoder in [`scopehost_wire::codec`].
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub msg_type: u8,
    pub payload: Vec<u8>,
}

/// One round trip over a single [`SerialPort`]. Holds the framer so partial
/// reads and stray bytes between requests carry over correctly.
pub struct Transport<S: SerialPort> {
    port: S,
    framer: Framer,
    request_timeout: Duration,
    read_chunk: usize,
}

impl<S: SerialPort> Transport<S> {
    pub fn new(port: S, request_timeout: Duration) -> Self {
        Self {
            port,
            framer: Framer::new(),
            request_timeout,
            read_chunk: 64,
        }
    }

    pub fn into_inner(self) -> S {
        self.port
    }

    /// Sends `(msg_type, payload)` as a frame and waits for either a frame
    /// of the same type or an `ERROR` frame, discarding everything else as
    /// stale/out-of-order traffic. See spec.md §4.4.
    pub async fn send_request(
        &mut self,
        msg_type: u8,
        payload: &[u8],
    ) -> Result<RawResponse, TransportError> {
        self.port.flush_input().await?;

        let frame = encode_frame(msg_type, payload)
            .map_err(|_| TransportError::IoError("payload too large to frame".into()))?;
        self.port.write(&frame).await?;

        let deadline = Instant::now() + self.request_timeout;
        let mut chunk = vec![0u8; self.read_chunk];
        loop {
            if Instant::now() >= deadline {
                return Err(TransportError::Timeout);
            }
            let n = self.port.read(&mut chunk, deadline).await?;
            if n == 0 {
                continue;
            }
            for event in self.framer.push_bytes(&chunk[..n]) {
                match event {
                    ParseEvent::CrcMismatch => return Err(TransportError::CrcMismatch),
                    ParseEvent::Frame { msg_type: got, payload }
                        if got == msg_type || got == scopehost_wire::model::MessageType::Error.as_u8() =>
                    {
                        return Ok(RawResponse { msg_type: got, payload });
                    }
                    ParseEvent::Frame { .. } => {
                        // Stale or out-of-order response; keep waiting.
                    }
                }
            }
        }
    }
}
