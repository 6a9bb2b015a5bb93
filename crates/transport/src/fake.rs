//! An in-memory [`SerialPort`] double. Not hardware — a deterministic stand-in
//! for the wire protocol so `scopehost-transport`, `-session`, `-manager` and
//! `-runtime` can all exercise real framing/codec logic without a real port.
//!
//! Grounded on the teacher's own pattern of driving `Firecracker`/
//! `FirecrackerApiClient` against a real (if disposable) process+socket:
//! since hardware can't be spawned for a test, this is the disposable double
//! that plays the same role.

use crate::SerialPort;
use std::collections::VecDeque;
use std::time::Instant;

type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

/// A fake serial port. Construct with [`FakeSerialPort::scripted`] to reply
/// to each write with the next canned frame regardless of its contents, or
/// with [`FakeSerialPort::with_responder`] to compute a response from the
/// request bytes — the latter is what simulates an actual device's state.
pub struct FakeSerialPort {
    incoming: VecDeque<u8>,
    pub written: Vec<u8>,
    responder: Option<Responder>,
}

impl FakeSerialPort {
    pub fn empty() -> Self {
        Self {
            incoming: VecDeque::new(),
            written: Vec::new(),
            responder: None,
        }
    }

    /// Each write consumes the next entry of `frames` (if any remain) and
    /// queues it as the response. Bytes arrive only after the write, just
    /// like a real device replying to a request it just received — so
    /// [`Transport`](crate::Transport)'s pre-request flush never races them.
    pub fn scripted(frames: Vec<Vec<u8>>) -> Self {
        let mut queue = VecDeque::from(frames);
        Self::empty().with_responder(move |_| queue.pop_front().unwrap_or_default())
    }

    /// Each write is handed to `responder`; its return value (typically one
    /// `encode_frame`'d response) is queued for the next reads.
    pub fn with_responder(
        mut self,
        responder: impl FnMut(&[u8]) -> Vec<u8> + Send + 'static,
    ) -> Self {
        self.responder = Some(Box::new(responder));
        self
    }

    pub fn push_incoming(&mut self, bytes: &[u8]) {
        self.incoming.extend(bytes.iter().copied());
    }
}

impl SerialPort for FakeSerialPort {
    async fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.written.extend_from_slice(bytes);
        if let Some(responder) = &mut self.responder {
            let response = responder(bytes);
            self.incoming.extend(response);
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8], _deadline: Instant) -> std::io::Result<usize> {
        if self.incoming.is_empty() {
            // A real port would block until data or the deadline; yield so a
            // spin-waiting caller doesn't starve the executor.
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            return Ok(0);
        }
        let n = buf.len().min(self.incoming.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.incoming.pop_front().expect("checked non-empty above");
        }
        Ok(n)
    }

    async fn flush_input(&mut self) -> std::io::Result<()> {
        self.incoming.clear();
        Ok(())
    }
}
