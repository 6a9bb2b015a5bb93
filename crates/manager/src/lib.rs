//! `DeviceManager`: the `path -> session` map. Connect/disconnect only;
//! everything about what a session can *do* lives in `scopehost-session`.

use scopehost_session::{DeviceSession, SessionError};
use scopehost_transport::{SerialConfig, SerialPort};
use scopehost_wire::model::DeviceInfo;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum ManagerError {
    /// Not returned by `connect` itself (a second connect on the same path
    /// returns the existing session per spec.md §4.6) — kept for embedders
    /// that want to assert exclusivity themselves.
    #[error("{0} is already connected")]
    AlreadyConnected(String),
    #[error("{0} is not connected")]
    NotConnected(String),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// The external collaborator that actually opens a port (spec.md §6 keeps
/// this out of scope for the core). `S` is whatever opaque handle type it
/// produces; the manager and everything above it only sees `SerialPort`.
pub trait PortOpener<S: SerialPort>: Send + Sync {
    fn open(
        &self,
        path: &str,
        config: SerialConfig,
    ) -> impl Future<Output = std::io::Result<S>> + Send;
}

/// One connected device, shared out of the manager. The session is behind a
/// `Mutex` so the runtime can dispatch concurrently across devices while
/// still enforcing "at most one outstanding operation per device" (spec.md
/// §5) through the lock itself rather than a separate queue.
pub struct ConnectedDevice<S: SerialPort> {
    pub path: String,
    pub info: DeviceInfo,
    pub session: Arc<Mutex<DeviceSession<S>>>,
}

// Manual `Clone` because deriving it would require `S: Clone`, which is not
// needed — the handle itself is never duplicated, only the `Arc` around it.
impl<S: SerialPort> Clone for ConnectedDevice<S> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            info: self.info.clone(),
            session: Arc::clone(&self.session),
        }
    }
}

pub struct DeviceManager<S: SerialPort, O: PortOpener<S>> {
    opener: O,
    request_timeout: Duration,
    sessions: Mutex<HashMap<String, ConnectedDevice<S>>>,
}

impl<S: SerialPort, O: PortOpener<S>> DeviceManager<S, O> {
    pub fn new(opener: O, request_timeout: Duration) -> Self {
        Self {
            opener,
            request_timeout,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Opens a session for `path`, or returns the existing one if already
    /// connected (spec.md §4.6: "second connect on the same path returns
    /// the existing session").
    pub async fn connect(
        &self,
        path: &str,
        config: SerialConfig,
    ) -> Result<ConnectedDevice<S>, ManagerError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(existing) = sessions.get(path) {
            return Ok(existing.clone());
        }
        let port = self
            .opener
            .open(path, config)
            .await
            .map_err(|e| ManagerError::Session(SessionError::Transport(e.into())))?;
        let session = DeviceSession::open(port, self.request_timeout).await?;
        let info = session.info().clone();
        let connected = ConnectedDevice {
            path: path.to_string(),
            info,
            session: Arc::new(Mutex::new(session)),
        };
        sessions.insert(path.to_string(), connected.clone());
        Ok(connected)
    }

    /// Best-effort: the session is simply dropped, releasing its handle.
    /// Errors while the last in-flight operation unwinds are swallowed, per
    /// spec.md §4.6.
    pub async fn disconnect(&self, path: &str) {
        self.sessions.lock().await.remove(path);
    }

    pub async fn disconnect_all(&self) {
        self.sessions.lock().await.clear();
    }

    pub async fn get_active(&self) -> Vec<ConnectedDevice<S>> {
        self.sessions.lock().await.values().cloned().collect()
    }

    pub async fn get(&self, path: &str) -> Option<ConnectedDevice<S>> {
        self.sessions.lock().await.get(path).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scopehost_transport::fake::FakeSerialPort;
    use scopehost_wire::framer::encode_frame;
    use scopehost_wire::model::MessageType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn get_info_frame() -> Vec<u8> {
        let payload = vec![
            0x02, 0x40, 0x00, 0x14, 0x00, 0x00, 0x00, 0x00, 0x04, 0x00, b'D', b'U', b'T', 0,
        ];
        encode_frame(MessageType::GetInfo.as_u8(), &payload).unwrap()
    }

    struct CountingOpener {
        opens: AtomicUsize,
    }

    impl PortOpener<FakeSerialPort> for CountingOpener {
        async fn open(&self, _path: &str, _config: SerialConfig) -> std::io::Result<FakeSerialPort> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(FakeSerialPort::scripted(vec![get_info_frame()]))
        }
    }

    #[tokio::test]
    async fn second_connect_on_same_path_reuses_session() {
        let manager = DeviceManager::new(CountingOpener { opens: AtomicUsize::new(0) }, Duration::from_millis(200));
        let a = manager.connect("/dev/ttyUSB0", SerialConfig::default()).await.unwrap();
        let b = manager.connect("/dev/ttyUSB0", SerialConfig::default()).await.unwrap();
        assert_eq!(manager.opener.opens.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a.session, &b.session));
    }

    #[tokio::test]
    async fn disconnect_removes_entry() {
        let manager = DeviceManager::new(CountingOpener { opens: AtomicUsize::new(0) }, Duration::from_millis(200));
        manager.connect("/dev/ttyUSB0", SerialConfig::default()).await.unwrap();
        manager.disconnect("/dev/ttyUSB0").await;
        assert!(manager.get("/dev/ttyUSB0").await.is_none());
    }

    #[tokio::test]
    async fn get_active_snapshots_all_connected() {
        let manager = DeviceManager::new(CountingOpener { opens: AtomicUsize::new(0) }, Duration::from_millis(200));
        manager.connect("/dev/ttyUSB0", SerialConfig::default()).await.unwrap();
        manager.connect("/dev/ttyUSB1", SerialConfig::default()).await.unwrap();
        let active = manager.get_active().await;
        assert_eq!(active.len(), 2);
    }
}
