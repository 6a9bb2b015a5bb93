//! `list_ports`, the other half of spec.md §6's transport collaborator
//! (`open`/`write`/`read`/`flush_input` are [`crate::SerialPort`] /
//! [`crate::Transport`]). Port enumeration itself is out of scope (spec.md
//! §1: "Port enumeration / OS-level serial open... the core consumes an
//! opaque handle") — this module only defines the shape the core is handed,
//! plus an in-memory double for tests and the demonstration binary.

use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PortKind {
    Usb,
    Bluetooth,
    Pci,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PortInfo {
    pub path: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial: Option<String>,
    pub kind: PortKind,
}

/// `vid`/`pid` narrow a `list_ports` call to a known device family; `None`
/// on either field matches anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortFilter {
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

impl PortFilter {
    fn matches(&self, info: &PortInfo) -> bool {
        self.vid.is_none_or(|vid| info.vid == Some(vid)) && self.pid.is_none_or(|pid| info.pid == Some(pid))
    }
}

/// The enumeration half of the transport collaborator. A real embedder
/// backs this with `serialport::available_ports` or similar OS glue; the
/// core only ever sees this trait.
pub trait PortCatalog: Send + Sync {
    fn list_ports(&self, filter: Option<&PortFilter>) -> Vec<PortInfo>;
}

/// Reference implementation over a fixed list, used by tests and
/// `scopehost-cli`'s simulated rig.
#[derive(Default)]
pub struct InMemoryPortCatalog {
    ports: Mutex<Vec<PortInfo>>,
}

impl InMemoryPortCatalog {
    pub fn new(ports: Vec<PortInfo>) -> Self {
        Self { ports: Mutex::new(ports) }
    }
}

impl PortCatalog for InMemoryPortCatalog {
    fn list_ports(&self, filter: Option<&PortFilter>) -> Vec<PortInfo> {
        self.ports
            .lock()
            .unwrap()
            .iter()
            .filter(|p| filter.is_none_or(|f| f.matches(p)))
            .cloned()
            .collect()
    }
}
