//! The saved-ports collaborator (spec.md §6): persistent key-value storage
//! of which ports the user has saved, owned entirely outside the core. The
//! core holds a read-only view plus command hooks to add/remove.

use scopehost_transport::SerialConfig;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct SavedPort {
    pub path: String,
    pub last_config: Option<SerialConfig>,
}

pub trait SavedPortsStore: Send + Sync {
    fn list(&self) -> Vec<SavedPort>;
    fn upsert(&self, ports: Vec<SavedPort>);
    fn remove(&self, paths: &[String]);
}

#[derive(Default)]
pub struct InMemorySavedPortsStore {
    ports: Mutex<Vec<SavedPort>>,
}

impl InMemorySavedPortsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SavedPortsStore for InMemorySavedPortsStore {
    fn list(&self) -> Vec<SavedPort> {
        self.ports.lock().unwrap().clone()
    }

    fn upsert(&self, ports: Vec<SavedPort>) {
        let mut guard = self.ports.lock().unwrap();
        for incoming in ports {
            match guard.iter_mut().find(|p| p.path == incoming.path) {
                Some(existing) => *existing = incoming,
                None => guard.push(incoming),
            }
        }
    }

    fn remove(&self, paths: &[String]) {
        self.ports.lock().unwrap().retain(|p| !paths.contains(&p.path));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_updates_existing_entry_in_place() {
        let store = InMemorySavedPortsStore::new();
        store.upsert(vec![SavedPort { path: "/dev/a".into(), last_config: None }]);
        store.upsert(vec![SavedPort {
            path: "/dev/a".into(),
            last_config: Some(SerialConfig::default()),
        }]);
        let ports = store.list();
        assert_eq!(ports.len(), 1);
        assert!(ports[0].last_config.is_some());
    }

    #[test]
    fn remove_drops_named_paths_only() {
        let store = InMemorySavedPortsStore::new();
        store.upsert(vec![
            SavedPort { path: "/dev/a".into(), last_config: None },
            SavedPort { path: "/dev/b".into(), last_config: None },
        ]);
        store.remove(&["/dev/a".to_string()]);
        assert_eq!(store.list(), vec![SavedPort { path: "/dev/b".into(), last_config: None }]);
    }
}
