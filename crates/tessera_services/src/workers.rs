//! Hosting-worker directory
//!
//! Workers register with a kind and the epoch of the server run that started
//! them, and periodically report how many entities they track. Instance
//! placement picks the least-loaded worker of the required kind among those
//! registered in the current epoch.

use parking_lot::RwLock;
use std::collections::HashMap;

pub const WORLD_MANAGER_KIND: &str = "world-manager";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRecord {
    pub name: String,
    pub kind: String,
    pub epoch: u64,
    pub tracked_entities: u64,
}

pub struct WorkerDirectory {
    epoch: u64,
    workers: RwLock<HashMap<String, WorkerRecord>>,
}

impl WorkerDirectory {
    pub fn new(epoch: u64) -> Self {
        Self {
            epoch,
            workers: RwLock::new(HashMap::new()),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn register(&self, name: impl Into<String>, kind: impl Into<String>, epoch: u64) {
        let name = name.into();
        let record = WorkerRecord {
            name: name.clone(),
            kind: kind.into(),
            epoch,
            tracked_entities: 0,
        };
        tracing::debug!(worker = %name, kind = %record.kind, epoch, "worker registered");
        self.workers.write().insert(name, record);
    }

    pub fn remove(&self, name: &str) -> bool {
        self.workers.write().remove(name).is_some()
    }

    /// Replace a worker's reported entity count.
    pub fn report(&self, name: &str, tracked_entities: u64) -> bool {
        match self.workers.write().get_mut(name) {
            Some(worker) => {
                worker.tracked_entities = tracked_entities;
                true
            }
            None => false,
        }
    }

    /// Adjust a worker's entity count by `delta`, saturating at zero.
    pub fn track(&self, name: &str, delta: i64) {
        if let Some(worker) = self.workers.write().get_mut(name) {
            worker.tracked_entities = worker.tracked_entities.saturating_add_signed(delta);
        }
    }

    pub fn get(&self, name: &str) -> Option<WorkerRecord> {
        self.workers.read().get(name).cloned()
    }

    /// Current-epoch worker of `kind` tracking the fewest entities.
    pub fn least_loaded(&self, kind: &str) -> Option<String> {
        self.workers
            .read()
            .values()
            .filter(|w| w.kind == kind && w.epoch == self.epoch)
            .min_by_key(|w| w.tracked_entities)
            .map(|w| w.name.clone())
    }

    /// True when `name` is a current-epoch worker of `kind`.
    pub fn is_live(&self, name: &str, kind: &str) -> bool {
        self.workers
            .read()
            .get(name)
            .is_some_and(|w| w.kind == kind && w.epoch == self.epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_loaded_ignores_stale_epochs_and_other_kinds() {
        let dir = WorkerDirectory::new(7);
        dir.register("old", WORLD_MANAGER_KIND, 6);
        dir.register("busy", WORLD_MANAGER_KIND, 7);
        dir.register("idle", WORLD_MANAGER_KIND, 7);
        dir.register("proxy", "proxy", 7);

        dir.report("busy", 40);
        dir.report("idle", 3);
        // The stale worker reports nothing but must never be picked
        assert_eq!(dir.least_loaded(WORLD_MANAGER_KIND).as_deref(), Some("idle"));

        dir.track("idle", 100);
        assert_eq!(dir.least_loaded(WORLD_MANAGER_KIND).as_deref(), Some("busy"));
        assert!(!dir.is_live("old", WORLD_MANAGER_KIND));
        assert!(dir.least_loaded("combat").is_none());
    }

    #[test]
    fn track_saturates_at_zero() {
        let dir = WorkerDirectory::new(1);
        dir.register("w", WORLD_MANAGER_KIND, 1);
        dir.track("w", -5);
        assert_eq!(dir.get("w").unwrap().tracked_entities, 0);
        assert!(dir.remove("w"));
        assert!(!dir.report("w", 1));
    }
}
