//! Coordinator-side instance bookkeeping
//!
//! One entry per tracked instance: its busy status and the objects currently
//! inside it. All mutation happens under a single directory lock; the status
//! check-and-set is what keeps load, unload and delete of one instance
//! mutually exclusive.

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tessera_core::{LifecycleError, LifecycleResult, ObjectId};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InstanceStatus {
    Ok,
    Loading,
    Unloading,
    Deleting,
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InstanceStatus::Ok => "ok",
            InstanceStatus::Loading => "loading",
            InstanceStatus::Unloading => "unloading",
            InstanceStatus::Deleting => "deleting",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceState {
    pub instance: ObjectId,
    pub status: InstanceStatus,
    pub content: BTreeSet<ObjectId>,
    /// The instance itself is gone but members (players) are still inside.
    retired: bool,
}

impl InstanceState {
    fn new(instance: ObjectId, status: InstanceStatus) -> Self {
        Self {
            instance,
            status,
            content: BTreeSet::new(),
            retired: false,
        }
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }
}

#[derive(Default)]
pub struct InstanceDirectory {
    states: Mutex<HashMap<ObjectId, InstanceState>>,
}

impl InstanceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `instance` if it is not tracked yet.
    pub fn ensure(&self, instance: ObjectId) {
        let mut states = self.states.lock();
        let state = states
            .entry(instance)
            .or_insert_with(|| InstanceState::new(instance, InstanceStatus::Ok));
        state.retired = false;
    }

    /// Move an idle instance into a busy status.
    ///
    /// `Loading` may start tracking an instance; `Unloading` and `Deleting`
    /// require an existing entry.
    pub fn begin(&self, instance: ObjectId, status: InstanceStatus) -> LifecycleResult<()> {
        let mut states = self.states.lock();
        match states.get_mut(&instance) {
            Some(state) if state.status == InstanceStatus::Ok => {
                state.status = status;
                state.retired = false;
                Ok(())
            }
            Some(state) => Err(LifecycleError::InstanceBusy {
                instance,
                status: state.status.to_string(),
            }),
            None if status == InstanceStatus::Loading => {
                states.insert(instance, InstanceState::new(instance, status));
                Ok(())
            }
            None => Err(LifecycleError::InstanceNotLoaded { instance }),
        }
    }

    /// Return a busy instance to `Ok`.
    pub fn finish(&self, instance: ObjectId) {
        if let Some(state) = self.states.lock().get_mut(&instance) {
            state.status = InstanceStatus::Ok;
        }
    }

    /// The instance master is gone: drop the entry, or keep it idle while
    /// members remain inside.
    pub fn retire(&self, instance: ObjectId) {
        let mut states = self.states.lock();
        let Some(state) = states.get_mut(&instance) else {
            return;
        };
        if state.content.is_empty() {
            states.remove(&instance);
        } else {
            state.status = InstanceStatus::Ok;
            state.retired = true;
            tracing::debug!(%instance, remaining = state.content.len(), "instance retired with members inside");
        }
    }

    pub fn status(&self, instance: ObjectId) -> Option<InstanceStatus> {
        self.states.lock().get(&instance).map(|s| s.status)
    }

    pub fn get(&self, instance: ObjectId) -> Option<InstanceState> {
        self.states.lock().get(&instance).cloned()
    }

    /// Add `oid` to the content of a tracked, live instance.
    pub fn add_content(&self, instance: ObjectId, oid: ObjectId) -> bool {
        match self.states.lock().get_mut(&instance) {
            Some(state) if !state.retired => {
                state.content.insert(oid);
                true
            }
            _ => false,
        }
    }

    pub fn remove_content(&self, instance: ObjectId, oid: ObjectId) -> bool {
        let mut states = self.states.lock();
        let Some(state) = states.get_mut(&instance) else {
            return false;
        };
        let removed = state.content.remove(&oid);
        if state.retired && state.content.is_empty() {
            states.remove(&instance);
        }
        removed
    }

    pub fn content(&self, instance: ObjectId) -> Vec<ObjectId> {
        self.states
            .lock()
            .get(&instance)
            .map(|s| s.content.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, instance: ObjectId, oid: ObjectId) -> bool {
        self.states
            .lock()
            .get(&instance)
            .is_some_and(|s| s.content.contains(&oid))
    }

    pub fn instances(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self.states.lock().keys().copied().collect();
        ids.sort();
        ids
    }
}
