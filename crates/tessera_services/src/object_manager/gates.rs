//! Per-object load admission
//!
//! At most one load of an id runs at a time. The lock here only guards the
//! in-flight table; it is never held while a load talks to plugins. A load
//! arriving for an id already in flight waits for it to finish, unless it
//! comes from the same call chain as the running load (a plugin loading its
//! own object back), in which case it is turned away at once.

use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use tessera_bus::ChainId;
use tessera_core::ObjectId;

#[derive(Default)]
pub struct LoadGates {
    in_flight: Mutex<HashMap<ObjectId, ChainId>>,
    finished: Condvar,
}

pub enum Admission<'a> {
    Claimed(LoadClaim<'a>),
    /// The caller's own chain is already loading this id.
    Reentrant,
}

impl LoadGates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `oid` for the calling chain, waiting out loads from other
    /// chains.
    pub fn admit(&self, oid: ObjectId) -> Admission<'_> {
        let chain = ChainId::current();
        let mut in_flight = self.in_flight.lock();
        loop {
            match in_flight.get(&oid) {
                None => {
                    in_flight.insert(oid, chain);
                    return Admission::Claimed(LoadClaim { gates: self, oid });
                }
                Some(owner) if *owner == chain => return Admission::Reentrant,
                Some(_) => self.finished.wait(&mut in_flight),
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }
}

/// Held by the one load running for an id.
pub struct LoadClaim<'a> {
    gates: &'a LoadGates,
    oid: ObjectId,
}

impl Drop for LoadClaim<'_> {
    fn drop(&mut self) {
        self.gates.in_flight.lock().remove(&self.oid);
        self.gates.finished.notify_all();
    }
}
