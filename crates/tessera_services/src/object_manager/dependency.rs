//! Sub-object dependency resolution
//!
//! Each generated namespace may name other namespaces it waits on. The table
//! is drained in rounds: every namespace whose dependencies are all resolved
//! is resolved in the current round. Whatever is left when a round resolves
//! nothing sits on a cycle.

use std::collections::BTreeMap;
use tessera_core::{Namespace, NamespaceSet, ObjectId};

#[derive(Debug, Default, Clone)]
pub struct DependencyTable {
    pending: BTreeMap<Namespace, NamespaceSet>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Namespaces that declared dependencies, in an order where each comes
    /// after everything it depends on. These get the ready notification.
    pub notify: Vec<Namespace>,
    /// Namespaces left unresolved because they depend on each other.
    pub cycle: Vec<Namespace>,
}

impl DependencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ns: Namespace, deps: impl IntoIterator<Item = Namespace>) {
        self.pending.insert(ns, deps.into_iter().collect());
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn resolve(mut self, oid: ObjectId) -> Resolution {
        let generated: NamespaceSet = self.pending.keys().copied().collect();
        let declared: NamespaceSet = self
            .pending
            .iter()
            .filter(|(_, deps)| !deps.is_empty())
            .map(|(ns, _)| *ns)
            .collect();

        for (ns, deps) in self.pending.iter_mut() {
            let unknown = deps.difference(generated);
            if !unknown.is_empty() {
                tracing::warn!(%oid, namespace = %ns, unknown = ?unknown, "dependency on namespace that was not generated");
                *deps = deps.intersection(generated);
            }
        }

        let mut resolution = Resolution::default();
        let mut resolved = NamespaceSet::EMPTY;
        loop {
            let ready: Vec<Namespace> = self
                .pending
                .iter()
                .filter(|(_, deps)| deps.is_subset_of(resolved))
                .map(|(ns, _)| *ns)
                .collect();
            if ready.is_empty() {
                break;
            }
            for ns in ready {
                self.pending.remove(&ns);
                resolved.insert(ns);
                if declared.contains(ns) {
                    resolution.notify.push(ns);
                }
            }
        }

        resolution.cycle = self.pending.into_keys().collect();
        resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OID: ObjectId = ObjectId::from_raw(1);

    #[test]
    fn dependents_come_after_their_dependencies() {
        let mut table = DependencyTable::new();
        table.insert(Namespace::INVENTORY, [Namespace::WORLD_MANAGER]);
        table.insert(Namespace::COMBAT, [Namespace::INVENTORY]);
        table.insert(Namespace::WORLD_MANAGER, []);

        let resolution = table.resolve(OID);
        assert_eq!(resolution.notify, vec![Namespace::INVENTORY, Namespace::COMBAT]);
        assert!(resolution.cycle.is_empty());
    }

    #[test]
    fn cycle_is_reported_not_followed() {
        let mut table = DependencyTable::new();
        table.insert(Namespace::INVENTORY, [Namespace::COMBAT]);
        table.insert(Namespace::COMBAT, [Namespace::INVENTORY]);
        table.insert(Namespace::VOICE, [Namespace::WORLD_MANAGER]);
        table.insert(Namespace::WORLD_MANAGER, []);

        let resolution = table.resolve(OID);
        assert_eq!(resolution.notify, vec![Namespace::VOICE]);
        assert_eq!(resolution.cycle, vec![Namespace::INVENTORY, Namespace::COMBAT]);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut table = DependencyTable::new();
        table.insert(Namespace::VOICE, [Namespace::VOICE]);
        assert_eq!(table.resolve(OID).cycle, vec![Namespace::VOICE]);
    }

    #[test]
    fn missing_namespaces_count_as_satisfied() {
        let mut table = DependencyTable::new();
        table.insert(Namespace::INVENTORY, [Namespace::COMBAT]);
        let resolution = table.resolve(OID);
        assert_eq!(resolution.notify, vec![Namespace::INVENTORY]);
        assert!(resolution.cycle.is_empty());
    }
}
