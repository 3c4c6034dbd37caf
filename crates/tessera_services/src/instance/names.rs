//! Unique instance-name reservation

use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;

/// Names currently being created, with waiters parked on a condvar.
#[derive(Default)]
pub struct NameReservations {
    pending: Mutex<HashSet<String>>,
    released: Condvar,
}

impl NameReservations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until nobody else is creating `name`, then run `exists`. When it
    /// reports no existing instance the name is reserved until the returned
    /// guard drops. Returns `None` when the name is already taken.
    pub fn reserve<F>(&self, name: &str, exists: F) -> Option<NameReservation<'_>>
    where
        F: FnOnce() -> bool,
    {
        let mut pending = self.pending.lock();
        while pending.contains(name) {
            self.released.wait(&mut pending);
        }
        if exists() {
            return None;
        }
        pending.insert(name.to_string());
        Some(NameReservation {
            owner: self,
            name: name.to_string(),
        })
    }

    pub fn is_pending(&self, name: &str) -> bool {
        self.pending.lock().contains(name)
    }
}

/// Held for the duration of one create.
pub struct NameReservation<'a> {
    owner: &'a NameReservations,
    name: String,
}

impl NameReservation<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for NameReservation<'_> {
    fn drop(&mut self) {
        self.owner.pending.lock().remove(&self.name);
        self.owner.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn guard_releases_on_drop() {
        let names = NameReservations::new();
        let guard = names.reserve("Dungeon", || false).unwrap();
        assert_eq!(guard.name(), "Dungeon");
        assert!(names.is_pending("Dungeon"));
        drop(guard);
        assert!(!names.is_pending("Dungeon"));
    }

    #[test]
    fn existing_name_is_rejected() {
        let names = NameReservations::new();
        assert!(names.reserve("Town", || true).is_none());
        assert!(!names.is_pending("Town"));
    }

    #[test]
    fn second_caller_waits_then_sees_the_first() {
        let names = Arc::new(NameReservations::new());
        let created = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let names = names.clone();
                let created = created.clone();
                thread::spawn(move || {
                    let guard = names.reserve("Arena", || created.load(Ordering::SeqCst) > 0);
                    if guard.is_some() {
                        thread::sleep(Duration::from_millis(20));
                        created.fetch_add(1, Ordering::SeqCst);
                    }
                    guard.is_some()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }
}
