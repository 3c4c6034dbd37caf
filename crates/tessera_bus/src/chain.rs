//! Call chains
//!
//! Every delivery runs under the [`ChainId`] of the thread that sent it, so
//! a handler that sends again stays on the sender's chain. Services use this
//! to tell a request that re-enters their own in-flight work from an
//! unrelated concurrent one.
//!
//! A thread outside any delivery is given a chain on first use and keeps it.

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CHAIN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: Cell<Option<ChainId>> = const { Cell::new(None) };
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ChainId(u64);

impl ChainId {
    /// Chain of the calling thread.
    pub fn current() -> ChainId {
        CURRENT.with(|current| match current.get() {
            Some(chain) => chain,
            None => {
                let chain = ChainId(NEXT_CHAIN.fetch_add(1, Ordering::Relaxed));
                current.set(Some(chain));
                chain
            }
        })
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chain#{}", self.0)
    }
}

struct Restore(Option<ChainId>);

impl Drop for Restore {
    fn drop(&mut self) {
        CURRENT.with(|current| current.set(self.0));
    }
}

/// Run `f` on `chain`, restoring the thread's previous chain afterwards.
pub(crate) fn within<R>(chain: ChainId, f: impl FnOnce() -> R) -> R {
    let _restore = Restore(CURRENT.with(|current| current.replace(Some(chain))));
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_is_stable_per_thread() {
        assert_eq!(ChainId::current(), ChainId::current());
        let other = std::thread::spawn(ChainId::current).join().unwrap();
        assert_ne!(other, ChainId::current());
    }

    #[test]
    fn within_restores_previous_chain() {
        let own = ChainId::current();
        let borrowed = std::thread::spawn(ChainId::current).join().unwrap();
        within(borrowed, || assert_eq!(ChainId::current(), borrowed));
        assert_eq!(ChainId::current(), own);
    }
}
