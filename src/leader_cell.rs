// src/leader_cell.rs

//! Atomic holder of the current cluster leader, paired with a one-shot
//! latch observers can wait on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::node::NodeDescriptor;

/// Holds `Option<Arc<NodeDescriptor<C>>>` behind a `parking_lot` lock,
/// plus a latch that is set exactly when the cell is non-`None`.
///
/// The latch is only ever flipped alongside a cell transition, never on
/// its own, so "latch set iff cell non-`None`" holds at every point the
/// cell is observed outside of an in-progress transition. All writes take
/// the lock only long enough to swap the slot; reads are a short read-lock.
pub struct LeaderCell<C> {
    slot: RwLock<Option<Arc<NodeDescriptor<C>>>>,
    known: AtomicBool,
    notify: Notify,
}

impl<C> Default for LeaderCell<C> {
    fn default() -> Self {
        Self {
            slot: RwLock::new(None),
            known: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }
}

impl<C> LeaderCell<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<NodeDescriptor<C>>> {
        self.slot.read().clone()
    }

    /// Unconditionally installs `node` as the known leader and raises the
    /// latch. Passing no node here is a caller error; use
    /// [`LeaderCell::compare_and_clear`] or [`LeaderCell::force_clear`] to
    /// clear the leader instead.
    pub fn set_known_leader(&self, node: Arc<NodeDescriptor<C>>) {
        *self.slot.write() = Some(node);
        self.known.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Atomically clears the cell iff it still holds `prev` (compared by
    /// `Arc` identity first, then by url equality). Returns `true` both
    /// when the clear happened and when the cell was already `None` —
    /// idempotent "clear if I still own this" semantics.
    pub fn compare_and_clear(&self, prev: &Arc<NodeDescriptor<C>>) -> bool {
        let mut slot = self.slot.write();
        match slot.as_ref() {
            None => true,
            Some(cur) if Arc::ptr_eq(cur, prev) || cur.url == prev.url => {
                *slot = None;
                self.known.store(false, Ordering::Release);
                self.notify.notify_waiters();
                true
            }
            Some(_) => false,
        }
    }

    /// Atomic CAS from `None` to `Some(node)`. Returns `true` iff this
    /// call performed the installation.
    pub fn set_if_nil(&self, node: Arc<NodeDescriptor<C>>, raise_latch: bool) -> bool {
        let mut slot = self.slot.write();
        if slot.is_some() {
            return false;
        }
        *slot = Some(node);
        if raise_latch {
            self.known.store(true, Ordering::Release);
            self.notify.notify_waiters();
        }
        true
    }

    /// Unconditionally clears the leader and resets the latch. Only meant
    /// to be used by the refresher during a controlled rediscovery pass.
    pub fn force_clear(&self) {
        *self.slot.write() = None;
        self.known.store(false, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_known(&self) -> bool {
        self.known.load(Ordering::Acquire)
    }

    /// Waits up to `timeout` for the latch to be set, or for `cancel` to
    /// fire. Uses the double-check-before-await pattern: construct the
    /// `notified()` future, re-check the flag, only then await it —
    /// otherwise a `notify_waiters()` that lands between the check and
    /// the await is lost forever.
    pub async fn await_leader(&self, timeout: Duration, cancel: &CancellationToken) -> bool {
        if self.is_known() {
            return true;
        }
        let notified = self.notify.notified();
        if self.is_known() {
            return true;
        }
        tokio::select! {
            _ = notified => self.is_known(),
            _ = tokio::time::sleep(timeout) => {
                trace!("timed out waiting for leader latch");
                self.is_known()
            }
            _ = cancel.cancelled() => {
                warn!("leader wait cancelled");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn latch_tracks_cell() {
        let cell: LeaderCell<()> = LeaderCell::new();
        assert!(!cell.is_known());
        let node = Arc::new(NodeDescriptor::new("http://a", ()));
        cell.set_known_leader(node.clone());
        assert!(cell.is_known());
        assert!(cell.compare_and_clear(&node));
        assert!(!cell.is_known());
        assert!(cell.get().is_none());
    }

    #[tokio::test]
    async fn set_if_nil_only_wins_once() {
        let cell: LeaderCell<()> = LeaderCell::new();
        let a = Arc::new(NodeDescriptor::new("http://a", ()));
        let b = Arc::new(NodeDescriptor::new("http://b", ()));
        assert!(cell.set_if_nil(a.clone(), true));
        assert!(!cell.set_if_nil(b, true));
        assert_eq!(cell.get().unwrap().url, "http://a");
    }

    #[tokio::test]
    async fn await_leader_returns_immediately_once_known() {
        let cell: LeaderCell<()> = LeaderCell::new();
        let node = Arc::new(NodeDescriptor::new("http://a", ()));
        cell.set_known_leader(node);
        let cancel = CancellationToken::new();
        let known = cell.await_leader(Duration::from_millis(50), &cancel).await;
        assert!(known);
    }

    #[tokio::test]
    async fn await_leader_times_out_when_unset() {
        let cell: LeaderCell<()> = LeaderCell::new();
        let cancel = CancellationToken::new();
        let known = cell.await_leader(Duration::from_millis(20), &cancel).await;
        assert!(!known);
    }
}
