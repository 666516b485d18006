//! Latest-request-wins view state.
//!
//! Every resolution for a view slot takes a ticket carrying a per-slot
//! sequence number. A completion is applied only when its ticket is still the
//! newest one issued for the slot; older completions are dropped, so a slow
//! response for a previous path can never overwrite a newer one.

use std::{collections::HashMap, future::Future, hash::Hash};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{ResolveError, Result};

/// What a view slot currently shows.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewState<T> {
    Loading,
    Ready(T),
    Failed(ResolveError),
}

/// Handle for one in-flight resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket<K> {
    key: K,
    seq: u64,
}

impl<K> Ticket<K> {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

struct Slot<T> {
    latest: u64,
    /// `None` after invalidation until the next `begin`.
    state: Option<ViewState<T>>,
}

/// View slots keyed by `K`, each replaced atomically on completion.
pub struct Views<K, T> {
    slots: Mutex<HashMap<K, Slot<T>>>,
}

impl<K, T> Default for Views<K, T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, T> Views<K, T>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    T: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a resolution for `key`, superseding any in flight, and show
    /// `Loading` until it completes.
    pub fn begin(&self, key: K) -> Ticket<K> {
        let mut slots = self.slots.lock();
        let slot = slots.entry(key.clone()).or_insert(Slot {
            latest: 0,
            state: None,
        });
        slot.latest += 1;
        slot.state = Some(ViewState::Loading);
        Ticket {
            key,
            seq: slot.latest,
        }
    }

    /// Apply `result` if `ticket` is still current. Returns whether it was.
    pub fn complete(&self, ticket: Ticket<K>, result: Result<T>) -> bool {
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(&ticket.key) else {
            return false;
        };
        if slot.latest != ticket.seq {
            debug!(key = ?ticket.key, seq = ticket.seq, latest = slot.latest, "dropping stale result");
            return false;
        }
        slot.state = Some(match result {
            Ok(value) => ViewState::Ready(value),
            Err(err) => ViewState::Failed(err),
        });
        true
    }

    /// Begin, await `fut`, and complete in one step.
    pub async fn run<F>(&self, key: K, fut: F) -> bool
    where
        F: Future<Output = Result<T>>,
    {
        let ticket = self.begin(key);
        let result = fut.await;
        self.complete(ticket, result)
    }

    pub fn get(&self, key: &K) -> Option<ViewState<T>> {
        self.slots.lock().get(key).and_then(|s| s.state.clone())
    }

    /// Clear what `key` shows; completions still in flight for it are dropped.
    ///
    /// The sequence counter survives, so tickets issued before and after the
    /// invalidation never share a number.
    pub fn invalidate(&self, key: &K) {
        if let Some(slot) = self.slots.lock().get_mut(key) {
            slot.latest += 1;
            slot.state = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[test]
    fn newer_ticket_wins_regardless_of_completion_order() {
        let views: Views<&str, &str> = Views::new();
        let a = views.begin("file");
        let b = views.begin("file");
        assert!(views.complete(b, Ok("/b")));
        assert!(!views.complete(a, Ok("/a")));
        assert_eq!(views.get(&"file"), Some(ViewState::Ready("/b")));
    }

    #[test]
    fn in_order_completion_still_ends_on_latest() {
        let views: Views<&str, &str> = Views::new();
        let a = views.begin("file");
        let b = views.begin("file");
        assert!(!views.complete(a, Ok("/a")));
        assert_eq!(views.get(&"file"), Some(ViewState::Loading));
        assert!(views.complete(b, Ok("/b")));
        assert_eq!(views.get(&"file"), Some(ViewState::Ready("/b")));
    }

    #[test]
    fn slots_are_independent() {
        let views: Views<&str, u32> = Views::new();
        let x = views.begin("x");
        let y = views.begin("y");
        assert!(views.complete(y, Err(ResolveError::RepositoryNotFound)));
        assert!(views.complete(x, Ok(1)));
        assert_eq!(views.get(&"x"), Some(ViewState::Ready(1)));
        assert_eq!(
            views.get(&"y"),
            Some(ViewState::Failed(ResolveError::RepositoryNotFound))
        );
    }

    #[test]
    fn invalidated_slot_ignores_late_results() {
        let views: Views<&str, u32> = Views::new();
        let t = views.begin("thread");
        views.invalidate(&"thread");
        assert!(!views.complete(t, Ok(3)));
        assert_eq!(views.get(&"thread"), None);
    }

    #[test]
    fn ticket_from_before_invalidation_loses_to_newer_one() {
        let views: Views<&str, &str> = Views::new();
        let stale = views.begin("thread");
        views.invalidate(&"thread");
        let fresh = views.begin("thread");
        assert_ne!(stale.seq(), fresh.seq());
        assert!(!views.complete(stale, Ok("old")));
        assert_eq!(views.get(&"thread"), Some(ViewState::Loading));
        assert!(views.complete(fresh, Ok("new")));
        assert_eq!(views.get(&"thread"), Some(ViewState::Ready("new")));
    }

    #[tokio::test]
    async fn concurrent_runs_settle_on_last_issued() {
        let views: Views<&str, &str> = Views::new();
        let (tx_a, rx_a) = oneshot::channel::<()>();
        let (tx_b, rx_b) = oneshot::channel::<()>();

        let run_a = views.run("file", async move {
            rx_a.await.ok();
            Ok("/a")
        });
        let run_b = async {
            // Let `/a` take its ticket first.
            tokio::task::yield_now().await;
            views
                .run("file", async move {
                    rx_b.await.ok();
                    Ok("/b")
                })
                .await
        };
        let release = async move {
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            tx_b.send(()).ok();
            tokio::task::yield_now().await;
            tx_a.send(()).ok();
        };
        let (applied_a, applied_b, ()) = tokio::join!(run_a, run_b, release);
        assert!(!applied_a);
        assert!(applied_b);
        assert_eq!(views.get(&"file"), Some(ViewState::Ready("/b")));
    }
}
