//! Per-identity serialized work queue.
//!
//! An identity is in at most one of two places: waiting in `ready`, or handed
//! to a worker (`processing`). Requests arriving for a queued identity merge
//! into the pending one; requests arriving while it is processed are parked
//! and released by `done`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::model::{Identity, ReconcileRequest};

#[derive(Default)]
struct State {
    ready: VecDeque<Identity>,
    pending: HashMap<Identity, ReconcileRequest>,
    processing: HashSet<Identity>,
}

pub struct WorkQueue {
    state: Mutex<State>,
    notify: Notify,
    closed: CancellationToken,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            closed: CancellationToken::new(),
        }
    }

    /// Enqueue `request`, merging it with any pending request for the same identity.
    pub async fn add(&self, request: ReconcileRequest) {
        if self.closed.is_cancelled() {
            return;
        }
        let mut state = self.state.lock().await;
        let identity = request.identity.clone();

        if let Some(existing) = state.pending.get_mut(&identity) {
            trace!(identity = %identity, "merging duplicate request");
            existing.merge(request);
            return;
        }
        state.pending.insert(identity.clone(), request);
        if !state.processing.contains(&identity) {
            state.ready.push_back(identity);
            self.notify.notify_one();
        }
    }

    /// Enqueue `request` once `delay` has passed. Dropped if the queue shuts down first.
    pub fn add_after(self: &Arc<Self>, request: ReconcileRequest, delay: Duration) {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = queue.closed.cancelled() => {}
                _ = tokio::time::sleep(delay) => queue.add(request).await,
            }
        });
    }

    /// Wait for the next request. `None` once the queue is shut down.
    ///
    /// The identity stays reserved for the caller until it calls `done`.
    pub async fn next(&self) -> Option<ReconcileRequest> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.closed.is_cancelled() {
                return None;
            }
            {
                let mut state = self.state.lock().await;
                while let Some(identity) = state.ready.pop_front() {
                    if let Some(request) = state.pending.remove(&identity) {
                        state.processing.insert(identity);
                        return Some(request);
                    }
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = self.closed.cancelled() => return None,
            }
        }
    }

    /// Release `identity` after its reconcile finished.
    pub async fn done(&self, identity: &Identity) {
        let mut state = self.state.lock().await;
        state.processing.remove(identity);
        if state.pending.contains_key(identity) {
            state.ready.push_back(identity.clone());
            self.notify.notify_one();
        }
    }

    /// Stop handing out work. Parked and delayed requests are dropped.
    pub fn shutdown(&self) {
        self.closed.cancel();
        self.notify.notify_waiters();
    }

    pub fn is_shutdown(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Number of identities waiting for a worker, parked ones included.
    pub async fn len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn in_flight(&self) -> usize {
        self.state.lock().await.processing.len()
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}
