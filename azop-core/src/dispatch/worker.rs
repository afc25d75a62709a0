//! Dispatch worker - pulls one request at a time and runs the engine on it.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::queue::WorkQueue;
use crate::engine::ReconcileEngine;
use crate::manager::ReconcileContext;
use crate::model::ResourceSpec;

/// Deadlines applied to each reconcile a worker runs.
#[derive(Debug, Clone, Copy)]
pub(super) struct Deadlines {
    pub request_timeout: Duration,
    pub call_timeout: Duration,
}

pub(super) async fn run<S: ResourceSpec>(
    worker: usize,
    engine: Arc<ReconcileEngine<S>>,
    queue: Arc<WorkQueue>,
    deadlines: Deadlines,
    cancel: CancellationToken,
) {
    debug!(worker, "worker started");

    while let Some(request) = queue.next().await {
        let ctx = ReconcileContext::new(
            deadlines.request_timeout,
            deadlines.call_timeout,
            cancel.child_token(),
        );
        debug!(
            worker,
            identity = %request.identity,
            generation = request.observed_generation,
            event = ?request.event,
            "reconciling"
        );

        let outcome = engine.reconcile(&ctx, &request).await;
        queue.done(&request.identity).await;

        if let Some(delay) = outcome.requeue_after {
            debug!(
                worker,
                identity = %request.identity,
                delay_ms = delay.as_millis() as u64,
                "requeue"
            );
            queue.add_after(request, delay);
        } else if let Some(kind) = outcome.terminal_error {
            info!(worker, identity = %request.identity, %kind, "reconcile ended with terminal error");
        }
    }

    debug!(worker, "worker stopped");
}
