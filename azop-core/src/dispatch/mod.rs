//! Dispatch loop: delivery queue plus a bounded pool of workers.
//!
//! Workers pull from the queue instead of being called back per event, which
//! keeps scheduling, backoff and cancellation in one place.

mod queue;
mod worker;

pub use queue::WorkQueue;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::engine::ReconcileEngine;
use crate::error::StoreResult;
use crate::model::{ReconcileRequest, ResourceSpec};
use crate::store::{RecordStore, StoreEvent};
use worker::Deadlines;

pub struct Dispatcher<S: ResourceSpec> {
    engine: Arc<ReconcileEngine<S>>,
    store: Arc<dyn RecordStore<S>>,
    queue: Arc<WorkQueue>,
    workers: usize,
    deadlines: Deadlines,
    resync_interval: Duration,
    cancel: CancellationToken,
}

impl<S: ResourceSpec> Dispatcher<S> {
    pub fn new(
        engine: Arc<ReconcileEngine<S>>,
        store: Arc<dyn RecordStore<S>>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            engine,
            store,
            queue: Arc::new(WorkQueue::new()),
            workers: config.workers.max(1),
            deadlines: Deadlines {
                request_timeout: config.request_timeout,
                call_timeout: config.call_timeout,
            },
            resync_interval: config.resync_interval,
            cancel: CancellationToken::new(),
        }
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    /// Token that stops the dispatcher and cancels in-flight reconciles.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn enqueue(&self, request: ReconcileRequest) {
        self.queue.add(request).await;
    }

    /// Enqueue every record in the store at its current generation.
    pub async fn resync(&self) -> StoreResult<usize> {
        let records = self.store.list().await?;
        let count = records.len();
        for record in records {
            let request = if record.deletion_requested {
                ReconcileRequest::delete(record.identity, record.generation)
            } else {
                ReconcileRequest::upsert(record.identity, record.generation)
            };
            self.queue.add(request).await;
        }
        debug!(count, "resync enqueued records");
        Ok(count)
    }

    /// Enqueue the request a store change calls for, if any.
    pub async fn watch(&self, event: &StoreEvent) {
        if let Some(request) = event.to_request() {
            self.queue.add(request).await;
        }
    }

    /// Run workers, the event watch and the periodic resync until shutdown.
    pub async fn run(&self, mut events: broadcast::Receiver<StoreEvent>) {
        info!(workers = self.workers, "dispatcher starting");

        let mut tasks = JoinSet::new();
        for n in 0..self.workers {
            tasks.spawn(worker::run(
                n,
                self.engine.clone(),
                self.queue.clone(),
                self.deadlines,
                self.cancel.clone(),
            ));
        }

        let mut resync = interval(self.resync_interval);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut watching = true;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = resync.tick() => {
                    if let Err(e) = self.resync().await {
                        warn!("resync failed: {e}");
                    }
                }
                event = events.recv(), if watching => match event {
                    Ok(event) => self.watch(&event).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "event stream lagged; resyncing");
                        if let Err(e) = self.resync().await {
                            warn!("resync failed: {e}");
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("event stream closed; relying on periodic resync");
                        watching = false;
                    }
                },
            }
        }

        info!("dispatcher shutting down");
        self.queue.shutdown();
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                error!("worker task failed: {e}");
            }
        }
        info!("dispatcher stopped");
    }

    /// Stop workers. In-flight reconciles are cancelled and leave status as is.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}
