//! Background pipeline queue.
//!
//! A bounded channel feeding a fixed pool of workers. A document id is held
//! at most once in the queue; enqueuing a document while a worker is running
//! it makes that worker run it once more before taking new work. Workers
//! never send on the channel themselves. Delivery is at-least-once, which the
//! idempotent stage handlers absorb.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use uuid::Uuid;

use covenant_utils::{log_error, CovenantError, CovenantResult};

use crate::pipeline::DocumentPipeline;

#[derive(Default)]
struct QueueState {
    queued: HashSet<Uuid>,
    running: HashSet<Uuid>,
    rerun: HashSet<Uuid>,
}

impl QueueState {
    fn is_idle(&self) -> bool {
        self.queued.is_empty() && self.running.is_empty()
    }
}

struct Shared {
    sender: mpsc::Sender<Uuid>,
    receiver: Mutex<mpsc::Receiver<Uuid>>,
    state: Mutex<QueueState>,
    idle: Notify,
}

enum Admission {
    Queued,
    Folded,
}

impl Shared {
    async fn admit(&self, document_id: Uuid) -> Admission {
        let mut state = self.state.lock().await;
        if state.queued.contains(&document_id) {
            return Admission::Folded;
        }
        if state.running.contains(&document_id) {
            state.rerun.insert(document_id);
            return Admission::Folded;
        }
        state.queued.insert(document_id);
        Admission::Queued
    }

    async fn release(&self, document_id: Uuid) {
        let idle = {
            let mut state = self.state.lock().await;
            state.queued.remove(&document_id);
            state.is_idle()
        };
        if idle {
            self.idle.notify_waiters();
        }
    }
}

#[derive(Clone)]
pub struct PipelineQueue {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    workers: Arc<std::sync::Mutex<Vec<JoinHandle<()>>>>,
    capacity: usize,
}

impl PipelineQueue {
    /// Spawn `workers` tasks draining a channel of `capacity` ids.
    pub fn start(pipeline: DocumentPipeline, workers: usize, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let (shutdown, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            sender,
            receiver: Mutex::new(receiver),
            state: Mutex::new(QueueState::default()),
            idle: Notify::new(),
        });

        let handles = (0..workers.max(1))
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    pipeline.clone(),
                    shared.clone(),
                    shutdown.subscribe(),
                ))
            })
            .collect();

        tracing::info!(workers = workers.max(1), capacity, "Pipeline queue started");
        Self {
            shared,
            shutdown,
            workers: Arc::new(std::sync::Mutex::new(handles)),
            capacity,
        }
    }

    /// Schedule a run of `document_id` without waiting for room. Returns
    /// `false` when the id was already waiting or was folded into a rerun of
    /// an in-flight run, and a `QueueFull` error when the channel is full.
    pub async fn enqueue(&self, document_id: Uuid) -> CovenantResult<bool> {
        if let Admission::Folded = self.shared.admit(document_id).await {
            return Ok(false);
        }

        match self.shared.sender.try_send(document_id) {
            Ok(()) => {
                tracing::debug!(%document_id, "Document enqueued");
                Ok(true)
            }
            Err(e) => {
                self.shared.release(document_id).await;
                Err(match e {
                    mpsc::error::TrySendError::Full(_) => CovenantError::queue_full(self.capacity),
                    mpsc::error::TrySendError::Closed(_) => CovenantError::internal("pipeline queue is closed"),
                })
            }
        }
    }

    /// Like [`enqueue`](Self::enqueue) but waits for room in the channel.
    /// Used for startup recovery, where no caller is waiting on a reply.
    pub async fn enqueue_wait(&self, document_id: Uuid) -> CovenantResult<bool> {
        if let Admission::Folded = self.shared.admit(document_id).await {
            return Ok(false);
        }

        if self.shared.sender.send(document_id).await.is_err() {
            self.shared.release(document_id).await;
            return Err(CovenantError::internal("pipeline queue is closed"));
        }
        tracing::debug!(%document_id, "Document enqueued");
        Ok(true)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Resolves once nothing is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if self.shared.state.lock().await.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Stop taking work and wait for in-flight documents to finish.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let handles: Vec<JoinHandle<()>> = match self.workers.lock() {
            Ok(mut workers) => workers.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        for handle in handles {
            if let Err(e) = handle.await {
                log_error!(e, "Pipeline worker ended abnormally");
            }
        }
        tracing::info!("Pipeline queue stopped");
    }
}

async fn run_worker(
    worker: usize,
    pipeline: DocumentPipeline,
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let next = {
            let mut receiver = shared.receiver.lock().await;
            tokio::select! {
                id = receiver.recv() => id,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        None
                    } else {
                        continue;
                    }
                }
            }
        };
        let Some(document_id) = next else {
            break;
        };

        {
            let mut state = shared.state.lock().await;
            state.queued.remove(&document_id);
            state.running.insert(document_id);
        }

        loop {
            if let Err(e) = pipeline.process(document_id).await {
                log_error!(e, "Pipeline run aborted", %document_id, worker);
            }

            let mut state = shared.state.lock().await;
            if state.rerun.remove(&document_id) {
                tracing::debug!(%document_id, worker, "Rerunning document");
                continue;
            }
            state.running.remove(&document_id);
            break;
        }

        if shared.state.lock().await.is_idle() {
            shared.idle.notify_waiters();
        }
    }
    tracing::debug!(worker, "Pipeline worker exiting");
}
