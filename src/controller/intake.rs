//! Inbound fragment event queue.
//!
//! Events are processed concurrently; nothing here serializes work per merge
//! key. Correctness under concurrency comes from the store's conditional writes.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::MergeOrchestrator;
use crate::domain::InboundFragmentEvent;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntakeError {
    #[error("intake queue is full")]
    QueueFull,
    #[error("intake queue is closed")]
    Closed,
}

/// Sending half of the intake queue, cloned into every producer
#[derive(Clone)]
pub struct EventIntake {
    tx: mpsc::Sender<InboundFragmentEvent>,
}

impl EventIntake {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<InboundFragmentEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueues without waiting; a full queue is reported back to the producer.
    pub fn submit(&self, event: InboundFragmentEvent) -> Result<(), IntakeError> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => IntakeError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => IntakeError::Closed,
        })
    }
}

/// Drains the queue until every sender is dropped, running each event's
/// pipeline on its own task.
pub async fn run_intake(orchestrator: Arc<MergeOrchestrator>, mut rx: mpsc::Receiver<InboundFragmentEvent>) {
    while let Some(event) = rx.recv().await {
        debug!(source_id = %event.source_id, raw_case_ref = %event.raw_case_ref, "fragment event dequeued");
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator.process_event(event).await;
        });
    }
    info!("fragment intake closed");
}
