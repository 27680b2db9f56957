//! Retry engine
//!
//! Bounded work queue drained by a fixed pool of workers. Each accepted event
//! runs through the state machine
//!
//! ```text
//! Pending → Attempting → Succeeded
//!                      → BackoffWait → Attempting (loop)
//!                      → Exhausted | Rejected
//! ```
//!
//! - `submit` never blocks: a full queue is reported to the caller
//! - Events sharing `(origin, record_id)` run one after another, in order;
//!   only the head of each key's lane occupies a worker
//! - `drain` closes intake and waits for all queued work
//! - `shutdown` additionally cancels backoff waits; those events end as
//!   `Cancelled` and are not counted as failures
//!
//! Outcomes are recorded in the [`MetricsRecorder`] and published on a
//! broadcast channel.

pub mod policy;
pub mod processor;
pub mod sequencer;

pub use policy::RetryPolicy;
pub use processor::{
    AttemptHandler, ChangeProcessor, ProcessingAction, ProcessingError, ProcessingReport, Verification,
};
pub use sequencer::{Admission, KeySequencer, SequenceKey};

use chrono::{DateTime, Utc};
use hms_common::config::WebhookConfig;
use hms_common::{EventType, MetricsRecorder, SourceIdentity, WebhookEvent};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Buffered outcomes per slow observer before it starts lagging
const OUTCOME_CHANNEL_CAPACITY: usize = 256;

/// Engine sizing and retry policy
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub policy: RetryPolicy,
    pub workers: usize,
    pub queue_capacity: usize,
}

impl EngineSettings {
    pub fn from_config(config: &WebhookConfig) -> Self {
        Self {
            policy: RetryPolicy::from_config(config),
            workers: config.workers.max(1),
            queue_capacity: config.queue_capacity.max(1),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&WebhookConfig::default())
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Processing queue is full")]
    QueueFull,

    #[error("Engine is shutting down")]
    ShuttingDown,
}

/// State of one attempt
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Pending,
    Success,
    TransientFailure(String),
    PermanentFailure(String),
}

/// One scheduled attempt; owned by the worker running the event
#[derive(Debug, Clone)]
pub struct ProcessingAttempt {
    pub event: Arc<WebhookEvent>,
    pub attempt_number: u32,
    pub scheduled_at: Instant,
    pub outcome: AttemptOutcome,
}

impl ProcessingAttempt {
    fn first(event: Arc<WebhookEvent>) -> Self {
        Self {
            event,
            attempt_number: 1,
            scheduled_at: Instant::now(),
            outcome: AttemptOutcome::Pending,
        }
    }

    fn retry(&self, delay: std::time::Duration) -> Self {
        Self {
            event: Arc::clone(&self.event),
            attempt_number: self.attempt_number + 1,
            scheduled_at: Instant::now() + delay,
            outcome: AttemptOutcome::Pending,
        }
    }
}

/// Terminal state of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded,
    /// Every allowed attempt failed transiently
    Exhausted,
    /// Permanent failure; not retried
    Rejected,
    /// Stopped by shutdown before finishing
    Cancelled,
}

/// Published once per event
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingOutcome {
    pub event_id: Uuid,
    pub idempotency_key: String,
    pub origin: SourceIdentity,
    pub record_id: String,
    pub event_type: EventType,
    pub status: OutcomeStatus,
    /// Attempts actually started
    pub attempts: u32,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ProcessingReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

/// Intake side of the pool, guarded as one unit so lane order and queue
/// order always agree
struct Dispatch {
    sender: Option<mpsc::UnboundedSender<Arc<WebhookEvent>>>,
    sequencer: KeySequencer<Arc<WebhookEvent>>,
}

type SharedDispatch = Arc<Mutex<Dispatch>>;

fn lock(dispatch: &SharedDispatch) -> MutexGuard<'_, Dispatch> {
    dispatch.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// State shared by all workers
struct WorkerContext {
    handler: Arc<dyn AttemptHandler>,
    metrics: Arc<MetricsRecorder>,
    policy: RetryPolicy,
    cancel: CancellationToken,
    outcomes: broadcast::Sender<ProcessingOutcome>,
}

pub struct RetryEngine {
    dispatch: SharedDispatch,
    workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
    outcomes: broadcast::Sender<ProcessingOutcome>,
    settings: EngineSettings,
}

impl RetryEngine {
    /// Spawn the worker pool; must be called inside a Tokio runtime
    pub fn start(
        settings: EngineSettings,
        handler: Arc<dyn AttemptHandler>,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        // Unbounded here; admission is bounded by the sequencer's capacity
        let (sender, receiver) = mpsc::unbounded_channel();
        let dispatch = Arc::new(Mutex::new(Dispatch {
            sender: Some(sender),
            sequencer: KeySequencer::new(settings.queue_capacity),
        }));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let (outcomes, _) = broadcast::channel(OUTCOME_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let context = Arc::new(WorkerContext {
            handler,
            metrics,
            policy: settings.policy,
            cancel: cancel.clone(),
            outcomes: outcomes.clone(),
        });

        let workers = (0..settings.workers)
            .map(|worker_id| {
                let receiver = Arc::clone(&receiver);
                let context = Arc::clone(&context);
                let dispatch = Arc::clone(&dispatch);
                tokio::spawn(async move {
                    loop {
                        // Lock only while waiting for the next event
                        let event = receiver.lock().await.recv().await;
                        let Some(event) = event else { break };
                        lock(&dispatch).sequencer.started();

                        // Work through the key's lane; followers never wait in the pool
                        let mut next = Some(event);
                        while let Some(event) = next {
                            run_event(&context, Arc::clone(&event)).await;
                            next = lock(&dispatch).sequencer.finished(&event.serialization_key());
                        }
                    }
                    tracing::debug!(worker_id, "Retry worker stopped");
                })
            })
            .collect();

        tracing::info!(
            workers = settings.workers,
            queue_capacity = settings.queue_capacity,
            max_attempts = settings.policy.max_attempts(),
            base_delay_ms = settings.policy.base_delay().as_millis() as u64,
            "Retry engine started"
        );

        Self {
            dispatch,
            workers: tokio::sync::Mutex::new(workers),
            cancel,
            outcomes,
            settings,
        }
    }

    /// Hand an event to the worker pool without waiting
    pub fn submit(&self, event: WebhookEvent) -> Result<Arc<WebhookEvent>, SubmitError> {
        let mut dispatch = lock(&self.dispatch);
        if dispatch.sender.is_none() || self.cancel.is_cancelled() {
            return Err(SubmitError::ShuttingDown);
        }

        let event = Arc::new(event);
        let admission = dispatch
            .sequencer
            .admit(event.serialization_key(), Arc::clone(&event))
            .ok_or(SubmitError::QueueFull)?;

        let parked = match admission {
            Admission::Dispatch(ready) => {
                let sent = dispatch.sender.as_ref().map(|sender| sender.send(ready));
                if !matches!(sent, Some(Ok(()))) {
                    // Workers are gone; undo the admission
                    dispatch.sequencer.started();
                    dispatch.sequencer.finished(&event.serialization_key());
                    return Err(SubmitError::ShuttingDown);
                }
                false
            }
            Admission::Parked => true,
        };

        tracing::debug!(
            event_id = %event.event_id,
            origin = %event.origin,
            record_id = %event.record_id,
            event_type = %event.event_type,
            parked,
            "Event queued"
        );
        Ok(event)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProcessingOutcome> {
        self.outcomes.subscribe()
    }

    /// Accepted events no worker has started yet
    pub fn queue_depth(&self) -> usize {
        lock(&self.dispatch).sequencer.depth()
    }

    pub fn is_accepting(&self) -> bool {
        lock(&self.dispatch).sender.is_some() && !self.cancel.is_cancelled()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Stop accepting events and wait for every queued event to finish
    pub async fn drain(&self) {
        self.close_intake();
        let workers = std::mem::take(&mut *self.workers.lock().await);
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Retry worker panicked");
            }
        }
        tracing::info!("Retry engine drained");
    }

    /// Stop accepting events, cancel pending backoff waits, join workers
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.drain().await;
    }

    fn close_intake(&self) {
        if lock(&self.dispatch).sender.take().is_some() {
            tracing::info!("Retry engine closed to new events");
        }
    }
}

async fn run_event(context: &WorkerContext, event: Arc<WebhookEvent>) {
    let started = Instant::now();
    let mut attempt = ProcessingAttempt::first(Arc::clone(&event));
    let mut attempts_started = 0;

    let (status, report, error) = loop {
        if context.cancel.is_cancelled() {
            break (OutcomeStatus::Cancelled, None, None);
        }

        attempts_started += 1;
        if attempt.attempt_number > 1 {
            context.metrics.record_retry();
        }

        match context.handler.handle(&event, attempt.attempt_number).await {
            Ok(report) => {
                attempt.outcome = AttemptOutcome::Success;
                context
                    .metrics
                    .record_success(started.elapsed(), event.event_type, &event.origin);
                break (OutcomeStatus::Succeeded, Some(report), None);
            }
            Err(ProcessingError::Permanent(message)) => {
                attempt.outcome = AttemptOutcome::PermanentFailure(message.clone());
                tracing::error!(
                    event_id = %event.event_id,
                    origin = %event.origin,
                    record_id = %event.record_id,
                    attempt = attempt.attempt_number,
                    error = %message,
                    "Event rejected, not retrying"
                );
                context.metrics.record_failure(event.event_type, &event.origin);
                break (OutcomeStatus::Rejected, None, Some(message));
            }
            Err(ProcessingError::Transient(message)) => {
                attempt.outcome = AttemptOutcome::TransientFailure(message.clone());
                if !context.policy.allows_retry_after(attempt.attempt_number) {
                    tracing::error!(
                        event_id = %event.event_id,
                        origin = %event.origin,
                        record_id = %event.record_id,
                        attempts = attempt.attempt_number,
                        error = %message,
                        "Event processing exhausted retries"
                    );
                    context.metrics.record_failure(event.event_type, &event.origin);
                    break (OutcomeStatus::Exhausted, None, Some(message));
                }

                let delay = context.policy.delay_after(attempt.attempt_number);
                tracing::warn!(
                    event_id = %event.event_id,
                    origin = %event.origin,
                    record_id = %event.record_id,
                    attempt = attempt.attempt_number,
                    max_attempts = context.policy.max_attempts(),
                    backoff_ms = delay.as_millis() as u64,
                    error = %message,
                    "Event processing failed, retrying"
                );
                attempt = attempt.retry(delay);

                tokio::select! {
                    _ = context.cancel.cancelled() => {
                        break (OutcomeStatus::Cancelled, None, Some(message));
                    }
                    _ = tokio::time::sleep_until(attempt.scheduled_at) => {}
                }
            }
        }
    };

    let elapsed = started.elapsed();
    if status == OutcomeStatus::Succeeded {
        tracing::info!(
            event_id = %event.event_id,
            origin = %event.origin,
            record_id = %event.record_id,
            event_type = %event.event_type,
            attempts = attempts_started,
            elapsed_ms = elapsed.as_millis() as u64,
            "Event processed"
        );
    } else if status == OutcomeStatus::Cancelled {
        tracing::info!(event_id = %event.event_id, "Event processing cancelled by shutdown");
    }

    let outcome = ProcessingOutcome {
        event_id: event.event_id,
        idempotency_key: event.idempotency_key(),
        origin: event.origin.clone(),
        record_id: event.record_id.clone(),
        event_type: event.event_type,
        status,
        attempts: attempts_started,
        elapsed_ms: elapsed.as_millis() as u64,
        report,
        error,
        finished_at: Utc::now(),
    };
    // No subscribers is fine
    let _ = context.outcomes.send(outcome);
}
