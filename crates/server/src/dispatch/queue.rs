//! In-memory queue behind the test-email endpoint.
//!
//! At most one send is in flight. A request arriving while the processor is busy is
//! parked in the queue and the caller gets its position back instead of a result.
//! Queued messages are drained in FIFO order by a background task and are lost if
//! the process stops.
//!
//! Sends run on their own tasks, so a caller that goes away mid-send neither cancels
//! the delivery nor leaves the processor stuck in the busy state.

use crate::dispatch::retry::{Attempted, RetryError, RetryPolicy, send_email};
use crate::email::{EmailProvider, OutgoingEmail, SendReceipt};
use crate::error::SendError;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use utoipa::ToSchema;

/// Terminal outcome of one send, retries included.
pub type SendOutcome = Result<Attempted<SendReceipt>, RetryError<SendError>>;

#[derive(Debug)]
pub enum Submission {
    /// Sent right away; the terminal outcome of that send.
    Completed(SendOutcome),
    /// Parked behind an in-flight send. Position is 1-based.
    Queued { position: usize },
}

/// Notified once per message when its send reaches a terminal outcome, whether it
/// went out immediately or from the queue.
#[async_trait]
pub trait SendObserver: Send + Sync {
    async fn completed(&self, email: &OutgoingEmail, outcome: &SendOutcome);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub processing: bool,
    pub queued: usize,
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<OutgoingEmail>,
    processing: bool,
}

pub struct QueueProcessor {
    state: Mutex<QueueState>,
    provider: Arc<dyn EmailProvider>,
    policy: RetryPolicy,
    observer: Option<Arc<dyn SendObserver>>,
}

/// Owns the busy flag of an immediate send. Dropping it returns the processor to
/// idle or starts the drain, even if the send task panicked.
struct InFlight(Arc<QueueProcessor>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.finish_or_drain();
    }
}

impl QueueProcessor {
    pub fn new(provider: Arc<dyn EmailProvider>, policy: RetryPolicy) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            provider,
            policy,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SendObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> QueueStatus {
        let state = self.lock();
        QueueStatus {
            processing: state.processing,
            queued: state.queue.len(),
        }
    }

    /// Sends `email` now when idle, otherwise queues it.
    #[tracing::instrument(skip_all, fields(to = %email.to))]
    pub async fn submit(self: &Arc<Self>, email: OutgoingEmail) -> Submission {
        {
            let mut state = self.lock();
            if state.processing || !state.queue.is_empty() {
                state.queue.push_back(email);
                let position = state.queue.len();
                tracing::info!(
                    name = "dispatch.queue.enqueued",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    position,
                    message = "Send in progress, message queued"
                );
                return Submission::Queued { position };
            }
            state.processing = true;
        }

        let in_flight = InFlight(Arc::clone(self));
        let task = tokio::spawn(async move {
            let outcome = in_flight.0.deliver(&email).await;
            drop(in_flight);
            outcome
        });

        match task.await {
            Ok(outcome) => Submission::Completed(outcome),
            Err(e) => {
                tracing::error!(
                    name = "dispatch.queue.task_failed",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    error = %e,
                    message = "Send task ended abnormally"
                );
                Submission::Completed(Err(RetryError::Failed {
                    attempts: 1,
                    error: SendError::Transport(format!("send task failed: {e}")),
                }))
            }
        }
    }

    async fn deliver(&self, email: &OutgoingEmail) -> SendOutcome {
        let outcome = send_email(self.provider.as_ref(), email, &self.policy).await;
        if let Some(observer) = &self.observer {
            observer.completed(email, &outcome).await;
        }
        outcome
    }

    /// Returns to idle, or hands the backlog to a drain task.
    fn finish_or_drain(self: &Arc<Self>) {
        {
            let mut state = self.lock();
            if state.queue.is_empty() {
                state.processing = false;
                return;
            }
        }
        let this = Arc::clone(self);
        tokio::spawn(async move { this.drain().await });
    }

    async fn drain(&self) {
        loop {
            let next = {
                let mut state = self.lock();
                match state.queue.pop_front() {
                    Some(email) => email,
                    None => {
                        state.processing = false;
                        return;
                    }
                }
            };

            match self.deliver(&next).await {
                Ok(sent) => tracing::info!(
                    name = "dispatch.queue.sent",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    to = %next.to,
                    attempts = sent.attempts,
                    email_id = sent.value.id.as_deref().unwrap_or_default(),
                    message = "Queued message sent"
                ),
                Err(e) => tracing::error!(
                    name = "dispatch.queue.failed",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    to = %next.to,
                    attempts = e.attempts(),
                    error = %e,
                    message = "Queued message failed"
                ),
            }
        }
    }
}
