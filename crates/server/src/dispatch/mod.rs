//! The admin email-dispatch pipeline: pacing, retries, batching and queueing.

pub mod batch;
pub mod queue;
pub mod rate_limiter;
pub mod retry;

pub use batch::{
    BatchDispatcher, BatchSettings, DeliveryStatus, DispatchResult, DispatchSummary, JobBuilder,
    Recipient, SendJob,
};
pub use queue::{QueueProcessor, QueueStatus, SendObserver, SendOutcome, Submission};
pub use rate_limiter::{RateLimitStatus, RateLimiter};
pub use retry::{Attempted, RetryError, RetryPolicy, send_email, send_with_retry};
