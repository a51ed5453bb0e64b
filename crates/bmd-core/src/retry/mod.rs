//! Retry and backoff policy for fetch attempts.
//!
//! Every fetch failure is retryable; post-download processing never is. The
//! policy only decides whether another attempt happens and how long to wait.

mod policy;

pub use policy::{RetryDecision, RetryPolicy};
