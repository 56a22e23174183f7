// SPDX-License-Identifier: Apache-2.0
//! The error-kind taxonomy shared by every engine (spec §7).
//!
//! Engines return `Result<T, EngineError>`; the transport boundary
//! (`theatreos-server`) is the only place that translates a kind into an
//! HTTP-style status code. Background drivers match on `EngineError` to
//! decide whether to retry on the next tick.

use thiserror::Error;

/// The typed failure surface every engine method can return.
///
/// Variants name *kinds*, not specific messages, per spec §7: callers branch
/// on the variant, not on string content.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Unknown id, value out of declared range, malformed input, or a
    /// magnitude over a declared budget (e.g. `max_change_per_hour`).
    #[error("validation error: {0}")]
    Validation(String),

    /// The referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An optimistic or state conflict: wrong object holder, gate state
    /// mismatch, or a duplicate unique key on a non-idempotent write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Caller lacks the required role or is not the resource's owner/member.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A wallet debit would drive the balance negative.
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    /// A per-author/per-actor cooldown has not yet elapsed.
    #[error("rate limited, retry after {retry_after}")]
    RateLimited {
        /// ISO-8601 instant at which the caller may retry.
        retry_after: String,
    },

    /// The caller's deadline was exceeded before the operation completed.
    #[error("timeout")]
    Timeout,

    /// An infrastructure fault. Safe to retry for idempotent operations.
    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    /// Whether retrying the same call (with the same idempotency key, where
    /// applicable) is safe.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Storage(_) | EngineError::Timeout)
    }

    /// Stable machine-readable kind name, for transport-boundary mapping and
    /// for logging without allocating a full `Display`.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation_error",
            EngineError::NotFound(_) => "not_found",
            EngineError::Conflict(_) => "conflict",
            EngineError::Forbidden(_) => "forbidden",
            EngineError::InsufficientFunds(_) => "insufficient_funds",
            EngineError::RateLimited { .. } => "rate_limited",
            EngineError::Timeout => "timeout",
            EngineError::Storage(_) => "storage_error",
        }
    }
}
