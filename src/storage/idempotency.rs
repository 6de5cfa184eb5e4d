//! Idempotency guard.
//!
//! The `event_id` column carries a unique constraint; the first insert for an
//! event wins and every later one fails with a unique violation. The guard
//! turns that outcome into a [`Claim`], so detection is a single round trip
//! with no check-then-insert window.

use crate::interfaces::response_store::Result;
use crate::storage::helpers::is_unique_violation;

/// Result of attempting to claim an `event_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// This caller owns the event; proceed with the write.
    New,
    /// The event was already recorded.
    Duplicate,
}

/// Classify the result of the claiming insert.
pub fn claim<T>(inserted: std::result::Result<T, sqlx::Error>) -> Result<Claim> {
    match inserted {
        Ok(_) => Ok(Claim::New),
        Err(e) if is_unique_violation(&e) => Ok(Claim::Duplicate),
        Err(e) => Err(e.into()),
    }
}
