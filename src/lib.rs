//! survey-ingest - Survey webhook ingestion
//!
//! Receives survey-platform webhook deliveries, stores each response exactly
//! once keyed by its `event_id`, and maintains CSAT/NPS metric buckets in the
//! same transaction as the response write.

#[cfg(not(any(feature = "sqlite", feature = "postgres")))]
compile_error!("survey-ingest needs at least one storage backend: enable `sqlite` or `postgres`");

pub mod aggregation;
pub mod config;
pub mod decoder;
pub mod handlers;
pub mod interfaces;
pub mod model;
pub mod services;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_utils;
