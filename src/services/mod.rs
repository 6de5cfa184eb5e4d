//! Pipeline services.

pub mod ingest;
pub mod replay;

pub use ingest::{IngestError, IngestOutcome, IngestService};
pub use replay::{verify_buckets, BucketMismatch, DriftReport};
