//! Abstract interfaces for survey-ingest components.
//!
//! These traits define the contracts for:
//! - Response storage (persistence plus in-transaction bucket folds)

pub mod response_store;

pub use response_store::{
    AppendOutcome, IngestLogEntry, ResponseStore, StorageError, StoredResponse,
};
