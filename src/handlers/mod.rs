//! HTTP handlers.
//!
//! - `webhook`: axum router, webhook ingestion and metric read endpoints
//! - `signature`: HMAC verification of webhook bodies

pub mod signature;
pub mod webhook;


pub use signature::{SignatureError, SignatureVerifier, SIGNATURE_HEADER};
pub use webhook::{router, serve, AppState};
