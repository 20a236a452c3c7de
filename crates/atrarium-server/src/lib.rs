//! Atrarium server: ingestion wiring, the group-actor host, the retention
//! sweep, and the HTTP read surface.

pub mod api;
pub mod background;
pub mod config;
pub mod host;
pub mod ingest;

pub use api::app;
pub use host::{CreateChildParams, DispatchOutcome, GroupHost};
