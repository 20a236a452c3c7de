//! Event filtering, parsing, and routing for the Atrarium ingestion
//! pipeline.
//!
//! The relay delivers a firehose of heterogeneous record mutations, at
//! least once and possibly out of order. This crate turns that stream into
//! typed per-group events in three stateless steps:
//!
//! 1. a *lightweight* substring filter over the raw serialized event — a
//!    throughput optimization, never a correctness gate;
//! 2. a *heavyweight* structural parse per record type into a closed
//!    [`GroupEvent`] enum — no partial or untyped record ever crosses this
//!    boundary;
//! 3. batch routing: post events grouped by target group id, config and
//!    membership events kept individual.
//!
//! Malformed records are dropped here, silently (a debug/warn log at most).
//! Dropping is an expected, frequent, non-exceptional outcome of ingestion
//! and never surfaces as an error to any caller.

mod event;
mod filter;
mod router;
mod source;

pub use event::{
    ConfigEvent, GroupEvent, MembershipEvent, PostEvent, RelayEvent, RelayOperation,
};
pub use filter::{extract_group_hashtags, parse_relay_event, passes_lightweight};
pub use router::{route, PostBatch, RoutedEvents};
pub use source::{JsonlSource, SourceStats};

/// Errors that can occur while reading from an event source.
///
/// Note that malformed *events* are not errors — they are skipped and
/// counted. Only I/O-level failures surface here.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Reading the underlying source failed.
    #[error("ingest i/o error: {0}")]
    Io(#[from] std::io::Error),
}
