//! Wiring between the ingestion pipeline and the group host.

use std::path::Path;
use std::sync::Arc;

use atrarium_ingest::{parse_relay_event, route, IngestError, JsonlSource, RelayEvent};

use crate::host::{DispatchOutcome, GroupHost};

/// Parses and dispatches one batch of relay events.
///
/// Fire-and-forget per event: parsing drops malformed records silently,
/// dispatch tallies per-event outcomes, and nothing here aborts the batch.
pub async fn dispatch_events(host: &GroupHost, events: Vec<RelayEvent>) -> DispatchOutcome {
    let parsed = events.iter().flat_map(parse_relay_event).collect();
    host.dispatch(route(parsed)).await
}

/// Reads a JSONL relay dump and dispatches everything in it.
///
/// # Errors
///
/// Only source I/O failures surface; malformed events are dropped and
/// counted by the source itself.
pub async fn ingest_jsonl(
    host: Arc<GroupHost>,
    path: impl AsRef<Path>,
) -> Result<DispatchOutcome, IngestError> {
    let source = JsonlSource::new(path.as_ref());

    // The source read is blocking file I/O; collect off the async runtime.
    let events = tokio::task::spawn_blocking(move || {
        let mut events = Vec::new();
        let stats = source.read_events(|ev| events.push(ev))?;
        Ok::<_, IngestError>((events, stats))
    })
    .await
    .map_err(|e| IngestError::Io(std::io::Error::other(e)))?;

    let (events, stats) = events?;
    let outcome = dispatch_events(&host, events).await;

    tracing::info!(
        emitted = stats.emitted,
        indexed = outcome.indexed,
        aggregated = outcome.aggregated,
        configs = outcome.configs,
        memberships = outcome.memberships,
        skipped = outcome.skipped,
        failed = outcome.failed,
        "ingested jsonl dump"
    );

    Ok(outcome)
}
