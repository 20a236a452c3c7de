//! Two-stage event filter: cheap substring pre-filter, then a strict
//! structural parse per record type.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::LazyLock;

use atrarium_types::{collections, GroupId, GroupStage, MemberRole, FILTER_TOKEN};
use regex::Regex;

use crate::event::{
    ConfigEvent, GroupEvent, MembershipEvent, PostEvent, RelayEvent, RelayOperation,
};

// Compiled once. The trailing \b stops a 9th hex character from being
// silently truncated into a valid-looking id.
static GROUP_HASHTAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#atrarium_([0-9a-f]{8})\b").unwrap());

/// Lightweight filter: does the raw serialized event mention the group
/// token at all?
///
/// Purely a throughput optimization — callers must treat a `true` result
/// as "worth parsing", never as "valid". The heavyweight parse is the only
/// correctness gate.
pub fn passes_lightweight(raw: &str) -> bool {
    raw.contains(FILTER_TOKEN)
}

/// Extracts all distinct group ids referenced by `#atrarium_<8 hex>`
/// hashtags in free text, in sorted order.
pub fn extract_group_hashtags(text: &str) -> Vec<GroupId> {
    let mut ids = BTreeSet::new();
    for caps in GROUP_HASHTAG_RE.captures_iter(text) {
        if let Ok(id) = GroupId::new(&caps[1]) {
            ids.insert(id);
        }
    }
    ids.into_iter().collect()
}

/// Heavyweight parse: structurally validate one relay event into zero or
/// more typed [`GroupEvent`]s.
///
/// An empty result means the event was filtered or dropped. Drops are
/// final and silent (debug/warn logging at most) — malformed producer data
/// is an expected outcome of ingestion, not a processing failure, and must
/// never surface as an error.
pub fn parse_relay_event(event: &RelayEvent) -> Vec<GroupEvent> {
    match event.collection.as_str() {
        collections::GROUP_POST => parse_native_post(event),
        collections::BSKY_POST => parse_legacy_post(event),
        collections::GROUP_CONFIG => parse_config(event),
        collections::GROUP_MEMBERSHIP => parse_membership(event),
        _ => Vec::new(),
    }
}

fn parse_native_post(event: &RelayEvent) -> Vec<GroupEvent> {
    if event.operation == RelayOperation::Delete {
        // The index mutates only via moderation and retention.
        return Vec::new();
    }

    let Some(community) = event.record.get("community").and_then(|v| v.as_str()) else {
        tracing::debug!(uri = %event.uri(), "native post without community field, dropping");
        return Vec::new();
    };

    let group_id = match GroupId::new(community) {
        Ok(id) => id,
        Err(_) => {
            tracing::debug!(uri = %event.uri(), community, "malformed community id, dropping");
            return Vec::new();
        }
    };

    vec![GroupEvent::Post(PostEvent {
        uri: event.uri(),
        author_did: event.did.clone(),
        group_id,
        created_at_us: record_time_us(event.record.get("createdAt"), event.time_us),
    })]
}

fn parse_legacy_post(event: &RelayEvent) -> Vec<GroupEvent> {
    if event.operation == RelayOperation::Delete {
        return Vec::new();
    }

    let Some(text) = event.record.get("text").and_then(|v| v.as_str()) else {
        return Vec::new();
    };

    let created_at_us = record_time_us(event.record.get("createdAt"), event.time_us);
    let uri = event.uri();

    // One post may carry several distinct group hashtags; fan out once per
    // group after deduplication.
    extract_group_hashtags(text)
        .into_iter()
        .map(|group_id| {
            GroupEvent::Post(PostEvent {
                uri: uri.clone(),
                author_did: event.did.clone(),
                group_id,
                created_at_us,
            })
        })
        .collect()
}

fn parse_config(event: &RelayEvent) -> Vec<GroupEvent> {
    if event.operation == RelayOperation::Delete {
        return Vec::new();
    }

    // Config records are keyed by the group id itself.
    let group_id = match GroupId::new(event.rkey.as_str()) {
        Ok(id) => id,
        Err(_) => {
            tracing::warn!(uri = %event.uri(), rkey = %event.rkey, "config record key is not a group id, dropping");
            return Vec::new();
        }
    };

    let Some(stage) = event
        .record
        .get("stage")
        .and_then(|v| v.as_str())
        .and_then(|s| GroupStage::from_str(s).ok())
    else {
        tracing::debug!(group = %group_id, "config record without a valid stage, dropping");
        return Vec::new();
    };

    let parent_uri = event
        .record
        .get("parentGroup")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    // A parent reference is only meaningful on a theme-stage config. This
    // is malformed producer data, not a transient failure: reject the whole
    // event, log it, and move on.
    if parent_uri.is_some() && stage != GroupStage::Theme {
        tracing::warn!(
            group = %group_id,
            stage = %stage,
            "config carries a parentGroup at non-theme stage, rejecting"
        );
        return Vec::new();
    }

    // The parent reference is addressed by the parent's own group id as
    // its record key; an unparseable reference rejects the whole event.
    let parent_group_id = match &parent_uri {
        Some(uri) => match uri.rsplit('/').next().and_then(|k| GroupId::new(k).ok()) {
            Some(id) => Some(id),
            None => {
                tracing::warn!(group = %group_id, parent = %uri, "unparseable parentGroup reference, rejecting");
                return Vec::new();
            }
        },
        None => None,
    };

    vec![GroupEvent::Config(ConfigEvent {
        group_id,
        name: event
            .record
            .get("name")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        description: event
            .record
            .get("description")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        stage,
        parent_group_id,
        parent_uri,
        created_at_us: record_time_us(event.record.get("createdAt"), event.time_us),
    })]
}

fn parse_membership(event: &RelayEvent) -> Vec<GroupEvent> {
    // A deleted membership record withdraws the intent; the body is gone,
    // so the target group must come from the record key.
    if event.operation == RelayOperation::Delete {
        let Ok(group_id) = GroupId::new(event.rkey.as_str()) else {
            tracing::debug!(uri = %event.uri(), "membership delete without group key, dropping");
            return Vec::new();
        };
        return vec![GroupEvent::Membership(MembershipEvent {
            group_id,
            did: event.did.clone(),
            role: MemberRole::Member,
            active: false,
            joined_at_us: event.time_us,
        })];
    }

    let Some(community) = event.record.get("community").and_then(|v| v.as_str()) else {
        tracing::debug!(uri = %event.uri(), "membership record without community field, dropping");
        return Vec::new();
    };
    let group_id = match GroupId::new(community) {
        Ok(id) => id,
        Err(_) => {
            tracing::debug!(uri = %event.uri(), community, "malformed community id, dropping");
            return Vec::new();
        }
    };

    let role = event
        .record
        .get("role")
        .and_then(|v| v.as_str())
        .and_then(|s| MemberRole::from_str(s).ok())
        .unwrap_or(MemberRole::Member);

    let active = event
        .record
        .get("active")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

    vec![GroupEvent::Membership(MembershipEvent {
        group_id,
        did: event.did.clone(),
        role,
        active,
        joined_at_us: record_time_us(event.record.get("createdAt"), event.time_us),
    })]
}

/// Resolves a record's own claimed timestamp, falling back to relay receipt
/// time. Accepts RFC 3339 strings and raw epoch-microsecond integers.
fn record_time_us(value: Option<&serde_json::Value>, fallback_us: i64) -> i64 {
    match value {
        Some(serde_json::Value::String(s)) => chrono::DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.timestamp_micros())
            .unwrap_or(fallback_us),
        Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(fallback_us),
        _ => fallback_us,
    }
}
