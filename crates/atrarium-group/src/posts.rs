//! Post index: membership-gated, idempotent ingestion plus retention.

use atrarium_types::{GroupId, ModerationStatus};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::GroupError;
use crate::membership;
use crate::now_us;

/// Input to [`index_post`]: one validated post event.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexPost {
    pub uri: String,
    pub author_did: String,
    pub created_at_us: i64,
}

/// A stored post index row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostIndexEntry {
    pub uri: String,
    pub author_did: String,
    pub created_at_us: i64,
    pub moderation_status: ModerationStatus,
    /// Set on rows aggregated into a parent from a child.
    pub source_group_id: Option<GroupId>,
    pub indexed_at_us: i64,
}

/// Indexes one post into the group.
///
/// Dual verification: routing already matched the group tag; here the
/// author must additionally hold an active membership, else the call fails
/// with a permission error. `source_group_id` is `Some` only for rows the
/// hierarchy coordinator replays into a parent — those were
/// membership-checked by the child, so the gate is skipped.
///
/// Idempotent by URI: redelivery overwrites the same row and never
/// touches an existing moderation status.
pub fn index_post(
    conn: &Connection,
    group_id: &GroupId,
    post: &IndexPost,
    source_group_id: Option<&GroupId>,
) -> Result<(), GroupError> {
    if source_group_id.is_none() {
        let role = membership::active_role(conn, group_id, &post.author_did)?;
        if role.is_none() {
            return Err(GroupError::permission(format!(
                "active membership in group {group_id}"
            )));
        }
    }

    conn.execute(
        "INSERT INTO post_index (
            group_id, uri, author_did, created_at_us,
            source_group_id, indexed_at_us
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT (group_id, uri) DO UPDATE SET
            author_did = excluded.author_did,
            created_at_us = excluded.created_at_us,
            source_group_id = excluded.source_group_id",
        params![
            group_id.as_str(),
            post.uri,
            post.author_did,
            post.created_at_us,
            source_group_id.map(GroupId::as_str),
            now_us(),
        ],
    )?;
    Ok(())
}

/// Reads one index row.
pub fn get_post(
    conn: &Connection,
    group_id: &GroupId,
    uri: &str,
) -> Result<Option<PostIndexEntry>, GroupError> {
    conn.query_row(
        "SELECT uri, author_did, created_at_us, moderation_status,
                source_group_id, indexed_at_us
         FROM post_index WHERE group_id = ?1 AND uri = ?2",
        params![group_id.as_str(), uri],
        map_row_to_entry,
    )
    .optional()
    .map_err(GroupError::from)
}

/// Number of index rows for the group (aggregated rows included).
pub fn post_count(conn: &Connection, group_id: &GroupId) -> Result<usize, GroupError> {
    let count: usize = conn.query_row(
        "SELECT COUNT(*) FROM post_index WHERE group_id = ?1",
        [group_id.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Deletes rows older than the retention window, measured from the post's
/// own creation time. Returns the number of rows deleted.
///
/// The TTL clock is the post's `created_at_us` regardless of which group's
/// view the row sits in, so aggregated parent rows expire in step with the
/// child originals.
pub fn cleanup(
    conn: &Connection,
    group_id: &GroupId,
    retention_days: i64,
) -> Result<usize, GroupError> {
    let cutoff_us = now_us() - retention_days * 24 * 60 * 60 * 1_000_000;
    let deleted = conn.execute(
        "DELETE FROM post_index WHERE group_id = ?1 AND created_at_us < ?2",
        params![group_id.as_str(), cutoff_us],
    )?;
    Ok(deleted)
}

fn map_row_to_entry(row: &Row) -> rusqlite::Result<PostIndexEntry> {
    let status_str: String = row.get(3)?;
    let moderation_status = ModerationStatus::from_str(&status_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            e.into(),
        )
    })?;

    let source_str: Option<String> = row.get(4)?;
    let source_group_id = match source_str {
        Some(s) => Some(GroupId::new(s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?),
        None => None,
    };

    Ok(PostIndexEntry {
        uri: row.get(0)?,
        author_did: row.get(1)?,
        created_at_us: row.get(2)?,
        moderation_status,
        source_group_id,
        indexed_at_us: row.get(5)?,
    })
}
