//! Per-group emoji registry cache.
//!
//! A pure read-through cache: the durable approval source of truth lives
//! outside the actor, so every entry here may be discarded and rebuilt at
//! any time via [`rebuild_registry`]. Only approved submissions are ever
//! written in.

use atrarium_types::GroupId;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::error::GroupError;

/// One cached emoji.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmojiEntry {
    /// Shortcode without colons, e.g. `blobcat`.
    pub shortcode: String,
    /// at-URI of the approved emoji record.
    pub source_uri: String,
    /// Blob reference (CID) of the image.
    pub blob_ref: String,
    pub animated: bool,
}

fn validate_shortcode(shortcode: &str) -> Result<(), GroupError> {
    let ok = !shortcode.is_empty()
        && shortcode.len() <= 32
        && shortcode
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
    if ok {
        Ok(())
    } else {
        Err(GroupError::Validation(format!(
            "shortcode must be 1-32 chars of [a-z0-9_], got '{shortcode}'"
        )))
    }
}

/// Reads the registry, ordered by shortcode.
pub fn get_registry(conn: &Connection, group_id: &GroupId) -> Result<Vec<EmojiEntry>, GroupError> {
    let mut stmt = conn.prepare(
        "SELECT shortcode, source_uri, blob_ref, animated
         FROM emoji_registry WHERE group_id = ?1 ORDER BY shortcode ASC",
    )?;
    let rows = stmt.query_map([group_id.as_str()], map_row_to_entry)?;
    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

/// Upserts one approved emoji.
pub fn upsert_entry(
    conn: &Connection,
    group_id: &GroupId,
    entry: &EmojiEntry,
) -> Result<(), GroupError> {
    validate_shortcode(&entry.shortcode)?;
    conn.execute(
        "INSERT INTO emoji_registry (group_id, shortcode, source_uri, blob_ref, animated)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (group_id, shortcode) DO UPDATE SET
             source_uri = excluded.source_uri,
             blob_ref = excluded.blob_ref,
             animated = excluded.animated",
        params![
            group_id.as_str(),
            entry.shortcode,
            entry.source_uri,
            entry.blob_ref,
            entry.animated
        ],
    )?;
    Ok(())
}

/// Removes one emoji (revocation). Returns whether a row was removed.
pub fn remove_entry(
    conn: &Connection,
    group_id: &GroupId,
    shortcode: &str,
) -> Result<bool, GroupError> {
    let removed = conn.execute(
        "DELETE FROM emoji_registry WHERE group_id = ?1 AND shortcode = ?2",
        params![group_id.as_str(), shortcode],
    )?;
    Ok(removed > 0)
}

/// Wholesale replace from the durable approval list, used for crash and
/// cache recovery.
pub fn rebuild_registry(
    conn: &Connection,
    group_id: &GroupId,
    approved: &[EmojiEntry],
) -> Result<(), GroupError> {
    for entry in approved {
        validate_shortcode(&entry.shortcode)?;
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM emoji_registry WHERE group_id = ?1",
        [group_id.as_str()],
    )?;
    for entry in approved {
        tx.execute(
            "INSERT OR REPLACE INTO emoji_registry
                (group_id, shortcode, source_uri, blob_ref, animated)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                group_id.as_str(),
                entry.shortcode,
                entry.source_uri,
                entry.blob_ref,
                entry.animated
            ],
        )?;
    }
    tx.commit()?;
    Ok(())
}

fn map_row_to_entry(row: &Row) -> rusqlite::Result<EmojiEntry> {
    Ok(EmojiEntry {
        shortcode: row.get(0)?,
        source_uri: row.get(1)?,
        blob_ref: row.get(2)?,
        animated: row.get(3)?,
    })
}
