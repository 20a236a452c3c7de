//! Moderation: append-only action log plus last-write-wins derived state.
//!
//! Actions carry their own effective timestamp (the record's claimed
//! time, not receipt time). For any target, the action with the greatest
//! effective timestamp wins regardless of processing order — redelivered
//! or out-of-order actions are accepted into the log but never regress
//! derived state.

use atrarium_types::{GroupId, ModerationActionKind, ModerationReason, ModerationStatus};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::GroupError;
use crate::hierarchy;
use crate::membership;
use crate::now_us;

/// One incoming moderation action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModerationAction {
    pub action: ModerationActionKind,
    /// Post at-URI for hide/unhide, user DID for block/unblock.
    pub target: String,
    pub moderator_did: String,
    pub reason: Option<ModerationReason>,
    /// The action record's own claimed timestamp, microseconds since epoch.
    pub effective_us: i64,
}

/// Whether an accepted action changed derived state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationOutcome {
    /// The action won the LWW comparison and derived state moved.
    Applied,
    /// A decision with a later effective timestamp already holds; the
    /// action was logged but derived state is unchanged.
    Stale,
}

/// One stored log row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModerationLogEntry {
    pub action: ModerationActionKind,
    pub target: String,
    pub moderator_did: String,
    pub reason: Option<ModerationReason>,
    pub effective_us: i64,
    pub applied_at_us: i64,
}

/// Verifies that `did` holds moderation authority over the group: an
/// active owner/moderator membership, or a cached inherited-moderator
/// entry (parent-owner authority over a theme-stage child).
pub fn ensure_moderator(
    conn: &Connection,
    group_id: &GroupId,
    did: &str,
) -> Result<(), GroupError> {
    if let Some(role) = membership::active_role(conn, group_id, did)? {
        if role.can_moderate() {
            return Ok(());
        }
    }
    if hierarchy::is_inherited_moderator(conn, group_id, did)? {
        return Ok(());
    }
    Err(GroupError::permission(format!(
        "moderation authority (owner or moderator role) in group {group_id}"
    )))
}

/// Applies one moderation action under the LWW rule.
///
/// The action is always appended to the log once it passes validation;
/// derived state (post status or user block) changes only when the
/// incoming effective timestamp is strictly greater than the stored one.
pub fn apply_moderation(
    conn: &Connection,
    group_id: &GroupId,
    action: &ModerationAction,
) -> Result<ModerationOutcome, GroupError> {
    if action.action.targets_post() {
        if !action.target.starts_with("at://") {
            return Err(GroupError::Validation(format!(
                "{} targets a post at-uri, got '{}'",
                action.action.as_str(),
                action.target
            )));
        }
    } else if !action.target.starts_with("did:") {
        return Err(GroupError::Validation(format!(
            "{} targets a user did, got '{}'",
            action.action.as_str(),
            action.target
        )));
    }

    let outcome = if action.action.targets_post() {
        apply_post_action(conn, group_id, action)?
    } else {
        apply_user_action(conn, group_id, action)?
    };

    conn.execute(
        "INSERT INTO moderation_log (
            group_id, action, target, moderator_did, reason,
            effective_us, applied_at_us
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            group_id.as_str(),
            action.action.as_str(),
            action.target,
            action.moderator_did,
            action.reason.map(|r| r.as_str()),
            action.effective_us,
            now_us(),
        ],
    )?;

    if outcome == ModerationOutcome::Stale {
        tracing::debug!(
            group = %group_id,
            action = action.action.as_str(),
            target = %action.target,
            "moderation action is stale, logged without effect"
        );
    }

    Ok(outcome)
}

fn apply_post_action(
    conn: &Connection,
    group_id: &GroupId,
    action: &ModerationAction,
) -> Result<ModerationOutcome, GroupError> {
    let stored: Option<Option<i64>> = conn
        .query_row(
            "SELECT status_effective_us FROM post_index
             WHERE group_id = ?1 AND uri = ?2",
            params![group_id.as_str(), action.target],
            |row| row.get(0),
        )
        .optional()?;

    let Some(stored_effective) = stored else {
        return Err(GroupError::NotFound(format!(
            "post {} in group {group_id}",
            action.target
        )));
    };

    if let Some(winning) = stored_effective {
        if action.effective_us <= winning {
            return Ok(ModerationOutcome::Stale);
        }
    }

    let new_status = match action.action {
        ModerationActionKind::HidePost => ModerationStatus::Hidden,
        ModerationActionKind::UnhidePost => ModerationStatus::Approved,
        _ => unreachable!("caller checked targets_post"),
    };

    conn.execute(
        "UPDATE post_index SET moderation_status = ?1, status_effective_us = ?2
         WHERE group_id = ?3 AND uri = ?4",
        params![
            new_status.as_str(),
            action.effective_us,
            group_id.as_str(),
            action.target
        ],
    )?;
    Ok(ModerationOutcome::Applied)
}

fn apply_user_action(
    conn: &Connection,
    group_id: &GroupId,
    action: &ModerationAction,
) -> Result<ModerationOutcome, GroupError> {
    let stored: Option<i64> = conn
        .query_row(
            "SELECT effective_us FROM user_blocks WHERE group_id = ?1 AND did = ?2",
            params![group_id.as_str(), action.target],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(winning) = stored {
        if action.effective_us <= winning {
            return Ok(ModerationOutcome::Stale);
        }
    }

    let blocked = action.action == ModerationActionKind::BlockUser;
    conn.execute(
        "INSERT INTO user_blocks (group_id, did, blocked, effective_us)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (group_id, did) DO UPDATE SET
             blocked = excluded.blocked,
             effective_us = excluded.effective_us",
        params![
            group_id.as_str(),
            action.target,
            blocked,
            action.effective_us
        ],
    )?;
    Ok(ModerationOutcome::Applied)
}

/// Whether a DID is currently blocked in the group.
pub fn is_blocked(conn: &Connection, group_id: &GroupId, did: &str) -> Result<bool, GroupError> {
    let blocked: bool = conn
        .query_row(
            "SELECT blocked FROM user_blocks WHERE group_id = ?1 AND did = ?2",
            params![group_id.as_str(), did],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(false);
    Ok(blocked)
}

/// Reads the full action log, oldest first.
pub fn list_log(
    conn: &Connection,
    group_id: &GroupId,
) -> Result<Vec<ModerationLogEntry>, GroupError> {
    let mut stmt = conn.prepare(
        "SELECT action, target, moderator_did, reason, effective_us, applied_at_us
         FROM moderation_log WHERE group_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map([group_id.as_str()], map_row_to_log_entry)?;
    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

fn map_row_to_log_entry(row: &Row) -> rusqlite::Result<ModerationLogEntry> {
    let action_str: String = row.get(0)?;
    let action = ModerationActionKind::from_str(&action_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let reason_str: Option<String> = row.get(3)?;
    let reason = match reason_str {
        Some(s) => Some(ModerationReason::from_str(&s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
        })?),
        None => None,
    };

    Ok(ModerationLogEntry {
        action,
        target: row.get(1)?,
        moderator_did: row.get(2)?,
        reason,
        effective_us: row.get(4)?,
        applied_at_us: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posts::{get_post, index_post, IndexPost};
    use atrarium_types::MemberRole;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        atrarium_db::run_migrations(&conn).expect("migrations");
        conn
    }

    fn gid() -> GroupId {
        GroupId::new("a1b2c3d4").unwrap()
    }

    fn seed_post(conn: &Connection, id: &GroupId, uri: &str) {
        membership::upsert_member(conn, id, "did:plc:author", MemberRole::Member, 1, true)
            .unwrap();
        index_post(
            conn,
            id,
            &IndexPost {
                uri: uri.to_string(),
                author_did: "did:plc:author".to_string(),
                created_at_us: 100,
            },
            None,
        )
        .unwrap();
    }

    fn act(
        kind: ModerationActionKind,
        target: &str,
        effective_us: i64,
    ) -> ModerationAction {
        ModerationAction {
            action: kind,
            target: target.to_string(),
            moderator_did: "did:plc:mod".to_string(),
            reason: Some(ModerationReason::Spam),
            effective_us,
        }
    }

    #[test]
    fn hide_then_unhide_in_order() {
        let conn = setup_db();
        let id = gid();
        seed_post(&conn, &id, "at://a/p/1");

        let hide = act(ModerationActionKind::HidePost, "at://a/p/1", 10);
        let unhide = act(ModerationActionKind::UnhidePost, "at://a/p/1", 20);

        assert_eq!(
            apply_moderation(&conn, &id, &hide).unwrap(),
            ModerationOutcome::Applied
        );
        assert_eq!(
            apply_moderation(&conn, &id, &unhide).unwrap(),
            ModerationOutcome::Applied
        );

        let entry = get_post(&conn, &id, "at://a/p/1").unwrap().unwrap();
        assert_eq!(entry.moderation_status, ModerationStatus::Approved);
    }

    #[test]
    fn hide_then_unhide_delivered_out_of_order() {
        let conn = setup_db();
        let id = gid();
        seed_post(&conn, &id, "at://a/p/1");

        // The unhide (T2) arrives before the hide (T1 < T2); the hide must
        // land in the log but leave the post approved.
        let unhide = act(ModerationActionKind::UnhidePost, "at://a/p/1", 20);
        let hide = act(ModerationActionKind::HidePost, "at://a/p/1", 10);

        assert_eq!(
            apply_moderation(&conn, &id, &unhide).unwrap(),
            ModerationOutcome::Applied
        );
        assert_eq!(
            apply_moderation(&conn, &id, &hide).unwrap(),
            ModerationOutcome::Stale
        );

        let entry = get_post(&conn, &id, "at://a/p/1").unwrap().unwrap();
        assert_eq!(entry.moderation_status, ModerationStatus::Approved);
        assert_eq!(list_log(&conn, &id).unwrap().len(), 2, "both logged");
    }

    #[test]
    fn equal_timestamps_keep_stored_decision() {
        let conn = setup_db();
        let id = gid();
        seed_post(&conn, &id, "at://a/p/1");

        apply_moderation(&conn, &id, &act(ModerationActionKind::HidePost, "at://a/p/1", 10))
            .unwrap();
        let outcome = apply_moderation(
            &conn,
            &id,
            &act(ModerationActionKind::UnhidePost, "at://a/p/1", 10),
        )
        .unwrap();

        assert_eq!(outcome, ModerationOutcome::Stale);
        let entry = get_post(&conn, &id, "at://a/p/1").unwrap().unwrap();
        assert_eq!(entry.moderation_status, ModerationStatus::Hidden);
    }

    #[test]
    fn moderating_unknown_post_is_not_found() {
        let conn = setup_db();
        let err = apply_moderation(
            &conn,
            &gid(),
            &act(ModerationActionKind::HidePost, "at://a/p/ghost", 10),
        )
        .unwrap_err();
        assert!(matches!(err, GroupError::NotFound(_)));
    }

    #[test]
    fn target_shape_is_validated() {
        let conn = setup_db();
        let id = gid();

        let err = apply_moderation(
            &conn,
            &id,
            &act(ModerationActionKind::HidePost, "did:plc:x", 10),
        )
        .unwrap_err();
        assert!(matches!(err, GroupError::Validation(_)));

        let err = apply_moderation(
            &conn,
            &id,
            &act(ModerationActionKind::BlockUser, "at://a/p/1", 10),
        )
        .unwrap_err();
        assert!(matches!(err, GroupError::Validation(_)));
    }

    #[test]
    fn block_unblock_lww_either_order() {
        let conn = setup_db();
        let id = gid();

        let block = act(ModerationActionKind::BlockUser, "did:plc:spammer", 10);
        let unblock = act(ModerationActionKind::UnblockUser, "did:plc:spammer", 20);

        apply_moderation(&conn, &id, &unblock).unwrap();
        let outcome = apply_moderation(&conn, &id, &block).unwrap();
        assert_eq!(outcome, ModerationOutcome::Stale);
        assert!(!is_blocked(&conn, &id, "did:plc:spammer").unwrap());
    }

    #[test]
    fn ensure_moderator_accepts_roles_and_inherited() {
        let conn = setup_db();
        let id = gid();

        membership::upsert_member(&conn, &id, "did:plc:owner", MemberRole::Owner, 1, true)
            .unwrap();
        membership::upsert_member(&conn, &id, "did:plc:member", MemberRole::Member, 2, true)
            .unwrap();
        hierarchy::set_inherited_moderators(&conn, &id, &["did:plc:parent".to_string()])
            .unwrap();

        assert!(ensure_moderator(&conn, &id, "did:plc:owner").is_ok());
        assert!(ensure_moderator(&conn, &id, "did:plc:parent").is_ok());

        let err = ensure_moderator(&conn, &id, "did:plc:member").unwrap_err();
        assert!(matches!(err, GroupError::Permission { .. }));
    }
}
