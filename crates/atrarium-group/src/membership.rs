//! Membership rows: idempotent upsert/delete keyed by (group, did).

use atrarium_types::{GroupId, MemberRole};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::GroupError;

/// A member of a group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Member {
    pub did: String,
    pub role: MemberRole,
    /// Microseconds since epoch; the first observed join time wins across
    /// redeliveries.
    pub joined_at_us: i64,
    pub active: bool,
}

/// Idempotent membership upsert.
///
/// Redelivery of the same membership event must not move `joined_at_us`,
/// so the stored join time is kept on conflict; role and active flag take
/// the incoming values.
pub fn upsert_member(
    conn: &Connection,
    group_id: &GroupId,
    did: &str,
    role: MemberRole,
    joined_at_us: i64,
    active: bool,
) -> Result<(), GroupError> {
    conn.execute(
        "INSERT INTO memberships (group_id, did, role, joined_at_us, active)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (group_id, did) DO UPDATE SET
             role = excluded.role,
             active = excluded.active",
        params![
            group_id.as_str(),
            did,
            role.as_str(),
            joined_at_us,
            active
        ],
    )?;
    Ok(())
}

/// Idempotent membership delete. Removing a non-member is not an error.
pub fn remove_member(conn: &Connection, group_id: &GroupId, did: &str) -> Result<(), GroupError> {
    conn.execute(
        "DELETE FROM memberships WHERE group_id = ?1 AND did = ?2",
        params![group_id.as_str(), did],
    )?;
    Ok(())
}

/// Lists all members of a group, owners first, then by join time.
pub fn list_members(conn: &Connection, group_id: &GroupId) -> Result<Vec<Member>, GroupError> {
    let mut stmt = conn.prepare(
        "SELECT did, role, joined_at_us, active
         FROM memberships WHERE group_id = ?1
         ORDER BY CASE role WHEN 'owner' THEN 0 WHEN 'moderator' THEN 1 ELSE 2 END,
                  joined_at_us ASC",
    )?;

    let rows = stmt.query_map([group_id.as_str()], map_row_to_member)?;
    let mut members = Vec::new();
    for row in rows {
        members.push(row?);
    }
    Ok(members)
}

/// Number of active members; drives stage-progression thresholds.
pub fn active_member_count(conn: &Connection, group_id: &GroupId) -> Result<usize, GroupError> {
    let count: usize = conn.query_row(
        "SELECT COUNT(*) FROM memberships WHERE group_id = ?1 AND active = 1",
        [group_id.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Role of a DID in the group, if it holds an *active* membership.
pub fn active_role(
    conn: &Connection,
    group_id: &GroupId,
    did: &str,
) -> Result<Option<MemberRole>, GroupError> {
    let role_str: Option<String> = conn
        .query_row(
            "SELECT role FROM memberships WHERE group_id = ?1 AND did = ?2 AND active = 1",
            params![group_id.as_str(), did],
            |row| row.get(0),
        )
        .optional()?;

    match role_str {
        Some(s) => {
            let role = MemberRole::from_str(&s).map_err(|e| {
                GroupError::Validation(format!("stored role is corrupt: {e}"))
            })?;
            Ok(Some(role))
        }
        None => Ok(None),
    }
}

/// DIDs holding the owner role. Cached into children as inherited
/// moderators at hierarchy-link creation.
pub fn owner_dids(conn: &Connection, group_id: &GroupId) -> Result<Vec<String>, GroupError> {
    let mut stmt = conn.prepare(
        "SELECT did FROM memberships
         WHERE group_id = ?1 AND role = 'owner' AND active = 1
         ORDER BY joined_at_us ASC",
    )?;
    let rows = stmt.query_map([group_id.as_str()], |row| row.get(0))?;
    let mut dids = Vec::new();
    for row in rows {
        dids.push(row?);
    }
    Ok(dids)
}

fn map_row_to_member(row: &Row) -> rusqlite::Result<Member> {
    let role_str: String = row.get(1)?;
    let role = MemberRole::from_str(&role_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Member {
        did: row.get(0)?,
        role,
        joined_at_us: row.get(2)?,
        active: row.get(3)?,
    })
}
