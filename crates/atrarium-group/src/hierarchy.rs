//! Hierarchy links and the inherited-moderator cache.
//!
//! The parent's child-set and the child's parent reference live in two
//! different actors and are updated by two separate calls, never a single
//! transaction. Both sides are idempotent on the natural key (child id),
//! so retries after a partial failure converge instead of duplicating.

use atrarium_types::{GroupId, GroupStage};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::config;
use crate::error::GroupError;
use crate::now_us;

/// One parent -> child link as stored on the parent side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChildLink {
    pub child_group_id: GroupId,
    pub child_uri: String,
    pub linked_at_us: i64,
}

/// Records a child on the parent. Idempotent: re-adding an existing child
/// (a retried coordination message) is a no-op.
pub fn add_child(
    conn: &Connection,
    parent_id: &GroupId,
    child_id: &GroupId,
    child_uri: &str,
) -> Result<(), GroupError> {
    conn.execute(
        "INSERT OR IGNORE INTO group_children (
            parent_group_id, child_group_id, child_uri, linked_at_us
        ) VALUES (?1, ?2, ?3, ?4)",
        params![
            parent_id.as_str(),
            child_id.as_str(),
            child_uri,
            now_us()
        ],
    )?;
    Ok(())
}

/// Removes a child link. Idempotent.
pub fn remove_child(
    conn: &Connection,
    parent_id: &GroupId,
    child_id: &GroupId,
) -> Result<(), GroupError> {
    conn.execute(
        "DELETE FROM group_children WHERE parent_group_id = ?1 AND child_group_id = ?2",
        params![parent_id.as_str(), child_id.as_str()],
    )?;
    Ok(())
}

/// Lists the parent's children, oldest link first.
pub fn list_children(
    conn: &Connection,
    parent_id: &GroupId,
) -> Result<Vec<ChildLink>, GroupError> {
    let mut stmt = conn.prepare(
        "SELECT child_group_id, child_uri, linked_at_us
         FROM group_children WHERE parent_group_id = ?1
         ORDER BY linked_at_us ASC, child_group_id ASC",
    )?;
    let rows = stmt.query_map([parent_id.as_str()], |row| {
        let id_str: String = row.get(0)?;
        let child_group_id = GroupId::new(id_str).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(ChildLink {
            child_group_id,
            child_uri: row.get(1)?,
            linked_at_us: row.get(2)?,
        })
    })?;

    let mut children = Vec::new();
    for row in rows {
        children.push(row?);
    }
    Ok(children)
}

/// Display names of the parent's children, for the deletion-blocked
/// conflict payload. Falls back to the child id when no config row has
/// arrived for it yet.
pub fn child_names(conn: &Connection, parent_id: &GroupId) -> Result<Vec<String>, GroupError> {
    let mut stmt = conn.prepare(
        "SELECT COALESCE(g.name, c.child_group_id)
         FROM group_children c
         LEFT JOIN groups g ON g.group_id = c.child_group_id
         WHERE c.parent_group_id = ?1
         ORDER BY c.linked_at_us ASC, c.child_group_id ASC",
    )?;
    let rows = stmt.query_map([parent_id.as_str()], |row| row.get(0))?;
    let mut names = Vec::new();
    for row in rows {
        names.push(row?);
    }
    Ok(names)
}

/// Verifies that a group may take on children: it must be `graduated`
/// and must not itself be someone's child (depth is limited to one
/// level).
pub fn ensure_can_parent(conn: &Connection, group_id: &GroupId) -> Result<(), GroupError> {
    let cfg = config::get_config(conn, group_id)?;

    if cfg.parent_group_id.is_some() {
        return Err(GroupError::NestedHierarchy {
            group_id: group_id.clone(),
        });
    }
    if cfg.stage != GroupStage::Graduated {
        return Err(GroupError::NotGraduated { stage: cfg.stage });
    }
    Ok(())
}

// ── inherited-moderator cache ────────────────────────────────────────

/// Replaces the child's cached inherited-moderator set. Written once at
/// hierarchy-link creation with the parent's owner DIDs.
pub fn set_inherited_moderators(
    conn: &Connection,
    group_id: &GroupId,
    dids: &[String],
) -> Result<(), GroupError> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM inherited_moderators WHERE group_id = ?1",
        [group_id.as_str()],
    )?;
    for did in dids {
        tx.execute(
            "INSERT OR IGNORE INTO inherited_moderators (group_id, did) VALUES (?1, ?2)",
            params![group_id.as_str(), did],
        )?;
    }
    tx.commit()?;
    Ok(())
}

/// Clears the cache. Called when the child advances past `theme`; the set
/// is never re-derived afterwards.
pub fn clear_inherited_moderators(
    conn: &Connection,
    group_id: &GroupId,
) -> Result<usize, GroupError> {
    let cleared = conn.execute(
        "DELETE FROM inherited_moderators WHERE group_id = ?1",
        [group_id.as_str()],
    )?;
    Ok(cleared)
}

/// Reads the cached set.
pub fn list_inherited_moderators(
    conn: &Connection,
    group_id: &GroupId,
) -> Result<Vec<String>, GroupError> {
    let mut stmt = conn.prepare(
        "SELECT did FROM inherited_moderators WHERE group_id = ?1 ORDER BY did ASC",
    )?;
    let rows = stmt.query_map([group_id.as_str()], |row| row.get(0))?;
    let mut dids = Vec::new();
    for row in rows {
        dids.push(row?);
    }
    Ok(dids)
}

/// Membership test against the cached set.
pub fn is_inherited_moderator(
    conn: &Connection,
    group_id: &GroupId,
    did: &str,
) -> Result<bool, GroupError> {
    let found: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM inherited_moderators WHERE group_id = ?1 AND did = ?2)",
        params![group_id.as_str(), did],
        |row| row.get(0),
    )?;
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{update_config, UpdateConfigParams};

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        atrarium_db::run_migrations(&conn).expect("migrations");
        conn
    }

    fn gid(s: &str) -> GroupId {
        GroupId::new(s).unwrap()
    }

    fn seed_group(conn: &Connection, id: &str, stage: GroupStage) {
        update_config(
            conn,
            &gid(id),
            &UpdateConfigParams {
                name: Some(format!("group {id}")),
                stage: Some(stage),
                ..Default::default()
            },
        )
        .expect("seed group");
    }

    #[test]
    fn add_child_is_idempotent() {
        let conn = setup_db();
        let parent = gid("aaaa0001");
        let child = gid("bbbb0002");

        add_child(&conn, &parent, &child, "at://p/c/bbbb0002").unwrap();
        add_child(&conn, &parent, &child, "at://p/c/bbbb0002").unwrap();

        assert_eq!(list_children(&conn, &parent).unwrap().len(), 1);
    }

    #[test]
    fn remove_child_is_idempotent() {
        let conn = setup_db();
        let parent = gid("aaaa0001");
        let child = gid("bbbb0002");

        add_child(&conn, &parent, &child, "at://p/c/bbbb0002").unwrap();
        remove_child(&conn, &parent, &child).unwrap();
        remove_child(&conn, &parent, &child).unwrap();

        assert!(list_children(&conn, &parent).unwrap().is_empty());
    }

    #[test]
    fn ensure_can_parent_requires_graduated() {
        let conn = setup_db();
        seed_group(&conn, "aaaa0001", GroupStage::Community);

        let err = ensure_can_parent(&conn, &gid("aaaa0001")).unwrap_err();
        match err {
            GroupError::NotGraduated { stage } => assert_eq!(stage, GroupStage::Community),
            other => panic!("expected NotGraduated, got {other:?}"),
        }

        seed_group(&conn, "cccc0003", GroupStage::Graduated);
        assert!(ensure_can_parent(&conn, &gid("cccc0003")).is_ok());
    }

    #[test]
    fn a_child_can_never_parent() {
        let conn = setup_db();
        update_config(
            &conn,
            &gid("bbbb0002"),
            &UpdateConfigParams {
                // A child that somehow reached graduated stage is still
                // barred from parenting by its own parent link.
                stage: Some(GroupStage::Graduated),
                parent_group_id: Some(gid("aaaa0001")),
                ..Default::default()
            },
        )
        .unwrap();

        let err = ensure_can_parent(&conn, &gid("bbbb0002")).unwrap_err();
        assert!(matches!(err, GroupError::NestedHierarchy { .. }));
    }

    #[test]
    fn child_names_fall_back_to_ids() {
        let conn = setup_db();
        let parent = gid("aaaa0001");
        seed_group(&conn, "bbbb0002", GroupStage::Theme);

        add_child(&conn, &parent, &gid("bbbb0002"), "at://p/c/1").unwrap();
        add_child(&conn, &parent, &gid("dddd0004"), "at://p/c/2").unwrap();

        assert_eq!(
            child_names(&conn, &parent).unwrap(),
            ["group bbbb0002", "dddd0004"]
        );
    }

    #[test]
    fn inherited_moderator_cache_round_trip() {
        let conn = setup_db();
        let child = gid("bbbb0002");

        set_inherited_moderators(&conn, &child, &["did:plc:p1".into(), "did:plc:p2".into()])
            .unwrap();
        assert!(is_inherited_moderator(&conn, &child, "did:plc:p1").unwrap());
        assert_eq!(list_inherited_moderators(&conn, &child).unwrap().len(), 2);

        let cleared = clear_inherited_moderators(&conn, &child).unwrap();
        assert_eq!(cleared, 2);
        assert!(!is_inherited_moderator(&conn, &child, "did:plc:p1").unwrap());
    }
}
