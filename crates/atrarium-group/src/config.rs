//! Group configuration storage: create-on-first-write merge semantics.

use atrarium_types::{GroupId, GroupStage};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::GroupError;

/// Stored configuration of one group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupConfig {
    pub group_id: GroupId,
    pub name: String,
    pub description: Option<String>,
    pub stage: GroupStage,
    /// Derived feed hashtag, `#atrarium_<id>`.
    pub hashtag: String,
    /// Fixed at creation for theme-stage children; never rewritten.
    pub parent_group_id: Option<GroupId>,
    pub parent_group_uri: Option<String>,
    /// ISO 8601.
    pub created_at: String,
    pub updated_at: String,
}

/// Partial update for [`update_config`]. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateConfigParams {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Raw stage setter. Legitimate transitions go through
    /// [`crate::GroupActor::progress_stage`]; this path exists for
    /// hierarchy bootstrapping and operational repair.
    pub stage: Option<GroupStage>,
    pub parent_group_id: Option<GroupId>,
    pub parent_group_uri: Option<String>,
}

/// Creates or merges the group's config.
///
/// The first call for a given id creates the row: stage defaults to
/// `theme`, the hashtag is derived from the id, the name defaults to the
/// id until a real one arrives. Later calls merge only the present fields
/// via a single UPDATE, avoiding a read-modify-write race.
///
/// The parent reference is immutable: setting it is allowed only while it
/// is unset; any attempt to change an existing value fails with
/// [`GroupError::ParentImmutable`]. Re-asserting the identical value is a
/// no-op, so redelivered config events stay idempotent.
pub fn update_config(
    conn: &Connection,
    group_id: &GroupId,
    updates: &UpdateConfigParams,
) -> Result<GroupConfig, GroupError> {
    let existing = get_config_opt(conn, group_id)?;

    let Some(existing) = existing else {
        let stage = updates.stage.unwrap_or(GroupStage::Theme);
        conn.execute(
            "INSERT INTO groups (
                group_id, name, description, stage, hashtag,
                parent_group_id, parent_group_uri
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                group_id.as_str(),
                updates.name.as_deref().unwrap_or(group_id.as_str()),
                updates.description,
                stage.as_str(),
                group_id.hashtag(),
                updates.parent_group_id.as_ref().map(GroupId::as_str),
                updates.parent_group_uri,
            ],
        )?;
        return get_config(conn, group_id);
    };

    if let Some(new_parent) = &updates.parent_group_id {
        match &existing.parent_group_id {
            Some(current) if current != new_parent => return Err(GroupError::ParentImmutable),
            _ => {}
        }
    }

    let mut set_parts: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut idx = 1usize;

    if let Some(name) = &updates.name {
        set_parts.push(format!("name = ?{}", idx));
        values.push(Box::new(name.clone()));
        idx += 1;
    }
    if let Some(description) = &updates.description {
        set_parts.push(format!("description = ?{}", idx));
        values.push(Box::new(description.clone()));
        idx += 1;
    }
    if let Some(stage) = &updates.stage {
        set_parts.push(format!("stage = ?{}", idx));
        values.push(Box::new(stage.as_str().to_string()));
        idx += 1;
    }
    if existing.parent_group_id.is_none() {
        if let Some(parent_id) = &updates.parent_group_id {
            set_parts.push(format!("parent_group_id = ?{}", idx));
            values.push(Box::new(parent_id.as_str().to_string()));
            idx += 1;
        }
        if let Some(parent_uri) = &updates.parent_group_uri {
            set_parts.push(format!("parent_group_uri = ?{}", idx));
            values.push(Box::new(parent_uri.clone()));
            idx += 1;
        }
    }

    if set_parts.is_empty() {
        return Ok(existing);
    }

    set_parts.push("updated_at = datetime('now')".to_string());

    let sql = format!(
        "UPDATE groups SET {} WHERE group_id = ?{}",
        set_parts.join(", "),
        idx
    );
    values.push(Box::new(group_id.as_str().to_string()));

    let params_refs: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|v| v.as_ref()).collect();
    conn.execute(&sql, params_refs.as_slice())?;

    get_config(conn, group_id)
}

/// Reads the group's config, or `NotFound`.
pub fn get_config(conn: &Connection, group_id: &GroupId) -> Result<GroupConfig, GroupError> {
    get_config_opt(conn, group_id)?
        .ok_or_else(|| GroupError::NotFound(format!("group {group_id}")))
}

pub(crate) fn get_config_opt(
    conn: &Connection,
    group_id: &GroupId,
) -> Result<Option<GroupConfig>, GroupError> {
    conn.query_row(
        "SELECT group_id, name, description, stage, hashtag,
                parent_group_id, parent_group_uri, created_at, updated_at
         FROM groups WHERE group_id = ?1",
        [group_id.as_str()],
        map_row_to_config,
    )
    .optional()
    .map_err(GroupError::from)
}

fn map_row_to_config(row: &Row) -> rusqlite::Result<GroupConfig> {
    let id_str: String = row.get(0)?;
    let group_id = GroupId::new(id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let stage_str: String = row.get(3)?;
    let stage = GroupStage::from_str(&stage_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let parent_str: Option<String> = row.get(5)?;
    let parent_group_id = match parent_str {
        Some(s) => Some(GroupId::new(s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?),
        None => None,
    };

    Ok(GroupConfig {
        group_id,
        name: row.get(1)?,
        description: row.get(2)?,
        stage,
        hashtag: row.get(4)?,
        parent_group_id,
        parent_group_uri: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        atrarium_db::run_migrations(&conn).expect("migrations");
        conn
    }

    fn gid(s: &str) -> GroupId {
        GroupId::new(s).unwrap()
    }

    #[test]
    fn first_update_creates_with_defaults() {
        let conn = setup_db();
        let id = gid("a1b2c3d4");

        let config = update_config(&conn, &id, &UpdateConfigParams::default()).expect("create");
        assert_eq!(config.name, "a1b2c3d4");
        assert_eq!(config.stage, GroupStage::Theme);
        assert_eq!(config.hashtag, "#atrarium_a1b2c3d4");
        assert!(config.parent_group_id.is_none());
    }

    #[test]
    fn merge_touches_only_present_fields() {
        let conn = setup_db();
        let id = gid("a1b2c3d4");

        update_config(
            &conn,
            &id,
            &UpdateConfigParams {
                name: Some("Rust circle".to_string()),
                description: Some("a place".to_string()),
                ..Default::default()
            },
        )
        .expect("create");

        let config = update_config(
            &conn,
            &id,
            &UpdateConfigParams {
                name: Some("Rust club".to_string()),
                ..Default::default()
            },
        )
        .expect("merge");

        assert_eq!(config.name, "Rust club");
        assert_eq!(config.description, Some("a place".to_string()));
    }

    #[test]
    fn empty_merge_is_a_no_op() {
        let conn = setup_db();
        let id = gid("a1b2c3d4");
        let created = update_config(&conn, &id, &UpdateConfigParams::default()).expect("create");
        let merged = update_config(&conn, &id, &UpdateConfigParams::default()).expect("no-op");
        assert_eq!(created, merged);
    }

    #[test]
    fn parent_is_immutable_once_set() {
        let conn = setup_db();
        let id = gid("a1b2c3d4");

        update_config(
            &conn,
            &id,
            &UpdateConfigParams {
                parent_group_id: Some(gid("deadbeef")),
                parent_group_uri: Some("at://p/net.atrarium.group.config/deadbeef".to_string()),
                ..Default::default()
            },
        )
        .expect("create with parent");

        // Re-asserting the same parent is idempotent.
        update_config(
            &conn,
            &id,
            &UpdateConfigParams {
                parent_group_id: Some(gid("deadbeef")),
                ..Default::default()
            },
        )
        .expect("idempotent re-assert");

        let err = update_config(
            &conn,
            &id,
            &UpdateConfigParams {
                parent_group_id: Some(gid("0badf00d")),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, GroupError::ParentImmutable));
    }

    #[test]
    fn parent_survives_stage_change() {
        let conn = setup_db();
        let id = gid("a1b2c3d4");

        update_config(
            &conn,
            &id,
            &UpdateConfigParams {
                parent_group_id: Some(gid("deadbeef")),
                ..Default::default()
            },
        )
        .expect("create");

        let config = update_config(
            &conn,
            &id,
            &UpdateConfigParams {
                stage: Some(GroupStage::Community),
                ..Default::default()
            },
        )
        .expect("stage change");

        assert_eq!(config.stage, GroupStage::Community);
        assert_eq!(config.parent_group_id, Some(gid("deadbeef")));
    }

    #[test]
    fn get_config_unknown_group_is_not_found() {
        let conn = setup_db();
        let err = get_config(&conn, &gid("a1b2c3d4")).unwrap_err();
        assert!(matches!(err, GroupError::NotFound(_)));
    }
}
