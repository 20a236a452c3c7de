//! The group actor: one instance per group id, owning that group's state.
//!
//! Methods here are the internal RPC surface. The host serializes calls
//! per actor (single-writer), so the module-level operations can assume
//! no two mutations against the same group race each other.

use atrarium_types::{GroupId, GroupStage, MemberRole};
use atrarium_db::{DbConnection, DbPool};
use rusqlite::Connection;

use crate::config::{self, GroupConfig, UpdateConfigParams};
use crate::emoji::{self, EmojiEntry};
use crate::error::GroupError;
use crate::feed::{self, FeedSkeleton};
use crate::hierarchy::{self, ChildLink};
use crate::membership::{self, Member};
use crate::moderation::{self, ModerationAction, ModerationLogEntry, ModerationOutcome};
use crate::posts::{self, IndexPost, PostIndexEntry};
use crate::stage;

/// Cached parent reference of a child group.
#[derive(Debug, Clone, PartialEq)]
pub struct ParentRef {
    pub group_id: GroupId,
    pub uri: Option<String>,
}

/// Stateful owner of one group's derived state.
pub struct GroupActor {
    group_id: GroupId,
    pool: DbPool,
}

impl GroupActor {
    pub fn new(pool: DbPool, group_id: GroupId) -> Self {
        Self { group_id, pool }
    }

    pub fn group_id(&self) -> &GroupId {
        &self.group_id
    }

    fn conn(&self) -> Result<DbConnection, GroupError> {
        Ok(self.pool.get()?)
    }

    fn ensure_owner(
        &self,
        conn: &Connection,
        actor_did: &str,
        operation: &str,
    ) -> Result<(), GroupError> {
        match membership::active_role(conn, &self.group_id, actor_did)? {
            Some(MemberRole::Owner) => Ok(()),
            _ => Err(GroupError::permission(format!(
                "owner role in group {} to {operation}",
                self.group_id
            ))),
        }
    }

    // ── config ───────────────────────────────────────────────────────

    /// Creates or merges the group config. Raw setter; see
    /// [`config::update_config`].
    pub fn update_config(&self, updates: &UpdateConfigParams) -> Result<GroupConfig, GroupError> {
        let conn = self.conn()?;
        config::update_config(&conn, &self.group_id, updates)
    }

    pub fn get_config(&self) -> Result<GroupConfig, GroupError> {
        let conn = self.conn()?;
        config::get_config(&conn, &self.group_id)
    }

    // ── membership ───────────────────────────────────────────────────

    /// Idempotent membership upsert; the member comes in active.
    pub fn add_member(
        &self,
        did: &str,
        role: MemberRole,
        joined_at_us: i64,
    ) -> Result<(), GroupError> {
        let conn = self.conn()?;
        membership::upsert_member(&conn, &self.group_id, did, role, joined_at_us, true)
    }

    /// Idempotent membership delete.
    pub fn remove_member(&self, did: &str) -> Result<(), GroupError> {
        let conn = self.conn()?;
        membership::remove_member(&conn, &self.group_id, did)
    }

    pub fn get_members(&self) -> Result<Vec<Member>, GroupError> {
        let conn = self.conn()?;
        membership::list_members(&conn, &self.group_id)
    }

    pub fn active_member_count(&self) -> Result<usize, GroupError> {
        let conn = self.conn()?;
        membership::active_member_count(&conn, &self.group_id)
    }

    /// Active owner DIDs; the coordinator caches these into new children.
    pub fn owner_dids(&self) -> Result<Vec<String>, GroupError> {
        let conn = self.conn()?;
        membership::owner_dids(&conn, &self.group_id)
    }

    // ── post index ───────────────────────────────────────────────────

    /// Ingests one post; the author must be an active member.
    pub fn index_post(&self, post: &IndexPost) -> Result<(), GroupError> {
        let conn = self.conn()?;
        posts::index_post(&conn, &self.group_id, post, None)
    }

    /// Ingests a row replayed from a child by the hierarchy coordinator.
    /// Membership was verified by the child; the row is tagged with its
    /// source group.
    pub fn index_aggregated_post(
        &self,
        post: &IndexPost,
        source_group_id: &GroupId,
    ) -> Result<(), GroupError> {
        let conn = self.conn()?;
        posts::index_post(&conn, &self.group_id, post, Some(source_group_id))
    }

    pub fn get_post(&self, uri: &str) -> Result<Option<PostIndexEntry>, GroupError> {
        let conn = self.conn()?;
        posts::get_post(&conn, &self.group_id, uri)
    }

    /// Deletes index rows older than the retention window.
    pub fn cleanup(&self, retention_days: i64) -> Result<usize, GroupError> {
        if retention_days <= 0 {
            return Err(GroupError::Validation(format!(
                "retention window must be positive, got {retention_days} days"
            )));
        }
        let conn = self.conn()?;
        posts::cleanup(&conn, &self.group_id, retention_days)
    }

    // ── moderation ───────────────────────────────────────────────────

    /// Applies one moderation action under last-write-wins. The acting DID
    /// must hold moderation authority: owner/moderator membership, or an
    /// inherited-moderator entry while the group is still theme-stage.
    pub fn moderate(&self, action: &ModerationAction) -> Result<ModerationOutcome, GroupError> {
        let conn = self.conn()?;
        moderation::ensure_moderator(&conn, &self.group_id, &action.moderator_did)?;
        moderation::apply_moderation(&conn, &self.group_id, action)
    }

    pub fn get_moderation_log(&self) -> Result<Vec<ModerationLogEntry>, GroupError> {
        let conn = self.conn()?;
        moderation::list_log(&conn, &self.group_id)
    }

    // ── feed ─────────────────────────────────────────────────────────

    pub fn get_feed_skeleton(
        &self,
        limit: Option<u32>,
        cursor: Option<&str>,
    ) -> Result<FeedSkeleton, GroupError> {
        let conn = self.conn()?;
        feed::feed_skeleton(&conn, &self.group_id, limit, cursor)
    }

    // ── hierarchy ────────────────────────────────────────────────────

    /// Records a child link. Idempotent on the child id; safe to retry.
    pub fn add_child(&self, child_id: &GroupId, child_uri: &str) -> Result<(), GroupError> {
        let conn = self.conn()?;
        hierarchy::add_child(&conn, &self.group_id, child_id, child_uri)
    }

    /// Removes a child link. Idempotent.
    pub fn remove_child(&self, child_id: &GroupId) -> Result<(), GroupError> {
        let conn = self.conn()?;
        hierarchy::remove_child(&conn, &self.group_id, child_id)
    }

    pub fn get_children(&self) -> Result<Vec<ChildLink>, GroupError> {
        let conn = self.conn()?;
        hierarchy::list_children(&conn, &self.group_id)
    }

    pub fn get_parent(&self) -> Result<Option<ParentRef>, GroupError> {
        let conn = self.conn()?;
        let cfg = config::get_config(&conn, &self.group_id)?;
        Ok(cfg.parent_group_id.map(|group_id| ParentRef {
            group_id,
            uri: cfg.parent_group_uri,
        }))
    }

    /// Verifies this group may take on children (graduated, not itself a
    /// child).
    pub fn ensure_can_parent(&self) -> Result<(), GroupError> {
        let conn = self.conn()?;
        hierarchy::ensure_can_parent(&conn, &self.group_id)
    }

    pub fn get_inherited_moderators(&self) -> Result<Vec<String>, GroupError> {
        let conn = self.conn()?;
        hierarchy::list_inherited_moderators(&conn, &self.group_id)
    }

    /// Caches the parent's owner DIDs at hierarchy-link creation.
    pub fn set_inherited_moderators(&self, dids: &[String]) -> Result<(), GroupError> {
        let conn = self.conn()?;
        hierarchy::set_inherited_moderators(&conn, &self.group_id, dids)
    }

    // ── stage ────────────────────────────────────────────────────────

    /// Attempts a stage transition; the acting DID must own the group.
    pub fn progress_stage(
        &self,
        actor_did: &str,
        requested: GroupStage,
    ) -> Result<GroupConfig, GroupError> {
        let conn = self.conn()?;
        self.ensure_owner(&conn, actor_did, "progress group stage")?;
        stage::progress_stage(&conn, &self.group_id, requested)
    }

    // ── deletion ─────────────────────────────────────────────────────

    /// Deletes all state for this group.
    ///
    /// Blocked with a conflict enumerating the children while any child
    /// link remains. Returns the parent id (if this group was a child) so
    /// the coordinator can issue the idempotent `remove_child` on the
    /// parent — a second, separate call by design.
    pub fn delete_group(&self, actor_did: &str) -> Result<Option<GroupId>, GroupError> {
        let conn = self.conn()?;
        let cfg = config::get_config(&conn, &self.group_id)?;
        self.ensure_owner(&conn, actor_did, "delete the group")?;

        let children = hierarchy::list_children(&conn, &self.group_id)?;
        if !children.is_empty() {
            let names = hierarchy::child_names(&conn, &self.group_id)?;
            return Err(GroupError::ChildrenExist {
                count: names.len(),
                names,
            });
        }

        let tx = conn.unchecked_transaction()?;
        for sql in [
            "DELETE FROM post_index WHERE group_id = ?1",
            "DELETE FROM moderation_log WHERE group_id = ?1",
            "DELETE FROM user_blocks WHERE group_id = ?1",
            "DELETE FROM memberships WHERE group_id = ?1",
            "DELETE FROM inherited_moderators WHERE group_id = ?1",
            "DELETE FROM emoji_registry WHERE group_id = ?1",
            "DELETE FROM groups WHERE group_id = ?1",
        ] {
            tx.execute(sql, [self.group_id.as_str()])?;
        }
        tx.commit()?;

        tracing::info!(group = %self.group_id, "group deleted");
        Ok(cfg.parent_group_id)
    }

    // ── emoji registry ───────────────────────────────────────────────

    pub fn get_emoji_registry(&self) -> Result<Vec<EmojiEntry>, GroupError> {
        let conn = self.conn()?;
        emoji::get_registry(&conn, &self.group_id)
    }

    pub fn update_emoji_registry(&self, entry: &EmojiEntry) -> Result<(), GroupError> {
        let conn = self.conn()?;
        emoji::upsert_entry(&conn, &self.group_id, entry)
    }

    pub fn remove_emoji_from_registry(&self, shortcode: &str) -> Result<bool, GroupError> {
        let conn = self.conn()?;
        emoji::remove_entry(&conn, &self.group_id, shortcode)
    }

    pub fn rebuild_emoji_registry(&self, approved: &[EmojiEntry]) -> Result<(), GroupError> {
        let conn = self.conn()?;
        emoji::rebuild_registry(&conn, &self.group_id, approved)
    }
}
