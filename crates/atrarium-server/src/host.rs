//! The group host: a routing table of single-writer group actors, plus
//! the cross-actor hierarchy coordination that cannot live inside any one
//! actor.
//!
//! Every actor is wrapped in its own async mutex, so mutations against one
//! group serialize while distinct groups proceed concurrently. Cross-actor
//! updates (child creation, deletion unlinking, feed aggregation replay)
//! are two independent idempotent calls, never a transaction — the system
//! tolerates a brief window of inconsistency and converges on retry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use atrarium_db::DbPool;
use atrarium_group::{GroupActor, GroupConfig, GroupError, IndexPost, UpdateConfigParams};
use atrarium_ingest::{ConfigEvent, MembershipEvent, RoutedEvents};
use atrarium_types::{GroupId, GroupStage, MemberRole};
use tokio::sync::Mutex;

/// Parameters for creating a child group under a graduated parent.
#[derive(Debug, Clone, Default)]
pub struct CreateChildParams {
    pub name: String,
    pub description: Option<String>,
    /// Explicit child id; generated when absent.
    pub child_id: Option<GroupId>,
}

/// Per-cycle tallies from [`GroupHost::dispatch`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub configs: usize,
    pub memberships: usize,
    pub indexed: usize,
    /// Rows replayed into a parent actor.
    pub aggregated: usize,
    /// Events dropped for expected reasons (non-member author, unknown
    /// group). Not failures; never retried.
    pub skipped: usize,
    /// Processing failures. The batch continues past them.
    pub failed: usize,
}

/// Routing table of group actors, keyed by group id.
pub struct GroupHost {
    pool: DbPool,
    actors: RwLock<HashMap<GroupId, Arc<Mutex<GroupActor>>>>,
}

impl GroupHost {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            actors: RwLock::new(HashMap::new()),
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Returns the actor for a group, creating the handle on first use.
    pub fn actor(&self, group_id: &GroupId) -> Arc<Mutex<GroupActor>> {
        if let Some(actor) = self
            .actors
            .read()
            .expect("actor table lock poisoned")
            .get(group_id)
        {
            return actor.clone();
        }

        let mut table = self.actors.write().expect("actor table lock poisoned");
        table
            .entry(group_id.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(GroupActor::new(
                    self.pool.clone(),
                    group_id.clone(),
                )))
            })
            .clone()
    }

    /// Ids of every group with stored config, in id order.
    pub fn group_ids(&self) -> Result<Vec<GroupId>, GroupError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT group_id FROM groups ORDER BY group_id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            let raw = row?;
            match GroupId::new(&raw) {
                Ok(id) => ids.push(id),
                Err(e) => tracing::warn!(group = %raw, error = %e, "skipping corrupt group id"),
            }
        }
        Ok(ids)
    }

    // ── hierarchy coordination ───────────────────────────────────────

    /// Creates a theme-stage child under a graduated parent.
    ///
    /// Two separate actor writes: the child's state is created first, then
    /// the link is recorded on the parent. Both sides key on the child id
    /// and are idempotent, so a retry after a partial failure converges.
    pub async fn create_child(
        &self,
        parent_id: &GroupId,
        actor_did: &str,
        params: CreateChildParams,
    ) -> Result<GroupConfig, GroupError> {
        let parent = self.actor(parent_id);
        let parent_owners = {
            let parent = parent.lock().await;
            parent.ensure_can_parent()?;
            let owners = parent.owner_dids()?;
            if !owners.iter().any(|d| d == actor_did) {
                return Err(GroupError::permission(format!(
                    "owner role in group {parent_id} to create a child group"
                )));
            }
            owners
        };

        let child_id = match params.child_id {
            Some(id) => {
                let child = self.actor(&id);
                let exists = child.lock().await.get_config().is_ok();
                if exists {
                    return Err(GroupError::DuplicateChild { child_id: id });
                }
                id
            }
            None => GroupId::generate(),
        };
        let child_uri = format!(
            "at://{actor_did}/{}/{child_id}",
            atrarium_types::collections::GROUP_CONFIG
        );
        let parent_uri = format!(
            "at://{actor_did}/{}/{parent_id}",
            atrarium_types::collections::GROUP_CONFIG
        );

        let child = self.actor(&child_id);
        let config = {
            let child = child.lock().await;
            let config = child.update_config(&UpdateConfigParams {
                name: Some(params.name),
                description: params.description,
                stage: Some(GroupStage::Theme),
                parent_group_id: Some(parent_id.clone()),
                parent_group_uri: Some(parent_uri),
            })?;
            child.add_member(actor_did, MemberRole::Owner, now_us())?;
            child.set_inherited_moderators(&parent_owners)?;
            config
        };

        // Second, separate call: record the link on the parent.
        parent.lock().await.add_child(&child_id, &child_uri)?;

        tracing::info!(parent = %parent_id, child = %child_id, "child group created");
        Ok(config)
    }

    /// Deletes a group, then unlinks it from its parent if it was a child.
    ///
    /// The unlink is a separate idempotent call; if it fails the link is
    /// left dangling and a later `remove_child` retry converges.
    pub async fn delete_group(
        &self,
        group_id: &GroupId,
        actor_did: &str,
    ) -> Result<(), GroupError> {
        let actor = self.actor(group_id);
        let parent_id = actor.lock().await.delete_group(actor_did)?;

        self.actors
            .write()
            .expect("actor table lock poisoned")
            .remove(group_id);

        if let Some(parent_id) = parent_id {
            let parent = self.actor(&parent_id);
            let remove_result = parent.lock().await.remove_child(group_id);
            if let Err(e) = remove_result {
                tracing::error!(
                    parent = %parent_id,
                    child = %group_id,
                    error = %e,
                    "failed to unlink deleted child from parent; remove_child can be retried"
                );
            }
        }
        Ok(())
    }

    // ── ingestion dispatch ───────────────────────────────────────────

    /// Dispatches one routed delivery cycle, fire-and-forget per event.
    ///
    /// Failures caused by malformed or unauthorized data are counted and
    /// dropped, never retried; only infrastructure failures land in
    /// `failed` (eligible for platform-level redelivery of the whole
    /// cycle, which every mutation tolerates).
    pub async fn dispatch(&self, routed: RoutedEvents) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        for config_event in &routed.configs {
            match self.apply_config(config_event).await {
                Ok(()) => outcome.configs += 1,
                Err(e) if e.kind() == atrarium_group::ErrorKind::Internal => {
                    tracing::warn!(group = %config_event.group_id, error = %e, "config event failed");
                    outcome.failed += 1;
                }
                Err(e) => {
                    tracing::debug!(group = %config_event.group_id, error = %e, "config event skipped");
                    outcome.skipped += 1;
                }
            }
        }

        for membership in &routed.memberships {
            match self.apply_membership(membership).await {
                Ok(()) => outcome.memberships += 1,
                Err(e) => {
                    tracing::warn!(group = %membership.group_id, error = %e, "membership event failed");
                    outcome.failed += 1;
                }
            }
        }

        for batch in &routed.post_batches {
            let actor = self.actor(&batch.group_id);
            // One parent lookup per batch; a group with no config yet has
            // no parent to aggregate into.
            let parent_ref = actor.lock().await.get_parent().ok().flatten();

            for post in &batch.posts {
                let index = IndexPost {
                    uri: post.uri.clone(),
                    author_did: post.author_did.clone(),
                    created_at_us: post.created_at_us,
                };

                match actor.lock().await.index_post(&index) {
                    Ok(()) => {
                        outcome.indexed += 1;
                        if let Some(parent_ref) = &parent_ref {
                            let parent = self.actor(&parent_ref.group_id);
                            let replay = parent
                                .lock()
                                .await
                                .index_aggregated_post(&index, &batch.group_id);
                            match replay {
                                Ok(()) => outcome.aggregated += 1,
                                Err(e) => {
                                    tracing::warn!(
                                        parent = %parent_ref.group_id,
                                        uri = %post.uri,
                                        error = %e,
                                        "aggregation replay failed"
                                    );
                                    outcome.failed += 1;
                                }
                            }
                        }
                    }
                    Err(GroupError::Permission { .. }) => {
                        // Dual verification: tag matched but the author is
                        // not an active member. Expected and final.
                        tracing::debug!(group = %batch.group_id, uri = %post.uri, "non-member post skipped");
                        outcome.skipped += 1;
                    }
                    Err(e) => {
                        tracing::warn!(group = %batch.group_id, uri = %post.uri, error = %e, "post indexing failed");
                        outcome.failed += 1;
                    }
                }
            }
        }

        outcome
    }

    async fn apply_config(&self, event: &ConfigEvent) -> Result<(), GroupError> {
        let actor = self.actor(&event.group_id);
        let actor = actor.lock().await;
        actor.update_config(&UpdateConfigParams {
            name: event.name.clone(),
            description: event.description.clone(),
            stage: Some(event.stage),
            parent_group_id: event.parent_group_id.clone(),
            parent_group_uri: event.parent_uri.clone(),
        })?;
        Ok(())
    }

    async fn apply_membership(&self, event: &MembershipEvent) -> Result<(), GroupError> {
        let actor = self.actor(&event.group_id);
        let actor = actor.lock().await;
        if event.active {
            actor.add_member(&event.did, event.role, event.joined_at_us)
        } else {
            actor.remove_member(&event.did)
        }
    }

    // ── retention ────────────────────────────────────────────────────

    /// Runs the TTL sweep across every known group. Returns the number of
    /// groups swept and rows deleted.
    pub async fn cleanup_all(&self, retention_days: i64) -> Result<(usize, usize), GroupError> {
        let ids = self.group_ids()?;
        let mut deleted = 0;
        for id in &ids {
            let actor = self.actor(id);
            deleted += actor.lock().await.cleanup(retention_days)?;
        }
        Ok((ids.len(), deleted))
    }
}

fn now_us() -> i64 {
    chrono::Utc::now().timestamp_micros()
}
