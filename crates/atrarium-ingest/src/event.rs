//! Relay envelope and the typed events produced by the parser.

use atrarium_types::{GroupId, GroupStage, MemberRole};
use serde::{Deserialize, Serialize};

/// Mutation kind carried by a relay event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayOperation {
    Create,
    Update,
    Delete,
}

/// A raw event as delivered by the relay.
///
/// The upstream wire protocol is out of scope; this is the envelope the
/// source adapters normalize into. `record` stays raw JSON until the
/// heavyweight parse — nothing downstream of [`crate::parse_relay_event`]
/// ever sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayEvent {
    /// DID of the repository the mutation happened in.
    pub did: String,
    /// Relay receipt time, microseconds since epoch.
    pub time_us: i64,
    /// Mutation kind.
    pub operation: RelayOperation,
    /// Record collection (type) name.
    pub collection: String,
    /// Record key within the collection.
    pub rkey: String,
    /// The raw record body. Absent for deletes.
    #[serde(default)]
    pub record: serde_json::Value,
}

impl RelayEvent {
    /// The at-URI addressing this record.
    pub fn uri(&self) -> String {
        format!("at://{}/{}/{}", self.did, self.collection, self.rkey)
    }
}

/// A fully validated event targeting one group, ready for routing.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupEvent {
    /// A post to index into the group.
    Post(PostEvent),
    /// A group config create/merge.
    Config(ConfigEvent),
    /// A membership intent.
    Membership(MembershipEvent),
}

impl GroupEvent {
    /// The group this event targets.
    pub fn group_id(&self) -> &GroupId {
        match self {
            Self::Post(p) => &p.group_id,
            Self::Config(c) => &c.group_id,
            Self::Membership(m) => &m.group_id,
        }
    }
}

/// A validated post event. A legacy post carrying several distinct group
/// hashtags fans out into one `PostEvent` per group.
#[derive(Debug, Clone, PartialEq)]
pub struct PostEvent {
    /// at-URI of the post record; the index's idempotency key.
    pub uri: String,
    /// DID of the author.
    pub author_did: String,
    /// Target group.
    pub group_id: GroupId,
    /// The post's own claimed creation time, microseconds since epoch.
    pub created_at_us: i64,
}

/// A validated group config event. The record key is the group id.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigEvent {
    pub group_id: GroupId,
    pub name: Option<String>,
    pub description: Option<String>,
    /// Required by the schema; events without a stage are dropped.
    pub stage: GroupStage,
    /// Present only on theme-stage configs; anything else is rejected
    /// before a `ConfigEvent` is built. The id is parsed from the
    /// reference's record key.
    pub parent_group_id: Option<GroupId>,
    pub parent_uri: Option<String>,
    pub created_at_us: i64,
}

/// A validated membership intent.
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipEvent {
    pub group_id: GroupId,
    /// DID of the member (the repository the record lives in).
    pub did: String,
    pub role: MemberRole,
    /// `false` for record deletions and explicit deactivations.
    pub active: bool,
    pub joined_at_us: i64,
}
