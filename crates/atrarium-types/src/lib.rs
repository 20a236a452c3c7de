//! Shared types, identifiers, and constants for the Atrarium platform.
//!
//! This crate provides the foundational types used across all Atrarium
//! crates: the validated group identifier, the stage/role/moderation
//! enums, and the constants that govern stage progression and feed
//! behavior.
//!
//! No crate in the workspace depends on anything *except* `atrarium-types`
//! for cross-cutting type definitions. This keeps the dependency graph
//! clean and prevents circular dependencies.

use serde::{Deserialize, Serialize};

/// Literal token present in every serialized event that references a group,
/// used by the lightweight ingestion filter. Covers both the `#atrarium_`
/// hashtag form and the `net.atrarium.*` collection names.
pub const FILTER_TOKEN: &str = "atrarium";

/// Prefix of the derived per-group hashtag (`#atrarium_<8 hex>`).
pub const HASHTAG_PREFIX: &str = "#atrarium_";

/// Active members required for the `theme -> community` transition.
pub const COMMUNITY_STAGE_MIN_MEMBERS: usize = 15;

/// Active members required for the `community -> graduated` transition.
pub const GRADUATED_STAGE_MIN_MEMBERS: usize = 50;

/// Default post retention window, in days, measured from the post's own
/// creation time.
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

/// Default page size for feed skeleton reads.
pub const FEED_DEFAULT_LIMIT: u32 = 50;

/// Maximum page size for feed skeleton reads.
pub const FEED_MAX_LIMIT: u32 = 100;

/// Collection (record type) names recognized by the ingestion parser.
pub mod collections {
    /// Native group-tagged post record.
    pub const GROUP_POST: &str = "net.atrarium.group.post";
    /// Legacy generic post record; group references are carried as hashtags.
    pub const BSKY_POST: &str = "app.bsky.feed.post";
    /// Group configuration record. The record key is the group id.
    pub const GROUP_CONFIG: &str = "net.atrarium.group.config";
    /// Membership intent record.
    pub const GROUP_MEMBERSHIP: &str = "net.atrarium.group.membership";
}

/// Error returned when a string is not a valid group id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid group id '{0}': expected 8 lowercase hex characters")]
pub struct InvalidGroupId(pub String);

/// A validated group identifier: exactly 8 lowercase hex characters.
///
/// Group ids appear in native post records, in the derived hashtag, and as
/// the record key of config records. Validation happens once, at parse
/// time; everything downstream can rely on the format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupId(String);

impl GroupId {
    /// Validates and wraps an id.
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidGroupId> {
        let id = id.into();
        if id.len() == 8 && id.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
            Ok(Self(id))
        } else {
            Err(InvalidGroupId(id))
        }
    }

    /// Generates a fresh random group id.
    pub fn generate() -> Self {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        Self(hex[..8].to_string())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the derived feed hashtag for this group (`#atrarium_<id>`).
    pub fn hashtag(&self) -> String {
        format!("{HASHTAG_PREFIX}{}", self.0)
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for GroupId {
    type Error = InvalidGroupId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl std::str::FromStr for GroupId {
    type Err = InvalidGroupId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl From<GroupId> for String {
    fn from(id: GroupId) -> Self {
        id.0
    }
}

/// Maturity stage of a group.
///
/// Every group starts at `Theme` and progresses upward through membership
/// thresholds. Only `Graduated` groups may parent children; only `Theme`
/// groups may be children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStage {
    /// Initial stage for every newly created group.
    Theme,
    /// Mid-tier stage, reachable at 15 active members.
    Community,
    /// Final stage, reachable at 50 active members. Required for parenting.
    Graduated,
}

impl GroupStage {
    /// Returns the canonical string label for this stage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Theme => "theme",
            Self::Community => "community",
            Self::Graduated => "graduated",
        }
    }

    /// The single permitted upward transition from this stage, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Theme => Some(Self::Community),
            Self::Community => Some(Self::Graduated),
            Self::Graduated => None,
        }
    }

    /// Active member count required to *enter* this stage via progression.
    pub fn member_threshold(self) -> Option<usize> {
        match self {
            Self::Theme => None,
            Self::Community => Some(COMMUNITY_STAGE_MIN_MEMBERS),
            Self::Graduated => Some(GRADUATED_STAGE_MIN_MEMBERS),
        }
    }
}

impl std::fmt::Display for GroupStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a known stage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown group stage '{0}'")]
pub struct ParseStageError(pub String);

impl std::str::FromStr for GroupStage {
    type Err = ParseStageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "theme" => Ok(Self::Theme),
            "community" => Ok(Self::Community),
            "graduated" => Ok(Self::Graduated),
            _ => Err(ParseStageError(s.to_string())),
        }
    }
}

/// Role of a member within a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    /// Group owner. Exactly one per group by convention; holds every
    /// capability including hierarchy and deletion.
    Owner,
    /// Can apply moderation actions.
    Moderator,
    /// Regular member; can post.
    Member,
}

impl MemberRole {
    /// Returns the canonical string label for this role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Moderator => "moderator",
            Self::Member => "member",
        }
    }

    /// Whether this role carries moderation authority.
    pub fn can_moderate(self) -> bool {
        matches!(self, Self::Owner | Self::Moderator)
    }
}

/// Error returned when a string is not a known role.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown member role '{0}'")]
pub struct ParseRoleError(pub String);

impl std::str::FromStr for MemberRole {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Self::Owner),
            "moderator" => Ok(Self::Moderator),
            "member" => Ok(Self::Member),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

/// Derived moderation status of an indexed post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationStatus {
    /// Visible in feed skeletons.
    Approved,
    /// Excluded from feed skeletons.
    Hidden,
}

impl ModerationStatus {
    /// Returns the canonical string label for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Hidden => "hidden",
        }
    }
}

impl std::str::FromStr for ModerationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(Self::Approved),
            "hidden" => Ok(Self::Hidden),
            _ => Err(format!("unknown moderation status '{s}'")),
        }
    }
}

/// Kind of a moderation action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationActionKind {
    /// Hide a post from feed skeletons. Target is a post at-URI.
    HidePost,
    /// Restore a hidden post. Target is a post at-URI.
    UnhidePost,
    /// Block a user; their posts are excluded from feeds. Target is a DID.
    BlockUser,
    /// Unblock a previously blocked user. Target is a DID.
    UnblockUser,
}

impl ModerationActionKind {
    /// Returns the canonical string label for this action.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HidePost => "hide_post",
            Self::UnhidePost => "unhide_post",
            Self::BlockUser => "block_user",
            Self::UnblockUser => "unblock_user",
        }
    }

    /// Whether this action targets a post URI (as opposed to a user DID).
    pub fn targets_post(self) -> bool {
        matches!(self, Self::HidePost | Self::UnhidePost)
    }
}

/// Error returned when a string is not a known moderation action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown moderation action '{0}'")]
pub struct ParseActionError(pub String);

impl std::str::FromStr for ModerationActionKind {
    type Err = ParseActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hide_post" => Ok(Self::HidePost),
            "unhide_post" => Ok(Self::UnhidePost),
            "block_user" => Ok(Self::BlockUser),
            "unblock_user" => Ok(Self::UnblockUser),
            _ => Err(ParseActionError(s.to_string())),
        }
    }
}

/// Closed set of reasons a moderator may attach to an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationReason {
    Spam,
    LowQuality,
    Duplicate,
    OffTopic,
    WrongCommunity,
    GuidelinesViolation,
    TermsViolation,
    Copyright,
    Harassment,
    Other,
}

impl ModerationReason {
    /// Returns the canonical string label for this reason.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Spam => "spam",
            Self::LowQuality => "low_quality",
            Self::Duplicate => "duplicate",
            Self::OffTopic => "off_topic",
            Self::WrongCommunity => "wrong_community",
            Self::GuidelinesViolation => "guidelines_violation",
            Self::TermsViolation => "terms_violation",
            Self::Copyright => "copyright",
            Self::Harassment => "harassment",
            Self::Other => "other",
        }
    }
}

impl std::str::FromStr for ModerationReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spam" => Ok(Self::Spam),
            "low_quality" => Ok(Self::LowQuality),
            "duplicate" => Ok(Self::Duplicate),
            "off_topic" => Ok(Self::OffTopic),
            "wrong_community" => Ok(Self::WrongCommunity),
            "guidelines_violation" => Ok(Self::GuidelinesViolation),
            "terms_violation" => Ok(Self::TermsViolation),
            "copyright" => Ok(Self::Copyright),
            "harassment" => Ok(Self::Harassment),
            "other" => Ok(Self::Other),
            _ => Err(format!("unknown moderation reason '{s}'")),
        }
    }
}
