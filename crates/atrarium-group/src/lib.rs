//! Per-group state ownership for the Atrarium platform.
//!
//! One [`GroupActor`] instance owns all derived state for one group:
//! config, membership, the post index with retention, the moderation log
//! with last-write-wins conflict resolution, hierarchy links, and the
//! emoji registry cache. The actor exposes the internal RPC surface the
//! rest of the system calls; the host (server crate) guarantees the
//! single-writer property by serializing calls per group.
//!
//! Every mutation is idempotent or an LWW merge, because the ingestion
//! pipeline delivers events at least once and out of order.

mod actor;
mod config;
mod cursor;
mod emoji;
mod error;
mod feed;
mod hierarchy;
mod membership;
mod moderation;
mod posts;
mod stage;

pub use actor::{GroupActor, ParentRef};
pub use config::{GroupConfig, UpdateConfigParams};
pub use cursor::{decode_cursor, encode_cursor};
pub use emoji::EmojiEntry;
pub use error::{ErrorKind, GroupError};
pub use feed::FeedSkeleton;
pub use hierarchy::ChildLink;
pub use membership::Member;
pub use moderation::{ModerationAction, ModerationLogEntry, ModerationOutcome};
pub use posts::{IndexPost, PostIndexEntry};

/// Current wall-clock time in microseconds since the epoch.
pub(crate) fn now_us() -> i64 {
    chrono::Utc::now().timestamp_micros()
}
