//! Feed skeleton reads: reverse-chronological post URIs with moderation
//! and block filtering, paginated by opaque cursor.

use atrarium_types::{GroupId, FEED_DEFAULT_LIMIT, FEED_MAX_LIMIT};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::cursor::{decode_cursor, encode_cursor};
use crate::error::GroupError;

/// One page of post URIs, newest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedSkeleton {
    pub items: Vec<String>,
    /// Present only when a further page exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Reads one feed page.
///
/// Ordering is `created_at_us DESC, uri DESC` — strict reverse
/// chronology with the URI as a deterministic tie-break. Excluded rows:
/// hidden entries, entries whose author is blocked in this group, and
/// aggregated entries whose author is blocked in the source child. The
/// scan is bounded by the page size; it never walks the whole index.
pub fn feed_skeleton(
    conn: &Connection,
    group_id: &GroupId,
    limit: Option<u32>,
    cursor: Option<&str>,
) -> Result<FeedSkeleton, GroupError> {
    let limit = match limit {
        None => FEED_DEFAULT_LIMIT,
        Some(l) if (1..=FEED_MAX_LIMIT).contains(&l) => l,
        Some(l) => {
            return Err(GroupError::Validation(format!(
                "limit must be between 1 and {FEED_MAX_LIMIT}, got {l}"
            )))
        }
    };

    let (cursor_ts, cursor_uri) = match cursor {
        Some(c) => {
            let (ts, uri) = decode_cursor(c)?;
            (Some(ts), Some(uri))
        }
        None => (None, None),
    };

    // Fetch one row beyond the page to learn whether a next page exists
    // without a second query.
    let mut stmt = conn.prepare(
        "SELECT p.created_at_us, p.uri
         FROM post_index p
         WHERE p.group_id = ?1
           AND p.moderation_status = 'approved'
           AND NOT EXISTS (
               SELECT 1 FROM user_blocks b
               WHERE b.group_id = ?1 AND b.did = p.author_did AND b.blocked = 1)
           AND (p.source_group_id IS NULL OR NOT EXISTS (
               SELECT 1 FROM user_blocks b2
               WHERE b2.group_id = p.source_group_id AND b2.did = p.author_did
                 AND b2.blocked = 1))
           AND (?2 IS NULL
                OR p.created_at_us < ?2
                OR (p.created_at_us = ?2 AND p.uri < ?3))
         ORDER BY p.created_at_us DESC, p.uri DESC
         LIMIT ?4",
    )?;

    let rows = stmt.query_map(
        params![group_id.as_str(), cursor_ts, cursor_uri, limit as i64 + 1],
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
    )?;

    let mut page: Vec<(i64, String)> = Vec::new();
    for row in rows {
        page.push(row?);
    }

    let has_more = page.len() > limit as usize;
    page.truncate(limit as usize);

    let cursor = if has_more {
        page.last()
            .map(|(ts, uri)| encode_cursor(*ts, uri))
    } else {
        None
    };

    Ok(FeedSkeleton {
        items: page.into_iter().map(|(_, uri)| uri).collect(),
        cursor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership;
    use crate::posts::{index_post, IndexPost};
    use atrarium_types::MemberRole;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        atrarium_db::run_migrations(&conn).expect("migrations");
        conn
    }

    fn gid() -> GroupId {
        GroupId::new("a1b2c3d4").unwrap()
    }

    fn seed_member(conn: &Connection, id: &GroupId, did: &str) {
        membership::upsert_member(conn, id, did, MemberRole::Member, 1, true).unwrap();
    }

    fn seed_post(conn: &Connection, id: &GroupId, uri: &str, created_at_us: i64) {
        index_post(
            conn,
            id,
            &IndexPost {
                uri: uri.to_string(),
                author_did: "did:plc:author".to_string(),
                created_at_us,
            },
            None,
        )
        .unwrap();
    }

    #[test]
    fn newest_first_with_uri_tie_break() {
        let conn = setup_db();
        let id = gid();
        seed_member(&conn, &id, "did:plc:author");

        seed_post(&conn, &id, "at://a/p/1", 100);
        seed_post(&conn, &id, "at://a/p/3", 300);
        seed_post(&conn, &id, "at://a/p/2a", 200);
        seed_post(&conn, &id, "at://a/p/2b", 200);

        let feed = feed_skeleton(&conn, &id, None, None).expect("feed");
        assert_eq!(
            feed.items,
            ["at://a/p/3", "at://a/p/2b", "at://a/p/2a", "at://a/p/1"]
        );
        assert!(feed.cursor.is_none(), "single page");
    }

    #[test]
    fn pagination_walks_every_row_exactly_once() {
        let conn = setup_db();
        let id = gid();
        seed_member(&conn, &id, "did:plc:author");

        for i in 0..7 {
            seed_post(&conn, &id, &format!("at://a/p/{i}"), 100 + i);
        }

        let mut seen = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let feed =
                feed_skeleton(&conn, &id, Some(3), cursor.as_deref()).expect("page");
            seen.extend(feed.items);
            match feed.cursor {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }

        assert_eq!(seen.len(), 7);
        let mut deduped = seen.clone();
        deduped.dedup();
        assert_eq!(deduped, seen, "no row repeats across pages");
    }

    #[test]
    fn exact_page_boundary_omits_cursor() {
        let conn = setup_db();
        let id = gid();
        seed_member(&conn, &id, "did:plc:author");
        seed_post(&conn, &id, "at://a/p/1", 100);
        seed_post(&conn, &id, "at://a/p/2", 200);

        let feed = feed_skeleton(&conn, &id, Some(2), None).expect("feed");
        assert_eq!(feed.items.len(), 2);
        assert!(feed.cursor.is_none(), "no phantom next page");
    }

    #[test]
    fn limit_validation() {
        let conn = setup_db();
        let id = gid();
        assert!(matches!(
            feed_skeleton(&conn, &id, Some(0), None).unwrap_err(),
            GroupError::Validation(_)
        ));
        assert!(matches!(
            feed_skeleton(&conn, &id, Some(101), None).unwrap_err(),
            GroupError::Validation(_)
        ));
    }

    #[test]
    fn malformed_cursor_is_invalid_cursor_not_empty_page() {
        let conn = setup_db();
        let id = gid();
        let err = feed_skeleton(&conn, &id, None, Some("%%%")).unwrap_err();
        assert!(matches!(err, GroupError::InvalidCursor(_)));
    }

    #[test]
    fn hidden_posts_are_excluded() {
        let conn = setup_db();
        let id = gid();
        seed_member(&conn, &id, "did:plc:author");
        seed_post(&conn, &id, "at://a/p/1", 100);
        seed_post(&conn, &id, "at://a/p/2", 200);

        conn.execute(
            "UPDATE post_index SET moderation_status = 'hidden' WHERE uri = 'at://a/p/2'",
            [],
        )
        .unwrap();

        let feed = feed_skeleton(&conn, &id, None, None).expect("feed");
        assert_eq!(feed.items, ["at://a/p/1"]);
    }

    #[test]
    fn blocked_author_is_excluded() {
        let conn = setup_db();
        let id = gid();
        seed_member(&conn, &id, "did:plc:author");
        seed_post(&conn, &id, "at://a/p/1", 100);

        conn.execute(
            "INSERT INTO user_blocks (group_id, did, blocked, effective_us)
             VALUES ('a1b2c3d4', 'did:plc:author', 1, 1)",
            [],
        )
        .unwrap();

        let feed = feed_skeleton(&conn, &id, None, None).expect("feed");
        assert!(feed.items.is_empty());
    }

    #[test]
    fn aggregated_row_respects_source_child_block_list() {
        let conn = setup_db();
        let parent = gid();
        let child = GroupId::new("deadbeef").unwrap();

        index_post(
            &conn,
            &parent,
            &IndexPost {
                uri: "at://a/p/1".to_string(),
                author_did: "did:plc:author".to_string(),
                created_at_us: 100,
            },
            Some(&child),
        )
        .unwrap();

        let feed = feed_skeleton(&conn, &parent, None, None).expect("feed");
        assert_eq!(feed.items.len(), 1, "visible before the child block");

        // Blocked in the child, not in the parent.
        conn.execute(
            "INSERT INTO user_blocks (group_id, did, blocked, effective_us)
             VALUES ('deadbeef', 'did:plc:author', 1, 1)",
            [],
        )
        .unwrap();

        let feed = feed_skeleton(&conn, &parent, None, None).expect("feed");
        assert!(feed.items.is_empty(), "child block shadows the parent view");
    }
}
