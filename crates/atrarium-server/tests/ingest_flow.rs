//! End-to-end ingestion: JSONL relay dump through filter, router, and
//! dispatch into group actors, verified via feed skeleton reads.

use std::io::Write;
use std::sync::Arc;

use atrarium_db::{create_pool, run_migrations, DbSettings};
use atrarium_group::UpdateConfigParams;
use atrarium_server::{ingest::ingest_jsonl, GroupHost};
use atrarium_types::{GroupId, GroupStage, MemberRole};

fn setup_host() -> Arc<GroupHost> {
    let pool = create_pool(
        ":memory:",
        DbSettings {
            busy_timeout_ms: 5_000,
            pool_max_size: 1,
        },
    )
    .expect("failed to create pool");
    {
        let conn = pool.get().expect("failed to get connection");
        run_migrations(&conn).expect("failed to run migrations");
    }
    Arc::new(GroupHost::new(pool))
}

fn gid(s: &str) -> GroupId {
    GroupId::new(s).unwrap()
}

fn write_jsonl(lines: &[String]) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("events.jsonl");
    let mut f = std::fs::File::create(&path).expect("create file");
    for line in lines {
        writeln!(f, "{line}").expect("write line");
    }
    (dir, path)
}

fn membership_event(did: &str, group: &str, role: &str) -> String {
    format!(
        r#"{{"did":"{did}","time_us":1000,"operation":"create","collection":"net.atrarium.group.membership","rkey":"{group}","record":{{"community":"{group}","role":"{role}"}}}}"#
    )
}

fn native_post(did: &str, rkey: &str, group: &str, created_at: &str) -> String {
    format!(
        r#"{{"did":"{did}","time_us":2000,"operation":"create","collection":"net.atrarium.group.post","rkey":"{rkey}","record":{{"community":"{group}","text":"hello","createdAt":"{created_at}"}}}}"#
    )
}

#[tokio::test]
async fn full_cycle_from_dump_to_feed() {
    let host = setup_host();

    let (_dir, path) = write_jsonl(&[
        // Config arrives over the firehose.
        format!(
            r#"{{"did":"did:plc:alice","time_us":100,"operation":"create","collection":"net.atrarium.group.config","rkey":"a1b2c3d4","record":{{"name":"Rust circle","stage":"theme"}}}}"#
        ),
        membership_event("did:plc:alice", "a1b2c3d4", "owner"),
        membership_event("did:plc:bob", "a1b2c3d4", "member"),
        native_post("did:plc:bob", "p1", "a1b2c3d4", "2025-06-01T10:00:00Z"),
        native_post("did:plc:bob", "p2", "a1b2c3d4", "2025-06-01T11:00:00Z"),
        // Carol never joined; dual verification drops her post.
        native_post("did:plc:carol", "p3", "a1b2c3d4", "2025-06-01T12:00:00Z"),
        // Legacy post fans out via hashtag.
        format!(
            r#"{{"did":"did:plc:bob","time_us":3000,"operation":"create","collection":"app.bsky.feed.post","rkey":"p4","record":{{"text":"legacy #atrarium_a1b2c3d4 post","createdAt":"2025-06-01T13:00:00Z"}}}}"#
        ),
        // Noise the lightweight filter should shed.
        r#"{"did":"did:plc:noise","time_us":4000,"operation":"create","collection":"app.bsky.feed.like","rkey":"l1","record":{}}"#.to_string(),
    ]);

    let outcome = ingest_jsonl(host.clone(), &path).await.expect("ingest");
    assert_eq!(outcome.configs, 1);
    assert_eq!(outcome.memberships, 2);
    assert_eq!(outcome.indexed, 3, "two native + one legacy");
    assert_eq!(outcome.skipped, 1, "carol's non-member post");
    assert_eq!(outcome.failed, 0);

    let actor = host.actor(&gid("a1b2c3d4"));
    let actor = actor.lock().await;
    assert_eq!(actor.get_config().expect("config").name, "Rust circle");

    let feed = actor.get_feed_skeleton(None, None).expect("feed");
    assert_eq!(
        feed.items,
        [
            "at://did:plc:bob/app.bsky.feed.post/p4",
            "at://did:plc:bob/net.atrarium.group.post/p2",
            "at://did:plc:bob/net.atrarium.group.post/p1",
        ]
    );
}

#[tokio::test]
async fn redelivered_dump_is_idempotent() {
    let host = setup_host();

    let (_dir, path) = write_jsonl(&[
        membership_event("did:plc:bob", "a1b2c3d4", "member"),
        native_post("did:plc:bob", "p1", "a1b2c3d4", "2025-06-01T10:00:00Z"),
    ]);

    ingest_jsonl(host.clone(), &path).await.expect("first pass");
    ingest_jsonl(host.clone(), &path).await.expect("second pass");

    let actor = host.actor(&gid("a1b2c3d4"));
    let feed = actor.lock().await.get_feed_skeleton(None, None).expect("feed");
    assert_eq!(feed.items.len(), 1, "at-least-once delivery, exactly one row");
}

#[tokio::test]
async fn child_posts_aggregate_into_the_parent_only() {
    let host = setup_host();

    // Parent and two sibling children, wired up front.
    {
        let parent = host.actor(&gid("aaaa0001"));
        let parent = parent.lock().await;
        parent
            .update_config(&UpdateConfigParams {
                name: Some("parent".to_string()),
                stage: Some(GroupStage::Graduated),
                ..Default::default()
            })
            .unwrap();
        parent.add_member("did:plc:owner", MemberRole::Owner, 1).unwrap();
    }
    for child in ["bbbb0002", "cccc0003"] {
        let actor = host.actor(&gid(child));
        let actor = actor.lock().await;
        actor
            .update_config(&UpdateConfigParams {
                name: Some(format!("child {child}")),
                parent_group_id: Some(gid("aaaa0001")),
                ..Default::default()
            })
            .unwrap();
    }
    {
        let parent = host.actor(&gid("aaaa0001"));
        let parent = parent.lock().await;
        parent.add_child(&gid("bbbb0002"), "at://o/c/bbbb0002").unwrap();
        parent.add_child(&gid("cccc0003"), "at://o/c/cccc0003").unwrap();
    }

    let (_dir, path) = write_jsonl(&[
        membership_event("did:plc:bob", "bbbb0002", "member"),
        native_post("did:plc:bob", "p1", "bbbb0002", "2025-06-01T10:00:00Z"),
    ]);

    let outcome = ingest_jsonl(host.clone(), &path).await.expect("ingest");
    assert_eq!(outcome.indexed, 1);
    assert_eq!(outcome.aggregated, 1, "replayed into the parent");

    let uri = "at://did:plc:bob/net.atrarium.group.post/p1";

    let parent_feed = {
        let parent = host.actor(&gid("aaaa0001"));
        let feed = parent.lock().await.get_feed_skeleton(None, None).expect("feed");
        feed
    };
    assert_eq!(parent_feed.items, [uri]);

    let sibling_feed = {
        let sibling = host.actor(&gid("cccc0003"));
        let feed = sibling.lock().await.get_feed_skeleton(None, None).expect("feed");
        feed
    };
    assert!(
        sibling_feed.items.is_empty(),
        "aggregation is parent-reads-down only; siblings see nothing"
    );
}

#[tokio::test]
async fn config_event_cannot_rewrite_parent() {
    let host = setup_host();

    {
        let child = host.actor(&gid("bbbb0002"));
        let child = child.lock().await;
        child
            .update_config(&UpdateConfigParams {
                parent_group_id: Some(gid("aaaa0001")),
                ..Default::default()
            })
            .unwrap();
    }

    // A config record claiming a different parent is skipped, not applied.
    let (_dir, path) = write_jsonl(&[format!(
        r#"{{"did":"did:plc:x","time_us":100,"operation":"create","collection":"net.atrarium.group.config","rkey":"bbbb0002","record":{{"stage":"theme","parentGroup":"at://did:plc:x/net.atrarium.group.config/dddd0004"}}}}"#
    )]);

    let outcome = ingest_jsonl(host.clone(), &path).await.expect("ingest");
    assert_eq!(outcome.configs, 0);
    assert_eq!(outcome.skipped, 1);

    let child = host.actor(&gid("bbbb0002"));
    let parent = child.lock().await.get_parent().expect("parent");
    assert_eq!(parent.expect("still set").group_id, gid("aaaa0001"));
}
