//! Stage progression: the three-tier maturity state machine.
//!
//! `theme -> community -> graduated`, gated on active-membership
//! thresholds. Anything other than the single next step — skipping,
//! re-requesting the current stage, downgrading — is structurally
//! invalid, which is a different rejection than a threshold shortfall.

use atrarium_types::{GroupId, GroupStage};
use rusqlite::{params, Connection};

use crate::config::{self, GroupConfig};
use crate::error::GroupError;
use crate::hierarchy;
use crate::membership;

/// Attempts the requested stage transition.
///
/// On the `theme -> community` step the inherited-moderator cache is
/// cleared in the same call: parent-owner authority over the child ends
/// the moment the child outgrows `theme`, and the set is never re-derived.
///
/// The parent reference is untouched by any transition.
pub fn progress_stage(
    conn: &Connection,
    group_id: &GroupId,
    requested: GroupStage,
) -> Result<GroupConfig, GroupError> {
    let cfg = config::get_config(conn, group_id)?;

    if cfg.stage.next() != Some(requested) {
        return Err(GroupError::InvalidStageTransition {
            from: cfg.stage,
            to: requested,
        });
    }

    let member_count = membership::active_member_count(conn, group_id)?;
    // next() never yields Theme, so the requested stage has a threshold.
    let Some(required) = requested.member_threshold() else {
        return Err(GroupError::InvalidStageTransition {
            from: cfg.stage,
            to: requested,
        });
    };

    if member_count < required {
        return Err(GroupError::ThresholdNotMet {
            current_stage: cfg.stage,
            requested_stage: requested,
            member_count,
            required,
        });
    }

    conn.execute(
        "UPDATE groups SET stage = ?1, updated_at = datetime('now') WHERE group_id = ?2",
        params![requested.as_str(), group_id.as_str()],
    )?;

    if cfg.stage == GroupStage::Theme {
        let cleared = hierarchy::clear_inherited_moderators(conn, group_id)?;
        if cleared > 0 {
            tracing::info!(
                group = %group_id,
                cleared,
                "inherited moderator authority expired on stage upgrade"
            );
        }
    }

    tracing::info!(
        group = %group_id,
        from = cfg.stage.as_str(),
        to = requested.as_str(),
        member_count,
        "group stage progressed"
    );

    config::get_config(conn, group_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{update_config, UpdateConfigParams};
    use atrarium_types::MemberRole;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        atrarium_db::run_migrations(&conn).expect("migrations");
        conn
    }

    fn gid() -> GroupId {
        GroupId::new("a1b2c3d4").unwrap()
    }

    fn seed_group(conn: &Connection) {
        update_config(conn, &gid(), &UpdateConfigParams::default()).expect("seed");
    }

    fn seed_members(conn: &Connection, count: usize) {
        for i in 0..count {
            membership::upsert_member(
                conn,
                &gid(),
                &format!("did:plc:member{i}"),
                if i == 0 {
                    MemberRole::Owner
                } else {
                    MemberRole::Member
                },
                i as i64,
                true,
            )
            .expect("seed member");
        }
    }

    #[test]
    fn fourteen_members_reject_fifteen_accept() {
        let conn = setup_db();
        seed_group(&conn);
        seed_members(&conn, 14);

        let err = progress_stage(&conn, &gid(), GroupStage::Community).unwrap_err();
        match err {
            GroupError::ThresholdNotMet {
                member_count,
                required,
                ..
            } => {
                assert_eq!(member_count, 14);
                assert_eq!(required, 15);
            }
            other => panic!("expected ThresholdNotMet, got {other:?}"),
        }

        seed_members(&conn, 15);
        let cfg = progress_stage(&conn, &gid(), GroupStage::Community).expect("upgrade");
        assert_eq!(cfg.stage, GroupStage::Community);
    }

    #[test]
    fn forty_nine_members_reject_fifty_accept() {
        let conn = setup_db();
        seed_group(&conn);
        seed_members(&conn, 49);
        progress_stage(&conn, &gid(), GroupStage::Community).expect("first upgrade");

        let err = progress_stage(&conn, &gid(), GroupStage::Graduated).unwrap_err();
        assert!(matches!(
            err,
            GroupError::ThresholdNotMet {
                member_count: 49,
                required: 50,
                ..
            }
        ));

        seed_members(&conn, 50);
        let cfg = progress_stage(&conn, &gid(), GroupStage::Graduated).expect("upgrade");
        assert_eq!(cfg.stage, GroupStage::Graduated);
    }

    #[test]
    fn skip_same_stage_and_downgrade_are_structurally_invalid() {
        let conn = setup_db();
        seed_group(&conn);
        seed_members(&conn, 50);

        // Skip.
        assert!(matches!(
            progress_stage(&conn, &gid(), GroupStage::Graduated).unwrap_err(),
            GroupError::InvalidStageTransition { .. }
        ));
        // Same stage.
        assert!(matches!(
            progress_stage(&conn, &gid(), GroupStage::Theme).unwrap_err(),
            GroupError::InvalidStageTransition { .. }
        ));

        progress_stage(&conn, &gid(), GroupStage::Community).expect("upgrade");

        // Downgrade.
        assert!(matches!(
            progress_stage(&conn, &gid(), GroupStage::Theme).unwrap_err(),
            GroupError::InvalidStageTransition { .. }
        ));
    }

    #[test]
    fn inactive_members_do_not_count() {
        let conn = setup_db();
        seed_group(&conn);
        seed_members(&conn, 15);
        conn.execute(
            "UPDATE memberships SET active = 0 WHERE did = 'did:plc:member0'",
            [],
        )
        .unwrap();

        assert!(matches!(
            progress_stage(&conn, &gid(), GroupStage::Community).unwrap_err(),
            GroupError::ThresholdNotMet {
                member_count: 14,
                ..
            }
        ));
    }

    #[test]
    fn leaving_theme_clears_inherited_moderators() {
        let conn = setup_db();
        seed_group(&conn);
        seed_members(&conn, 15);
        hierarchy::set_inherited_moderators(&conn, &gid(), &["did:plc:parent".into()]).unwrap();

        progress_stage(&conn, &gid(), GroupStage::Community).expect("upgrade");
        assert!(hierarchy::list_inherited_moderators(&conn, &gid())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn parent_reference_survives_progression() {
        let conn = setup_db();
        update_config(
            &conn,
            &gid(),
            &UpdateConfigParams {
                parent_group_id: Some(GroupId::new("deadbeef").unwrap()),
                parent_group_uri: Some("at://p/net.atrarium.group.config/deadbeef".into()),
                ..Default::default()
            },
        )
        .unwrap();
        seed_members(&conn, 15);

        let cfg = progress_stage(&conn, &gid(), GroupStage::Community).expect("upgrade");
        assert_eq!(
            cfg.parent_group_id,
            Some(GroupId::new("deadbeef").unwrap())
        );
        assert_eq!(
            cfg.parent_group_uri.as_deref(),
            Some("at://p/net.atrarium.group.config/deadbeef")
        );
    }
}
