//! Batch routing: post events grouped per target group, config and
//! membership events kept individual.

use std::collections::BTreeMap;

use atrarium_types::GroupId;

use crate::event::{ConfigEvent, GroupEvent, MembershipEvent, PostEvent};

/// All post events of one delivery cycle destined for a single group.
#[derive(Debug, Clone, PartialEq)]
pub struct PostBatch {
    pub group_id: GroupId,
    pub posts: Vec<PostEvent>,
}

/// Parsed events of one delivery cycle, ordered for dispatch.
///
/// Dispatch (in the server crate) makes one actor call per post and one
/// per config/membership event, fire-and-forget per event: a failure never
/// aborts the rest of the cycle.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RoutedEvents {
    pub post_batches: Vec<PostBatch>,
    pub configs: Vec<ConfigEvent>,
    pub memberships: Vec<MembershipEvent>,
}

impl RoutedEvents {
    /// Total number of routed events across all kinds.
    pub fn len(&self) -> usize {
        self.post_batches.iter().map(|b| b.posts.len()).sum::<usize>()
            + self.configs.len()
            + self.memberships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Groups parsed events by target group id.
///
/// Post batches come out keyed in group-id order; posts within a batch and
/// config/membership events keep their arrival order (delivery order makes
/// no correctness promises anyway — every downstream mutation is
/// idempotent or LWW).
pub fn route(events: Vec<GroupEvent>) -> RoutedEvents {
    let mut posts: BTreeMap<GroupId, Vec<PostEvent>> = BTreeMap::new();
    let mut routed = RoutedEvents::default();

    for event in events {
        match event {
            GroupEvent::Post(post) => {
                posts.entry(post.group_id.clone()).or_default().push(post);
            }
            GroupEvent::Config(config) => routed.configs.push(config),
            GroupEvent::Membership(membership) => routed.memberships.push(membership),
        }
    }

    routed.post_batches = posts
        .into_iter()
        .map(|(group_id, posts)| PostBatch { group_id, posts })
        .collect();

    routed
}
