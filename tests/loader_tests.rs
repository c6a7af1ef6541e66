//! 加载器集成测试

use rankgraph::{
    error::{ConsistencyWarning, GraphError},
    graph::GraphLoader,
    models::{GraphSnapshot, GroupId, LinkId, RankId},
};
use uuid::Uuid;

mod common;
use common::*;

fn two_groups() -> GraphSnapshot {
    let mut ranks = default_rank_rows(1);
    ranks.extend(default_rank_rows(2));
    GraphSnapshot {
        permissions: vec![permission_row(0, "BUILD"), permission_row(1, "DOORS")],
        groups: vec![group_row(1, "Alpha"), group_row(2, "Beta")],
        ranks,
        ..GraphSnapshot::default()
    }
}

#[test]
fn test_clean_snapshot_loads_everything() {
    let owner = Uuid::new_v4();
    let mut snapshot = two_groups();
    snapshot.memberships = vec![membership_row(1, owner, 0)];
    snapshot.grants = vec![grant_row(1, 0, 0)];
    snapshot.links = vec![link_row(7, (1, 0), (2, 1))];

    let (registry, report) = GraphLoader::default().load(&snapshot);

    assert!(report.is_clean());
    assert_eq!(report.groups, 2);
    assert_eq!(report.links, 1);
    assert_eq!(report.rows, snapshot.row_count());
    assert!(registry.has_permission(GroupId(1), &owner, "BUILD"));
    assert_eq!(registry.held_ranks(GroupId(2), &owner), vec![RankId(1)]);
}

#[test]
fn test_membership_with_unknown_rank_is_dropped() {
    let good = Uuid::new_v4();
    let bad = Uuid::new_v4();
    let mut snapshot = two_groups();
    snapshot.memberships = vec![membership_row(1, good, 3), membership_row(1, bad, 99)];

    let (registry, report) = GraphLoader::default().load(&snapshot);

    assert_eq!(
        report.warnings,
        vec![ConsistencyWarning::UnknownMemberRank {
            group: GroupId(1),
            principal: bad,
            rank: RankId(99),
        }]
    );
    let alpha = registry.resolve(GroupId(1)).unwrap();
    assert_eq!(alpha.member_rank(&good), Some(RankId(3)));
    assert!(!alpha.is_member(&bad));
    assert_eq!(registry.group_count(), 2);
}

#[test]
fn test_orphan_ranks_are_dropped() {
    let mut snapshot = two_groups();
    snapshot.ranks.push(rank_row(1, 10, "LOST", Some(11)));
    snapshot.ranks.push(rank_row(1, 11, "ALSO_LOST", Some(10)));
    snapshot.ranks.push(rank_row(9, 0, "NOBODY", None));

    let (registry, report) = GraphLoader::default().load(&snapshot);

    assert_eq!(report.count("orphan_rank"), 2);
    assert_eq!(report.count("rank_without_group"), 1);
    assert_eq!(registry.resolve(GroupId(1)).unwrap().ranks().len(), 6);
}

#[test]
fn test_parentless_rank_attaches_to_root() {
    let mut snapshot = two_groups();
    snapshot.ranks.push(rank_row(2, 6, "GUESTS", None));

    let (registry, report) = GraphLoader::default().load(&snapshot);

    assert!(report.is_clean());
    let guests = registry.resolve(GroupId(2)).unwrap().ranks().rank(RankId(6)).unwrap();
    assert_eq!(guests.parent, Some(RankId(0)));
}

#[test]
fn test_duplicate_group_name_keeps_first() {
    let mut snapshot = two_groups();
    snapshot.groups.push(group_row(3, "ALPHA"));
    snapshot.ranks.extend(default_rank_rows(3));

    let (registry, report) = GraphLoader::default().load(&snapshot);

    assert_eq!(report.count("duplicate_group_name"), 1);
    assert_eq!(report.count("rank_without_group"), 6);
    assert_eq!(registry.resolve_by_name("alpha").unwrap().id(), GroupId(1));
    assert!(registry.resolve(GroupId(3)).is_none());
}

#[test]
fn test_merge_chain_is_flattened() {
    let mut snapshot = two_groups();
    // 5 -> 4 -> 1，4 与 5 都已不存在
    snapshot.merges = vec![merge_row(5, 4), merge_row(4, 1), merge_row(6, 2)];

    let (registry, report) = GraphLoader::default().load(&snapshot);

    assert!(report.is_clean());
    assert_eq!(report.resolvable_ids, 5);
    let mut redirects: Vec<_> = registry.redirects().collect();
    redirects.sort();
    assert_eq!(
        redirects,
        vec![
            (GroupId(4), GroupId(1)),
            (GroupId(5), GroupId(1)),
            (GroupId(6), GroupId(2)),
        ]
    );
}

#[test]
fn test_bad_merge_rows_are_dropped() {
    let mut snapshot = two_groups();
    snapshot.merges = vec![merge_row(2, 1), merge_row(8, 9), merge_row(10, 11), merge_row(11, 10)];

    let (registry, report) = GraphLoader::default().load(&snapshot);

    assert_eq!(report.count("live_group_redirected"), 1);
    assert_eq!(report.count("stale_redirect"), 3);
    assert_eq!(registry.resolve(GroupId(2)).unwrap().id(), GroupId(2));
    assert!(registry.resolve(GroupId(10)).is_none());
}

#[test]
fn test_links_resolve_through_merged_ids() {
    let principal = Uuid::new_v4();
    let mut snapshot = two_groups();
    snapshot.memberships = vec![membership_row(1, principal, 3)];
    snapshot.merges = vec![merge_row(4, 2)];
    snapshot.links = vec![
        link_row(1, (1, 3), (4, 2)),
        link_row(2, (1, 3), (2, 2)),
        link_row(3, (1, 3), (12, 2)),
        link_row(4, (1, 42), (2, 2)),
    ];

    let (registry, report) = GraphLoader::default().load(&snapshot);

    assert_eq!(report.links, 1);
    assert_eq!(
        report.warnings,
        vec![
            ConsistencyWarning::DuplicateLink { link: LinkId(2) },
            ConsistencyWarning::LinkWithoutGroup {
                link: LinkId(3),
                group: GroupId(12),
            },
            ConsistencyWarning::UnknownLinkRank {
                link: LinkId(4),
                group: GroupId(1),
                rank: RankId(42),
            },
        ]
    );
    let link = registry.link(LinkId(1)).unwrap();
    assert_eq!(link.target.group, GroupId(2));
    assert_eq!(registry.held_ranks(GroupId(4), &principal), vec![RankId(2)]);
}

#[test]
fn test_invitations_and_grants_validated() {
    let principal = Uuid::new_v4();
    let mut snapshot = two_groups();
    snapshot.grants = vec![grant_row(1, 2, 1), grant_row(1, 77, 1), grant_row(3, 0, 0)];
    snapshot.invitations = vec![
        invitation_row(1, principal, 3),
        invitation_row(2, principal, 77),
        invitation_row(5, principal, 0),
    ];

    let (registry, report) = GraphLoader::default().load(&snapshot);

    assert_eq!(report.count("unknown_grant_rank"), 1);
    assert_eq!(report.count("grant_without_group"), 1);
    assert_eq!(report.count("unknown_invitation_rank"), 1);
    assert_eq!(report.count("invitation_without_group"), 1);
    let alpha = registry.resolve(GroupId(1)).unwrap();
    assert_eq!(alpha.invitation(&principal).unwrap().rank, RankId(3));
    assert!(!alpha.is_member(&principal));
}

#[test]
fn test_new_ids_continue_after_loaded_ids() {
    let mut snapshot = two_groups();
    snapshot.merges = vec![merge_row(40, 2)];
    snapshot.links = vec![link_row(15, (1, 0), (2, 0))];

    let (mut registry, _) = GraphLoader::default().load(&snapshot);

    let created = registry.create_group("Gamma").unwrap().id();
    assert_eq!(created, GroupId(41));
    let link = registry.add_link(GroupId(1), RankId(1), GroupId(2), RankId(1)).unwrap();
    assert_eq!(link.id, LinkId(16));
    let permission = registry.register_permission("FURNACES").unwrap();
    assert_eq!(permission.id.0, 2);
}

#[test]
fn test_duplicate_permission_rows() {
    let mut snapshot = two_groups();
    snapshot.permissions.push(permission_row(1, "OTHER"));
    snapshot.permissions.push(permission_row(5, "BUILD"));

    let (registry, report) = GraphLoader::default().load(&snapshot);

    assert_eq!(report.count("duplicate_permission"), 2);
    assert_eq!(registry.catalog().len(), 2);
}

#[test]
fn test_max_ids_load_without_overflow() {
    let snapshot = GraphSnapshot {
        permissions: vec![permission_row(i32::MAX, "BUILD")],
        groups: vec![group_row(i32::MAX, "Edge")],
        ranks: vec![
            rank_row(i32::MAX, 0, "OWNER", None),
            rank_row(i32::MAX, i32::MAX, "LAST", Some(0)),
        ],
        links: vec![link_row(i32::MAX, (i32::MAX, 0), (i32::MAX, i32::MAX))],
        ..GraphSnapshot::default()
    };

    let (mut registry, report) = GraphLoader::default().load(&snapshot);

    assert_eq!(report.groups, 1);
    assert_eq!(report.links, 1);
    assert_eq!(
        report.warnings,
        vec![
            ConsistencyWarning::IdSpaceExhausted { space: "permission", group: None },
            ConsistencyWarning::IdSpaceExhausted { space: "group", group: None },
            ConsistencyWarning::IdSpaceExhausted { space: "link", group: None },
            ConsistencyWarning::IdSpaceExhausted {
                space: "rank",
                group: Some(GroupId(i32::MAX)),
            },
        ]
    );

    assert!(matches!(
        registry.create_group("Another"),
        Err(GraphError::IdSpaceExhausted("group"))
    ));
    assert!(matches!(
        registry.register_permission("DOORS"),
        Err(GraphError::IdSpaceExhausted("permission"))
    ));
    assert!(matches!(
        registry
            .group_mut(GroupId(i32::MAX))
            .unwrap()
            .create_rank("GUESTS", Some(RankId(0))),
        Err(GraphError::IdSpaceExhausted("rank"))
    ));
    assert!(matches!(
        registry.add_link(GroupId(i32::MAX), RankId(i32::MAX), GroupId(i32::MAX), RankId(0)),
        Err(GraphError::IdSpaceExhausted("link"))
    ));
}
