//! Graph loader (从存储行重建权限图)
//!
//! 启动时执行一次。存储中的数据可能在多次 schema 演进中积累了不一致，
//! 因此加载器尽量容错：任何无法挂接的行都会被丢弃并记录为
//! [`ConsistencyWarning`]，加载本身不会失败。

use super::{GraphLimits, Group, GroupRegistry};
use crate::{
    error::{ConsistencyWarning, GraphError},
    models::{GraphSnapshot, GroupId, GroupLink, RankId, RankRef, ROOT_RANK_ID},
};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// 加载结果摘要
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// 被丢弃或被修正的行
    pub warnings: Vec<ConsistencyWarning>,
    pub rows: usize,
    pub permissions: usize,
    pub groups: usize,
    pub resolvable_ids: usize,
    pub links: usize,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// 指定种类的警告数量
    pub fn count(&self, kind: &str) -> usize {
        self.warnings.iter().filter(|w| w.kind() == kind).count()
    }

    fn warn(&mut self, warning: ConsistencyWarning) {
        tracing::warn!(kind = warning.kind(), detail = ?warning, "Inconsistent row in storage");
        metrics::counter!("rankgraph.load.dropped_rows", "kind" => warning.kind()).increment(1);
        self.warnings.push(warning);
    }
}

/// 尚未挂接到树上的 rank 行
struct PendingRank<'a> {
    name: &'a str,
    parent: Option<RankId>,
}

pub struct GraphLoader {
    limits: GraphLimits,
}

impl Default for GraphLoader {
    fn default() -> Self {
        Self::new(GraphLimits::default())
    }
}

impl GraphLoader {
    pub fn new(limits: GraphLimits) -> Self {
        Self { limits }
    }

    /// 从快照构建注册表
    pub fn load(&self, snapshot: &GraphSnapshot) -> (GroupRegistry, LoadReport) {
        let mut registry = GroupRegistry::new(self.limits);
        let mut report = LoadReport {
            rows: snapshot.row_count(),
            ..LoadReport::default()
        };

        self.load_permissions(snapshot, &mut registry, &mut report);
        let shells = self.load_group_shells(snapshot, &mut registry, &mut report);
        let pending = self.collect_ranks(snapshot, &shells, &mut report);
        self.build_rank_trees(shells, pending, &mut registry, &mut report);
        self.attach_members(snapshot, &mut registry, &mut report);
        self.attach_grants(snapshot, &mut registry, &mut report);
        self.apply_merges(snapshot, &mut registry, &mut report);
        self.attach_links(snapshot, &mut registry, &mut report);
        self.attach_invitations(snapshot, &mut registry, &mut report);
        for (space, group) in registry.exhausted_id_spaces() {
            report.warn(ConsistencyWarning::IdSpaceExhausted { space, group });
        }

        report.permissions = registry.catalog().len();
        report.groups = registry.group_count();
        report.resolvable_ids = registry.resolvable_id_count();
        report.links = registry.link_count();

        metrics::gauge!("rankgraph.groups.live").set(report.groups as f64);
        tracing::info!(
            groups = report.groups,
            ids = report.resolvable_ids,
            links = report.links,
            permissions = report.permissions,
            dropped = report.warnings.len(),
            "Loaded group graph from storage"
        );

        (registry, report)
    }

    fn load_permissions(
        &self,
        snapshot: &GraphSnapshot,
        registry: &mut GroupRegistry,
        report: &mut LoadReport,
    ) {
        for row in &snapshot.permissions {
            if !registry.catalog_mut().insert_loaded(row.perm_id, &row.name) {
                report.warn(ConsistencyWarning::DuplicatePermission {
                    id: row.perm_id,
                    name: row.name.clone(),
                });
            }
        }
    }

    /// 第一步：组外壳与组名索引，重复 id 或组名只保留第一个
    fn load_group_shells(
        &self,
        snapshot: &GraphSnapshot,
        registry: &mut GroupRegistry,
        report: &mut LoadReport,
    ) -> BTreeMap<GroupId, Group> {
        let mut shells = BTreeMap::new();
        let mut names = HashSet::new();
        for row in &snapshot.groups {
            // 被丢弃的 id 仍然保留，新建组不会与存储中的主键冲突
            registry.reserve_group_id(row.group_id);

            if shells.contains_key(&row.group_id) {
                report.warn(ConsistencyWarning::DuplicateGroupId {
                    group: row.group_id,
                });
                continue;
            }
            if !names.insert(row.group_name.to_lowercase()) {
                report.warn(ConsistencyWarning::DuplicateGroupName {
                    group: row.group_id,
                    name: row.group_name.clone(),
                });
                continue;
            }

            let mut group = Group::new(row.group_id, &row.group_name, self.limits);
            if let Some(meta) = &row.meta_data {
                group.set_metadata(meta.clone());
            }
            shells.insert(row.group_id, group);
        }
        shells
    }

    /// 第二步：按组收集尚未挂接的 rank
    fn collect_ranks<'a>(
        &self,
        snapshot: &'a GraphSnapshot,
        shells: &BTreeMap<GroupId, Group>,
        report: &mut LoadReport,
    ) -> HashMap<GroupId, BTreeMap<RankId, PendingRank<'a>>> {
        let mut pending: HashMap<GroupId, BTreeMap<RankId, PendingRank<'a>>> = HashMap::new();
        for row in &snapshot.ranks {
            if !shells.contains_key(&row.group_id) {
                report.warn(ConsistencyWarning::RankWithoutGroup {
                    group: row.group_id,
                    rank: row.rank_id,
                });
                continue;
            }
            let ranks = pending.entry(row.group_id).or_default();
            if ranks.contains_key(&row.rank_id) {
                report.warn(ConsistencyWarning::DuplicateRank {
                    group: row.group_id,
                    rank: row.rank_id,
                });
                continue;
            }
            ranks.insert(
                row.rank_id,
                PendingRank {
                    name: &row.rank_name,
                    parent: row.parent_rank_id,
                },
            );
        }
        pending
    }

    /// 第三步：从根开始广度优先挂接子节点，不可达的 rank 作为孤儿丢弃
    fn build_rank_trees(
        &self,
        shells: BTreeMap<GroupId, Group>,
        mut pending: HashMap<GroupId, BTreeMap<RankId, PendingRank<'_>>>,
        registry: &mut GroupRegistry,
        report: &mut LoadReport,
    ) {
        for (group_id, mut group) in shells {
            let ranks = pending.remove(&group_id).unwrap_or_default();
            let Some(root) = pick_root(group_id, &ranks, report) else {
                report.warn(ConsistencyWarning::GroupWithoutRoot { group: group_id });
                continue;
            };

            // 没有父节点的非根 rank 直接挂在根下
            let mut children: HashMap<RankId, Vec<RankId>> = HashMap::new();
            for (id, rank) in &ranks {
                if *id != root {
                    children.entry(rank.parent.unwrap_or(root)).or_default().push(*id);
                }
            }

            let tree = group.ranks_mut();
            tree.insert_loaded(root, ranks[&root].name, None);
            let mut queue = VecDeque::from([root]);
            while let Some(parent) = queue.pop_front() {
                for child in children.remove(&parent).unwrap_or_default() {
                    if tree.insert_loaded(child, ranks[&child].name, Some(parent)) {
                        queue.push_back(child);
                    } else {
                        report.warn(ConsistencyWarning::DuplicateRankName {
                            group: group_id,
                            rank: child,
                            name: ranks[&child].name.to_string(),
                        });
                    }
                }
            }

            let duplicates: HashSet<RankId> = report
                .warnings
                .iter()
                .filter_map(|warning| match warning {
                    ConsistencyWarning::DuplicateRankName { group, rank, .. } if *group == group_id => {
                        Some(*rank)
                    }
                    _ => None,
                })
                .collect();
            for id in ranks.keys() {
                if !tree.contains(*id) && !duplicates.contains(id) {
                    report.warn(ConsistencyWarning::OrphanRank {
                        group: group_id,
                        rank: *id,
                    });
                }
            }

            registry.insert_loaded_group(group);
        }
    }

    /// 第四步：成员
    fn attach_members(
        &self,
        snapshot: &GraphSnapshot,
        registry: &mut GroupRegistry,
        report: &mut LoadReport,
    ) {
        for row in &snapshot.memberships {
            let Ok(group) = registry.group_mut(row.group_id) else {
                report.warn(ConsistencyWarning::MemberWithoutGroup {
                    group: row.group_id,
                    principal: row.member_id,
                });
                continue;
            };
            match group.add_member(row.member_id, row.rank_id) {
                Ok(()) => {}
                Err(GraphError::MemberExists { .. }) => {
                    report.warn(ConsistencyWarning::DuplicateMember {
                        group: row.group_id,
                        principal: row.member_id,
                    })
                }
                Err(_) => report.warn(ConsistencyWarning::UnknownMemberRank {
                    group: row.group_id,
                    principal: row.member_id,
                    rank: row.rank_id,
                }),
            }
        }
    }

    /// 第五步：权限授予，重复授予是幂等的
    fn attach_grants(
        &self,
        snapshot: &GraphSnapshot,
        registry: &mut GroupRegistry,
        report: &mut LoadReport,
    ) {
        for row in &snapshot.grants {
            if registry.catalog().lookup(row.perm_id).is_none() {
                report.warn(ConsistencyWarning::UnknownGrantPermission {
                    group: row.group_id,
                    rank: row.rank_id,
                    permission: row.perm_id,
                });
                continue;
            }
            let Ok(group) = registry.group_mut(row.group_id) else {
                report.warn(ConsistencyWarning::GrantWithoutGroup {
                    group: row.group_id,
                    rank: row.rank_id,
                });
                continue;
            };
            if group.grant_permission(row.rank_id, row.perm_id).is_err() {
                report.warn(ConsistencyWarning::UnknownGrantRank {
                    group: row.group_id,
                    rank: row.rank_id,
                });
            }
        }
    }

    /// 第六步：合并重定向。存储中的链式映射被折叠成直接指向存活组。
    fn apply_merges(
        &self,
        snapshot: &GraphSnapshot,
        registry: &mut GroupRegistry,
        report: &mut LoadReport,
    ) {
        let mut pairs: HashMap<GroupId, GroupId> = HashMap::new();
        for row in &snapshot.merges {
            pairs.entry(row.old_group).or_insert(row.new_group);
        }

        for row in &snapshot.merges {
            if registry.contains_live(row.old_group) {
                report.warn(ConsistencyWarning::LiveGroupRedirected {
                    old: row.old_group,
                    new: row.new_group,
                });
                continue;
            }
            if pairs.get(&row.old_group) != Some(&row.new_group) {
                // 同一个旧 id 的后续映射，以第一条为准
                report.warn(ConsistencyWarning::StaleRedirect {
                    old: row.old_group,
                    new: row.new_group,
                });
                continue;
            }

            let mut target = row.new_group;
            let mut resolved = None;
            for _ in 0..=pairs.len() {
                if registry.contains_live(target) {
                    resolved = Some(target);
                    break;
                }
                match pairs.get(&target) {
                    Some(next) => target = *next,
                    None => break,
                }
            }

            match resolved {
                Some(live) => {
                    if live != row.new_group {
                        tracing::debug!(old = %row.old_group, stored = %row.new_group, live = %live, "Flattened merge chain");
                    }
                    registry.insert_redirect(row.old_group, live);
                }
                None => report.warn(ConsistencyWarning::StaleRedirect {
                    old: row.old_group,
                    new: row.new_group,
                }),
            }
        }
    }

    /// 第七步：链接，端点经重定向解析
    fn attach_links(
        &self,
        snapshot: &GraphSnapshot,
        registry: &mut GroupRegistry,
        report: &mut LoadReport,
    ) {
        for row in &snapshot.links {
            let endpoints = [
                (row.origin_group_id, row.origin_rank_id),
                (row.target_group_id, row.target_rank_id),
            ];
            let mut resolved = Vec::with_capacity(2);
            for (group_id, rank_id) in endpoints {
                let Some(group) = registry.resolve(group_id) else {
                    report.warn(ConsistencyWarning::LinkWithoutGroup {
                        link: row.link_id,
                        group: group_id,
                    });
                    break;
                };
                if !group.ranks().contains(rank_id) {
                    report.warn(ConsistencyWarning::UnknownLinkRank {
                        link: row.link_id,
                        group: group_id,
                        rank: rank_id,
                    });
                    break;
                }
                resolved.push(RankRef::new(group.id(), rank_id));
            }
            let [origin, target] = resolved[..] else {
                continue;
            };

            let link = GroupLink {
                id: row.link_id,
                origin,
                target,
            };
            if !registry.insert_loaded_link(link) {
                report.warn(ConsistencyWarning::DuplicateLink { link: row.link_id });
            }
        }
    }

    /// 第八步：待处理邀请
    fn attach_invitations(
        &self,
        snapshot: &GraphSnapshot,
        registry: &mut GroupRegistry,
        report: &mut LoadReport,
    ) {
        for row in &snapshot.invitations {
            let Ok(group) = registry.group_mut(row.group_id) else {
                report.warn(ConsistencyWarning::InvitationWithoutGroup {
                    group: row.group_id,
                    principal: row.member_id,
                });
                continue;
            };
            if group.invite(row.member_id, row.rank_id, row.invited_at).is_err() {
                report.warn(ConsistencyWarning::UnknownInvitationRank {
                    group: row.group_id,
                    principal: row.member_id,
                    rank: row.rank_id,
                });
            }
        }
    }
}

/// 选择根：无父节点的 rank 中优先 0 号，否则取最小 id；
/// 全部都有父节点时退回到 0 号 rank 并忽略其父节点
fn pick_root(
    group: GroupId,
    ranks: &BTreeMap<RankId, PendingRank<'_>>,
    report: &mut LoadReport,
) -> Option<RankId> {
    let parentless: Vec<RankId> = ranks
        .iter()
        .filter(|(_, rank)| rank.parent.is_none())
        .map(|(id, _)| *id)
        .collect();
    if parentless.contains(&ROOT_RANK_ID) {
        return Some(ROOT_RANK_ID);
    }
    if let Some(first) = parentless.first() {
        return Some(*first);
    }
    let fallback = ranks.get(&ROOT_RANK_ID)?;
    if let Some(parent) = fallback.parent {
        report.warn(ConsistencyWarning::RootParentIgnored { group, parent });
    }
    Some(ROOT_RANK_ID)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GrantRow, GroupRow, MembershipRow, PermissionId, PermissionRow, RankRow};
    use uuid::Uuid;

    fn rank(group: i32, id: i32, name: &str, parent: Option<i32>) -> RankRow {
        RankRow {
            group_id: GroupId(group),
            rank_id: RankId(id),
            rank_name: name.to_string(),
            parent_rank_id: parent.map(RankId),
        }
    }

    fn group(id: i32, name: &str) -> GroupRow {
        GroupRow {
            group_id: GroupId(id),
            group_name: name.to_string(),
            meta_data: None,
        }
    }

    #[test]
    fn test_parentless_ranks_attach_to_root() {
        let snapshot = GraphSnapshot {
            groups: vec![group(1, "Alpha")],
            ranks: vec![
                rank(1, 0, "OWNER", None),
                rank(1, 2, "MODS", None),
                rank(1, 3, "MEMBERS", Some(2)),
            ],
            ..GraphSnapshot::default()
        };

        let (registry, report) = GraphLoader::default().load(&snapshot);
        assert!(report.is_clean());
        let tree = registry.resolve(GroupId(1)).unwrap().ranks();
        assert_eq!(tree.rank(RankId(2)).unwrap().parent, Some(RankId(0)));
        assert_eq!(tree.rank(RankId(3)).unwrap().parent, Some(RankId(2)));
    }

    #[test]
    fn test_cycle_ranks_are_orphans() {
        let snapshot = GraphSnapshot {
            groups: vec![group(1, "Alpha")],
            ranks: vec![
                rank(1, 0, "OWNER", None),
                rank(1, 1, "A", Some(2)),
                rank(1, 2, "B", Some(1)),
                rank(1, 3, "C", Some(9)),
            ],
            ..GraphSnapshot::default()
        };

        let (registry, report) = GraphLoader::default().load(&snapshot);
        assert_eq!(report.count("orphan_rank"), 3);
        assert_eq!(registry.resolve(GroupId(1)).unwrap().ranks().len(), 1);
    }

    #[test]
    fn test_root_fallback_ignores_parent() {
        let snapshot = GraphSnapshot {
            groups: vec![group(1, "Alpha"), group(2, "Empty")],
            ranks: vec![rank(1, 0, "OWNER", Some(5)), rank(1, 1, "ADMINS", Some(0))],
            ..GraphSnapshot::default()
        };

        let (registry, report) = GraphLoader::default().load(&snapshot);
        assert_eq!(report.count("root_parent_ignored"), 1);
        assert_eq!(report.count("group_without_root"), 1);
        let tree = registry.resolve(GroupId(1)).unwrap().ranks();
        assert!(tree.root().unwrap().is_root());
        assert_eq!(tree.len(), 2);
        assert!(registry.resolve(GroupId(2)).is_none());
    }

    #[test]
    fn test_grants_need_known_permission() {
        let principal = Uuid::new_v4();
        let snapshot = GraphSnapshot {
            permissions: vec![PermissionRow {
                perm_id: PermissionId(1),
                name: "BUILD".to_string(),
            }],
            groups: vec![group(1, "Alpha")],
            ranks: vec![rank(1, 0, "OWNER", None)],
            memberships: vec![MembershipRow {
                group_id: GroupId(1),
                member_id: principal,
                rank_id: RankId(0),
            }],
            grants: vec![
                GrantRow {
                    group_id: GroupId(1),
                    rank_id: RankId(0),
                    perm_id: PermissionId(1),
                },
                GrantRow {
                    group_id: GroupId(1),
                    rank_id: RankId(0),
                    perm_id: PermissionId(1),
                },
                GrantRow {
                    group_id: GroupId(1),
                    rank_id: RankId(0),
                    perm_id: PermissionId(2),
                },
            ],
            ..GraphSnapshot::default()
        };

        let (registry, report) = GraphLoader::default().load(&snapshot);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.count("unknown_grant_permission"), 1);
        assert!(registry.has_permission(GroupId(1), &principal, "BUILD"));
    }
}
