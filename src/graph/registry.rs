//! Group registry (组注册表)
//!
//! 持有全部存活的组（按 id 与不区分大小写的组名索引）、合并重定向表、
//! 权限目录以及跨组链接索引。
//!
//! 合并重定向始终是扁平的：每个退役 id 直接指向一个存活 id，
//! 因此 [`GroupRegistry::resolve`] 至多跳转一次。

use super::{validate_name, GraphLimits, Group, PermissionCatalog};
use crate::{
    error::{GraphError, GraphResult},
    models::{GroupId, GroupLink, LinkId, Permission, PermissionId, RankId, RankRef},
};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// 新建组的默认 rank 树：(id, 名称, 父节点)
pub const DEFAULT_RANKS: &[(RankId, &str, Option<RankId>)] = &[
    (RankId(0), "OWNER", None),
    (RankId(1), "ADMINS", Some(RankId(0))),
    (RankId(2), "MODS", Some(RankId(1))),
    (RankId(3), "MEMBERS", Some(RankId(2))),
    (RankId(4), "DEFAULT", Some(RankId(0))),
    (RankId(5), "BLACKLISTED", Some(RankId(4))),
];

#[derive(Debug, Clone)]
pub struct GroupRegistry {
    limits: GraphLimits,
    catalog: PermissionCatalog,
    groups: HashMap<GroupId, Group>,
    by_name: HashMap<String, GroupId>,
    redirects: HashMap<GroupId, GroupId>,
    /// 已被合并的组遗留的数据，不再参与解析
    retired: HashMap<GroupId, Group>,
    links: HashMap<LinkId, GroupLink>,
    /// 下一个可分配的 id，`None` 表示 id 空间已耗尽
    next_group_id: Option<GroupId>,
    next_link_id: Option<LinkId>,
}

impl Default for GroupRegistry {
    fn default() -> Self {
        Self::new(GraphLimits::default())
    }
}

fn name_key(name: &str) -> String {
    name.to_lowercase()
}

impl GroupRegistry {
    pub fn new(limits: GraphLimits) -> Self {
        Self {
            limits,
            catalog: PermissionCatalog::new(),
            groups: HashMap::new(),
            by_name: HashMap::new(),
            redirects: HashMap::new(),
            retired: HashMap::new(),
            links: HashMap::new(),
            next_group_id: Some(GroupId(1)),
            next_link_id: Some(LinkId(1)),
        }
    }

    pub fn limits(&self) -> GraphLimits {
        self.limits
    }

    // ==================== 权限目录 ====================

    pub fn catalog(&self) -> &PermissionCatalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut PermissionCatalog {
        &mut self.catalog
    }

    pub fn register_permission(&mut self, name: &str) -> GraphResult<Permission> {
        self.catalog.register(name)
    }

    fn permission_named(&self, name: &str) -> GraphResult<Permission> {
        self.catalog
            .lookup_by_name(name)
            .cloned()
            .ok_or_else(|| GraphError::UnknownPermission(name.to_string()))
    }

    // ==================== 查询 ====================

    /// 解析组 id：存活 id 直接返回，退役 id 经一次重定向
    pub fn resolve(&self, id: GroupId) -> Option<&Group> {
        self.resolve_id(id).and_then(|live| self.groups.get(&live))
    }

    pub fn resolve_id(&self, id: GroupId) -> Option<GroupId> {
        if self.groups.contains_key(&id) {
            return Some(id);
        }
        self.redirects
            .get(&id)
            .copied()
            .filter(|live| self.groups.contains_key(live))
    }

    pub fn resolve_by_name(&self, name: &str) -> Option<&Group> {
        self.by_name
            .get(&name_key(name))
            .and_then(|id| self.groups.get(id))
    }

    /// 获取可修改的存活组（经重定向解析）
    pub fn group_mut(&mut self, id: GroupId) -> GraphResult<&mut Group> {
        let live = self.resolve_id(id).ok_or(GraphError::UnknownGroup(id))?;
        self.groups.get_mut(&live).ok_or(GraphError::UnknownGroup(id))
    }

    fn require(&self, id: GroupId) -> GraphResult<&Group> {
        self.resolve(id).ok_or(GraphError::UnknownGroup(id))
    }

    /// 已合并组遗留的数据，供调用方显式整合
    pub fn retired(&self, id: GroupId) -> Option<&Group> {
        self.retired.get(&id)
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// 退役 id -> 存活 id
    pub fn redirects(&self) -> impl Iterator<Item = (GroupId, GroupId)> + '_ {
        self.redirects.iter().map(|(old, new)| (*old, *new))
    }

    /// 所有可解析的 id 数量（存活 + 重定向）
    pub fn resolvable_id_count(&self) -> usize {
        self.groups.len() + self.redirects.len()
    }

    pub fn link(&self, id: LinkId) -> Option<&GroupLink> {
        self.links.get(&id)
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    // ==================== 组操作 ====================

    /// 创建组并写入默认 rank 树
    pub fn create_group(&mut self, name: &str) -> GraphResult<&Group> {
        validate_name(name, self.limits.max_group_name_length)?;
        let key = name_key(name);
        if self.by_name.contains_key(&key) {
            return Err(GraphError::DuplicateName(name.to_string()));
        }

        let id = self
            .next_group_id
            .ok_or(GraphError::IdSpaceExhausted("group"))?;
        let mut group = Group::new(id, name, self.limits);
        for (rank, rank_name, parent) in DEFAULT_RANKS {
            group.ranks_mut().insert_loaded(*rank, rank_name, *parent);
        }

        self.next_group_id = id.checked_next();
        self.by_name.insert(key, id);
        tracing::debug!(group = %id, name = %name, "Group created");
        Ok(self.groups.entry(id).or_insert(group))
    }

    /// 改名，返回旧名称
    pub fn rename_group(&mut self, id: GroupId, new_name: &str) -> GraphResult<String> {
        validate_name(new_name, self.limits.max_group_name_length)?;
        let live = self.require(id)?.id();
        let key = name_key(new_name);
        if let Some(owner) = self.by_name.get(&key) {
            if *owner != live {
                return Err(GraphError::DuplicateName(new_name.to_string()));
            }
        }

        let group = self.groups.get_mut(&live).ok_or(GraphError::UnknownGroup(id))?;
        let old_name = group.name().to_string();
        group.set_name(new_name);
        self.by_name.remove(&name_key(&old_name));
        self.by_name.insert(key, live);
        Ok(old_name)
    }

    /// 把 `to_merge` 并入 `survivor`
    ///
    /// 只折叠身份：`to_merge` 的 rank、成员、授权与链接留在原处，不会转移到 `survivor`。
    pub fn merge(&mut self, survivor: GroupId, to_merge: GroupId) -> GraphResult<()> {
        let survivor_id = self.require(survivor)?.id();
        let merged_id = self.require(to_merge)?.id();
        if survivor_id == merged_id {
            return Err(GraphError::SelfMerge(survivor_id));
        }

        // 以下步骤均不会失败
        for target in self.redirects.values_mut() {
            if *target == merged_id {
                *target = survivor_id;
            }
        }
        self.redirects.insert(merged_id, survivor_id);
        if let Some(group) = self.groups.remove(&merged_id) {
            self.by_name.remove(&name_key(group.name()));
            self.retired.insert(merged_id, group);
        }

        tracing::info!(survivor = %survivor_id, merged = %merged_id, "Group merged");
        Ok(())
    }

    // ==================== 权限解析 ====================

    pub fn grant_permission(
        &mut self,
        group: GroupId,
        rank: RankId,
        permission: &str,
    ) -> GraphResult<bool> {
        let permission = self.permission_named(permission)?;
        self.group_mut(group)?.grant_permission(rank, permission.id)
    }

    pub fn revoke_permission(
        &mut self,
        group: GroupId,
        rank: RankId,
        permission: &str,
    ) -> GraphResult<bool> {
        let permission = self.permission_named(permission)?;
        self.group_mut(group)?.revoke_permission(rank, permission.id)
    }

    /// rank 上显式授予的权限（不继承）
    pub fn effective_permissions(&self, group: GroupId, rank: RankId) -> GraphResult<Vec<Permission>> {
        let ids = self.require(group)?.ranks().effective_permissions(rank)?;
        Ok(ids
            .into_iter()
            .filter_map(|id| self.catalog.lookup(id).cloned())
            .collect())
    }

    /// 主体在组内持有的 rank：直接成员 rank，加上经入向链接映射而来的 rank（只跟随一跳）
    ///
    /// 链接起点必须是存活组本身；起点已被合并时链接留在退役组中，不经重定向转给存活组。
    pub fn held_ranks(&self, group: GroupId, principal: &Uuid) -> Vec<RankId> {
        let Some(group) = self.resolve(group) else {
            return Vec::new();
        };
        let mut held = BTreeSet::new();
        if let Some(rank) = group.member_rank(principal) {
            held.insert(rank);
        }
        for link in group.incoming_links() {
            let origin_rank = self
                .groups
                .get(&link.origin.group)
                .and_then(|origin| origin.member_rank(principal));
            if origin_rank == Some(link.origin.rank) {
                held.insert(link.target.rank);
            }
        }
        held.into_iter().collect()
    }

    /// 主体持有的任一 rank 是否显式拥有该权限
    pub fn has_permission(&self, group: GroupId, principal: &Uuid, permission: &str) -> bool {
        let (Some(live), Some(permission)) =
            (self.resolve(group), self.catalog.lookup_by_name(permission))
        else {
            return false;
        };
        self.held_ranks(live.id(), principal).into_iter().any(|rank| {
            live.ranks()
                .rank(rank)
                .is_some_and(|rank| rank.permissions.contains(&permission.id))
        })
    }

    // ==================== 链接 ====================

    pub fn add_link(
        &mut self,
        origin_group: GroupId,
        origin_rank: RankId,
        target_group: GroupId,
        target_rank: RankId,
    ) -> GraphResult<GroupLink> {
        let origin = self.require(origin_group)?;
        origin.require_rank(origin_rank)?;
        let target = self.require(target_group)?;
        target.require_rank(target_rank)?;

        let id = self.next_link_id.ok_or(GraphError::IdSpaceExhausted("link"))?;
        let link = GroupLink {
            id,
            origin: RankRef::new(origin.id(), origin_rank),
            target: RankRef::new(target.id(), target_rank),
        };
        if origin.has_outgoing_edge(&link) {
            return Err(GraphError::DuplicateEdge(link.to_string()));
        }

        self.attach_link(link.clone());
        self.next_link_id = id.checked_next();
        Ok(link)
    }

    /// 删除链接，同时从两端的集合中移除
    pub fn remove_link(&mut self, id: LinkId) -> GraphResult<GroupLink> {
        let link = self.links.remove(&id).ok_or(GraphError::UnknownLink(id))?;
        if let Some(origin) = self.endpoint_mut(link.origin.group) {
            origin.remove_outgoing(id);
        }
        if let Some(target) = self.endpoint_mut(link.target.group) {
            target.remove_incoming(id);
        }
        Ok(link)
    }

    /// 链接端点可能是已退役的组（合并时链接被留下）
    fn endpoint_mut(&mut self, id: GroupId) -> Option<&mut Group> {
        match self.groups.get_mut(&id) {
            Some(group) => Some(group),
            None => self.retired.get_mut(&id),
        }
    }

    fn attach_link(&mut self, link: GroupLink) {
        if let Some(origin) = self.endpoint_mut(link.origin.group) {
            origin.insert_outgoing(link.clone());
        }
        if let Some(target) = self.endpoint_mut(link.target.group) {
            target.insert_incoming(link.clone());
        }
        self.links.insert(link.id, link);
    }

    // ==================== 加载器使用 ====================

    pub(crate) fn insert_loaded_group(&mut self, group: Group) {
        self.reserve_group_id(group.id());
        self.by_name.insert(name_key(group.name()), group.id());
        self.groups.insert(group.id(), group);
    }

    pub(crate) fn contains_live(&self, id: GroupId) -> bool {
        self.groups.contains_key(&id)
    }

    pub(crate) fn insert_redirect(&mut self, old: GroupId, new: GroupId) {
        self.reserve_group_id(old);
        self.redirects.insert(old, new);
    }

    /// 插入已持久化的链接，端点已解析为存活组。重复的 id 或端点返回 false。
    pub(crate) fn insert_loaded_link(&mut self, link: GroupLink) -> bool {
        let duplicate = self.links.contains_key(&link.id)
            || self
                .groups
                .get(&link.origin.group)
                .is_some_and(|origin| origin.has_outgoing_edge(&link));
        if duplicate {
            return false;
        }
        if self.next_link_id.is_some_and(|next| next <= link.id) {
            self.next_link_id = link.id.checked_next();
        }
        self.attach_link(link);
        true
    }

    pub(crate) fn reserve_group_id(&mut self, id: GroupId) {
        if self.next_group_id.is_some_and(|next| next <= id) {
            self.next_group_id = id.checked_next();
        }
    }

    /// 加载后无法继续分配的 id 空间：(空间名, 所属组)
    pub(crate) fn exhausted_id_spaces(&self) -> Vec<(&'static str, Option<GroupId>)> {
        let mut exhausted = Vec::new();
        if self.catalog.lookup(PermissionId(i32::MAX)).is_some() {
            exhausted.push(("permission", None));
        }
        if self.next_group_id.is_none() {
            exhausted.push(("group", None));
        }
        if self.next_link_id.is_none() {
            exhausted.push(("link", None));
        }
        let mut groups: Vec<&Group> = self.groups.values().collect();
        groups.sort_by_key(|group| group.id());
        for group in groups {
            if group.ranks().contains(RankId(i32::MAX)) {
                exhausted.push(("rank", Some(group.id())));
            }
        }
        exhausted
    }
}
