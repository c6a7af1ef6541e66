//! Rank tree (一个组的 rank 层级)
//!
//! rank 以 id 为键存放在扁平的 arena 中，父子关系只记录 id，
//! 因此删除或移动节点不会留下悬空引用。

use super::{validate_name, GraphLimits};
use crate::{
    error::{GraphError, GraphResult},
    models::{GroupId, PermissionId, Rank, RankId},
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

#[derive(Debug, Clone)]
pub struct RankTree {
    group: GroupId,
    ranks: BTreeMap<RankId, Rank>,
    children: BTreeMap<RankId, BTreeSet<RankId>>,
    root: Option<RankId>,
    max_name_length: usize,
}

impl RankTree {
    pub fn new(group: GroupId) -> Self {
        Self::with_limits(group, GraphLimits::default())
    }

    pub fn with_limits(group: GroupId, limits: GraphLimits) -> Self {
        Self {
            group,
            ranks: BTreeMap::new(),
            children: BTreeMap::new(),
            root: None,
            max_name_length: limits.max_rank_name_length,
        }
    }

    pub fn group(&self) -> GroupId {
        self.group
    }

    // ==================== 查询 ====================

    pub fn rank(&self, id: RankId) -> Option<&Rank> {
        self.ranks.get(&id)
    }

    pub fn rank_by_name(&self, name: &str) -> Option<&Rank> {
        self.ranks.values().find(|rank| rank.name == name)
    }

    pub fn contains(&self, id: RankId) -> bool {
        self.ranks.contains_key(&id)
    }

    pub fn root(&self) -> Option<&Rank> {
        self.root.and_then(|id| self.ranks.get(&id))
    }

    /// 按 id 升序遍历所有 rank
    pub fn iter(&self) -> impl Iterator<Item = &Rank> {
        self.ranks.values()
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /// 直接子节点，按 id 升序
    pub fn children(&self, id: RankId) -> impl Iterator<Item = RankId> + '_ {
        self.children.get(&id).into_iter().flatten().copied()
    }

    /// 全部后代（广度优先，不含自身）
    pub fn descendants(&self, id: RankId) -> Vec<RankId> {
        let mut result = Vec::new();
        let mut queue: VecDeque<RankId> = self.children(id).collect();
        while let Some(next) = queue.pop_front() {
            result.push(next);
            queue.extend(self.children(next));
        }
        result
    }

    /// 从指定 rank 到根的路径，根在最后
    pub fn path_to_root(&self, id: RankId) -> GraphResult<Vec<&Rank>> {
        let mut path = Vec::new();
        let mut current = Some(self.require(id)?);
        while let Some(rank) = current {
            path.push(rank);
            if path.len() > self.ranks.len() {
                // 路径长度不会超过 rank 总数
                tracing::error!(group = %self.group, rank = %id, "Rank parent chain does not terminate");
                return Err(GraphError::CycleDetected {
                    rank: id,
                    parent: rank.id,
                });
            }
            current = rank.parent.and_then(|parent| self.ranks.get(&parent));
        }
        Ok(path)
    }

    /// 显式授予的权限集合（不沿父链继承）
    pub fn effective_permissions(&self, id: RankId) -> GraphResult<BTreeSet<PermissionId>> {
        Ok(self.require(id)?.permissions.clone())
    }

    // ==================== 结构修改 ====================

    /// 创建 rank；第一个 rank 必须没有父节点（根）
    pub fn create_rank(&mut self, name: &str, parent: Option<RankId>) -> GraphResult<Rank> {
        validate_name(name, self.max_name_length)?;
        match parent {
            Some(parent) if !self.ranks.contains_key(&parent) => {
                return Err(GraphError::UnknownParent(parent))
            }
            None if self.root.is_some() => return Err(GraphError::RootAlreadyExists),
            _ => {}
        }
        if self.rank_by_name(name).is_some() {
            return Err(GraphError::DuplicateName(name.to_string()));
        }

        let id = match self.ranks.keys().next_back() {
            Some(last) => last
                .checked_next()
                .ok_or(GraphError::IdSpaceExhausted("rank"))?,
            None => RankId(0),
        };
        let rank = Rank::new(id, name, parent);
        self.link_node(rank.clone());
        Ok(rank)
    }

    /// 加载已持久化的 rank。根（无父节点）必须先于其他节点插入。
    pub(crate) fn insert_loaded(&mut self, id: RankId, name: &str, parent: Option<RankId>) -> bool {
        if self.ranks.contains_key(&id) || self.rank_by_name(name).is_some() {
            return false;
        }
        match parent {
            Some(parent) if !self.ranks.contains_key(&parent) => return false,
            None if self.root.is_some() => return false,
            _ => {}
        }
        self.link_node(Rank::new(id, name, parent));
        true
    }

    /// 删除 rank。成员、邀请与链接由 [`Group`](super::Group) 检查，这里检查授权与子节点。
    pub fn remove_rank(&mut self, id: RankId) -> GraphResult<Rank> {
        let rank = self.require(id)?;
        if rank.is_root() {
            return Err(GraphError::CannotRemoveRoot);
        }
        if !rank.permissions.is_empty() || self.children(id).next().is_some() {
            return Err(GraphError::RankInUse(id));
        }

        let rank = self
            .ranks
            .remove(&id)
            .ok_or(GraphError::UnknownRank { group: self.group, rank: id })?;
        if let Some(parent) = rank.parent {
            if let Some(siblings) = self.children.get_mut(&parent) {
                siblings.remove(&id);
            }
        }
        self.children.remove(&id);
        Ok(rank)
    }

    pub fn rename(&mut self, id: RankId, new_name: &str) -> GraphResult<()> {
        validate_name(new_name, self.max_name_length)?;
        self.require(id)?;
        if let Some(existing) = self.rank_by_name(new_name) {
            if existing.id == id {
                return Ok(());
            }
            return Err(GraphError::DuplicateName(new_name.to_string()));
        }
        if let Some(rank) = self.ranks.get_mut(&id) {
            rank.name = new_name.to_string();
        }
        Ok(())
    }

    /// 把非根 rank 移到新的父节点下，拒绝成环
    pub fn move_rank(&mut self, id: RankId, new_parent: RankId) -> GraphResult<()> {
        let rank = self.require(id)?;
        let old_parent = rank.parent.ok_or(GraphError::CannotMoveRoot)?;
        if !self.ranks.contains_key(&new_parent) {
            return Err(GraphError::UnknownParent(new_parent));
        }
        if new_parent == id || self.descendants(id).contains(&new_parent) {
            return Err(GraphError::CycleDetected {
                rank: id,
                parent: new_parent,
            });
        }
        if old_parent == new_parent {
            return Ok(());
        }

        if let Some(siblings) = self.children.get_mut(&old_parent) {
            siblings.remove(&id);
        }
        self.children.entry(new_parent).or_default().insert(id);
        if let Some(rank) = self.ranks.get_mut(&id) {
            rank.parent = Some(new_parent);
        }
        Ok(())
    }

    // ==================== 权限 ====================

    /// 授予权限；已授予时为空操作。返回是否发生变化
    pub fn grant_permission(&mut self, id: RankId, permission: PermissionId) -> GraphResult<bool> {
        let group = self.group;
        let rank = self
            .ranks
            .get_mut(&id)
            .ok_or(GraphError::UnknownRank { group, rank: id })?;
        Ok(rank.permissions.insert(permission))
    }

    /// 撤销权限；未授予时为空操作。返回是否发生变化
    pub fn revoke_permission(&mut self, id: RankId, permission: PermissionId) -> GraphResult<bool> {
        let group = self.group;
        let rank = self
            .ranks
            .get_mut(&id)
            .ok_or(GraphError::UnknownRank { group, rank: id })?;
        Ok(rank.permissions.remove(&permission))
    }

    fn require(&self, id: RankId) -> GraphResult<&Rank> {
        self.ranks.get(&id).ok_or(GraphError::UnknownRank {
            group: self.group,
            rank: id,
        })
    }

    fn link_node(&mut self, rank: Rank) {
        match rank.parent {
            Some(parent) => {
                self.children.entry(parent).or_default().insert(rank.id);
            }
            None => self.root = Some(rank.id),
        }
        self.ranks.insert(rank.id, rank);
    }
}
