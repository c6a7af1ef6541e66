//! Group (组)
//!
//! 组拥有自己的 rank 树、成员表、待处理邀请以及出入两个方向的链接集合。
//! 改名与合并需要全局唯一性，由 [`GroupRegistry`](super::GroupRegistry) 负责。

use super::{GraphLimits, RankTree};
use crate::{
    error::{GraphError, GraphResult},
    models::{GroupId, GroupLink, Invitation, LinkId, PermissionId, Rank, RankId},
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Group {
    id: GroupId,
    name: String,
    metadata: serde_json::Value,
    ranks: RankTree,
    members: HashMap<Uuid, RankId>,
    invitations: HashMap<Uuid, Invitation>,
    outgoing: BTreeMap<LinkId, GroupLink>,
    incoming: BTreeMap<LinkId, GroupLink>,
}

impl Group {
    pub(crate) fn new(id: GroupId, name: &str, limits: GraphLimits) -> Self {
        Self {
            id,
            name: name.to_string(),
            metadata: serde_json::Value::Null,
            ranks: RankTree::with_limits(id, limits),
            members: HashMap::new(),
            invitations: HashMap::new(),
            outgoing: BTreeMap::new(),
            incoming: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    /// 不透明的元数据，核心不解释其内容
    pub fn metadata(&self) -> &serde_json::Value {
        &self.metadata
    }

    pub fn set_metadata(&mut self, metadata: serde_json::Value) {
        self.metadata = metadata;
    }

    pub fn ranks(&self) -> &RankTree {
        &self.ranks
    }

    pub(crate) fn ranks_mut(&mut self) -> &mut RankTree {
        &mut self.ranks
    }

    pub(crate) fn require_rank(&self, rank: RankId) -> GraphResult<&Rank> {
        self.ranks.rank(rank).ok_or(GraphError::UnknownRank {
            group: self.id,
            rank,
        })
    }

    // ==================== Ranks ====================

    pub fn create_rank(&mut self, name: &str, parent: Option<RankId>) -> GraphResult<Rank> {
        self.ranks.create_rank(name, parent)
    }

    /// 删除 rank；成员、邀请、链接或授权仍引用它时拒绝（级联由调用方完成）
    pub fn remove_rank(&mut self, rank: RankId) -> GraphResult<Rank> {
        self.require_rank(rank)?;
        let referenced = self.members.values().any(|held| *held == rank)
            || self.invitations.values().any(|invite| invite.rank == rank)
            || self.rank_has_links(rank);
        if referenced {
            return Err(GraphError::RankInUse(rank));
        }
        self.ranks.remove_rank(rank)
    }

    pub fn rename_rank(&mut self, rank: RankId, new_name: &str) -> GraphResult<()> {
        self.ranks.rename(rank, new_name)
    }

    pub fn move_rank(&mut self, rank: RankId, new_parent: RankId) -> GraphResult<()> {
        self.ranks.move_rank(rank, new_parent)
    }

    pub fn grant_permission(&mut self, rank: RankId, permission: PermissionId) -> GraphResult<bool> {
        self.ranks.grant_permission(rank, permission)
    }

    pub fn revoke_permission(&mut self, rank: RankId, permission: PermissionId) -> GraphResult<bool> {
        self.ranks.revoke_permission(rank, permission)
    }

    // ==================== Members ====================

    pub fn member_rank(&self, principal: &Uuid) -> Option<RankId> {
        self.members.get(principal).copied()
    }

    pub fn is_member(&self, principal: &Uuid) -> bool {
        self.members.contains_key(principal)
    }

    pub fn members(&self) -> impl Iterator<Item = (&Uuid, &RankId)> {
        self.members.iter()
    }

    pub fn members_with_rank(&self, rank: RankId) -> Vec<Uuid> {
        let mut members: Vec<Uuid> = self
            .members
            .iter()
            .filter(|(_, held)| **held == rank)
            .map(|(principal, _)| *principal)
            .collect();
        members.sort();
        members
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn add_member(&mut self, principal: Uuid, rank: RankId) -> GraphResult<()> {
        self.require_rank(rank)?;
        if self.members.contains_key(&principal) {
            return Err(GraphError::MemberExists {
                group: self.id,
                principal,
            });
        }
        self.members.insert(principal, rank);
        Ok(())
    }

    /// 修改成员 rank，返回原 rank
    pub fn set_member_rank(&mut self, principal: Uuid, rank: RankId) -> GraphResult<RankId> {
        self.require_rank(rank)?;
        let group = self.id;
        let held = self
            .members
            .get_mut(&principal)
            .ok_or(GraphError::UnknownMember { group, principal })?;
        Ok(std::mem::replace(held, rank))
    }

    pub fn remove_member(&mut self, principal: &Uuid) -> GraphResult<RankId> {
        self.members.remove(principal).ok_or(GraphError::UnknownMember {
            group: self.id,
            principal: *principal,
        })
    }

    // ==================== Invitations ====================

    /// 发出邀请；同一主体的旧邀请被覆盖（rank 与时间都更新），返回旧邀请
    pub fn invite(
        &mut self,
        principal: Uuid,
        rank: RankId,
        invited_at: DateTime<Utc>,
    ) -> GraphResult<Option<Invitation>> {
        self.require_rank(rank)?;
        Ok(self.invitations.insert(
            principal,
            Invitation {
                principal,
                group: self.id,
                rank,
                invited_at,
            },
        ))
    }

    pub fn revoke_invitation(&mut self, principal: &Uuid) -> Option<Invitation> {
        self.invitations.remove(principal)
    }

    pub fn invitation(&self, principal: &Uuid) -> Option<&Invitation> {
        self.invitations.get(principal)
    }

    pub fn invitations(&self) -> impl Iterator<Item = &Invitation> {
        self.invitations.values()
    }

    // ==================== Links ====================

    pub fn outgoing_links(&self) -> impl Iterator<Item = &GroupLink> {
        self.outgoing.values()
    }

    pub fn incoming_links(&self) -> impl Iterator<Item = &GroupLink> {
        self.incoming.values()
    }

    fn rank_has_links(&self, rank: RankId) -> bool {
        self.outgoing.values().any(|link| link.origin.rank == rank)
            || self.incoming.values().any(|link| link.target.rank == rank)
    }

    pub(crate) fn has_outgoing_edge(&self, link: &GroupLink) -> bool {
        self.outgoing
            .values()
            .any(|existing| existing.endpoints() == link.endpoints())
    }

    pub(crate) fn insert_outgoing(&mut self, link: GroupLink) {
        self.outgoing.insert(link.id, link);
    }

    pub(crate) fn insert_incoming(&mut self, link: GroupLink) {
        self.incoming.insert(link.id, link);
    }

    pub(crate) fn remove_outgoing(&mut self, link: LinkId) -> Option<GroupLink> {
        self.outgoing.remove(&link)
    }

    pub(crate) fn remove_incoming(&mut self, link: LinkId) -> Option<GroupLink> {
        self.incoming.remove(&link)
    }
}
