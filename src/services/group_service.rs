//! 组服务
//!
//! 持有共享的 [`GroupRegistry`]。每个修改在写锁内同步完成（全部成功或不变），
//! 释放锁之后再写入存储并追加操作日志。存储失败以 `StorageUnavailable` 返回，
//! 内存中的修改保持生效，由调用方决定如何重试。
//!
//! 同一组的修改经由该组的持久化通道串行执行：通道锁从应用前一直持有到写入存储之后，
//! 因此存储收到的写入顺序与内存中的应用顺序一致。合并同时锁住两个组的通道（按 id 升序）。

use super::ActionLogService;
use crate::{
    error::{GraphError, GraphResult},
    graph::{GraphLimits, GraphLoader, Group, GroupRegistry, LoadReport},
    models::{
        ActionLogEntry, GroupAction, GroupId, GroupLink, Invitation, LinkId, Permission, Rank,
        RankId, ROOT_RANK_ID,
    },
    repository::GroupStore,
};
use chrono::Utc;
use std::{collections::HashMap, future::Future, sync::Arc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, RwLockReadGuard};
use uuid::Uuid;

/// 操作者在组内的 rank 名称，非成员为空串
fn actor_rank(group: &Group, actor: &Uuid) -> String {
    group
        .member_rank(actor)
        .and_then(|rank| group.ranks().rank(rank))
        .map(|rank| rank.name.clone())
        .unwrap_or_default()
}

pub struct GroupService {
    registry: Arc<RwLock<GroupRegistry>>,
    store: Arc<dyn GroupStore>,
    action_log: ActionLogService,
    /// 按组的持久化通道
    lanes: Arc<Mutex<HashMap<GroupId, Arc<Mutex<()>>>>>,
    /// 权限目录的持久化通道
    catalog_lane: Arc<Mutex<()>>,
}

impl GroupService {
    pub fn new(registry: GroupRegistry, store: Arc<dyn GroupStore>) -> Self {
        Self {
            registry: Arc::new(RwLock::new(registry)),
            action_log: ActionLogService::new(store.clone()),
            store,
            lanes: Arc::new(Mutex::new(HashMap::new())),
            catalog_lane: Arc::new(Mutex::new(())),
        }
    }

    /// 从存储读取快照并重建注册表
    pub async fn load(
        store: Arc<dyn GroupStore>,
        limits: GraphLimits,
    ) -> GraphResult<(Self, LoadReport)> {
        let snapshot = store.load_snapshot().await?;
        let (registry, report) = GraphLoader::new(limits).load(&snapshot);
        Ok((Self::new(registry, store), report))
    }

    /// 只读访问注册表
    pub async fn read(&self) -> RwLockReadGuard<'_, GroupRegistry> {
        self.registry.read().await
    }

    pub async fn has_permission(&self, group: GroupId, principal: &Uuid, permission: &str) -> bool {
        self.registry.read().await.has_permission(group, principal, permission)
    }

    async fn get_or_create_lane(&self, group: GroupId) -> Arc<Mutex<()>> {
        let mut lanes = self.lanes.lock().await;
        lanes.entry(group).or_default().clone()
    }

    async fn live_id(&self, group: GroupId) -> GraphResult<GroupId> {
        self.registry
            .read()
            .await
            .resolve_id(group)
            .ok_or(GraphError::UnknownGroup(group))
    }

    /// 锁住组的持久化通道
    ///
    /// 持有通道期间该组不会被合并，因此返回时的存活 id 在整个操作内保持不变。
    async fn lock_group(&self, group: GroupId) -> GraphResult<OwnedMutexGuard<()>> {
        loop {
            let live = self.live_id(group).await?;
            let lane = self.get_or_create_lane(live).await.lock_owned().await;
            // 等待通道时组可能已被合并
            if self.live_id(group).await? == live {
                return Ok(lane);
            }
        }
    }

    /// 按 id 升序锁住两个组的通道
    async fn lock_pair(
        &self,
        survivor: GroupId,
        to_merge: GroupId,
    ) -> GraphResult<(OwnedMutexGuard<()>, OwnedMutexGuard<()>)> {
        loop {
            let live = (self.live_id(survivor).await?, self.live_id(to_merge).await?);
            if live.0 == live.1 {
                return Err(GraphError::SelfMerge(live.0));
            }
            let (low, high) = if live.0 < live.1 { live } else { (live.1, live.0) };
            let first = self.get_or_create_lane(low).await.lock_owned().await;
            let second = self.get_or_create_lane(high).await.lock_owned().await;
            if (self.live_id(survivor).await?, self.live_id(to_merge).await?) == live {
                return Ok((first, second));
            }
        }
    }

    async fn persist<F>(&self, operation: &'static str, write: F) -> GraphResult<()>
    where
        F: Future<Output = GraphResult<()>>,
    {
        write.await.map_err(|e| {
            tracing::error!(operation, error = %e, "Failed to persist group change");
            metrics::counter!("rankgraph.persist.failures", "operation" => operation).increment(1);
            e
        })
    }

    // ==================== 权限目录 ====================

    pub async fn register_permission(&self, name: &str) -> GraphResult<Permission> {
        let _lane = self.catalog_lane.lock().await;
        let permission = self.registry.write().await.register_permission(name)?;
        self.persist("insert_permission", self.store.insert_permission(&permission))
            .await?;
        tracing::info!(permission = %permission.name, id = %permission.id, "Permission registered");
        Ok(permission)
    }

    // ==================== 组 ====================

    /// 创建组，创建者成为根 rank 的成员
    pub async fn create_group(&self, founder: Uuid, name: &str) -> GraphResult<GroupId> {
        let (group, _lane) = {
            let mut registry = self.registry.write().await;
            let id = registry.create_group(name)?.id();
            // 新 id 尚未对外可见，通道锁不会被争用
            let lane = self.get_or_create_lane(id).await.lock_owned().await;
            let group = registry.group_mut(id)?;
            group.add_member(founder, ROOT_RANK_ID)?;
            (group.clone(), lane)
        };

        self.persist("insert_group", self.store.insert_group(&group)).await?;
        self.action_log
            .record(
                ActionLogEntry::new(group.id(), founder, GroupAction::GroupCreate, actor_rank(&group, &founder))
                    .with_subject(group.name()),
            )
            .await;
        Ok(group.id())
    }

    pub async fn rename_group(&self, actor: Uuid, group: GroupId, new_name: &str) -> GraphResult<()> {
        let _lane = self.lock_group(group).await?;
        let (live, old_name, rank) = {
            let mut registry = self.registry.write().await;
            let old_name = registry.rename_group(group, new_name)?;
            let renamed = registry.resolve(group).ok_or(GraphError::UnknownGroup(group))?;
            (renamed.id(), old_name, actor_rank(renamed, &actor))
        };

        self.persist("rename_group", self.store.rename_group(live, new_name)).await?;
        self.action_log
            .record(
                ActionLogEntry::new(live, actor, GroupAction::GroupRename, rank)
                    .with_subject(new_name)
                    .with_extra(old_name),
            )
            .await;
        Ok(())
    }

    pub async fn set_metadata(&self, group: GroupId, metadata: serde_json::Value) -> GraphResult<()> {
        let _lane = self.lock_group(group).await?;
        let live = {
            let mut registry = self.registry.write().await;
            let target = registry.group_mut(group)?;
            target.set_metadata(metadata.clone());
            target.id()
        };
        self.persist("update_metadata", self.store.update_metadata(live, &metadata))
            .await
    }

    /// 把 `to_merge` 并入 `survivor`，返回存活组 id
    pub async fn merge(&self, actor: Uuid, survivor: GroupId, to_merge: GroupId) -> GraphResult<GroupId> {
        let _lanes = self.lock_pair(survivor, to_merge).await?;
        let (survivor_id, merged_id, merged_name, rank) = {
            let mut registry = self.registry.write().await;
            let survivor_group = registry.resolve(survivor).ok_or(GraphError::UnknownGroup(survivor))?;
            let survivor_id = survivor_group.id();
            let rank = actor_rank(survivor_group, &actor);
            let merged = registry.resolve(to_merge).ok_or(GraphError::UnknownGroup(to_merge))?;
            let (merged_id, merged_name) = (merged.id(), merged.name().to_string());
            registry.merge(survivor_id, merged_id)?;
            (survivor_id, merged_id, merged_name, rank)
        };

        self.persist("merge_groups", self.store.merge_groups(survivor_id, merged_id))
            .await?;
        self.action_log
            .record(
                ActionLogEntry::new(survivor_id, actor, GroupAction::GroupMerge, rank)
                    .with_subject(merged_name)
                    .with_extra(merged_id.to_string()),
            )
            .await;
        Ok(survivor_id)
    }

    // ==================== Rank ====================

    pub async fn create_rank(
        &self,
        actor: Uuid,
        group: GroupId,
        name: &str,
        parent: RankId,
    ) -> GraphResult<Rank> {
        let _lane = self.lock_group(group).await?;
        let (live, created, rank) = {
            let mut registry = self.registry.write().await;
            let target = registry.group_mut(group)?;
            let created = target.create_rank(name, Some(parent))?;
            (target.id(), created, actor_rank(target, &actor))
        };

        self.persist("insert_rank", self.store.insert_rank(live, &created)).await?;
        self.action_log
            .record(ActionLogEntry::new(live, actor, GroupAction::RankCreate, rank).with_subject(&created.name))
            .await;
        Ok(created)
    }

    pub async fn remove_rank(&self, actor: Uuid, group: GroupId, rank_id: RankId) -> GraphResult<Rank> {
        let _lane = self.lock_group(group).await?;
        let (live, removed, rank) = {
            let mut registry = self.registry.write().await;
            let target = registry.group_mut(group)?;
            let removed = target.remove_rank(rank_id)?;
            (target.id(), removed, actor_rank(target, &actor))
        };

        self.persist("delete_rank", self.store.delete_rank(live, rank_id)).await?;
        self.action_log
            .record(ActionLogEntry::new(live, actor, GroupAction::RankRemove, rank).with_subject(&removed.name))
            .await;
        Ok(removed)
    }

    pub async fn rename_rank(
        &self,
        actor: Uuid,
        group: GroupId,
        rank_id: RankId,
        new_name: &str,
    ) -> GraphResult<()> {
        let _lane = self.lock_group(group).await?;
        let (live, old_name, rank) = {
            let mut registry = self.registry.write().await;
            let target = registry.group_mut(group)?;
            let old_name = target.require_rank(rank_id)?.name.clone();
            target.rename_rank(rank_id, new_name)?;
            (target.id(), old_name, actor_rank(target, &actor))
        };

        self.persist("rename_rank", self.store.rename_rank(live, rank_id, new_name))
            .await?;
        self.action_log
            .record(
                ActionLogEntry::new(live, actor, GroupAction::RankRename, rank)
                    .with_subject(new_name)
                    .with_extra(old_name),
            )
            .await;
        Ok(())
    }

    pub async fn move_rank(
        &self,
        actor: Uuid,
        group: GroupId,
        rank_id: RankId,
        new_parent: RankId,
    ) -> GraphResult<()> {
        let _lane = self.lock_group(group).await?;
        let (live, moved, rank) = {
            let mut registry = self.registry.write().await;
            let target = registry.group_mut(group)?;
            target.move_rank(rank_id, new_parent)?;
            let moved = target.require_rank(rank_id)?.name.clone();
            (target.id(), moved, actor_rank(target, &actor))
        };

        self.persist("move_rank", self.store.move_rank(live, rank_id, new_parent))
            .await?;
        self.action_log
            .record(
                ActionLogEntry::new(live, actor, GroupAction::RankMove, rank)
                    .with_subject(moved)
                    .with_extra(new_parent.to_string()),
            )
            .await;
        Ok(())
    }

    /// 授予权限；返回是否发生了变化
    pub async fn grant_permission(
        &self,
        actor: Uuid,
        group: GroupId,
        rank_id: RankId,
        permission: &str,
    ) -> GraphResult<bool> {
        let _lane = self.lock_group(group).await?;
        let (live, permission_id, changed, rank) = {
            let mut registry = self.registry.write().await;
            let changed = registry.grant_permission(group, rank_id, permission)?;
            let permission_id = registry
                .catalog()
                .lookup_by_name(permission)
                .map(|p| p.id)
                .ok_or_else(|| GraphError::UnknownPermission(permission.to_string()))?;
            let target = registry.resolve(group).ok_or(GraphError::UnknownGroup(group))?;
            (target.id(), permission_id, changed, actor_rank(target, &actor))
        };
        if !changed {
            return Ok(false);
        }

        self.persist("insert_grant", self.store.insert_grant(live, rank_id, permission_id))
            .await?;
        self.action_log
            .record(
                ActionLogEntry::new(live, actor, GroupAction::PermissionGrant, rank)
                    .with_subject(permission)
                    .with_extra(rank_id.to_string()),
            )
            .await;
        Ok(true)
    }

    /// 撤销权限；返回是否发生了变化
    pub async fn revoke_permission(
        &self,
        actor: Uuid,
        group: GroupId,
        rank_id: RankId,
        permission: &str,
    ) -> GraphResult<bool> {
        let _lane = self.lock_group(group).await?;
        let (live, permission_id, changed, rank) = {
            let mut registry = self.registry.write().await;
            let changed = registry.revoke_permission(group, rank_id, permission)?;
            let permission_id = registry
                .catalog()
                .lookup_by_name(permission)
                .map(|p| p.id)
                .ok_or_else(|| GraphError::UnknownPermission(permission.to_string()))?;
            let target = registry.resolve(group).ok_or(GraphError::UnknownGroup(group))?;
            (target.id(), permission_id, changed, actor_rank(target, &actor))
        };
        if !changed {
            return Ok(false);
        }

        self.persist("delete_grant", self.store.delete_grant(live, rank_id, permission_id))
            .await?;
        self.action_log
            .record(
                ActionLogEntry::new(live, actor, GroupAction::PermissionRevoke, rank)
                    .with_subject(permission)
                    .with_extra(rank_id.to_string()),
            )
            .await;
        Ok(true)
    }

    // ==================== 成员 ====================

    pub async fn add_member(
        &self,
        actor: Uuid,
        group: GroupId,
        principal: Uuid,
        rank_id: RankId,
    ) -> GraphResult<()> {
        let _lane = self.lock_group(group).await?;
        let (live, rank) = {
            let mut registry = self.registry.write().await;
            let target = registry.group_mut(group)?;
            target.add_member(principal, rank_id)?;
            (target.id(), actor_rank(target, &actor))
        };

        self.persist("insert_member", self.store.insert_member(live, principal, rank_id))
            .await?;
        self.action_log
            .record(
                ActionLogEntry::new(live, actor, GroupAction::MemberAdd, rank)
                    .with_subject(principal.to_string())
                    .with_extra(rank_id.to_string()),
            )
            .await;
        Ok(())
    }

    /// 修改成员 rank，返回原 rank
    pub async fn set_member_rank(
        &self,
        actor: Uuid,
        group: GroupId,
        principal: Uuid,
        rank_id: RankId,
    ) -> GraphResult<RankId> {
        let _lane = self.lock_group(group).await?;
        let (live, previous, rank) = {
            let mut registry = self.registry.write().await;
            let target = registry.group_mut(group)?;
            let previous = target.set_member_rank(principal, rank_id)?;
            (target.id(), previous, actor_rank(target, &actor))
        };

        self.persist("update_member", self.store.update_member(live, principal, rank_id))
            .await?;
        self.action_log
            .record(
                ActionLogEntry::new(live, actor, GroupAction::MemberRankChange, rank)
                    .with_subject(principal.to_string())
                    .with_extra(format!("{} -> {}", previous, rank_id)),
            )
            .await;
        Ok(previous)
    }

    pub async fn remove_member(&self, actor: Uuid, group: GroupId, principal: Uuid) -> GraphResult<RankId> {
        let _lane = self.lock_group(group).await?;
        let (live, previous, rank) = {
            let mut registry = self.registry.write().await;
            let target = registry.group_mut(group)?;
            // 操作者可能移除自己，先取 rank
            let rank = actor_rank(target, &actor);
            let previous = target.remove_member(&principal)?;
            (target.id(), previous, rank)
        };

        self.persist("delete_member", self.store.delete_member(live, principal))
            .await?;
        self.action_log
            .record(
                ActionLogEntry::new(live, actor, GroupAction::MemberRemove, rank)
                    .with_subject(principal.to_string()),
            )
            .await;
        Ok(previous)
    }

    // ==================== 邀请 ====================

    pub async fn invite(
        &self,
        actor: Uuid,
        group: GroupId,
        principal: Uuid,
        rank_id: RankId,
    ) -> GraphResult<Invitation> {
        let _lane = self.lock_group(group).await?;
        let (invitation, rank) = {
            let mut registry = self.registry.write().await;
            let target = registry.group_mut(group)?;
            target.invite(principal, rank_id, Utc::now())?;
            let invitation = target
                .invitation(&principal)
                .cloned()
                .ok_or(GraphError::UnknownMember {
                    group: target.id(),
                    principal,
                })?;
            (invitation, actor_rank(target, &actor))
        };

        self.persist("upsert_invitation", self.store.upsert_invitation(&invitation))
            .await?;
        self.action_log
            .record(
                ActionLogEntry::new(invitation.group, actor, GroupAction::InviteSend, rank)
                    .with_subject(principal.to_string())
                    .with_extra(rank_id.to_string()),
            )
            .await;
        Ok(invitation)
    }

    /// 撤销邀请；返回是否存在过邀请
    pub async fn revoke_invitation(&self, actor: Uuid, group: GroupId, principal: Uuid) -> GraphResult<bool> {
        let _lane = self.lock_group(group).await?;
        let (live, revoked, rank) = {
            let mut registry = self.registry.write().await;
            let target = registry.group_mut(group)?;
            let revoked = target.revoke_invitation(&principal);
            (target.id(), revoked, actor_rank(target, &actor))
        };
        if revoked.is_none() {
            return Ok(false);
        }

        self.persist("delete_invitation", self.store.delete_invitation(live, principal))
            .await?;
        self.action_log
            .record(
                ActionLogEntry::new(live, actor, GroupAction::InviteRevoke, rank)
                    .with_subject(principal.to_string()),
            )
            .await;
        Ok(true)
    }

    // ==================== 链接 ====================

    pub async fn add_link(
        &self,
        actor: Uuid,
        origin_group: GroupId,
        origin_rank: RankId,
        target_group: GroupId,
        target_rank: RankId,
    ) -> GraphResult<GroupLink> {
        let _lane = self.lock_group(origin_group).await?;
        let (link, rank) = {
            let mut registry = self.registry.write().await;
            let link = registry.add_link(origin_group, origin_rank, target_group, target_rank)?;
            let rank = registry
                .resolve(link.origin.group)
                .map(|origin| actor_rank(origin, &actor))
                .unwrap_or_default();
            (link, rank)
        };

        self.persist("insert_link", self.store.insert_link(&link)).await?;
        self.action_log
            .record(
                ActionLogEntry::new(link.origin.group, actor, GroupAction::LinkCreate, rank)
                    .with_subject(link.to_string())
                    .with_extra(link.id.to_string()),
            )
            .await;
        Ok(link)
    }

    pub async fn remove_link(&self, actor: Uuid, link_id: LinkId) -> GraphResult<GroupLink> {
        // 链接的起点 id 固定不变（可能已退役），与创建时使用同一通道
        let origin = self
            .registry
            .read()
            .await
            .link(link_id)
            .map(|link| link.origin.group)
            .ok_or(GraphError::UnknownLink(link_id))?;
        let _lane = self.get_or_create_lane(origin).await.lock_owned().await;
        let (link, rank) = {
            let mut registry = self.registry.write().await;
            let link = registry.remove_link(link_id)?;
            let rank = registry
                .resolve(link.origin.group)
                .map(|origin| actor_rank(origin, &actor))
                .unwrap_or_default();
            (link, rank)
        };

        self.persist("delete_link", self.store.delete_link(link_id)).await?;
        self.action_log
            .record(
                ActionLogEntry::new(link.origin.group, actor, GroupAction::LinkRemove, rank)
                    .with_subject(link.to_string())
                    .with_extra(link_id.to_string()),
            )
            .await;
        Ok(link)
    }
}
