//! Database repository layer
//!
//! [`GroupStore`] 是持久化协作方的接口：启动时读取完整快照，运行时逐条写入已在内存中生效的修改。

pub mod group_repo;

pub use group_repo::GroupRepository;

use crate::{
    error::GraphResult,
    graph::Group,
    models::{
        ActionLogEntry, GraphSnapshot, GroupId, GroupLink, Invitation, LinkId, Permission,
        PermissionId, Rank, RankId,
    },
};
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn load_snapshot(&self) -> GraphResult<GraphSnapshot>;

    async fn insert_permission(&self, permission: &Permission) -> GraphResult<()>;

    async fn insert_group(&self, group: &Group) -> GraphResult<()>;
    async fn rename_group(&self, group: GroupId, name: &str) -> GraphResult<()>;
    async fn update_metadata(&self, group: GroupId, metadata: &serde_json::Value) -> GraphResult<()>;
    async fn merge_groups(&self, survivor: GroupId, merged: GroupId) -> GraphResult<()>;

    async fn insert_rank(&self, group: GroupId, rank: &Rank) -> GraphResult<()>;
    async fn delete_rank(&self, group: GroupId, rank: RankId) -> GraphResult<()>;
    async fn rename_rank(&self, group: GroupId, rank: RankId, name: &str) -> GraphResult<()>;
    async fn move_rank(&self, group: GroupId, rank: RankId, parent: RankId) -> GraphResult<()>;
    async fn insert_grant(&self, group: GroupId, rank: RankId, permission: PermissionId)
        -> GraphResult<()>;
    async fn delete_grant(&self, group: GroupId, rank: RankId, permission: PermissionId)
        -> GraphResult<()>;

    async fn insert_member(&self, group: GroupId, principal: Uuid, rank: RankId) -> GraphResult<()>;
    async fn update_member(&self, group: GroupId, principal: Uuid, rank: RankId) -> GraphResult<()>;
    async fn delete_member(&self, group: GroupId, principal: Uuid) -> GraphResult<()>;

    async fn upsert_invitation(&self, invitation: &Invitation) -> GraphResult<()>;
    async fn delete_invitation(&self, group: GroupId, principal: Uuid) -> GraphResult<()>;

    async fn insert_link(&self, link: &GroupLink) -> GraphResult<()>;
    async fn delete_link(&self, link: LinkId) -> GraphResult<()>;

    async fn record_action(&self, entry: &ActionLogEntry) -> GraphResult<()>;
}
