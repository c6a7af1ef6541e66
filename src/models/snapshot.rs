//! Storage row shapes consumed by the graph loader
//!
//! 每个结构体对应一个表的一行，字段名与查询中的列别名一致。

use super::{GroupId, LinkId, PermissionId, RankId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PermissionRow {
    pub perm_id: PermissionId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GroupRow {
    pub group_id: GroupId,
    pub group_name: String,
    pub meta_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RankRow {
    pub group_id: GroupId,
    pub rank_id: RankId,
    pub rank_name: String,
    pub parent_rank_id: Option<RankId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MembershipRow {
    pub group_id: GroupId,
    pub member_id: Uuid,
    pub rank_id: RankId,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GrantRow {
    pub group_id: GroupId,
    pub rank_id: RankId,
    pub perm_id: PermissionId,
}

/// 合并映射：old_group 已被并入 new_group
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MergeRow {
    pub old_group: GroupId,
    pub new_group: GroupId,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LinkRow {
    pub link_id: LinkId,
    pub origin_group_id: GroupId,
    pub origin_rank_id: RankId,
    pub target_group_id: GroupId,
    pub target_rank_id: RankId,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InvitationRow {
    pub member_id: Uuid,
    pub group_id: GroupId,
    pub rank_id: RankId,
    pub invited_at: DateTime<Utc>,
}

/// 启动时一次性读取的全部行
#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    pub permissions: Vec<PermissionRow>,
    pub groups: Vec<GroupRow>,
    pub ranks: Vec<RankRow>,
    pub memberships: Vec<MembershipRow>,
    pub grants: Vec<GrantRow>,
    pub merges: Vec<MergeRow>,
    pub links: Vec<LinkRow>,
    pub invitations: Vec<InvitationRow>,
}

impl GraphSnapshot {
    /// 快照中的总行数
    pub fn row_count(&self) -> usize {
        self.permissions.len()
            + self.groups.len()
            + self.ranks.len()
            + self.memberships.len()
            + self.grants.len()
            + self.merges.len()
            + self.links.len()
            + self.invitations.len()
    }
}
