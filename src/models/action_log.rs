//! Group action log models

use super::GroupId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 组操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupAction {
    // 组相关
    GroupCreate,
    GroupRename,
    GroupMerge,

    // 成员相关
    MemberAdd,
    MemberRankChange,
    MemberRemove,
    InviteSend,
    InviteRevoke,

    // rank 相关
    RankCreate,
    RankRename,
    RankMove,
    RankRemove,

    // 权限相关
    PermissionGrant,
    PermissionRevoke,

    // 链接相关
    LinkCreate,
    LinkRemove,
}

impl GroupAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupAction::GroupCreate => "group.create",
            GroupAction::GroupRename => "group.rename",
            GroupAction::GroupMerge => "group.merge",

            GroupAction::MemberAdd => "member.add",
            GroupAction::MemberRankChange => "member.rank_change",
            GroupAction::MemberRemove => "member.remove",
            GroupAction::InviteSend => "invite.send",
            GroupAction::InviteRevoke => "invite.revoke",

            GroupAction::RankCreate => "rank.create",
            GroupAction::RankRename => "rank.rename",
            GroupAction::RankMove => "rank.move",
            GroupAction::RankRemove => "rank.remove",

            GroupAction::PermissionGrant => "permission.grant",
            GroupAction::PermissionRevoke => "permission.revoke",

            GroupAction::LinkCreate => "link.create",
            GroupAction::LinkRemove => "link.remove",
        }
    }
}

/// 操作日志条目（只追加，不被核心读取）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub group_id: GroupId,
    /// 执行操作的主体
    pub actor: Uuid,
    pub action: GroupAction,
    /// 操作涉及的 rank 名称
    pub rank: String,
    /// 被操作对象的名称（成员、权限、新组名等）
    pub subject: Option<String>,
    pub extra: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl ActionLogEntry {
    pub fn new(group_id: GroupId, actor: Uuid, action: GroupAction, rank: impl Into<String>) -> Self {
        Self {
            group_id,
            actor,
            action,
            rank: rank.into(),
            subject: None,
            extra: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }
}
