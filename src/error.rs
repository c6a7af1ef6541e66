//! 统一错误模型
//! 定义图操作的错误类型、错误分类与加载期一致性警告

use crate::models::{GroupId, LinkId, PermissionId, RankId};
use thiserror::Error;
use uuid::Uuid;

/// 图操作错误类型
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Name already taken: {0}")]
    DuplicateName(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Unknown parent rank {0}")]
    UnknownParent(RankId),

    #[error("Unknown rank {rank} in group {group}")]
    UnknownRank { group: GroupId, rank: RankId },

    #[error("Unknown group {0}")]
    UnknownGroup(GroupId),

    #[error("Unknown permission {0}")]
    UnknownPermission(String),

    #[error("Unknown link {0}")]
    UnknownLink(LinkId),

    #[error("{principal} is not a member of group {group}")]
    UnknownMember { group: GroupId, principal: Uuid },

    #[error("{principal} is already a member of group {group}")]
    MemberExists { group: GroupId, principal: Uuid },

    #[error("Group {0} cannot be merged into itself")]
    SelfMerge(GroupId),

    #[error("Link already exists: {0}")]
    DuplicateEdge(String),

    #[error("Rank {0} is still referenced")]
    RankInUse(RankId),

    #[error("Root rank cannot be removed")]
    CannotRemoveRoot,

    #[error("Root rank cannot be moved")]
    CannotMoveRoot,

    #[error("Rank tree already has a root")]
    RootAlreadyExists,

    #[error("Moving rank {rank} under {parent} would create a cycle")]
    CycleDetected { rank: RankId, parent: RankId },

    #[error("No {0} ids left to allocate")]
    IdSpaceExhausted(&'static str),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// 调用方输入有误，同步返回，不自动重试
    Validation,
    /// 会破坏树结构的操作，在任何修改之前拒绝
    StructuralInvariant,
    /// 持久化层不可用，由调用方决定重试策略
    Storage,
    Config,
}

impl GraphError {
    /// 获取错误分类
    pub fn category(&self) -> ErrorCategory {
        match self {
            GraphError::RootAlreadyExists | GraphError::CycleDetected { .. } => {
                ErrorCategory::StructuralInvariant
            }
            GraphError::StorageUnavailable(_) => ErrorCategory::Storage,
            GraphError::Config(_) => ErrorCategory::Config,
            _ => ErrorCategory::Validation,
        }
    }

    /// 获取稳定的错误码
    pub fn code(&self) -> &'static str {
        match self {
            GraphError::DuplicateName(_) => "duplicate_name",
            GraphError::InvalidName(_) => "invalid_name",
            GraphError::UnknownParent(_) => "unknown_parent",
            GraphError::UnknownRank { .. } => "unknown_rank",
            GraphError::UnknownGroup(_) => "unknown_group",
            GraphError::UnknownPermission(_) => "unknown_permission",
            GraphError::UnknownLink(_) => "unknown_link",
            GraphError::UnknownMember { .. } => "unknown_member",
            GraphError::MemberExists { .. } => "member_exists",
            GraphError::SelfMerge(_) => "self_merge",
            GraphError::DuplicateEdge(_) => "duplicate_edge",
            GraphError::RankInUse(_) => "rank_in_use",
            GraphError::CannotRemoveRoot => "cannot_remove_root",
            GraphError::CannotMoveRoot => "cannot_move_root",
            GraphError::RootAlreadyExists => "root_already_exists",
            GraphError::CycleDetected { .. } => "cycle_detected",
            GraphError::IdSpaceExhausted(_) => "id_space_exhausted",
            GraphError::StorageUnavailable(_) => "storage_unavailable",
            GraphError::Config(_) => "config_error",
        }
    }
}

/// 从 config::ConfigError 转换
impl From<config::ConfigError> for GraphError {
    fn from(e: config::ConfigError) -> Self {
        GraphError::Config(e.to_string())
    }
}

pub type GraphResult<T> = Result<T, GraphError>;

/// 加载期一致性警告
///
/// 每条警告对应一行被丢弃（或被修正）的存储数据，加载过程不会因此失败。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyWarning {
    DuplicatePermission { id: PermissionId, name: String },
    DuplicateGroupId { group: GroupId },
    DuplicateGroupName { group: GroupId, name: String },
    RankWithoutGroup { group: GroupId, rank: RankId },
    DuplicateRank { group: GroupId, rank: RankId },
    DuplicateRankName { group: GroupId, rank: RankId, name: String },
    /// 没有无父节点的 rank，使用 0 号 rank 作为根并忽略其父节点
    RootParentIgnored { group: GroupId, parent: RankId },
    OrphanRank { group: GroupId, rank: RankId },
    GroupWithoutRoot { group: GroupId },
    MemberWithoutGroup { group: GroupId, principal: Uuid },
    UnknownMemberRank { group: GroupId, principal: Uuid, rank: RankId },
    DuplicateMember { group: GroupId, principal: Uuid },
    GrantWithoutGroup { group: GroupId, rank: RankId },
    UnknownGrantRank { group: GroupId, rank: RankId },
    UnknownGrantPermission { group: GroupId, rank: RankId, permission: PermissionId },
    LiveGroupRedirected { old: GroupId, new: GroupId },
    StaleRedirect { old: GroupId, new: GroupId },
    LinkWithoutGroup { link: LinkId, group: GroupId },
    UnknownLinkRank { link: LinkId, group: GroupId, rank: RankId },
    DuplicateLink { link: LinkId },
    InvitationWithoutGroup { group: GroupId, principal: Uuid },
    UnknownInvitationRank { group: GroupId, principal: Uuid, rank: RankId },
    /// 存储中已出现 `i32::MAX`，该 id 空间无法继续分配（行本身照常加载）
    IdSpaceExhausted { space: &'static str, group: Option<GroupId> },
}

impl ConsistencyWarning {
    /// 警告种类，用于日志与指标标签
    pub fn kind(&self) -> &'static str {
        match self {
            ConsistencyWarning::DuplicatePermission { .. } => "duplicate_permission",
            ConsistencyWarning::DuplicateGroupId { .. } => "duplicate_group_id",
            ConsistencyWarning::DuplicateGroupName { .. } => "duplicate_group_name",
            ConsistencyWarning::RankWithoutGroup { .. } => "rank_without_group",
            ConsistencyWarning::DuplicateRank { .. } => "duplicate_rank",
            ConsistencyWarning::DuplicateRankName { .. } => "duplicate_rank_name",
            ConsistencyWarning::RootParentIgnored { .. } => "root_parent_ignored",
            ConsistencyWarning::OrphanRank { .. } => "orphan_rank",
            ConsistencyWarning::GroupWithoutRoot { .. } => "group_without_root",
            ConsistencyWarning::MemberWithoutGroup { .. } => "member_without_group",
            ConsistencyWarning::UnknownMemberRank { .. } => "unknown_member_rank",
            ConsistencyWarning::DuplicateMember { .. } => "duplicate_member",
            ConsistencyWarning::GrantWithoutGroup { .. } => "grant_without_group",
            ConsistencyWarning::UnknownGrantRank { .. } => "unknown_grant_rank",
            ConsistencyWarning::UnknownGrantPermission { .. } => "unknown_grant_permission",
            ConsistencyWarning::LiveGroupRedirected { .. } => "live_group_redirected",
            ConsistencyWarning::StaleRedirect { .. } => "stale_redirect",
            ConsistencyWarning::LinkWithoutGroup { .. } => "link_without_group",
            ConsistencyWarning::UnknownLinkRank { .. } => "unknown_link_rank",
            ConsistencyWarning::DuplicateLink { .. } => "duplicate_link",
            ConsistencyWarning::InvitationWithoutGroup { .. } => "invitation_without_group",
            ConsistencyWarning::UnknownInvitationRank { .. } => "unknown_invitation_rank",
            ConsistencyWarning::IdSpaceExhausted { .. } => "id_space_exhausted",
        }
    }
}
