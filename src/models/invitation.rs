//! Invitation model

use super::{GroupId, RankId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 待处理的入组邀请，每个 (principal, group) 至多一条
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    pub principal: Uuid,
    pub group: GroupId,
    pub rank: RankId,
    pub invited_at: DateTime<Utc>,
}
