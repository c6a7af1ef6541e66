//! Cross-group link model

use super::{GroupId, LinkId, RankId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// (group, rank) 端点
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RankRef {
    pub group: GroupId,
    pub rank: RankId,
}

impl RankRef {
    pub fn new(group: GroupId, rank: RankId) -> Self {
        Self { group, rank }
    }
}

impl fmt::Display for RankRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.group, self.rank)
    }
}

/// 有向的跨组链接：持有 origin rank 的成员视同持有 target rank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupLink {
    pub id: LinkId,
    pub origin: RankRef,
    pub target: RankRef,
}

impl GroupLink {
    /// 唯一性键 (origin, target)
    pub fn endpoints(&self) -> (RankRef, RankRef) {
        (self.origin, self.target)
    }
}

impl fmt::Display for GroupLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.origin, self.target)
    }
}
