//! Rank model

use super::{PermissionId, RankId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// 组内的一个 rank（rank 树中的节点）
///
/// 父子关系只以 id 引用，不持有其他节点。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rank {
    pub id: RankId,
    pub name: String,
    pub parent: Option<RankId>,
    /// 显式授予的权限，不从父节点继承
    pub permissions: BTreeSet<PermissionId>,
}

impl Rank {
    pub fn new(id: RankId, name: impl Into<String>, parent: Option<RankId>) -> Self {
        Self {
            id,
            name: name.into(),
            parent,
            permissions: BTreeSet::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}
