//! Permission catalog
//!
//! 全局的 id <-> 权限名映射。只追加，不删除。

use crate::{
    error::{GraphError, GraphResult},
    models::{Permission, PermissionId},
};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default)]
pub struct PermissionCatalog {
    by_id: BTreeMap<PermissionId, Permission>,
    by_name: HashMap<String, PermissionId>,
}

impl PermissionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册新权限，分配下一个未使用的 id
    pub fn register(&mut self, name: &str) -> GraphResult<Permission> {
        if self.by_name.contains_key(name) {
            return Err(GraphError::DuplicateName(name.to_string()));
        }
        let id = match self.by_id.keys().next_back() {
            Some(last) => last
                .checked_next()
                .ok_or(GraphError::IdSpaceExhausted("permission"))?,
            None => PermissionId(0),
        };
        let permission = Permission {
            id,
            name: name.to_string(),
        };
        self.by_name.insert(permission.name.clone(), id);
        self.by_id.insert(id, permission.clone());
        Ok(permission)
    }

    /// 加载已持久化的权限，id 或名称冲突时返回 false 且不修改目录
    pub(crate) fn insert_loaded(&mut self, id: PermissionId, name: &str) -> bool {
        if self.by_id.contains_key(&id) || self.by_name.contains_key(name) {
            return false;
        }
        self.by_name.insert(name.to_string(), id);
        self.by_id.insert(
            id,
            Permission {
                id,
                name: name.to_string(),
            },
        );
        true
    }

    pub fn lookup(&self, id: PermissionId) -> Option<&Permission> {
        self.by_id.get(&id)
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<&Permission> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }

    /// 按 id 升序遍历
    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
