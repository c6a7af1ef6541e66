//! 权限图核心
//! 权限目录、rank 树、组、组注册表（含链接与合并重定向）以及从存储重建图的加载器

pub mod catalog;
pub mod group;
pub mod loader;
pub mod rank_tree;
pub mod registry;

pub use catalog::PermissionCatalog;
pub use group::Group;
pub use loader::{GraphLoader, LoadReport};
pub use rank_tree::RankTree;
pub use registry::{GroupRegistry, DEFAULT_RANKS};

use serde::Deserialize;

/// 名称长度限制
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct GraphLimits {
    /// 组名最大长度（字符数）
    pub max_group_name_length: usize,
    /// rank 名最大长度（字符数）
    pub max_rank_name_length: usize,
}

impl Default for GraphLimits {
    fn default() -> Self {
        Self {
            max_group_name_length: 255,
            max_rank_name_length: 40,
        }
    }
}

/// 校验名称：非空、无首尾空白、不超过长度限制
pub(crate) fn validate_name(name: &str, max_length: usize) -> crate::error::GraphResult<()> {
    if name.is_empty() || name.trim() != name {
        return Err(crate::error::GraphError::InvalidName(name.to_string()));
    }
    if name.chars().count() > max_length {
        return Err(crate::error::GraphError::InvalidName(format!(
            "{} (longer than {} characters)",
            name, max_length
        )));
    }
    Ok(())
}
