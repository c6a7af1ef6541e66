//! Identifier newtypes
//!
//! 所有标识符都映射到数据库中的 INT 列。

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! int_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
            sqlx::Type,
        )]
        #[sqlx(transparent)]
        pub struct $name(pub i32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i32> for $name {
            fn from(value: i32) -> Self {
                Self(value)
            }
        }

        impl $name {
            /// 下一个顺序分配的 id；已到 `i32::MAX` 时为 `None`
            pub fn checked_next(self) -> Option<Self> {
                self.0.checked_add(1).map(Self)
            }
        }
    };
}

int_id!(
    /// Canonical group id. Retired ids only survive as merge redirects.
    GroupId
);
int_id!(
    /// Rank id, unique within one group
    RankId
);
int_id!(PermissionId);
int_id!(LinkId);

/// 根 rank 的约定 id（OWNER）
pub const ROOT_RANK_ID: RankId = RankId(0);
