//! Permission model

use super::PermissionId;
use serde::{Deserialize, Serialize};

/// Permission
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub name: String,
}
