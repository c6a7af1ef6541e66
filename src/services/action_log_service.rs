//! 组操作日志服务
//!
//! 操作日志只追加、从不回读；写入失败不会影响已经完成的操作。

use crate::{models::ActionLogEntry, repository::GroupStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct ActionLogService {
    store: Arc<dyn GroupStore>,
}

impl ActionLogService {
    pub fn new(store: Arc<dyn GroupStore>) -> Self {
        Self { store }
    }

    /// 记录一条操作日志
    pub async fn record(&self, entry: ActionLogEntry) {
        match self.store.record_action(&entry).await {
            Ok(()) => {
                tracing::debug!(
                    group = %entry.group_id,
                    actor = %entry.actor,
                    action = entry.action.as_str(),
                    "Group action recorded"
                );
            }
            Err(e) => {
                tracing::warn!(
                    group = %entry.group_id,
                    action = entry.action.as_str(),
                    error = %e,
                    "Failed to record group action"
                );
                metrics::counter!("rankgraph.action_log.failures").increment(1);
            }
        }
    }
}
