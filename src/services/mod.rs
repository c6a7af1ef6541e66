//! Business logic layer

pub mod action_log_service;
pub mod group_service;

pub use action_log_service::ActionLogService;
pub use group_service::GroupService;
