//! 数据模型模块
//! 标识符、图中的值对象、存储行与操作日志

pub mod action_log;
pub mod ids;
pub mod invitation;
pub mod link;
pub mod permission;
pub mod rank;
pub mod snapshot;

pub use action_log::*;
pub use ids::*;
pub use invitation::*;
pub use link::*;
pub use permission::*;
pub use rank::*;
pub use snapshot::*;
