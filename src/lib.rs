//! 组 / rank / 权限图
//! 提供权限图核心、加载器、持久化与服务层

pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod models;
pub mod repository;
pub mod services;
pub mod telemetry;
