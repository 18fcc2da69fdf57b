//! 配置模块
//!
//! 环境变量解析与配置管理

pub mod env;
pub mod services;

pub use env::{ConfigError, DeployConfig, MigrationConfig};
pub use services::{default_ecosystems, default_registry, Ecosystem};
