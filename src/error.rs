//! 统一错误处理
//!
//! 各组件有自己的错误类型，`DeployError` 汇总可以让流水线进入失败分支的错误

use thiserror::Error;

use crate::config::ConfigError;
use crate::infra::vcs::SyncError;
use crate::services::backup::BackupError;
use crate::services::deps::InstallError;

/// 流水线致命错误
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("backup failed: {0}")]
    Backup(#[from] BackupError),

    #[error("source sync failed: {0}")]
    Sync(#[from] SyncError),

    #[error("dependency install failed: {0}")]
    Install(#[from] InstallError),

    #[error("critical service {service} is not active after start")]
    ServiceNotActive { service: String },

    #[error("no backup artifact available")]
    NoBackup,
}

impl DeployError {
    /// 简短分类，用于日志字段
    pub fn kind(&self) -> &'static str {
        match self {
            DeployError::Config(_) => "config",
            DeployError::Backup(_) => "backup",
            DeployError::Sync(_) => "sync",
            DeployError::Install(_) => "install",
            DeployError::ServiceNotActive { .. } => "service_not_active",
            DeployError::NoBackup => "no_backup",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_source() {
        let err = DeployError::from(InstallError::CommandFailed {
            ecosystem: "python".to_string(),
            code: Some(1),
        });
        assert_eq!(err.kind(), "install");
        assert!(err.to_string().contains("dependency install failed"));
        assert!(err.to_string().contains("python"));
    }

    #[test]
    fn test_service_not_active_display() {
        let err = DeployError::ServiceNotActive {
            service: "grok-api".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "critical service grok-api is not active after start"
        );
    }
}
