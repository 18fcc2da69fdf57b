//! 回滚
//!
//! 恢复最新备份：停止服务 → 替换应用目录 → 启动服务。
//! 没有可用备份或校验失败时不做任何修改

use std::path::PathBuf;

use super::backup::BackupStore;
use super::controller::ServiceController;
use crate::domain::backup::{BackupArtifact, Verification};
use crate::domain::deploy::Outcome;

pub struct RollbackCoordinator {
    store: BackupStore,
    controller: ServiceController,
    app_root: PathBuf,
}

impl RollbackCoordinator {
    pub fn new(store: BackupStore, controller: ServiceController, app_root: PathBuf) -> Self {
        Self {
            store,
            controller,
            app_root,
        }
    }

    /// 回滚到最新备份
    pub async fn rollback(&self) -> Outcome {
        let artifact = match self.store.latest().await {
            Ok(Some(artifact)) => artifact,
            Ok(None) => {
                tracing::error!(backup_root = %self.store.root().display(), "No backup available, cannot roll back");
                return Outcome::FailedNoBackup;
            }
            Err(e) => {
                tracing::error!(error = %e, "Cannot read backup directory");
                return Outcome::RollbackFailed {
                    reason: e.to_string(),
                };
            }
        };
        self.rollback_to(&artifact).await
    }

    /// 按名称回滚到某个备份，名称不存在时不做任何修改
    pub async fn rollback_named(&self, name: &str) -> Outcome {
        let artifacts = match self.store.list().await {
            Ok(list) => list,
            Err(e) => {
                tracing::error!(error = %e, "Cannot read backup directory");
                return Outcome::RollbackFailed {
                    reason: e.to_string(),
                };
            }
        };
        match artifacts.into_iter().find(|a| a.name == name) {
            Some(artifact) => self.rollback_to(&artifact).await,
            None => {
                tracing::error!(
                    artifact = %name,
                    backup_root = %self.store.root().display(),
                    "Backup not found, cannot roll back"
                );
                Outcome::FailedNoBackup
            }
        }
    }

    /// 回滚到指定备份
    pub async fn rollback_to(&self, artifact: &BackupArtifact) -> Outcome {
        tracing::info!(artifact = %artifact.name, "Rolling back");

        match self.store.verify(artifact).await {
            Ok(Verification::Verified) => {
                tracing::info!(artifact = %artifact.name, "Backup checksum verified")
            }
            Ok(Verification::Unverifiable) => {
                tracing::warn!(artifact = %artifact.name, "Backup has no checksum metadata, restoring unverified")
            }
            Ok(Verification::Mismatch { expected, actual }) => {
                tracing::error!(
                    artifact = %artifact.name,
                    expected = %expected,
                    actual = %actual,
                    "Backup checksum mismatch, refusing to restore"
                );
                return Outcome::RollbackFailed {
                    reason: format!("checksum mismatch for {}", artifact.name),
                };
            }
            Err(e) => {
                tracing::error!(artifact = %artifact.name, error = %e, "Cannot verify backup");
                return Outcome::RollbackFailed {
                    reason: e.to_string(),
                };
            }
        }

        self.controller.stop_all().await;

        let restored = self.store.restore(artifact, &self.app_root).await;

        // 恢复失败也要把服务拉起来
        self.controller.start_all().await;

        match restored {
            Ok(()) => {
                tracing::info!(artifact = %artifact.name, "Rollback complete");
                Outcome::RolledBack {
                    artifact: artifact.name.clone(),
                }
            }
            Err(e) => {
                tracing::error!(artifact = %artifact.name, error = %e, "Restore failed");
                Outcome::RollbackFailed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
