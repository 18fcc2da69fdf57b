//! Schema 迁移
//!
//! 入口脚本不存在时跳过；脚本失败只产生警告，不触发回滚

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{DeployConfig, MigrationConfig};
use crate::infra::command::CommandRunner;

/// 迁移结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// 没有迁移入口
    NotPresent,
    Applied,
    /// 入口执行失败（原因）
    Failed(String),
}

pub struct MigrationRunner {
    config: MigrationConfig,
    timeout: Duration,
}

impl MigrationRunner {
    pub fn new(config: MigrationConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    pub fn from_config(config: &DeployConfig) -> Self {
        Self::new(config.migration.clone(), config.command_timeout)
    }

    fn entry_path(&self, app_root: &Path) -> PathBuf {
        app_root.join(&self.config.entry)
    }

    /// 执行迁移入口
    pub async fn migrate(&self, app_root: &Path) -> MigrationOutcome {
        let entry = self.entry_path(app_root);
        if !entry.is_file() {
            tracing::info!(entry = %entry.display(), "No migration entry point, skipping");
            return MigrationOutcome::NotPresent;
        }

        let entry_arg = entry.to_string_lossy();
        tracing::info!(runner = %self.config.runner, entry = %entry_arg, "Running migrations");

        let outcome = match CommandRunner::run_streaming(
            &self.config.runner,
            &[entry_arg.as_ref()],
            app_root,
            self.timeout,
        )
        .await
        {
            Ok(result) if result.success() => MigrationOutcome::Applied,
            Ok(result) if result.timed_out => {
                MigrationOutcome::Failed(format!("timed out after {:?}", self.timeout))
            }
            Ok(result) => MigrationOutcome::Failed(format!(
                "exited with code {}",
                result
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "none".to_string())
            )),
            Err(e) => MigrationOutcome::Failed(e.to_string()),
        };

        match &outcome {
            MigrationOutcome::Applied => tracing::info!("Migrations applied"),
            MigrationOutcome::Failed(reason) => {
                tracing::warn!(reason = %reason, "Migration failed, continuing deployment")
            }
            MigrationOutcome::NotPresent => {}
        }
        outcome
    }
}
