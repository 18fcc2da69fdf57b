//! 依赖安装
//!
//! 应用目录中存在哪个生态的清单文件，就执行该生态的安装命令。
//! 任一命令失败都是致命的：此时服务已经停止，代码已经更新

use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::config::{DeployConfig, Ecosystem};
use crate::infra::command::{CommandError, CommandRunner};

/// 依赖安装错误
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("{ecosystem} install exited with code {code:?}")]
    CommandFailed { ecosystem: String, code: Option<i32> },

    #[error("{ecosystem} install timed out after {timeout:?}")]
    Timeout { ecosystem: String, timeout: Duration },

    #[error("{ecosystem} install could not run: {source}")]
    Command {
        ecosystem: String,
        #[source]
        source: CommandError,
    },
}

/// 安装报告
#[derive(Clone, Debug, Default)]
pub struct InstallReport {
    /// 执行过安装的生态
    pub installed: Vec<String>,
    /// 没有清单文件而跳过的生态
    pub skipped: Vec<String>,
}

/// 依赖安装器
pub struct DependencyInstaller {
    ecosystems: Vec<Ecosystem>,
    timeout: Duration,
}

impl DependencyInstaller {
    pub fn new(ecosystems: Vec<Ecosystem>, timeout: Duration) -> Self {
        Self { ecosystems, timeout }
    }

    pub fn from_config(config: &DeployConfig) -> Self {
        Self::new(config.ecosystems.clone(), config.command_timeout)
    }

    /// 按顺序安装；第一个失败的生态终止整个阶段
    pub async fn install(&self, app_root: &Path) -> Result<InstallReport, InstallError> {
        let mut report = InstallReport::default();

        for eco in &self.ecosystems {
            if !app_root.join(&eco.manifest).is_file() {
                tracing::info!(ecosystem = %eco.name, manifest = %eco.manifest, "No manifest, skipping");
                report.skipped.push(eco.name.clone());
                continue;
            }

            tracing::info!(ecosystem = %eco.name, command = %eco.command_line(), "Installing dependencies");
            let args: Vec<&str> = eco.args.iter().map(String::as_str).collect();
            let result = CommandRunner::run_streaming(&eco.program, &args, app_root, self.timeout)
                .await
                .map_err(|source| InstallError::Command {
                    ecosystem: eco.name.clone(),
                    source,
                })?;

            if result.timed_out {
                return Err(InstallError::Timeout {
                    ecosystem: eco.name.clone(),
                    timeout: self.timeout,
                });
            }
            if !result.status.success() {
                return Err(InstallError::CommandFailed {
                    ecosystem: eco.name.clone(),
                    code: result.status.code(),
                });
            }

            report.installed.push(eco.name.clone());
        }

        Ok(report)
    }
}
