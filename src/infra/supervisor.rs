//! 进程管理器接口
//!
//! `Supervisor` 抽象宿主机的服务管理（systemd），`Systemctl` 为默认实现

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::command::{CommandError, CommandRunner};

/// 进程管理器错误
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to run supervisor command: {0}")]
    Command(#[from] CommandError),

    #[error("{action} {unit} failed: {stderr}")]
    Failed {
        action: &'static str,
        unit: String,
        stderr: String,
    },
}

/// 宿主机进程管理器
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// 请求启动 unit（返回时服务不一定已经就绪）
    async fn start(&self, unit: &str) -> Result<(), SupervisorError>;

    /// 请求停止 unit
    async fn stop(&self, unit: &str) -> Result<(), SupervisorError>;

    /// 查询 unit 是否处于 active 状态
    async fn is_active(&self, unit: &str) -> bool;
}

/// systemctl 实现
#[derive(Clone, Debug)]
pub struct Systemctl {
    /// 是否通过 `sudo -n` 执行
    pub use_sudo: bool,
    pub timeout: Duration,
}

impl Systemctl {
    pub fn new(use_sudo: bool, timeout: Duration) -> Self {
        Self { use_sudo, timeout }
    }

    /// 组装命令行，返回 (program, args)
    fn command<'a>(&self, args: &[&'a str]) -> (&'static str, Vec<&'a str>) {
        if self.use_sudo {
            let mut full = vec!["-n", "systemctl"];
            full.extend_from_slice(args);
            ("sudo", full)
        } else {
            ("systemctl", args.to_vec())
        }
    }

    async fn run(&self, action: &'static str, unit: &str) -> Result<(), SupervisorError> {
        let (program, args) = self.command(&[action, unit]);
        let output =
            CommandRunner::run_simple(program, &args, Path::new("/"), self.timeout).await?;

        if output.status.success() {
            tracing::debug!(unit = %unit, action, "systemctl succeeded");
            Ok(())
        } else {
            Err(SupervisorError::Failed {
                action,
                unit: unit.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl Supervisor for Systemctl {
    async fn start(&self, unit: &str) -> Result<(), SupervisorError> {
        self.run("start", unit).await
    }

    async fn stop(&self, unit: &str) -> Result<(), SupervisorError> {
        self.run("stop", unit).await
    }

    async fn is_active(&self, unit: &str) -> bool {
        let (program, args) = self.command(&["is-active", "--quiet", unit]);
        match CommandRunner::run_simple(program, &args, Path::new("/"), self.timeout).await {
            Ok(output) => output.status.success(),
            Err(e) => {
                tracing::warn!(unit = %unit, error = %e, "Failed to query unit state");
                false
            }
        }
    }
}
