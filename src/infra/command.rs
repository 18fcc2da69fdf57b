//! 命令执行器
//!
//! 提供统一的命令执行接口，支持：
//! - 输出逐行写入日志
//! - 超时控制（超时后杀掉子进程）
//! - stdout/stderr 分离

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{error, info, warn};

/// 命令执行器
pub struct CommandRunner;

/// 命令执行错误
#[derive(Debug)]
pub enum CommandError {
    /// 命令启动失败
    SpawnFailed(std::io::Error),
    /// 命令超时
    Timeout,
    /// 等待命令完成失败
    WaitFailed(std::io::Error),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::SpawnFailed(e) => write!(f, "Failed to spawn command: {}", e),
            CommandError::Timeout => write!(f, "Command timed out"),
            CommandError::WaitFailed(e) => write!(f, "Failed to wait for command: {}", e),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::SpawnFailed(e) | CommandError::WaitFailed(e) => Some(e),
            CommandError::Timeout => None,
        }
    }
}

/// 命令执行结果
#[derive(Debug)]
pub struct CommandResult {
    /// 退出状态
    pub status: ExitStatus,
    /// 是否因超时而终止
    pub timed_out: bool,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }
}

impl CommandRunner {
    /// 执行命令并把输出逐行写入日志
    ///
    /// # Arguments
    /// * `program` - 要执行的程序
    /// * `args` - 命令行参数
    /// * `work_dir` - 工作目录
    /// * `timeout` - 超时时间
    pub async fn run_streaming(
        program: &str,
        args: &[&str],
        work_dir: &Path,
        timeout: Duration,
    ) -> Result<CommandResult, CommandError> {
        let mut child = Command::new(program)
            .args(args)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(CommandError::SpawnFailed)?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let finished = tokio::time::timeout(timeout, async {
            tokio::join!(
                pump_lines(stdout, program, false),
                pump_lines(stderr, program, true)
            );
            child.wait().await
        })
        .await;

        match finished {
            Ok(status) => {
                let status = status.map_err(CommandError::WaitFailed)?;
                Ok(CommandResult {
                    status,
                    timed_out: false,
                })
            }
            Err(_) => {
                error!(program = %program, "Command timed out after {:?}", timeout);
                let _ = child.kill().await;
                // 等待进程实际终止
                let status = child.wait().await.map_err(CommandError::WaitFailed)?;
                Ok(CommandResult {
                    status,
                    timed_out: true,
                })
            }
        }
    }

    /// 执行简单命令（无流式输出）
    ///
    /// 用于只关心退出码和少量输出的场景（如 git rev-parse、systemctl is-active）
    pub async fn run_simple(
        program: &str,
        args: &[&str],
        work_dir: &Path,
        timeout: Duration,
    ) -> Result<std::process::Output, CommandError> {
        let child = Command::new(program)
            .args(args)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        tokio::select! {
            result = child => {
                result.map_err(CommandError::SpawnFailed)
            }
            _ = tokio::time::sleep(timeout) => {
                Err(CommandError::Timeout)
            }
        }
    }
}

/// 逐行读取输出写入日志，stderr 使用 WARN
async fn pump_lines<R>(reader: Option<R>, program: &str, is_stderr: bool)
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return;
    };
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        if is_stderr {
            warn!(program = %program, stream = "stderr", "{}", line);
        } else {
            info!(program = %program, stream = "stdout", "{}", line);
        }
    }
}
