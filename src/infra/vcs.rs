//! 版本控制接口
//!
//! `SourceControl` 抽象应用目录的 git 操作，`Git` 为默认实现

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::command::{CommandError, CommandRunner};

/// 同步后得到的短 revision
pub type Revision = String;

/// 源码同步错误
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{0} is not a version-controlled checkout")]
    NotARepository(PathBuf),

    #[error("failed to run git: {0}")]
    Command(#[from] CommandError),

    #[error("git {step} failed: {stderr}")]
    Git { step: &'static str, stderr: String },
}

/// 应用目录的版本控制操作
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// 目录是否是一个工作树
    async fn is_repository(&self, dir: &Path) -> bool;

    /// 工作树是否有未提交的修改
    async fn has_local_changes(&self, dir: &Path) -> Result<bool, SyncError>;

    /// 拉取远端并快进到目标分支，返回短 revision
    async fn sync_to(&self, dir: &Path, remote: &str, branch: &str) -> Result<Revision, SyncError>;
}

/// git 命令行实现
#[derive(Clone, Debug)]
pub struct Git {
    pub timeout: Duration,
}

impl Git {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn git(&self, dir: &Path, step: &'static str, args: &[&str]) -> Result<String, SyncError> {
        let output = CommandRunner::run_simple("git", args, dir, self.timeout).await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(SyncError::Git {
                step,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl SourceControl for Git {
    async fn is_repository(&self, dir: &Path) -> bool {
        if !dir.is_dir() {
            return false;
        }
        matches!(
            self.git(dir, "rev-parse", &["rev-parse", "--is-inside-work-tree"]).await,
            Ok(out) if out == "true"
        )
    }

    async fn has_local_changes(&self, dir: &Path) -> Result<bool, SyncError> {
        let status = self.git(dir, "status", &["status", "--porcelain"]).await?;
        Ok(!status.is_empty())
    }

    async fn sync_to(&self, dir: &Path, remote: &str, branch: &str) -> Result<Revision, SyncError> {
        if !self.is_repository(dir).await {
            return Err(SyncError::NotARepository(dir.to_path_buf()));
        }

        self.git(dir, "fetch", &["fetch", "--prune", remote]).await?;
        self.git(dir, "checkout", &["checkout", branch]).await?;
        let upstream = format!("{}/{}", remote, branch);
        self.git(dir, "merge", &["merge", "--ff-only", &upstream]).await?;
        self.git(dir, "rev-parse", &["rev-parse", "--short", "HEAD"]).await
    }
}
