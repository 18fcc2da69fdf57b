//! 源码同步

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::DeployConfig;
use crate::infra::vcs::{Revision, SourceControl, SyncError};

/// 把应用目录同步到远端分支
pub struct SourceSync {
    vcs: Arc<dyn SourceControl>,
    app_root: PathBuf,
    remote: String,
}

impl SourceSync {
    pub fn new(config: &DeployConfig, vcs: Arc<dyn SourceControl>) -> Self {
        Self {
            vcs,
            app_root: config.app_root.clone(),
            remote: config.remote.clone(),
        }
    }

    /// 拉取并快进到 `branch`
    ///
    /// 应用目录不是工作树时直接失败，这是硬性前提
    pub async fn sync_to(&self, branch: &str) -> Result<Revision, SyncError> {
        if !self.vcs.is_repository(&self.app_root).await {
            return Err(SyncError::NotARepository(self.app_root.clone()));
        }

        tracing::info!(remote = %self.remote, branch = %branch, "Syncing source");
        let revision = self.vcs.sync_to(&self.app_root, &self.remote, branch).await?;
        tracing::info!(revision = %revision, branch = %branch, "Source synced");
        Ok(revision)
    }
}
