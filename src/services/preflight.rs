//! 部署前检查
//!
//! 磁盘空间、工作树是否干净、运行权限。这些检查只产生警告，
//! 唯一致命的是配置本身不一致（`DeployConfig::validate`）

use serde::Serialize;
use std::path::{Path, PathBuf};
use sysinfo::Disks;

use crate::config::{ConfigError, DeployConfig};
use crate::infra::vcs::SourceControl;

/// 预检报告
#[derive(Clone, Debug, Default, Serialize)]
pub struct PreflightReport {
    pub warnings: Vec<String>,
    /// 目标卷的剩余空间（字节）
    pub free_bytes: Option<u64>,
}

impl PreflightReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    fn warn(&mut self, message: String) {
        tracing::warn!("Preflight: {}", message);
        self.warnings.push(message);
    }
}

/// 执行所有预检
pub async fn check(
    config: &DeployConfig,
    vcs: &dyn SourceControl,
) -> Result<PreflightReport, ConfigError> {
    config.validate()?;

    let mut report = PreflightReport::default();

    // 磁盘空间
    let probe_path = disk_probe_path(config);
    match free_space(&probe_path) {
        Some(free) => {
            report.free_bytes = Some(free);
            if free < config.min_free_bytes {
                report.warn(format!(
                    "low disk space on {}: {} bytes free, {} required",
                    probe_path.display(),
                    free,
                    config.min_free_bytes
                ));
            } else {
                tracing::info!(path = %probe_path.display(), free_bytes = free, "Disk space OK");
            }
        }
        None => report.warn(format!(
            "cannot determine free space for {}",
            probe_path.display()
        )),
    }

    // 工作树
    match vcs.has_local_changes(&config.app_root).await {
        Ok(true) => report.warn(format!(
            "uncommitted local changes in {}",
            config.app_root.display()
        )),
        Ok(false) => tracing::info!("Working tree clean"),
        Err(e) => report.warn(format!("cannot inspect working tree: {}", e)),
    }

    // 权限
    let is_root = nix::unistd::geteuid().is_root();
    if let Some(message) = privilege_warning(config.is_production(), is_root, &config.environment) {
        report.warn(message);
    }

    Ok(report)
}

/// 生产环境需要 root 才能控制 systemd 服务；非生产环境不应以 root 运行
fn privilege_warning(production: bool, is_root: bool, environment: &str) -> Option<String> {
    match (production, is_root) {
        (true, false) => Some(format!(
            "running as non-root user in {} environment",
            environment
        )),
        (false, true) => Some(format!("running as root in {} environment", environment)),
        _ => None,
    }
}

fn disk_probe_path(config: &DeployConfig) -> PathBuf {
    if config.app_root.exists() {
        return config.app_root.clone();
    }
    match config.backup_root.parent() {
        Some(parent) if parent.exists() => parent.to_path_buf(),
        _ => PathBuf::from("/"),
    }
}

/// 挂载点为路径最长前缀的磁盘的可用空间
fn free_space(path: &Path) -> Option<u64> {
    let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| path.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space())
}
