//! 环境变量配置加载
//!
//! 启动时读取一次，生成不可变的 `DeployConfig`，之后以 `Arc` 传给各组件

use std::collections::HashSet;
use std::env;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::services::{default_ecosystems, default_registry, Ecosystem};
use crate::domain::service::ServiceDescriptor;

/// 配置错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid service entry {0:?} (expected name=unit@url[!])")]
    InvalidService(String),

    #[error("invalid value {value:?} for {var}")]
    InvalidValue { var: &'static str, value: String },

    #[error("service registry is empty")]
    EmptyRegistry,

    #[error("duplicate service name {0:?}")]
    DuplicateService(String),

    #[error("backup root {backup_root} must not be inside application root {app_root}")]
    BackupInsideApp { app_root: PathBuf, backup_root: PathBuf },
}

/// 迁移入口配置
#[derive(Clone, Debug)]
pub struct MigrationConfig {
    /// 入口脚本，相对于应用目录
    pub entry: PathBuf,
    /// 执行入口的程序
    pub runner: String,
}

/// 部署配置
#[derive(Clone, Debug)]
pub struct DeployConfig {
    /// 目标环境标签 (production / staging / ...)
    pub environment: String,
    /// 应用目录（git 工作树）
    pub app_root: PathBuf,
    /// 备份目录
    pub backup_root: PathBuf,
    /// 备份制品名称前缀
    pub backup_prefix: String,
    /// 保留最新的 N 个备份，0 表示不按数量清理
    pub backup_keep: usize,
    /// 清理早于 N 天的备份
    pub backup_retention_days: Option<u32>,
    /// 打包时排除的路径名
    pub backup_exclude: Vec<String>,
    /// 追加写入的日志文件
    pub log_file: PathBuf,
    /// 同步的目标分支
    pub branch: String,
    pub remote: String,
    /// 受管服务，顺序即停止/启动顺序
    pub services: Vec<ServiceDescriptor>,
    /// 预检磁盘剩余空间下限
    pub min_free_bytes: u64,
    /// 单次健康探测超时
    pub health_timeout: Duration,
    /// 启动后就绪轮询的总时长上限
    pub settle_timeout: Duration,
    /// 就绪轮询第一次退避间隔
    pub settle_initial_delay: Duration,
    /// git / 安装 / 迁移命令超时
    pub command_timeout: Duration,
    /// systemctl 是否通过 sudo 执行
    pub supervisor_sudo: bool,
    /// critical 服务启动失败是否升级为致命错误
    pub escalate_start_failures: bool,
    pub migration: MigrationConfig,
    pub ecosystems: Vec<Ecosystem>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            environment: "production".to_string(),
            app_root: PathBuf::from("/opt/sovereign/app"),
            backup_root: PathBuf::from("/opt/sovereign/backups"),
            backup_prefix: "app_backup".to_string(),
            backup_keep: 10,
            backup_retention_days: None,
            backup_exclude: Vec::new(),
            log_file: PathBuf::from("/var/log/sovereign-deploy.log"),
            branch: "main".to_string(),
            remote: "origin".to_string(),
            services: default_registry(),
            min_free_bytes: constants::DEFAULT_MIN_FREE_BYTES,
            health_timeout: Duration::from_secs(5),
            settle_timeout: Duration::from_secs(30),
            settle_initial_delay: Duration::from_millis(500),
            command_timeout: Duration::from_secs(600),
            supervisor_sudo: false,
            escalate_start_failures: true,
            migration: MigrationConfig {
                entry: PathBuf::from("scripts/migrate.sh"),
                runner: "sh".to_string(),
            },
            ecosystems: default_ecosystems(),
        }
    }
}

impl DeployConfig {
    /// 从环境变量加载配置，未设置的项使用默认值
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let services = match env::var("SERVICES") {
            Ok(list) if !list.trim().is_empty() => {
                ServiceDescriptor::parse_list(&list).map_err(ConfigError::InvalidService)?
            }
            _ => defaults.services,
        };

        let backup_exclude = env::var("BACKUP_EXCLUDE")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            environment: env::var("DEPLOY_ENV").unwrap_or(defaults.environment),
            app_root: env_path("APP_ROOT").unwrap_or(defaults.app_root),
            backup_root: env_path("BACKUP_ROOT").unwrap_or(defaults.backup_root),
            backup_prefix: env::var("BACKUP_PREFIX").unwrap_or(defaults.backup_prefix),
            backup_keep: env_parse("BACKUP_KEEP")?.unwrap_or(defaults.backup_keep),
            backup_retention_days: env_parse("BACKUP_RETENTION_DAYS")?
                .or(defaults.backup_retention_days),
            backup_exclude,
            log_file: env_path("LOG_FILE").unwrap_or(defaults.log_file),
            branch: env::var("DEPLOY_BRANCH").unwrap_or(defaults.branch),
            remote: env::var("DEPLOY_REMOTE").unwrap_or(defaults.remote),
            services,
            min_free_bytes: env_parse("MIN_FREE_BYTES")?.unwrap_or(defaults.min_free_bytes),
            health_timeout: env_parse("HEALTH_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.health_timeout),
            settle_timeout: env_parse("SETTLE_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.settle_timeout),
            settle_initial_delay: env_parse("SETTLE_INITIAL_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.settle_initial_delay),
            command_timeout: env_parse("COMMAND_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.command_timeout),
            supervisor_sudo: env_bool("SUPERVISOR_SUDO").unwrap_or(defaults.supervisor_sudo),
            escalate_start_failures: env_bool("ESCALATE_START_FAILURES")
                .unwrap_or(defaults.escalate_start_failures),
            migration: MigrationConfig {
                entry: env_path("MIGRATION_ENTRY").unwrap_or(defaults.migration.entry),
                runner: env::var("MIGRATION_RUNNER").unwrap_or(defaults.migration.runner),
            },
            ecosystems: defaults.ecosystems,
        })
    }

    /// 检查配置的一致性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.services.is_empty() {
            return Err(ConfigError::EmptyRegistry);
        }

        let mut seen = HashSet::new();
        for service in &self.services {
            if !seen.insert(service.name.as_str()) {
                return Err(ConfigError::DuplicateService(service.name.clone()));
            }
        }

        // 回滚会清空应用目录，备份不能放在里面
        if resolve(&self.backup_root).starts_with(resolve(&self.app_root)) {
            return Err(ConfigError::BackupInsideApp {
                app_root: self.app_root.clone(),
                backup_root: self.backup_root.clone(),
            });
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
            || self.environment.eq_ignore_ascii_case("prod")
    }
}

/// 消除 `.` 和 `..`，存在的最长前缀再按文件系统解析符号链接
fn resolve(path: &Path) -> PathBuf {
    let mut lexical = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                lexical.pop();
            }
            other => lexical.push(other),
        }
    }

    let mut existing = lexical.as_path();
    let mut rest = Vec::new();
    loop {
        if let Ok(canonical) = std::fs::canonicalize(existing) {
            return rest.iter().rev().fold(canonical, |acc, c| acc.join(c));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return lexical,
        }
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    env::var(var).ok().filter(|v| !v.is_empty()).map(PathBuf::from)
}

fn env_bool(var: &str) -> Option<bool> {
    env::var(var)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes"))
}

fn env_parse<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value }),
        _ => Ok(None),
    }
}

/// 常量
pub mod constants {
    /// 默认磁盘剩余空间下限 (1 GiB)
    pub const DEFAULT_MIN_FREE_BYTES: u64 = 1024 * 1024 * 1024;

    /// 就绪轮询单次退避下限（毫秒）
    pub const SETTLE_MIN_BACKOFF_MS: u64 = 50;

    /// 就绪轮询单次退避上限（毫秒）
    pub const SETTLE_MAX_BACKOFF_MS: u64 = 5_000;

    /// 版本号
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}
