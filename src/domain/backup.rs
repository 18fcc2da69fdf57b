//! 备份制品领域模型
//!
//! 制品命名规则: `<prefix>_<YYYYMMDD_HHMMSS>.tar.gz`（UTC），
//! 元数据写在同名的 `.json` 旁路文件中

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 归档扩展名
pub const ARCHIVE_EXT: &str = ".tar.gz";
/// 元数据扩展名
pub const METADATA_EXT: &str = ".json";
/// 时间戳格式
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// 备份制品（写入后不可变）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackupArtifact {
    /// 制品名称（不含扩展名），如 "app_backup_20260114_093000"
    pub name: String,
    /// 归档文件路径
    pub path: PathBuf,
    /// 从文件名解析出的创建时间
    pub created_at: DateTime<Utc>,
}

impl BackupArtifact {
    /// 元数据文件路径
    pub fn metadata_path(&self) -> PathBuf {
        self.path.with_file_name(format!("{}{}", self.name, METADATA_EXT))
    }
}

/// 制品元数据
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BackupMetadata {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub source_dir: PathBuf,
    pub size_bytes: u64,
    pub sha256: String,
    #[serde(default)]
    pub excluded: Vec<String>,
}

/// `BackupStore::create` 的结果
#[derive(Clone, Debug)]
pub enum BackupOutcome {
    Created(BackupArtifact),
    /// 源目录不存在等情况，只发出警告
    Skipped { reason: String },
}

/// 校验结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verification {
    Verified,
    Mismatch { expected: String, actual: String },
    /// 没有元数据可比对
    Unverifiable,
}

/// 生成制品名称
pub fn artifact_name(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}", prefix, at.format(TIMESTAMP_FORMAT))
}

/// 从归档文件名解析制品名称与时间戳
///
/// 不符合命名规则的文件返回 None
pub fn parse_archive_name(prefix: &str, file_name: &str) -> Option<(String, DateTime<Utc>)> {
    let name = file_name.strip_suffix(ARCHIVE_EXT)?;
    let ts = name.strip_prefix(prefix)?.strip_prefix('_')?;
    let parsed = NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).ok()?;
    Some((name.to_string(), parsed.and_utc()))
}
