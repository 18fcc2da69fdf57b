//! 备份存储
//!
//! 把应用目录打包成带时间戳的 tar.gz 制品：
//! 1. 先写入 `.partial` 临时文件，完成后再重命名，避免留下半截归档
//! 2. 同名 `.json` 元数据记录源目录、大小和 SHA-256
//! 3. 按保留数量和保留天数清理旧制品
//!
//! "最新"按文件名中的时间戳判定，不看文件系统 mtime。
//! 排除项只匹配应用目录的顶层条目，恢复时这些条目原样保留

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use walkdir::WalkDir;

use crate::config::DeployConfig;
use crate::domain::backup::{
    artifact_name, parse_archive_name, BackupArtifact, BackupMetadata, BackupOutcome,
    Verification, ARCHIVE_EXT,
};

/// 备份错误
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("backup artifact {0} already exists")]
    AlreadyExists(PathBuf),

    #[error("invalid backup metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// 备份存储
#[derive(Clone, Debug)]
pub struct BackupStore {
    root: PathBuf,
    prefix: String,
    /// 保留数量，0 表示不按数量清理
    keep: usize,
    /// 超过天数的制品会被清理
    retention_days: Option<u32>,
    exclude: Vec<String>,
}

impl BackupStore {
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
            keep: 0,
            retention_days: None,
            exclude: Vec::new(),
        }
    }

    pub fn from_config(config: &DeployConfig) -> Self {
        Self {
            root: config.backup_root.clone(),
            prefix: config.backup_prefix.clone(),
            keep: config.backup_keep,
            retention_days: config.backup_retention_days,
            exclude: config.backup_exclude.clone(),
        }
    }

    pub fn with_keep(mut self, keep: usize) -> Self {
        self.keep = keep;
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = Some(days);
        self
    }

    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 创建备份
    ///
    /// 源目录不存在时返回 `Skipped`（警告，不是错误）
    pub async fn create(&self, source_dir: &Path) -> Result<BackupOutcome, BackupError> {
        if !fs::metadata(source_dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            let reason = format!("source directory {} does not exist", source_dir.display());
            tracing::warn!(source = %source_dir.display(), "Skipping backup: source directory missing");
            return Ok(BackupOutcome::Skipped { reason });
        }

        fs::create_dir_all(&self.root).await?;

        let created_at = chrono::Utc::now();
        let name = artifact_name(&self.prefix, created_at);
        let path = self.root.join(format!("{}{}", name, ARCHIVE_EXT));
        if fs::try_exists(&path).await? {
            return Err(BackupError::AlreadyExists(path));
        }
        let partial = self.root.join(format!("{}{}.partial", name, ARCHIVE_EXT));

        tracing::info!(
            artifact = %name,
            source = %source_dir.display(),
            "Creating backup"
        );

        let (source, dest, exclude) = (source_dir.to_path_buf(), partial.clone(), self.exclude.clone());
        let written = tokio::task::spawn_blocking(move || -> io::Result<(u64, String)> {
            write_archive(&source, &dest, &exclude)?;
            let size = std::fs::metadata(&dest)?.len();
            Ok((size, hash_file(&dest)?))
        })
        .await?;

        let (size_bytes, sha256) = match written {
            Ok(v) => v,
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                return Err(e.into());
            }
        };
        fs::rename(&partial, &path).await?;

        let artifact = BackupArtifact {
            name: name.clone(),
            path,
            created_at,
        };
        let metadata = BackupMetadata {
            name: name.clone(),
            created_at,
            source_dir: source_dir.to_path_buf(),
            size_bytes,
            sha256,
            excluded: self.exclude.clone(),
        };
        fs::write(artifact.metadata_path(), serde_json::to_vec_pretty(&metadata)?).await?;

        tracing::info!(artifact = %name, size_bytes, "Backup created");

        self.prune(&name).await;

        Ok(BackupOutcome::Created(artifact))
    }

    /// 列出所有制品，按时间戳从旧到新
    pub async fn list(&self) -> Result<Vec<BackupArtifact>, BackupError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut artifacts = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some((name, created_at)) =
                parse_archive_name(&self.prefix, &file_name.to_string_lossy())
            else {
                continue;
            };
            if !entry.file_type().await?.is_file() {
                continue;
            }
            artifacts.push(BackupArtifact {
                name,
                path: entry.path(),
                created_at,
            });
        }

        sort_artifacts(&mut artifacts);
        Ok(artifacts)
    }

    /// 最新的制品
    pub async fn latest(&self) -> Result<Option<BackupArtifact>, BackupError> {
        Ok(self.list().await?.pop())
    }

    /// 校验制品 SHA-256
    pub async fn verify(&self, artifact: &BackupArtifact) -> Result<Verification, BackupError> {
        let Some(metadata) = read_metadata(artifact).await else {
            return Ok(Verification::Unverifiable);
        };
        let path = artifact.path.clone();
        let actual = tokio::task::spawn_blocking(move || hash_file(&path)).await??;
        if actual.eq_ignore_ascii_case(&metadata.sha256) {
            Ok(Verification::Verified)
        } else {
            Ok(Verification::Mismatch {
                expected: metadata.sha256,
                actual,
            })
        }
    }

    /// 用制品替换目标目录
    ///
    /// 除排除项以外的顶层条目全部删除后重新解包
    pub async fn restore(&self, artifact: &BackupArtifact, target: &Path) -> Result<(), BackupError> {
        let mut preserved = self.exclude.clone();
        if let Some(metadata) = read_metadata(artifact).await {
            for name in metadata.excluded {
                if !preserved.contains(&name) {
                    preserved.push(name);
                }
            }
        }

        if fs::try_exists(target).await? {
            clear_dir(target, &preserved).await?;
        } else {
            fs::create_dir_all(target).await?;
        }

        let (archive, target) = (artifact.path.clone(), target.to_path_buf());
        tokio::task::spawn_blocking(move || unpack_archive(&archive, &target)).await??;
        Ok(())
    }

    /// 清理超出保留数量或保留天数的旧制品，刚创建的制品不会被清理
    async fn prune(&self, just_created: &str) {
        if self.keep == 0 && self.retention_days.is_none() {
            return;
        }
        let artifacts = match self.list().await {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list backups for retention");
                return;
            }
        };

        let excess = if self.keep == 0 {
            0
        } else {
            artifacts.len().saturating_sub(self.keep)
        };
        let cutoff = self
            .retention_days
            .map(|days| chrono::Utc::now() - chrono::Duration::days(i64::from(days)));

        let expired = artifacts
            .iter()
            .filter(|a| a.name != just_created)
            .enumerate()
            .filter(|(i, a)| *i < excess || cutoff.is_some_and(|c| a.created_at < c))
            .map(|(_, a)| a);

        for artifact in expired {
            let _ = fs::remove_file(artifact.metadata_path()).await;
            match fs::remove_file(&artifact.path).await {
                Ok(()) => tracing::info!(artifact = %artifact.name, "Pruned old backup"),
                Err(e) => tracing::warn!(artifact = %artifact.name, error = %e, "Failed to prune backup"),
            }
        }
    }
}

/// 按时间戳排序，时间相同时按名称
pub fn sort_artifacts(artifacts: &mut [BackupArtifact]) {
    artifacts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
}

async fn read_metadata(artifact: &BackupArtifact) -> Option<BackupMetadata> {
    let bytes = fs::read(artifact.metadata_path()).await.ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// 只有顶层条目参与排除匹配
fn is_excluded(entry: &walkdir::DirEntry, exclude: &[String]) -> bool {
    entry.depth() == 1 && is_listed(&entry.file_name().to_string_lossy(), exclude)
}

fn is_listed(name: &str, names: &[String]) -> bool {
    names.iter().any(|n| n == name)
}

/// 删除目录下的顶层条目，`keep` 中列出的除外
async fn clear_dir(dir: &Path, keep: &[String]) -> io::Result<()> {
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if is_listed(&entry.file_name().to_string_lossy(), keep) {
            continue;
        }
        // file_type 不跟随符号链接，指向目录的链接按文件删除
        if entry.file_type().await?.is_dir() {
            fs::remove_dir_all(entry.path()).await?;
        } else {
            fs::remove_file(entry.path()).await?;
        }
    }
    Ok(())
}

/// 打包目录（条目路径相对于源目录，符号链接按链接保存）
fn write_archive(source: &Path, dest: &Path, exclude: &[String]) -> io::Result<()> {
    let file = File::create(dest)?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    let walker = WalkDir::new(source)
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_excluded(e, exclude));

    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        builder.append_path_with_name(entry.path(), relative)?;
    }

    let encoder = builder.into_inner()?;
    let mut writer = encoder.finish()?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

fn unpack_archive(archive: &Path, target: &Path) -> io::Result<()> {
    let file = File::open(archive)?;
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);
    archive.unpack(target)
}

fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
