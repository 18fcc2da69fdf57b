//! 日志
//!
//! 控制台（按级别着色，输出到 stderr）+ 追加写入的日志文件。
//! 文件中每行: `<RFC3339 时间戳> <LEVEL> <消息> <字段>`

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::Subscriber;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 默认日志级别（可用 RUST_LOG 覆盖）
const DEFAULT_FILTER: &str = "info";

/// 构建日志订阅者
///
/// # Arguments
/// * `log_file` - 追加写入的日志文件，父目录不存在时自动创建
/// * `console` - 是否同时输出到控制台
pub fn subscriber(
    log_file: Option<&Path>,
    console: bool,
) -> io::Result<Box<dyn Subscriber + Send + Sync>> {
    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    let console_layer = console.then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(io::stderr)
    });

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    Ok(Box::new(
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(console_layer),
    ))
}

/// 安装全局日志
///
/// 日志文件无法打开时退回到仅控制台输出
pub fn init(log_file: &Path) {
    let (sub, file_error) = match subscriber(Some(log_file), true) {
        Ok(sub) => (sub, None),
        Err(e) => match subscriber(None, true) {
            Ok(sub) => (sub, Some(e)),
            Err(_) => return,
        },
    };

    if tracing::subscriber::set_global_default(sub).is_err() {
        return;
    }

    if let Some(e) = file_error {
        tracing::warn!(
            path = %log_file.display(),
            error = %e,
            "Cannot open log file, logging to console only"
        );
    }
}
