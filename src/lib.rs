//! XJP Release Guard - 带备份与回滚的部署编排
//!
//! 一次部署依次经过 预检 → 备份 → 停服 → 同步 → 依赖 → 迁移 → 启动 → 健康检查，
//! 越过停服之后的任何致命错误都会恢复到最新备份

pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod logging;
pub mod services;

use std::sync::Arc;

pub use cli::Command;
pub use config::DeployConfig;
pub use domain::deploy::{DeploymentRun, Outcome, Stage};
pub use error::DeployError;
pub use services::Orchestrator;

use config::env::constants::VERSION;
use infra::{Git, Systemctl};

/// 命令行入口：解析参数、加载配置、初始化日志并执行子命令
///
/// `args` 不含程序名，返回进程退出码
pub async fn run_cli(args: &[String]) -> i32 {
    let command = cli::parse(args);
    let mut stdout = std::io::stdout();

    if let Some(code) = cli::run_without_config(&command, &mut stdout) {
        return code;
    }

    let config = match DeployConfig::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return 1;
        }
    };

    logging::init(&config.log_file);
    tracing::info!(
        version = VERSION,
        environment = %config.environment,
        command = ?command,
        "XJP Release Guard starting"
    );

    let supervisor = Arc::new(Systemctl::new(config.supervisor_sudo, config.command_timeout));
    let vcs = Arc::new(Git::new(config.command_timeout));

    cli::dispatch(command, config, supervisor, vcs, &mut stdout).await
}
