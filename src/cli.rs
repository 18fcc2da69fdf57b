//! 命令行分发
//!
//! 子命令映射到编排器的入口，终态映射到进程退出码

use serde_json::json;
use std::fmt::Write as _;
use std::io::Write;
use std::sync::Arc;

use crate::config::env::constants::VERSION;
use crate::config::DeployConfig;
use crate::domain::deploy::Outcome;
use crate::domain::service::HealthReport;
use crate::infra::supervisor::Supervisor;
use crate::infra::vcs::SourceControl;
use crate::services::Orchestrator;

/// 子命令
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Deploy,
    Status { json: bool },
    /// 不指定制品时恢复最新备份
    Rollback { artifact: Option<String> },
    Health,
    Help,
    Unknown(String),
}

/// 解析参数（不含程序名），无参数时默认执行部署
pub fn parse(args: &[String]) -> Command {
    let Some(first) = args.first() else {
        return Command::Deploy;
    };
    match first.as_str() {
        "deploy" => Command::Deploy,
        "status" => Command::Status {
            json: args.iter().skip(1).any(|a| a == "--json"),
        },
        "rollback" => Command::Rollback {
            artifact: args.get(1).cloned(),
        },
        "health" => Command::Health,
        "help" | "-h" | "--help" => Command::Help,
        other => Command::Unknown(other.to_string()),
    }
}

pub fn usage() -> String {
    format!(
        "XJP Release Guard {} - 带备份与回滚的部署编排

USAGE:
    xjp-release-guard [COMMAND]

COMMANDS:
    deploy           Run the full deployment pipeline (default)
    status [--json]  Show service states and backups
    rollback [NAME]  Restore the latest backup, or the named one
    health           Probe every service health endpoint
    help             Print this message

EXIT CODES:
    0  deployed (rollback: restored)
    1  usage error, or a critical service is unhealthy
    2  rolled back
    3  failed, no backup available
    4  rollback failed
    5  aborted before any change",
        VERSION
    )
}

/// 不需要配置的子命令在这里处理，其余返回 None
pub fn run_without_config(command: &Command, out: &mut (dyn Write + Send)) -> Option<i32> {
    match command {
        Command::Help => {
            let _ = writeln!(out, "{}", usage());
            Some(0)
        }
        Command::Unknown(name) => {
            eprintln!("Unknown command: {}", name);
            eprintln!();
            eprintln!("{}", usage());
            Some(1)
        }
        _ => None,
    }
}

/// 执行子命令，返回退出码
///
/// 面向操作者的输出写入 `out`，日志仍走 tracing
pub async fn dispatch(
    command: Command,
    config: Arc<DeployConfig>,
    supervisor: Arc<dyn Supervisor>,
    vcs: Arc<dyn SourceControl>,
    out: &mut (dyn Write + Send),
) -> i32 {
    if let Some(code) = run_without_config(&command, out) {
        return code;
    }

    match command {
        // 已由 run_without_config 处理
        Command::Help | Command::Unknown(_) => 1,
        Command::Deploy => {
            let orchestrator = Orchestrator::new(config.clone(), supervisor, vcs);
            let run = orchestrator.run(&config.environment).await;
            run.outcome.as_ref().map_or(1, Outcome::exit_code)
        }
        Command::Rollback { artifact } => {
            let orchestrator = Orchestrator::new(config, supervisor, vcs);
            let coordinator = orchestrator.rollback_coordinator();
            let outcome = match artifact {
                Some(name) => coordinator.rollback_named(&name).await,
                None => coordinator.rollback().await,
            };
            match outcome {
                Outcome::RolledBack { .. } => 0,
                other => other.exit_code(),
            }
        }
        Command::Health => {
            let orchestrator = Orchestrator::new(config, supervisor, vcs);
            let report = orchestrator
                .health()
                .check_all(orchestrator.controller().registry())
                .await;
            let _ = out.write_all(render_health(&report).as_bytes());
            if report.critical_healthy() {
                0
            } else {
                1
            }
        }
        Command::Status { json } => {
            let orchestrator = Orchestrator::new(config, supervisor, vcs);
            let _ = out.write_all(status(&orchestrator, json).await.as_bytes());
            0
        }
    }
}

/// 每个服务一行 `<name>: OK|FAILED`，最后一行是汇总
pub fn render_health(report: &HealthReport) -> String {
    let mut text = String::new();
    for svc in &report.services {
        let state = if svc.result.reachable { "OK" } else { "FAILED" };
        let marker = if svc.critical { " (critical)" } else { "" };
        let _ = writeln!(text, "{}: {}{}", svc.name, state, marker);
    }
    let aggregate = if report.all_healthy() { "healthy" } else { "unhealthy" };
    let _ = writeln!(text, "aggregate: {}", aggregate);
    text
}

async fn status(orchestrator: &Orchestrator, as_json: bool) -> String {
    let services = orchestrator.controller().status_all().await;
    let backups = match orchestrator.store().list().await {
        Ok(list) => list,
        Err(e) => {
            tracing::warn!(error = %e, "Cannot list backups");
            Vec::new()
        }
    };
    let latest = backups.last().map(|a| a.name.clone());

    if as_json {
        let doc = json!({
            "version": VERSION,
            "services": services
                .iter()
                .map(|(name, active)| json!({ "name": name, "active": active }))
                .collect::<Vec<_>>(),
            "backups": {
                "count": backups.len(),
                "latest": latest,
            },
        });
        return format!("{}\n", doc);
    }

    let mut text = String::from("Services:\n");
    for (name, active) in &services {
        let state = if *active { "active" } else { "inactive" };
        let _ = writeln!(text, "  {:<20} {}", name, state);
    }
    let _ = writeln!(text);
    let _ = writeln!(text, "Backups: {}", backups.len());
    let _ = writeln!(text, "Latest:  {}", latest.as_deref().unwrap_or("-"));
    text
}
