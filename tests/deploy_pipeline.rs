//! 部署流水线端到端测试：假进程管理器 + 假版本控制 + 本地健康端点

mod common;

use std::sync::Arc;

use common::{
    lines_with_level, seed_app, snapshot, spawn_health_server, test_config, FakeSupervisor,
    FakeVcs,
};
use xjp_release_guard::config::{DeployConfig, Ecosystem};
use xjp_release_guard::domain::deploy::{Outcome, Stage, StageStatus};
use xjp_release_guard::logging;
use xjp_release_guard::services::BackupStore;
use xjp_release_guard::Orchestrator;

fn capture_logs(config: &DeployConfig) -> tracing::subscriber::DefaultGuard {
    let sub = logging::subscriber(Some(&config.log_file), false).unwrap();
    tracing::subscriber::set_default(sub)
}

fn read_log(config: &DeployConfig) -> String {
    std::fs::read_to_string(&config.log_file).unwrap_or_default()
}

#[tokio::test]
async fn test_successful_deploy_reaches_done() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_health_server().await;
    let config = test_config(dir.path(), addr);
    seed_app(&config.app_root);

    let fake = Arc::new(FakeSupervisor::default());
    let vcs = Arc::new(FakeVcs::with_incoming(&[("version.txt", "v2\n")]));
    let orchestrator = Orchestrator::new(Arc::new(config.clone()), fake.clone(), vcs.clone());

    let run = orchestrator.run("staging").await;

    assert_eq!(run.outcome, Some(Outcome::Success));
    assert_eq!(run.stage, Stage::Done);
    assert!(run.stage.is_terminal());
    assert_eq!(run.revision.as_deref(), Some("f00dbab"));
    assert!(run.artifact.is_some());
    assert!(run
        .records
        .iter()
        .all(|r| matches!(r.status, StageStatus::Success | StageStatus::Warning)));
    assert_eq!(
        std::fs::read_to_string(config.app_root.join("version.txt")).unwrap(),
        "v2\n"
    );

    // 停止和启动都按注册表顺序
    assert_eq!(
        fake.calls(),
        vec![
            "stop svc-a.service",
            "stop svc-b.service",
            "start svc-a.service",
            "start svc-b.service"
        ]
    );
    assert_eq!(vcs.sync_count(), 1);
}

#[tokio::test]
async fn test_install_failure_rolls_back_byte_for_byte() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_health_server().await;
    let config = DeployConfig {
        environment: "production".to_string(),
        ecosystems: vec![Ecosystem::new("python", "requirements.txt", "false", &[])],
        ..test_config(dir.path(), addr)
    };
    seed_app(&config.app_root);
    let before = snapshot(&config.app_root);

    let _guard = capture_logs(&config);

    let fake = Arc::new(FakeSupervisor::default());
    let vcs = Arc::new(FakeVcs::with_incoming(&[
        ("version.txt", "v2\n"),
        ("requirements.txt", "broken==0.0\n"),
        ("src/new_module.py", "print('new')\n"),
    ]));
    let orchestrator = Orchestrator::new(Arc::new(config.clone()), fake.clone(), vcs);

    let run = orchestrator.run(&config.environment).await;

    let artifact = run.artifact.clone().expect("backup created");
    assert_eq!(
        run.outcome,
        Some(Outcome::RolledBack {
            artifact: artifact.clone()
        })
    );
    assert_eq!(run.outcome.as_ref().map(Outcome::exit_code), Some(2));
    assert_eq!(run.record(Stage::Deps).unwrap().status, StageStatus::Failed);
    assert_eq!(run.record(Stage::Migrate).unwrap().status, StageStatus::Skipped);

    // 应用目录与部署前完全一致
    assert_eq!(snapshot(&config.app_root), before);

    let log = read_log(&config);
    let errors = lines_with_level(&log, "ERROR");
    assert_eq!(errors.len(), 1, "expected exactly one ERROR line, got {:?}", errors);
    assert!(errors[0].contains("python"));

    let complete: Vec<String> = lines_with_level(&log, "INFO")
        .into_iter()
        .filter(|l| l.contains("Rollback complete"))
        .collect();
    assert_eq!(complete.len(), 1);
    assert!(complete[0].contains(&format!("artifact={}", artifact)));
    assert!(log.contains("from=DEPS to=ROLLED_BACK"));

    // 部署停一次 + 回滚停一次，启动只发生在回滚里
    let calls = fake.calls();
    assert_eq!(calls.iter().filter(|c| c.starts_with("stop ")).count(), 4);
    assert_eq!(calls.iter().filter(|c| c.starts_with("start ")).count(), 2);
}

#[tokio::test]
async fn test_preflight_warnings_do_not_change_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_health_server().await;
    let config = DeployConfig {
        min_free_bytes: u64::MAX,
        ..test_config(dir.path(), addr)
    };
    seed_app(&config.app_root);

    let vcs = Arc::new(FakeVcs {
        dirty: true,
        ..FakeVcs::clean()
    });
    let orchestrator = Orchestrator::new(
        Arc::new(config),
        Arc::new(FakeSupervisor::default()),
        vcs,
    );

    let run = orchestrator.run("staging").await;

    assert_eq!(run.outcome, Some(Outcome::Success));
    let preflight = run.record(Stage::Preflight).unwrap();
    assert_eq!(preflight.status, StageStatus::Warning);
    assert!(preflight.message.as_deref().unwrap().contains("uncommitted"));
}

#[tokio::test]
async fn test_failing_migration_still_reaches_done() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_health_server().await;
    let config = test_config(dir.path(), addr);
    seed_app(&config.app_root);

    let vcs = Arc::new(FakeVcs::with_incoming(&[("scripts/migrate.sh", "exit 1\n")]));
    let orchestrator = Orchestrator::new(
        Arc::new(config),
        Arc::new(FakeSupervisor::default()),
        vcs,
    );

    let run = orchestrator.run("staging").await;

    assert_eq!(run.outcome, Some(Outcome::Success));
    assert_eq!(run.record(Stage::Migrate).unwrap().status, StageStatus::Warning);
}

#[tokio::test]
async fn test_unhealthy_services_after_start_do_not_roll_back() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_health_server().await;
    let mut config = test_config(dir.path(), addr);
    config.services[1].health_url = format!("http://{}/fail", addr);
    seed_app(&config.app_root);

    let orchestrator = Orchestrator::new(
        Arc::new(config),
        Arc::new(FakeSupervisor::default()),
        Arc::new(FakeVcs::clean()),
    );

    let run = orchestrator.run("staging").await;

    assert_eq!(run.outcome, Some(Outcome::Success));
    let health = run.record(Stage::HealthCheck).unwrap();
    assert_eq!(health.status, StageStatus::Warning);
    assert!(health.message.as_deref().unwrap().contains("svc-b"));
}

#[tokio::test]
async fn test_critical_start_failure_escalates_to_rollback() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_health_server().await;
    let config = test_config(dir.path(), addr);
    seed_app(&config.app_root);
    let before = snapshot(&config.app_root);

    let orchestrator = Orchestrator::new(
        Arc::new(config.clone()),
        Arc::new(FakeSupervisor::with_broken(&["svc-a.service"])),
        Arc::new(FakeVcs::with_incoming(&[("version.txt", "v2\n")])),
    );

    let run = orchestrator.run("staging").await;

    assert!(matches!(run.outcome, Some(Outcome::RolledBack { .. })));
    assert_eq!(run.record(Stage::Start).unwrap().status, StageStatus::Failed);
    assert_eq!(snapshot(&config.app_root), before);
}

#[tokio::test]
async fn test_critical_start_failure_without_escalation_is_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_health_server().await;
    let config = DeployConfig {
        escalate_start_failures: false,
        ..test_config(dir.path(), addr)
    };
    seed_app(&config.app_root);

    let orchestrator = Orchestrator::new(
        Arc::new(config),
        Arc::new(FakeSupervisor::with_broken(&["svc-a.service"])),
        Arc::new(FakeVcs::clean()),
    );

    let run = orchestrator.run("staging").await;

    assert_eq!(run.outcome, Some(Outcome::Success));
    assert_eq!(run.record(Stage::Start).unwrap().status, StageStatus::Warning);
}

#[tokio::test]
async fn test_sync_failure_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_health_server().await;
    let config = test_config(dir.path(), addr);
    seed_app(&config.app_root);

    let orchestrator = Orchestrator::new(
        Arc::new(config),
        Arc::new(FakeSupervisor::default()),
        Arc::new(FakeVcs::default()),
    );

    let run = orchestrator.run("staging").await;

    assert!(matches!(run.outcome, Some(Outcome::RolledBack { .. })));
    let sync = run.record(Stage::Sync).unwrap();
    assert_eq!(sync.status, StageStatus::Failed);
    assert!(sync.message.as_deref().unwrap().contains("not a version-controlled checkout"));
}

#[tokio::test]
async fn test_missing_app_root_without_backup_never_stops_services() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_health_server().await;
    let config = test_config(dir.path(), addr);

    let fake = Arc::new(FakeSupervisor::default());
    let orchestrator = Orchestrator::new(
        Arc::new(config),
        fake.clone(),
        Arc::new(FakeVcs::clean()),
    );

    let run = orchestrator.run("staging").await;

    assert_eq!(run.outcome, Some(Outcome::FailedNoBackup));
    assert_eq!(run.outcome.as_ref().map(Outcome::exit_code), Some(3));
    assert!(fake.calls().is_empty());
    assert_eq!(run.record(Stage::Stop).unwrap().status, StageStatus::Skipped);
}

#[tokio::test]
async fn test_backup_inside_app_root_aborts_before_any_change() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_health_server().await;
    let base = test_config(dir.path(), addr);
    let config = DeployConfig {
        backup_root: base.app_root.join("backups"),
        ..base
    };
    seed_app(&config.app_root);
    let before = snapshot(&config.app_root);

    let fake = Arc::new(FakeSupervisor::default());
    let orchestrator = Orchestrator::new(
        Arc::new(config.clone()),
        fake.clone(),
        Arc::new(FakeVcs::clean()),
    );

    let run = orchestrator.run("staging").await;

    assert!(matches!(run.outcome, Some(Outcome::Aborted { .. })));
    assert_eq!(run.outcome.as_ref().map(Outcome::exit_code), Some(5));
    assert!(fake.calls().is_empty());
    assert!(run.artifact.is_none());
    assert_eq!(snapshot(&config.app_root), before);
}

#[tokio::test]
async fn test_direct_rollback_without_backup_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_health_server().await;
    let config = test_config(dir.path(), addr);
    seed_app(&config.app_root);
    let before = snapshot(&config.app_root);

    let fake = Arc::new(FakeSupervisor::default());
    let orchestrator = Orchestrator::new(
        Arc::new(config.clone()),
        fake.clone(),
        Arc::new(FakeVcs::clean()),
    );

    let outcome = orchestrator.rollback_coordinator().rollback().await;

    assert_eq!(outcome, Outcome::FailedNoBackup);
    assert!(fake.calls().is_empty());
    assert_eq!(snapshot(&config.app_root), before);
    assert!(BackupStore::from_config(&config).list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rollback_keeps_excluded_top_level_entries() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_health_server().await;
    let config = DeployConfig {
        backup_exclude: vec!["logs".to_string(), "node_modules".to_string()],
        ecosystems: vec![Ecosystem::new("python", "requirements.txt", "false", &[])],
        ..test_config(dir.path(), addr)
    };
    seed_app(&config.app_root);
    std::fs::create_dir_all(config.app_root.join("src/logs")).unwrap();
    std::fs::write(config.app_root.join("src/logs/mod.py"), "LEVEL = 'info'\n").unwrap();
    std::fs::create_dir_all(config.app_root.join("node_modules/pkg")).unwrap();
    std::fs::write(config.app_root.join("node_modules/pkg/index.js"), "module.exports = 1\n").unwrap();
    std::fs::create_dir_all(config.app_root.join("logs")).unwrap();
    std::fs::write(config.app_root.join("logs/run.log"), "started\n").unwrap();
    let before = snapshot(&config.app_root);

    let vcs = Arc::new(FakeVcs::with_incoming(&[
        ("requirements.txt", "broken==0.0\n"),
        ("src/logs/mod.py", "LEVEL = 'debug'\n"),
    ]));
    let orchestrator = Orchestrator::new(
        Arc::new(config.clone()),
        Arc::new(FakeSupervisor::default()),
        vcs,
    );

    let run = orchestrator.run("staging").await;

    assert!(matches!(run.outcome, Some(Outcome::RolledBack { .. })));
    assert_eq!(snapshot(&config.app_root), before);
}
