//! 部署编排
//!
//! 按固定顺序执行各阶段，每个阶段返回 `StageOutcome`：
//! - `Completed` / `Warned` 继续下一个阶段
//! - `Fatal` 交给 `transition_on_fatal` 决定终态
//!
//! 越过 STOP 之后的任何致命错误都会触发且只触发一次回滚

mod summary;

use std::path::Path;
use std::sync::Arc;

use crate::config::DeployConfig;
use crate::domain::backup::BackupOutcome;
use crate::domain::deploy::{DeploymentRun, Outcome, Stage, StageOutcome};
use crate::error::DeployError;
use crate::infra::supervisor::Supervisor;
use crate::infra::vcs::SourceControl;

use super::backup::BackupStore;
use super::controller::ServiceController;
use super::deps::DependencyInstaller;
use super::health::HealthChecker;
use super::migrate::{MigrationOutcome, MigrationRunner};
use super::preflight;
use super::rollback::RollbackCoordinator;
use super::sync::SourceSync;

/// 部署编排器
pub struct Orchestrator {
    config: Arc<DeployConfig>,
    vcs: Arc<dyn SourceControl>,
    store: BackupStore,
    controller: ServiceController,
    health: HealthChecker,
    sync: SourceSync,
    installer: DependencyInstaller,
    migrations: MigrationRunner,
}

impl Orchestrator {
    pub fn new(
        config: Arc<DeployConfig>,
        supervisor: Arc<dyn Supervisor>,
        vcs: Arc<dyn SourceControl>,
    ) -> Self {
        Self {
            store: BackupStore::from_config(&config),
            controller: ServiceController::new(&config, supervisor),
            health: HealthChecker::new(config.health_timeout),
            sync: SourceSync::new(&config, vcs.clone()),
            installer: DependencyInstaller::from_config(&config),
            migrations: MigrationRunner::from_config(&config),
            vcs,
            config,
        }
    }

    pub fn store(&self) -> &BackupStore {
        &self.store
    }

    pub fn controller(&self) -> &ServiceController {
        &self.controller
    }

    pub fn health(&self) -> &HealthChecker {
        &self.health
    }

    pub fn rollback_coordinator(&self) -> RollbackCoordinator {
        RollbackCoordinator::new(
            self.store.clone(),
            self.controller.clone(),
            self.config.app_root.clone(),
        )
    }

    /// 执行一次完整部署
    pub async fn run(&self, environment: &str) -> DeploymentRun {
        let mut run = DeploymentRun::new(environment);
        tracing::info!(
            run_id = %run.id,
            environment = %environment,
            branch = %self.config.branch,
            app_root = %self.config.app_root.display(),
            "=== Starting deployment ==="
        );

        let outcome = self.execute(&mut run).await;
        run.complete(outcome);
        summary::log_summary(&run);
        run
    }

    async fn execute(&self, run: &mut DeploymentRun) -> Outcome {
        for stage in Stage::PIPELINE {
            run.stage = stage;
            if let Some(record) = run.record_mut(stage) {
                record.start();
            }
            tracing::info!(stage = %stage, "--- {} ---", stage.display_name());

            let outcome = self.execute_stage(stage, run).await;
            if let Some(record) = run.record_mut(stage) {
                record.finish(&outcome);
            }

            match outcome {
                StageOutcome::Fatal(err) => {
                    tracing::error!(stage = %stage, kind = err.kind(), error = %err, "Stage failed");
                    let terminal = self.transition_on_fatal(stage, &err).await;
                    log_transition(stage, terminal.stage());
                    return terminal;
                }
                StageOutcome::Warned(message) => {
                    tracing::warn!(stage = %stage, warning = %message, "Stage completed with warnings");
                }
                StageOutcome::Completed => {}
            }

            log_transition(stage, stage.next().unwrap_or(Stage::Done));
        }

        Outcome::Success
    }

    /// 致命错误的去向
    async fn transition_on_fatal(&self, stage: Stage, err: &DeployError) -> Outcome {
        match stage {
            // 什么都还没改动
            Stage::Preflight => Outcome::Aborted {
                reason: err.to_string(),
            },
            Stage::Backup => Outcome::FailedNoBackup,
            _ if stage.requires_rollback() => self.rollback_coordinator().rollback().await,
            _ => Outcome::Aborted {
                reason: err.to_string(),
            },
        }
    }

    async fn execute_stage(&self, stage: Stage, run: &mut DeploymentRun) -> StageOutcome {
        let app_root = self.config.app_root.as_path();
        match stage {
            Stage::Preflight => self.preflight().await,
            Stage::Backup => self.backup(app_root, run).await,
            Stage::Stop => self.stop().await,
            Stage::Sync => match self.sync.sync_to(&self.config.branch).await {
                Ok(revision) => {
                    run.revision = Some(revision);
                    StageOutcome::Completed
                }
                Err(e) => StageOutcome::Fatal(e.into()),
            },
            Stage::Deps => match self.installer.install(app_root).await {
                Ok(report) => {
                    tracing::info!(
                        installed = ?report.installed,
                        skipped = ?report.skipped,
                        "Dependencies installed"
                    );
                    StageOutcome::Completed
                }
                Err(e) => StageOutcome::Fatal(e.into()),
            },
            Stage::Migrate => match self.migrations.migrate(app_root).await {
                MigrationOutcome::Applied | MigrationOutcome::NotPresent => StageOutcome::Completed,
                MigrationOutcome::Failed(reason) => {
                    StageOutcome::Warned(format!("migration failed: {}", reason))
                }
            },
            Stage::Start => self.start().await,
            Stage::HealthCheck => {
                let report = self.health.check_all(self.controller.registry()).await;
                if report.all_healthy() {
                    StageOutcome::Completed
                } else {
                    StageOutcome::Warned(format!(
                        "unhealthy services: {}",
                        report.unhealthy().join(", ")
                    ))
                }
            }
            _ => StageOutcome::Completed,
        }
    }

    async fn preflight(&self) -> StageOutcome {
        match preflight::check(&self.config, self.vcs.as_ref()).await {
            Ok(report) if report.is_clean() => StageOutcome::Completed,
            Ok(report) => StageOutcome::Warned(report.warnings.join("; ")),
            Err(e) => StageOutcome::Fatal(e.into()),
        }
    }

    /// 备份阶段
    ///
    /// 源目录不存在时跳过；此时必须已有更早的制品作为回滚目标，否则不能进入 STOP
    async fn backup(&self, app_root: &Path, run: &mut DeploymentRun) -> StageOutcome {
        match self.store.create(app_root).await {
            Ok(BackupOutcome::Created(artifact)) => {
                run.artifact = Some(artifact.name);
                StageOutcome::Completed
            }
            Ok(BackupOutcome::Skipped { reason }) => match self.store.latest().await {
                Ok(Some(previous)) => StageOutcome::Warned(format!(
                    "backup skipped ({}), rollback target is {}",
                    reason, previous.name
                )),
                Ok(None) => StageOutcome::Fatal(DeployError::NoBackup),
                Err(e) => StageOutcome::Fatal(e.into()),
            },
            Err(e) => StageOutcome::Fatal(e.into()),
        }
    }

    async fn stop(&self) -> StageOutcome {
        let failed: Vec<String> = self
            .controller
            .stop_all()
            .await
            .into_iter()
            .filter(|r| !r.stopped)
            .map(|r| r.name)
            .collect();
        if failed.is_empty() {
            StageOutcome::Completed
        } else {
            StageOutcome::Warned(format!("failed to stop: {}", failed.join(", ")))
        }
    }

    async fn start(&self) -> StageOutcome {
        let reports = self.controller.start_all().await;

        if self.config.escalate_start_failures {
            if let Some(down) = reports.iter().find(|r| r.critical && !r.active) {
                return StageOutcome::Fatal(DeployError::ServiceNotActive {
                    service: down.name.clone(),
                });
            }
        }

        let not_ready: Vec<&str> = reports
            .iter()
            .filter(|r| !r.ready)
            .map(|r| r.name.as_str())
            .collect();
        if not_ready.is_empty() {
            StageOutcome::Completed
        } else {
            StageOutcome::Warned(format!("not ready: {}", not_ready.join(", ")))
        }
    }
}

fn log_transition(from: Stage, to: Stage) {
    tracing::info!(from = %from, to = %to, "stage transition");
}
