//! 部署相关领域模型
//!
//! 状态机阶段、阶段结果与一次部署运行的记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DeployError;

/// 部署状态机阶段
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Preflight,
    Backup,
    Stop,
    Sync,
    Deps,
    Migrate,
    Start,
    HealthCheck,
    Done,
    RolledBack,
    FailedNoBackup,
    RollbackFailed,
    Aborted,
}

impl Stage {
    /// 正向流水线，严格按顺序执行
    pub const PIPELINE: [Stage; 8] = [
        Stage::Preflight,
        Stage::Backup,
        Stage::Stop,
        Stage::Sync,
        Stage::Deps,
        Stage::Migrate,
        Stage::Start,
        Stage::HealthCheck,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Preflight => "PREFLIGHT",
            Stage::Backup => "BACKUP",
            Stage::Stop => "STOP",
            Stage::Sync => "SYNC",
            Stage::Deps => "DEPS",
            Stage::Migrate => "MIGRATE",
            Stage::Start => "START",
            Stage::HealthCheck => "HEALTHCHECK",
            Stage::Done => "DONE",
            Stage::RolledBack => "ROLLED_BACK",
            Stage::FailedNoBackup => "FAILED_NO_BACKUP",
            Stage::RollbackFailed => "ROLLBACK_FAILED",
            Stage::Aborted => "ABORTED",
        }
    }

    /// 显示名称
    pub fn display_name(&self) -> &'static str {
        match self {
            Stage::Preflight => "Preflight Checks",
            Stage::Backup => "Backup",
            Stage::Stop => "Stop Services",
            Stage::Sync => "Source Sync",
            Stage::Deps => "Install Dependencies",
            Stage::Migrate => "Schema Migration",
            Stage::Start => "Start Services",
            Stage::HealthCheck => "Health Check",
            Stage::Done => "Done",
            Stage::RolledBack => "Rolled Back",
            Stage::FailedNoBackup => "Failed (no backup)",
            Stage::RollbackFailed => "Rollback Failed",
            Stage::Aborted => "Aborted",
        }
    }

    /// 下一个阶段（终态返回 None）
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Preflight => Some(Stage::Backup),
            Stage::Backup => Some(Stage::Stop),
            Stage::Stop => Some(Stage::Sync),
            Stage::Sync => Some(Stage::Deps),
            Stage::Deps => Some(Stage::Migrate),
            Stage::Migrate => Some(Stage::Start),
            Stage::Start => Some(Stage::HealthCheck),
            Stage::HealthCheck => Some(Stage::Done),
            _ => None,
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Stage::Done
                | Stage::RolledBack
                | Stage::FailedNoBackup
                | Stage::RollbackFailed
                | Stage::Aborted
        )
    }

    /// 该阶段之后是否已经越过"不可回头点"（失败需要回滚）
    pub fn requires_rollback(&self) -> bool {
        matches!(
            self,
            Stage::Stop
                | Stage::Sync
                | Stage::Deps
                | Stage::Migrate
                | Stage::Start
                | Stage::HealthCheck
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个阶段的执行结果
#[derive(Debug)]
pub enum StageOutcome {
    /// 正常完成
    Completed,
    /// 完成但有警告，继续执行
    Warned(String),
    /// 致命错误，由状态转移表决定去向
    Fatal(DeployError),
}

/// 一次运行的终态结果
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    RolledBack { artifact: String },
    FailedNoBackup,
    RollbackFailed { reason: String },
    Aborted { reason: String },
}

impl Outcome {
    /// 对应的终态阶段
    pub fn stage(&self) -> Stage {
        match self {
            Outcome::Success => Stage::Done,
            Outcome::RolledBack { .. } => Stage::RolledBack,
            Outcome::FailedNoBackup => Stage::FailedNoBackup,
            Outcome::RollbackFailed { .. } => Stage::RollbackFailed,
            Outcome::Aborted { .. } => Stage::Aborted,
        }
    }

    /// 进程退出码
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Success => 0,
            Outcome::RolledBack { .. } => 2,
            Outcome::FailedNoBackup => 3,
            Outcome::RollbackFailed { .. } => 4,
            Outcome::Aborted { .. } => 5,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// 阶段执行状态
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Warning,
    Failed,
    Skipped,
}

impl StageStatus {
    pub fn icon(&self) -> &'static str {
        match self {
            StageStatus::Success => "✓",
            StageStatus::Warning => "!",
            StageStatus::Failed => "✗",
            StageStatus::Skipped => "⊘",
            StageStatus::Running => "⟳",
            StageStatus::Pending => "○",
        }
    }
}

/// 阶段执行记录
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// 持续时间（毫秒）
    pub duration_ms: Option<i64>,
    pub status: StageStatus,
    pub message: Option<String>,
}

impl StageRecord {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            started_at: None,
            finished_at: None,
            duration_ms: None,
            status: StageStatus::Pending,
            message: None,
        }
    }

    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
        self.status = StageStatus::Running;
    }

    /// 根据阶段结果完成记录
    pub fn finish(&mut self, outcome: &StageOutcome) {
        let now = Utc::now();
        self.finished_at = Some(now);
        let (status, message) = match outcome {
            StageOutcome::Completed => (StageStatus::Success, None),
            StageOutcome::Warned(msg) => (StageStatus::Warning, Some(msg.clone())),
            StageOutcome::Fatal(e) => (StageStatus::Failed, Some(e.to_string())),
        };
        self.status = status;
        self.message = message;
        if let Some(started) = self.started_at {
            self.duration_ms = Some((now - started).num_milliseconds());
        }
    }

    pub fn skip(&mut self, reason: Option<String>) {
        self.status = StageStatus::Skipped;
        self.message = reason;
    }
}

/// 一次部署运行
///
/// CLI 调用时创建，只由 Orchestrator 修改，进程退出即丢弃（持久结果只在日志里）
#[derive(Clone, Debug, Serialize)]
pub struct DeploymentRun {
    pub id: String,
    pub environment: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stage: Stage,
    pub outcome: Option<Outcome>,
    /// SourceSync 之后的短 revision
    pub revision: Option<String>,
    /// 本次运行创建的备份
    pub artifact: Option<String>,
    pub records: Vec<StageRecord>,
}

impl DeploymentRun {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            environment: environment.into(),
            started_at: Utc::now(),
            finished_at: None,
            stage: Stage::Preflight,
            outcome: None,
            revision: None,
            artifact: None,
            records: Stage::PIPELINE.iter().map(|s| StageRecord::new(*s)).collect(),
        }
    }

    pub fn record_mut(&mut self, stage: Stage) -> Option<&mut StageRecord> {
        self.records.iter_mut().find(|r| r.stage == stage)
    }

    pub fn record(&self, stage: Stage) -> Option<&StageRecord> {
        self.records.iter().find(|r| r.stage == stage)
    }

    /// 设置终态；未执行的阶段标记为跳过
    pub fn complete(&mut self, outcome: Outcome) {
        self.stage = outcome.stage();
        debug_assert!(self.stage.is_terminal());
        self.finished_at = Some(Utc::now());
        for record in &mut self.records {
            if record.status == StageStatus::Pending {
                record.skip(Some("not reached".to_string()));
            }
        }
        self.outcome = Some(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_is_strictly_sequential() {
        for pair in Stage::PIPELINE.windows(2) {
            assert_eq!(pair[0].next(), Some(pair[1]));
        }
        assert_eq!(Stage::HealthCheck.next(), Some(Stage::Done));
        assert_eq!(Stage::Done.next(), None);
        assert_eq!(Stage::RolledBack.next(), None);
        assert!(Stage::PIPELINE.iter().all(|s| !s.is_terminal()));
    }

    #[test]
    fn test_rollback_boundary() {
        assert!(!Stage::Preflight.requires_rollback());
        assert!(!Stage::Backup.requires_rollback());
        assert!(Stage::Stop.requires_rollback());
        assert!(Stage::Deps.requires_rollback());
        assert!(Stage::HealthCheck.requires_rollback());
    }

    #[test]
    fn test_outcome_exit_codes() {
        assert_eq!(Outcome::Success.exit_code(), 0);
        assert_ne!(
            Outcome::RolledBack { artifact: "a".into() }.exit_code(),
            0
        );
        assert_ne!(Outcome::FailedNoBackup.exit_code(), 0);
        assert_eq!(Outcome::FailedNoBackup.stage(), Stage::FailedNoBackup);
    }

    #[test]
    fn test_stage_record_lifecycle() {
        let mut record = StageRecord::new(Stage::Migrate);
        assert_eq!(record.status, StageStatus::Pending);

        record.start();
        assert_eq!(record.status, StageStatus::Running);

        record.finish(&StageOutcome::Warned("migration failed".into()));
        assert_eq!(record.status, StageStatus::Warning);
        assert!(record.duration_ms.is_some());
        assert_eq!(record.message.as_deref(), Some("migration failed"));
    }

    #[test]
    fn test_complete_marks_unreached_stages_skipped() {
        let mut run = DeploymentRun::new("staging");
        run.record_mut(Stage::Preflight).unwrap().start();
        run.record_mut(Stage::Preflight)
            .unwrap()
            .finish(&StageOutcome::Completed);

        run.complete(Outcome::Aborted { reason: "x".into() });

        assert_eq!(run.stage, Stage::Aborted);
        assert_eq!(run.record(Stage::Preflight).unwrap().status, StageStatus::Success);
        assert_eq!(run.record(Stage::Backup).unwrap().status, StageStatus::Skipped);
    }
}
