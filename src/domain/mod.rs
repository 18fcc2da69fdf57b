//! 领域模型
//!
//! 纯数据类型和业务规则，不直接执行外部命令

pub mod backup;
pub mod deploy;
pub mod service;

pub use backup::{BackupArtifact, BackupMetadata, BackupOutcome, Verification};
pub use deploy::{DeploymentRun, Outcome, Stage, StageOutcome, StageRecord, StageStatus};
pub use service::{HealthCheckResult, HealthReport, ServiceDescriptor, ServiceHealth};
