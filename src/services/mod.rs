//! 服务层模块
//!
//! 每个部署组件一个文件，`deploy` 负责按顺序编排

pub mod backup;
pub mod controller;
pub mod deploy;
pub mod deps;
pub mod health;
pub mod migrate;
pub mod preflight;
pub mod rollback;
pub mod sync;

pub use backup::{BackupError, BackupStore};
pub use controller::{ServiceController, StartReport, StopReport};
pub use deploy::Orchestrator;
pub use deps::{DependencyInstaller, InstallError, InstallReport};
pub use health::HealthChecker;
pub use migrate::{MigrationOutcome, MigrationRunner};
pub use preflight::PreflightReport;
pub use rollback::RollbackCoordinator;
pub use sync::SourceSync;
