//! 基础设施模块
//!
//! 封装外部依赖（命令执行、进程管理器、版本控制）

pub mod command;
pub mod supervisor;
pub mod vcs;

pub use command::{CommandError, CommandResult, CommandRunner};
pub use supervisor::{Supervisor, SupervisorError, Systemctl};
pub use vcs::{Git, Revision, SourceControl, SyncError};
