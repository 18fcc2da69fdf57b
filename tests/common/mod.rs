//! 集成测试共用的假进程管理器、假版本控制与本地健康端点

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{http::StatusCode, routing::get, Router};
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use xjp_release_guard::config::{DeployConfig, Ecosystem};
use xjp_release_guard::domain::service::ServiceDescriptor;
use xjp_release_guard::infra::supervisor::{Supervisor, SupervisorError};
use xjp_release_guard::infra::vcs::{Revision, SourceControl, SyncError};

/// 启动本地健康端点: /ok 返回 200，/fail 返回 503
pub async fn spawn_health_server() -> SocketAddr {
    let app = Router::new()
        .route("/ok", get(|| async { "ok" }))
        .route("/fail", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// 记录调用顺序的假进程管理器
#[derive(Default)]
pub struct FakeSupervisor {
    pub calls: Mutex<Vec<String>>,
    pub active: Mutex<HashSet<String>>,
    /// 这些 unit 启动后不会变成 active
    pub broken: HashSet<String>,
}

impl FakeSupervisor {
    pub fn with_broken(units: &[&str]) -> Self {
        Self {
            broken: units.iter().map(|u| u.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_active(&self, unit: &str) {
        self.active.lock().unwrap().insert(unit.to_string());
    }
}

#[async_trait]
impl Supervisor for FakeSupervisor {
    async fn start(&self, unit: &str) -> Result<(), SupervisorError> {
        self.calls.lock().unwrap().push(format!("start {}", unit));
        if !self.broken.contains(unit) {
            self.active.lock().unwrap().insert(unit.to_string());
        }
        Ok(())
    }

    async fn stop(&self, unit: &str) -> Result<(), SupervisorError> {
        self.calls.lock().unwrap().push(format!("stop {}", unit));
        self.active.lock().unwrap().remove(unit);
        Ok(())
    }

    async fn is_active(&self, unit: &str) -> bool {
        self.active.lock().unwrap().contains(unit)
    }
}

/// 假版本控制：同步时把 `incoming` 中的文件写入应用目录
#[derive(Default)]
pub struct FakeVcs {
    pub repository: bool,
    pub dirty: bool,
    pub incoming: Vec<(String, String)>,
    pub syncs: Mutex<usize>,
}

impl FakeVcs {
    pub fn clean() -> Self {
        Self {
            repository: true,
            ..Self::default()
        }
    }

    pub fn with_incoming(files: &[(&str, &str)]) -> Self {
        Self {
            repository: true,
            incoming: files
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn sync_count(&self) -> usize {
        *self.syncs.lock().unwrap()
    }
}

#[async_trait]
impl SourceControl for FakeVcs {
    async fn is_repository(&self, _dir: &Path) -> bool {
        self.repository
    }

    async fn has_local_changes(&self, _dir: &Path) -> Result<bool, SyncError> {
        Ok(self.dirty)
    }

    async fn sync_to(&self, dir: &Path, _remote: &str, _branch: &str) -> Result<Revision, SyncError> {
        *self.syncs.lock().unwrap() += 1;
        for (rel, content) in &self.incoming {
            let path = dir.join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, content).unwrap();
        }
        Ok("f00dbab".to_string())
    }
}

/// 临时目录中的测试配置
pub fn test_config(root: &Path, health_addr: SocketAddr) -> DeployConfig {
    DeployConfig {
        environment: "staging".to_string(),
        app_root: root.join("app"),
        backup_root: root.join("backups"),
        log_file: root.join("logs/deploy.log"),
        services: vec![
            ServiceDescriptor::new("svc-a", "svc-a.service", &format!("http://{}/ok", health_addr), true),
            ServiceDescriptor::new("svc-b", "svc-b.service", &format!("http://{}/ok", health_addr), false),
        ],
        min_free_bytes: 0,
        health_timeout: Duration::from_millis(500),
        settle_timeout: Duration::from_millis(300),
        settle_initial_delay: Duration::from_millis(10),
        command_timeout: Duration::from_secs(10),
        ecosystems: vec![Ecosystem::new("python", "requirements.txt", "true", &[])],
        ..DeployConfig::default()
    }
}

/// 写入初始应用目录
pub fn seed_app(app_root: &Path) {
    std::fs::create_dir_all(app_root.join("src")).unwrap();
    std::fs::write(app_root.join("version.txt"), "v1\n").unwrap();
    std::fs::write(app_root.join("src/main.py"), "print('v1')\n").unwrap();
    std::fs::write(app_root.join("data.bin"), [0u8, 1, 2, 255, 254]).unwrap();
}

/// 目录下所有文件的相对路径与内容
pub fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    walkdir::WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(dir).unwrap().to_path_buf();
            (rel, std::fs::read(e.path()).unwrap())
        })
        .collect()
}

/// 日志文件中包含指定级别的行
pub fn lines_with_level(log: &str, level: &str) -> Vec<String> {
    log.lines()
        .filter(|l| l.split_whitespace().nth(1) == Some(level))
        .map(str::to_string)
        .collect()
}
