//! 服务控制
//!
//! 按注册表顺序启停服务。启动后不做固定等待，而是带退避地轮询
//! `is_active` 和健康端点，总时长受 `settle_timeout` 限制

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::health::HealthChecker;
use crate::config::env::constants::{SETTLE_MAX_BACKOFF_MS, SETTLE_MIN_BACKOFF_MS};
use crate::config::DeployConfig;
use crate::domain::service::ServiceDescriptor;
use crate::infra::supervisor::Supervisor;

/// 停止结果
#[derive(Clone, Debug, Serialize)]
pub struct StopReport {
    pub name: String,
    pub stopped: bool,
    pub error: Option<String>,
}

/// 启动结果
#[derive(Clone, Debug, Serialize)]
pub struct StartReport {
    pub name: String,
    pub critical: bool,
    /// 进程管理器报告 active
    pub active: bool,
    /// active 且健康端点通过
    pub ready: bool,
    #[serde(skip)]
    pub waited: Duration,
    pub error: Option<String>,
}

/// 服务控制器
#[derive(Clone)]
pub struct ServiceController {
    supervisor: Arc<dyn Supervisor>,
    registry: Vec<ServiceDescriptor>,
    health: HealthChecker,
    settle_timeout: Duration,
    settle_initial_delay: Duration,
}

impl ServiceController {
    pub fn new(config: &DeployConfig, supervisor: Arc<dyn Supervisor>) -> Self {
        Self {
            supervisor,
            registry: config.services.clone(),
            health: HealthChecker::new(config.health_timeout),
            settle_timeout: config.settle_timeout,
            settle_initial_delay: config.settle_initial_delay,
        }
    }

    pub fn registry(&self) -> &[ServiceDescriptor] {
        &self.registry
    }

    /// 停止服务；失败只记 WARN（服务可能本来就没在运行）
    pub async fn stop(&self, svc: &ServiceDescriptor) -> StopReport {
        tracing::info!(service = %svc.name, unit = %svc.unit, "Stopping service");
        match self.supervisor.stop(&svc.unit).await {
            Ok(()) => StopReport {
                name: svc.name.clone(),
                stopped: true,
                error: None,
            },
            Err(e) => {
                tracing::warn!(service = %svc.name, error = %e, "Failed to stop service, continuing");
                StopReport {
                    name: svc.name.clone(),
                    stopped: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// 启动服务并等待就绪
    pub async fn start(&self, svc: &ServiceDescriptor) -> StartReport {
        tracing::info!(service = %svc.name, unit = %svc.unit, "Starting service");
        let error = match self.supervisor.start(&svc.unit).await {
            Ok(()) => None,
            Err(e) => Some(e.to_string()),
        };

        let started = Instant::now();
        let (active, ready) = self.wait_ready(svc).await;
        let waited = started.elapsed();

        if ready {
            tracing::info!(service = %svc.name, waited_ms = waited.as_millis() as u64, "Service ready");
        } else if active {
            tracing::warn!(
                service = %svc.name,
                url = %svc.health_url,
                "Service active but health endpoint not passing"
            );
        } else {
            tracing::error!(
                service = %svc.name,
                unit = %svc.unit,
                critical = svc.critical,
                error = error.as_deref().unwrap_or("not active"),
                "Service failed to reach active state"
            );
        }

        StartReport {
            name: svc.name.clone(),
            critical: svc.critical,
            active,
            ready,
            waited,
            error,
        }
    }

    pub async fn is_active(&self, svc: &ServiceDescriptor) -> bool {
        self.supervisor.is_active(&svc.unit).await
    }

    /// 按注册表顺序停止所有服务
    pub async fn stop_all(&self) -> Vec<StopReport> {
        let mut reports = Vec::with_capacity(self.registry.len());
        for svc in &self.registry {
            reports.push(self.stop(svc).await);
        }
        reports
    }

    /// 按注册表顺序启动所有服务
    pub async fn start_all(&self) -> Vec<StartReport> {
        let mut reports = Vec::with_capacity(self.registry.len());
        for svc in &self.registry {
            reports.push(self.start(svc).await);
        }
        reports
    }

    /// 查询所有服务状态
    pub async fn status_all(&self) -> Vec<(String, bool)> {
        let mut statuses = Vec::with_capacity(self.registry.len());
        for svc in &self.registry {
            statuses.push((svc.name.clone(), self.is_active(svc).await));
        }
        statuses
    }

    /// 带退避的就绪轮询，返回 (active, ready)
    async fn wait_ready(&self, svc: &ServiceDescriptor) -> (bool, bool) {
        let deadline = Instant::now() + self.settle_timeout;
        let max_backoff = Duration::from_millis(SETTLE_MAX_BACKOFF_MS);
        let mut delay = self
            .settle_initial_delay
            .max(Duration::from_millis(SETTLE_MIN_BACKOFF_MS));

        loop {
            // 进程管理器会在监听端口绑定之前就报告 started
            let now = Instant::now();
            tokio::time::sleep(delay.min(deadline.saturating_duration_since(now))).await;

            let active = self.supervisor.is_active(&svc.unit).await;
            if active && self.health.probe(&svc.health_url).await.reachable {
                return (true, true);
            }
            if Instant::now() >= deadline {
                return (active, false);
            }
            delay = (delay * 2).min(max_backoff);
        }
    }
}
