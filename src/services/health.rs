//! 健康检查
//!
//! 每个服务一次带超时的 HTTP GET，按状态码判定；所有探测并发执行，结果按注册表顺序汇总

use futures::future::join_all;
use reqwest::Client;
use std::time::{Duration, Instant};

use crate::domain::service::{HealthCheckResult, HealthReport, ServiceDescriptor, ServiceHealth};

/// 健康检查器
#[derive(Clone, Debug)]
pub struct HealthChecker {
    client: Client,
    timeout: Duration,
}

impl HealthChecker {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(1)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, timeout }
    }

    /// 探测单个 URL
    pub async fn probe(&self, url: &str) -> HealthCheckResult {
        let started = Instant::now();
        match self.client.get(url).timeout(self.timeout).send().await {
            Ok(response) => {
                let status = response.status();
                let latency = started.elapsed();
                if status.is_success() {
                    HealthCheckResult::healthy(status.as_u16(), latency)
                } else {
                    HealthCheckResult::unhealthy(
                        Some(status.as_u16()),
                        Some(latency),
                        format!("non-success status {}", status),
                    )
                }
            }
            Err(e) => {
                let reason = if e.is_timeout() {
                    format!("timed out after {:?}", self.timeout)
                } else {
                    e.to_string()
                };
                HealthCheckResult::unhealthy(None, None, reason)
            }
        }
    }

    /// 检查所有服务
    ///
    /// critical 服务失败记为 ERROR，非 critical 记为 WARN；不影响流水线结果
    pub async fn check_all(&self, registry: &[ServiceDescriptor]) -> HealthReport {
        let results = join_all(registry.iter().map(|svc| self.probe(&svc.health_url))).await;

        let services: Vec<ServiceHealth> = registry
            .iter()
            .zip(results)
            .map(|(svc, result)| {
                log_result(svc, &result);
                ServiceHealth {
                    name: svc.name.clone(),
                    critical: svc.critical,
                    result,
                }
            })
            .collect();

        let report = HealthReport { services };
        if report.all_healthy() {
            tracing::info!(services = report.services.len(), "All services healthy");
        } else {
            tracing::warn!(
                unhealthy = ?report.unhealthy(),
                critical_healthy = report.critical_healthy(),
                "Some services are unhealthy"
            );
        }
        report
    }
}

fn log_result(svc: &ServiceDescriptor, result: &HealthCheckResult) {
    let latency_ms = result.latency.map(|d| d.as_millis() as u64);
    if result.reachable {
        tracing::info!(service = %svc.name, latency_ms = ?latency_ms, "Health check OK");
    } else {
        let reason = result.error.as_deref().unwrap_or("unknown");
        if svc.critical {
            tracing::error!(service = %svc.name, url = %svc.health_url, reason, "Health check FAILED");
        } else {
            tracing::warn!(service = %svc.name, url = %svc.health_url, reason, "Health check FAILED");
        }
    }
}
