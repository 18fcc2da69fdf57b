//! 受管服务相关领域模型
//!
//! 纯数据类型，无 tokio/reqwest 依赖

use serde::Serialize;
use std::time::Duration;

/// 受管服务描述（不可变）
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// 服务名称 (如 "grok-api")
    pub name: String,
    /// 进程管理器 unit (如 "grok-api.service")
    pub unit: String,
    /// 健康检查 URL
    pub health_url: String,
    /// 健康检查失败时是否升级为 ERROR
    pub critical: bool,
}

impl ServiceDescriptor {
    pub fn new(name: &str, unit: &str, health_url: &str, critical: bool) -> Self {
        Self {
            name: name.to_string(),
            unit: unit.to_string(),
            health_url: health_url.to_string(),
            critical,
        }
    }

    /// 解析单个服务描述
    /// 格式: "name=unit@health_url"，末尾 `!` 表示 critical
    /// 例如: "grok-api=grok-api.service@http://127.0.0.1:8080/health!"
    pub fn parse(entry: &str) -> Option<Self> {
        let entry = entry.trim();
        let (entry, critical) = match entry.strip_suffix('!') {
            Some(rest) => (rest, true),
            None => (entry, false),
        };
        let (name, rest) = entry.split_once('=')?;
        let (unit, health_url) = rest.split_once('@')?;
        let (name, unit, health_url) = (name.trim(), unit.trim(), health_url.trim());
        if name.is_empty() || unit.is_empty() || health_url.is_empty() {
            return None;
        }
        Some(Self::new(name, unit, health_url, critical))
    }

    /// 从配置字符串解析服务列表，保留书写顺序
    /// 分隔符: ';' 或 ','
    pub fn parse_list(list: &str) -> Result<Vec<Self>, String> {
        list.split([';', ','])
            .filter(|s| !s.trim().is_empty())
            .map(|s| Self::parse(s).ok_or_else(|| s.trim().to_string()))
            .collect()
    }
}

/// 单个服务的健康检查结果
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct HealthCheckResult {
    pub reachable: bool,
    /// HTTP 状态码（请求未完成时为空）
    pub status: Option<u16>,
    #[serde(serialize_with = "serialize_latency")]
    pub latency: Option<Duration>,
    pub error: Option<String>,
}

impl HealthCheckResult {
    pub fn healthy(status: u16, latency: Duration) -> Self {
        Self {
            reachable: true,
            status: Some(status),
            latency: Some(latency),
            error: None,
        }
    }

    pub fn unhealthy(status: Option<u16>, latency: Option<Duration>, error: impl Into<String>) -> Self {
        Self {
            reachable: false,
            status,
            latency,
            error: Some(error.into()),
        }
    }
}

fn serialize_latency<S: serde::Serializer>(
    latency: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match latency {
        Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
        None => serializer.serialize_none(),
    }
}

/// 某个服务的检查条目
#[derive(Clone, Debug, Serialize)]
pub struct ServiceHealth {
    pub name: String,
    pub critical: bool,
    pub result: HealthCheckResult,
}

/// 汇总报告，按注册表顺序
#[derive(Clone, Debug, Default, Serialize)]
pub struct HealthReport {
    pub services: Vec<ServiceHealth>,
}

impl HealthReport {
    pub fn get(&self, name: &str) -> Option<&HealthCheckResult> {
        self.services
            .iter()
            .find(|s| s.name == name)
            .map(|s| &s.result)
    }

    /// 所有服务是否健康
    pub fn all_healthy(&self) -> bool {
        self.services.iter().all(|s| s.result.reachable)
    }

    /// 所有 critical 服务是否健康
    pub fn critical_healthy(&self) -> bool {
        self.services
            .iter()
            .filter(|s| s.critical)
            .all(|s| s.result.reachable)
    }

    pub fn unhealthy(&self) -> Vec<&str> {
        self.services
            .iter()
            .filter(|s| !s.result.reachable)
            .map(|s| s.name.as_str())
            .collect()
    }
}
