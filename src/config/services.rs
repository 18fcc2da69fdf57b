//! 默认服务注册表与依赖生态表

use crate::domain::service::ServiceDescriptor;

/// 默认的受管服务列表
///
/// 顺序即停止顺序和启动顺序
pub fn default_registry() -> Vec<ServiceDescriptor> {
    vec![
        ServiceDescriptor::new(
            "grok-api",
            "grok-api.service",
            "http://127.0.0.1:8080/health",
            true,
        ),
        ServiceDescriptor::new(
            "orbit-bridge",
            "orbit-bridge.service",
            "http://127.0.0.1:3001/status",
            false,
        ),
        ServiceDescriptor::new(
            "job-master",
            "job-master.service",
            "http://127.0.0.1:5010/health",
            false,
        ),
    ]
}

/// 依赖生态：清单文件存在时执行对应的安装命令
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ecosystem {
    /// 生态名称 (如 "python")
    pub name: String,
    /// 清单文件，相对于应用目录
    pub manifest: String,
    pub program: String,
    pub args: Vec<String>,
}

impl Ecosystem {
    pub fn new(name: &str, manifest: &str, program: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            manifest: manifest.to_string(),
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// 命令行展示用
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// 支持的依赖生态，按顺序安装
pub fn default_ecosystems() -> Vec<Ecosystem> {
    vec![
        Ecosystem::new(
            "python",
            "requirements.txt",
            "pip",
            &["install", "--quiet", "-r", "requirements.txt"],
        ),
        Ecosystem::new("node", "package.json", "npm", &["install", "--omit=dev"]),
        Ecosystem::new("rust", "Cargo.toml", "cargo", &["build", "--release"]),
    ]
}
