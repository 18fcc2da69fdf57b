//! XJP Release Guard - 带备份与回滚的部署编排
//!
//! Usage:
//! - Deploy: `xjp-release-guard` or `xjp-release-guard deploy`
//! - Service and backup status: `xjp-release-guard status [--json]`
//! - Restore the latest backup: `xjp-release-guard rollback`
//! - Probe health endpoints: `xjp-release-guard health`

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create runtime: {}", e);
            std::process::exit(1);
        }
    };

    let code = rt.block_on(xjp_release_guard::run_cli(&args));
    std::process::exit(code);
}
