//! 结束横幅与阶段汇总

use crate::domain::deploy::DeploymentRun;

const RULE: &str = "============================================================";

pub(super) fn log_summary(run: &DeploymentRun) {
    let Some(outcome) = &run.outcome else {
        return;
    };

    tracing::info!("{}", RULE);
    if outcome.is_success() {
        tracing::info!(
            run_id = %run.id,
            revision = run.revision.as_deref().unwrap_or("-"),
            "Deployment finished: {}",
            outcome.stage()
        );
    } else {
        tracing::warn!(
            run_id = %run.id,
            exit_code = outcome.exit_code(),
            "Deployment finished: {}",
            outcome.stage()
        );
    }
    tracing::info!("{}", RULE);

    tracing::info!("=== Stage Summary ===");
    for record in &run.records {
        let duration = record
            .duration_ms
            .map(|d| format!("{}ms", d))
            .unwrap_or_else(|| "-".to_string());
        match &record.message {
            Some(message) => tracing::info!(
                "{} {} ({}) {}",
                record.status.icon(),
                record.stage.display_name(),
                duration,
                message
            ),
            None => tracing::info!(
                "{} {} ({})",
                record.status.icon(),
                record.stage.display_name(),
                duration
            ),
        }
    }
}
