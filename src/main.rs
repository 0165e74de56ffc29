//! Payout Reconciler
//!
//! Loads pending wire transfers, reconciles them against the payment
//! processor and prints the final status report.
//!
//! ```text
//! ┌──────────┐    ┌──────────────┐    ┌───────────┐    ┌──────────┐
//! │  Source  │───▶│  Recipients  │───▶│ Transfers │───▶│  Report  │
//! │  (CSV)   │    │(create/enrol)│    │ (enqueue) │    │ (stdout) │
//! └──────────┘    └──────────────┘    └───────────┘    └──────────┘
//! ```

use std::sync::Arc;

use anyhow::Context;
use payout_reconciler::config::AppConfig;
use payout_reconciler::logging::init_logging;
use payout_reconciler::{
    CsvTransferSource, HttpGateway, ReconciliationEngine, RunOutcome, ShutdownSignal,
};

fn get_arg(names: &[&str]) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if names.contains(&args[i].as_str()) && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

fn get_env() -> String {
    get_arg(&["--env", "-e"]).unwrap_or_else(|| "dev".to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env).with_context(|| format!("loading config/{}.yaml", env))?;
    let _log_guard = init_logging(&config);

    tracing::info!(
        env = %env,
        git_hash = env!("GIT_HASH"),
        "Starting payout reconciler"
    );

    let input = get_arg(&["--input"]).unwrap_or_else(|| config.source.transfers_csv.clone());
    let source = Arc::new(CsvTransferSource::new(&input));
    let gateway = Arc::new(HttpGateway::new(&config.gateway).context("building HTTP gateway")?);
    let policy = config.worker.retry_policy()?;

    let shutdown = Arc::new(ShutdownSignal::new());
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl-C received, stopping after the current pass");
            signal.request_shutdown();
        }
    });

    let engine = ReconciliationEngine::new(
        source,
        gateway,
        config.worker.bank_context(),
        config.normalize.normalizer(),
    )
    .with_shutdown(shutdown);

    let summary = engine
        .execute_detailed(policy)
        .await
        .with_context(|| format!("reconciling transfers from {}", input))?;

    tracing::info!(
        outcome = %summary.outcome,
        passes = summary.passes,
        elapsed_ms = (summary.finished_at - summary.started_at).num_milliseconds(),
        "Reconciliation finished"
    );
    if summary.outcome == RunOutcome::Exhausted {
        tracing::warn!("Attempts exhausted with items still pending");
    }
    print!("{}", summary.report);
    Ok(())
}
