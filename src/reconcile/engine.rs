//! Reconciliation Engine
//!
//! Runs passes over the loaded batch until every recipient and transfer is
//! terminal or the attempt budget runs out.
//!
//! ```text
//! LOADING → RECIPIENTS_PASS → TRANSFERS_PASS → DONE
//!                ↑                 │
//!                └── RETRY_WAIT ←──┘ (pending) ──→ EXHAUSTED
//! ```
//!
//! Recipients are fully resolved before any transfer touches the gateway,
//! since transfer payloads embed the recipient's remote id. Within a pass a
//! pending item never stops the loop early: every item gets its chance to
//! progress before the pass decides whether to retry.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::error::{ReconcileError, SourceError};
use super::gateway::LedgerGateway;
use super::recipients::{Normalizer, RecipientResolver, RecipientSet};
use super::report;
use super::source::TransferSource;
use super::status::{RunOutcome, recipient_is_terminal, transfer_is_terminal};
use super::transfers::{TransferBook, TransferResolver};
use super::types::BankContext;
use crate::shutdown::ShutdownSignal;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(20);

/// Attempt budget and fixed delay between passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: NonZeroU32,
    backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Result<Self, ReconcileError> {
        let max_attempts = NonZeroU32::new(max_attempts).ok_or_else(|| {
            ReconcileError::InvalidConfig("max_attempts must be at least 1".to_string())
        })?;
        Ok(Self {
            max_attempts,
            backoff,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.get()
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: NonZeroU32::new(DEFAULT_MAX_ATTEMPTS).unwrap_or(NonZeroU32::MIN),
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// Result of one run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    /// Passes performed, including the last one
    pub passes: u32,
    /// Report of the last completed pass
    pub report: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassResult {
    Complete,
    Pending,
}

/// Per-run state; dropped when the run returns
struct Run {
    book: TransferBook,
    recipients: RecipientSet,
}

impl Run {
    fn report(&self) -> String {
        report::render(self.book.transfers(), self.book.states())
    }
}

pub struct ReconciliationEngine {
    source: Arc<dyn TransferSource>,
    recipients: RecipientResolver,
    transfers: TransferResolver,
    shutdown: Option<Arc<ShutdownSignal>>,
}

impl ReconciliationEngine {
    pub fn new(
        source: Arc<dyn TransferSource>,
        gateway: Arc<dyn LedgerGateway>,
        context: BankContext,
        normalizer: Normalizer,
    ) -> Self {
        info!(gateway = gateway.name(), "Creating reconciliation engine");
        Self {
            source,
            recipients: RecipientResolver::new(gateway.clone(), context.clone(), normalizer),
            transfers: TransferResolver::new(gateway, context),
            shutdown: None,
        }
    }

    /// Abort the backoff sleep when shutdown is requested
    pub fn with_shutdown(mut self, signal: Arc<ShutdownSignal>) -> Self {
        self.shutdown = Some(signal);
        self
    }

    /// Run to completion and return the final report
    ///
    /// `RetryPolicy::default()` gives the standard budget of
    /// [`DEFAULT_MAX_ATTEMPTS`] passes with [`DEFAULT_BACKOFF`] between them.
    ///
    /// Never fails: exhausting attempts, or failing to load the batch, is
    /// reflected only in the returned report.
    pub async fn execute(&self, policy: RetryPolicy) -> String {
        match self.execute_detailed(policy).await {
            Ok(summary) => summary.report,
            Err(e) => {
                error!(code = e.code(), error = %e, "Reconciliation run aborted");
                report::render(&[], &[])
            }
        }
    }

    /// Run to completion, returning how the run ended
    ///
    /// Only a failure to load the pending batch is returned as an error.
    pub async fn execute_detailed(&self, policy: RetryPolicy) -> Result<RunSummary, ReconcileError> {
        let started_at = Utc::now();
        let mut run: Option<Run> = None;
        let mut remaining = policy.max_attempts();
        let mut passes = 0u32;

        info!(
            max_attempts = policy.max_attempts(),
            backoff_secs = policy.backoff().as_secs_f64(),
            "Starting reconciliation run"
        );

        let (outcome, report) = loop {
            passes += 1;
            let result = self.run_pass(&mut run).await;

            // emitted for every pass, including failed loads
            let report = run
                .as_ref()
                .map(Run::report)
                .unwrap_or_else(|| report::render(&[], &[]));
            info!(pass = passes, "{}", report);

            match result? {
                PassResult::Complete => break (RunOutcome::Done, report),
                PassResult::Pending => {
                    remaining -= 1;
                    if remaining == 0 {
                        warn!(passes, "Attempts exhausted with transitions still pending");
                        break (RunOutcome::Exhausted, report);
                    }
                    debug!(
                        pass = passes,
                        remaining,
                        backoff_secs = policy.backoff().as_secs_f64(),
                        "Waiting for processor transitions"
                    );
                    if !self.backoff(policy.backoff()).await {
                        warn!(passes, "Shutdown requested, ending run");
                        break (RunOutcome::Exhausted, report);
                    }
                }
            }
        };

        let finished_at = Utc::now();
        info!(
            outcome = %outcome,
            passes,
            elapsed_ms = (finished_at - started_at).num_milliseconds(),
            "Reconciliation run finished"
        );

        Ok(RunSummary {
            outcome,
            passes,
            report,
            started_at,
            finished_at,
        })
    }

    /// Sleep between passes; false if interrupted by shutdown
    async fn backoff(&self, delay: Duration) -> bool {
        let Some(signal) = &self.shutdown else {
            tokio::time::sleep(delay).await;
            return true;
        };
        if signal.is_shutdown_requested() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = signal.wait() => false,
        }
    }

    async fn load(&self) -> Result<Run, SourceError> {
        let transfers = self.source.list_pending().await?;
        let (recipients, links) = self.recipients.derive_and_load(&transfers);
        info!(
            transfers = transfers.len(),
            recipients = recipients.len(),
            "Loaded pending batch"
        );
        Ok(Run {
            book: TransferBook::new(transfers, links),
            recipients,
        })
    }

    /// One pass: all recipients, then (if none is pending) all transfers
    ///
    /// The batch is loaded on the first pass only; later passes reuse the
    /// accumulated remote linkage.
    async fn run_pass(&self, slot: &mut Option<Run>) -> Result<PassResult, SourceError> {
        if slot.is_none() {
            *slot = Some(self.load().await?);
        }
        let Some(run) = slot.as_mut() else {
            return Ok(PassResult::Pending);
        };

        let mut must_wait = false;
        for id in run.recipients.ids() {
            let validation = self.recipients.validate(&mut run.recipients, id).await;
            let enrollment = if validation.needs_enrollment() {
                Some(self.recipients.enroll(&mut run.recipients, id).await)
            } else {
                None
            };

            let state = run.recipients.state(id);
            let pending = validation.is_pending()
                || enrollment.is_some_and(|e| e.is_pending())
                || !recipient_is_terminal(state.remote_status.as_deref());
            debug!(
                recipient = %id,
                ?validation,
                ?enrollment,
                status = state.remote_status.as_deref().unwrap_or("None"),
                pending,
                "Recipient processed"
            );
            must_wait |= pending;
        }
        if must_wait {
            info!("Recipients pending, transfers deferred to next pass");
            return Ok(PassResult::Pending);
        }

        for idx in run.book.indices() {
            let validation = self.transfers.validate(&mut run.book, idx).await;
            let enrollment = if validation.needs_enrollment() {
                Some(
                    self.transfers
                        .enroll(&mut run.book, idx, &run.recipients)
                        .await,
                )
            } else {
                None
            };

            let pending = validation.is_pending()
                || enrollment.is_some_and(|e| e.is_pending())
                || !transfer_is_terminal(run.book.status(idx));
            debug!(
                transfer = %idx,
                ?validation,
                ?enrollment,
                status = run.book.status(idx).unwrap_or("None"),
                pending,
                "Transfer processed"
            );
            must_wait |= pending;
        }

        Ok(if must_wait {
            PassResult::Pending
        } else {
            PassResult::Complete
        })
    }
}
