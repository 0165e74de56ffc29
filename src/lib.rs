//! Payout Reconciler
//!
//! Reconciles a batch of locally recorded wire transfers against a payment
//! processor's ledger: recipients are created and enrolled until approved,
//! then transfers are created and enqueued until the processor accepts them.
//!
//! # Modules
//!
//! - [`reconcile`] - Engine, resolvers, gateway seam and report
//! - [`config`] - YAML configuration with environment overrides
//! - [`logging`] - tracing subscriber setup
//! - [`shutdown`] - Cooperative cancellation signal

pub mod config;
pub mod logging;
pub mod reconcile;
pub mod shutdown;

// Convenient re-exports at crate root
pub use config::AppConfig;
pub use reconcile::{
    CsvTransferSource, GatewayError, HttpGateway, LedgerGateway, ReconcileError,
    ReconciliationEngine, RetryPolicy, RunOutcome, RunSummary, TransferSource,
};
pub use shutdown::ShutdownSignal;
