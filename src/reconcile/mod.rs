//! Payout Reconciliation
//!
//! Drives pending local wire transfers, and the recipients they pay, through
//! the payment processor's asynchronous approval pipeline.
//!
//! # Flow
//!
//! ```text
//! TransferSource ──▶ RecipientResolver (derive + dedupe)
//!                          │
//!                          ▼
//!               ReconciliationEngine ──pass──▶ LedgerGateway
//!                          │
//!                          ▼
//!                       report
//! ```
//!
//! # Invariants
//!
//! 1. **Recipients first**: no transfer is created before its recipient is approved
//! 2. **One creation per run**: a recorded remote id is enrolled/enqueued, never recreated
//! 3. **Terminal short-circuit**: `approved` / `enqueued` / `NON_VALID` entities get no further calls
//! 4. **Pass-level retry**: pending items never abort a pass; the whole pass is retried

pub mod engine;
pub mod error;
pub mod gateway;
pub mod recipients;
pub mod report;
pub mod source;
pub mod status;
pub mod transfers;
pub mod types;


// Re-exports for convenience
pub use engine::{ReconciliationEngine, RetryPolicy, RunSummary};
pub use error::{GatewayError, ReconcileError, SourceError};
pub use gateway::{HttpGateway, LedgerGateway};
pub use recipients::{Normalizer, RecipientResolver, RecipientSet};
pub use source::{CsvTransferSource, MemorySource, TransferSource};
pub use status::{Enrollment, RunOutcome, Validation};
pub use transfers::{TransferBook, TransferResolver};
pub use types::{
    BankContext, Beneficiary, EntityKind, Fields, Recipient, RecipientId, RemoteEntity, Transfer,
    TransferIdx, TransitionKind,
};
