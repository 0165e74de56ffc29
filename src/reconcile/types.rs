//! Reconciliation Core Types
//!
//! Local transfer records, canonical recipients, per-run state entries and
//! the fixed remote entity shape returned by the gateway.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered field mapping used for gateway filters, payloads and contexts
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Amount in the processor's minor units (CLP has no decimals)
pub type Amount = i64;

/// Stable index of a distinct recipient, assigned at load time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecipientId(pub usize);

impl RecipientId {
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "recipient#{}", self.0)
    }
}

/// Stable index of a transfer within the loaded batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferIdx(pub usize);

impl TransferIdx {
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for TransferIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transfer#{}", self.0)
    }
}

/// Raw beneficiary fields as stored alongside a pending transfer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Beneficiary {
    /// National legal id (RUT)
    pub legal_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub account_number: String,
    /// Account type in the local store's vocabulary
    pub account_type: String,
    /// Bank identifier in the local store's vocabulary
    pub bank: String,
}

/// Pending local wire transfer
///
/// Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// Local store primary key
    pub id: i64,
    pub amount: Amount,
    /// Free-text commentary sent as the remote description
    pub description: String,
    pub beneficiary: Beneficiary,
}

impl Transfer {
    pub fn new(id: i64, amount: Amount, description: impl Into<String>, beneficiary: Beneficiary) -> Self {
        Self {
            id,
            amount,
            description: description.into(),
            beneficiary,
        }
    }
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<WireTransfer ${} to {} {}>",
            self.amount, self.beneficiary.first_name, self.beneficiary.last_name
        )
    }
}

/// Canonical recipient derived from a transfer's beneficiary fields
///
/// Field names are the processor's wire names. Structural equality is the
/// deduplication fingerprint: two transfers deriving equal values share one
/// recipient.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Recipient {
    pub rut: String,
    pub email: String,
    pub name: String,
    pub account_number: String,
    pub account_type: String,
    pub bank_id: String,
}

impl Recipient {
    /// Wire representation as an ordered field mapping
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("rut".into(), self.rut.clone().into());
        fields.insert("email".into(), self.email.clone().into());
        fields.insert("name".into(), self.name.clone().into());
        fields.insert("account_number".into(), self.account_number.clone().into());
        fields.insert("account_type".into(), self.account_type.clone().into());
        fields.insert("bank_id".into(), self.bank_id.clone().into());
        fields
    }
}

/// Remote linkage of one distinct recipient
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipientState {
    pub remote_id: Option<String>,
    pub remote_status: Option<String>,
    /// Whether the last observed remote entity carried an in-flight transition
    pub last_seen_transition: bool,
}

/// Remote linkage of one transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferState {
    pub remote_id: Option<String>,
    pub remote_status: Option<String>,
    /// Set once at load time, never changes afterward
    pub recipient: RecipientId,
}

impl TransferState {
    pub fn new(recipient: RecipientId) -> Self {
        Self {
            remote_id: None,
            remote_status: None,
            recipient,
        }
    }
}

/// Remote collection addressed by a gateway call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Recipient,
    Transfer,
}

impl EntityKind {
    /// Resource path of the collection below the API base URL
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Recipient => "banking/recipients",
            EntityKind::Transfer => "banking/transactions",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Recipient => "RECIPIENT",
            EntityKind::Transfer => "TRANSFER",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State transition requested from the processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    /// Approve a draft recipient
    Enroll,
    /// Queue a created transfer for execution
    Enqueue,
}

impl TransitionKind {
    /// Action segment appended to the entity path
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::Enroll => "enroll",
            TransitionKind::Enqueue => "enqueue",
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Remote recipient or transfer as seen by the reconciler
///
/// Extra attributes returned by the processor are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntity {
    pub id: String,
    #[serde(default)]
    pub status: String,
    /// Name of the transition currently in flight, if any
    #[serde(default)]
    pub transition: Option<String>,
}

impl RemoteEntity {
    pub fn new(id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: status.into(),
            transition: None,
        }
    }

    /// Whether the processor reports an asynchronous transition in progress
    #[inline]
    pub fn in_flight(&self) -> bool {
        self.transition.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Processor credentials and owner context shared by every call of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankContext {
    /// Signing key used to authorize enroll/enqueue
    pub bank_key_id: String,
    /// Payer account; owner of recipients and sender of transfers
    pub bank_account_id: String,
}

impl BankContext {
    pub fn new(bank_key_id: impl Into<String>, bank_account_id: impl Into<String>) -> Self {
        Self {
            bank_key_id: bank_key_id.into(),
            bank_account_id: bank_account_id.into(),
        }
    }
}
