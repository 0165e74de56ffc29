//! Transfer Sources
//!
//! Supply the ordered pending transfers for one run. Order must be stable:
//! it drives recipient ordering and report ordering.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::error::SourceError;
use super::types::{Amount, Beneficiary, Transfer};

/// Provider of pending local transfers
#[async_trait]
pub trait TransferSource: Send + Sync {
    async fn list_pending(&self) -> Result<Vec<Transfer>, SourceError>;
}

/// Fixed in-memory batch
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    transfers: Vec<Transfer>,
}

impl MemorySource {
    pub fn new(transfers: Vec<Transfer>) -> Self {
        Self { transfers }
    }
}

#[async_trait]
impl TransferSource for MemorySource {
    async fn list_pending(&self) -> Result<Vec<Transfer>, SourceError> {
        Ok(self.transfers.clone())
    }
}

/// One row of the `wire_transfers` export
#[derive(Debug, Deserialize)]
struct WireTransferRow {
    id: i64,
    amount: Amount,
    #[serde(default)]
    commentary: String,
    #[serde(default)]
    rut: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    account_number: String,
    #[serde(default)]
    account_type: String,
    #[serde(default)]
    account_bank: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    lastname: String,
}

impl From<WireTransferRow> for Transfer {
    fn from(row: WireTransferRow) -> Self {
        Transfer {
            id: row.id,
            amount: row.amount,
            description: row.commentary,
            beneficiary: Beneficiary {
                legal_id: row.rut,
                email: row.email,
                first_name: row.name,
                last_name: row.lastname,
                account_number: row.account_number,
                account_type: row.account_type,
                bank: row.account_bank,
            },
        }
    }
}

/// CSV export of the local `wire_transfers` table
///
/// Header: `id,amount,commentary,rut,email,account_number,account_type,account_bank,name,lastname`
#[derive(Debug, Clone)]
pub struct CsvTransferSource {
    path: PathBuf,
}

impl CsvTransferSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Parse transfers from CSV bytes, preserving row order
    pub fn parse(data: &[u8]) -> Result<Vec<Transfer>, SourceError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(data);

        let mut seen = HashSet::new();
        let mut transfers = Vec::new();

        for result in reader.deserialize::<WireTransferRow>() {
            let row = result?;
            if !seen.insert(row.id) {
                // header is line 1
                return Err(SourceError::InvalidRecord {
                    line: transfers.len() as u64 + 2,
                    reason: format!("duplicate transfer id {}", row.id),
                });
            }
            transfers.push(Transfer::from(row));
        }

        Ok(transfers)
    }
}

#[async_trait]
impl TransferSource for CsvTransferSource {
    async fn list_pending(&self) -> Result<Vec<Transfer>, SourceError> {
        let data = tokio::fs::read(&self.path).await?;
        let transfers = Self::parse(&data)?;
        info!(
            count = transfers.len(),
            path = %self.path.display(),
            "Loaded pending transfers"
        );
        debug!(ids = ?transfers.iter().map(|t| t.id).collect::<Vec<_>>(), "Transfer order");
        Ok(transfers)
    }
}
