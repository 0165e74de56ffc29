//! Ledger Gateway
//!
//! Abstract capability of the payment processor: query, fetch, create and
//! transition entities in the recipients and transfers collections.

pub mod http;
#[cfg(test)]
pub mod mock;

pub use http::HttpGateway;
#[cfg(test)]
pub use mock::MockGateway;

use async_trait::async_trait;

use super::error::GatewayError;
use super::types::{EntityKind, Fields, RemoteEntity, TransitionKind};

/// Remote ledger operations used by the reconciler
///
/// Transitions are asynchronous on the processor side: `transition` does not
/// return the resulting entity, the caller observes the new status on a later
/// `list`/`get`.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Get gateway name for logging
    fn name(&self) -> &'static str;

    /// Query entities whose attributes match every filter entry
    async fn list(&self, kind: EntityKind, filter: &Fields) -> Result<Vec<RemoteEntity>, GatewayError>;

    /// Fetch one entity by remote id
    ///
    /// Fails with [`GatewayError::NotFound`] if the id does not resolve.
    async fn get(&self, kind: EntityKind, remote_id: &str) -> Result<RemoteEntity, GatewayError>;

    /// Create a new entity
    ///
    /// Fails with [`GatewayError::RejectedPayload`] when the processor refuses
    /// the payload.
    async fn create(&self, kind: EntityKind, payload: &Fields) -> Result<RemoteEntity, GatewayError>;

    /// Request a state transition on an existing entity
    async fn transition(
        &self,
        kind: EntityKind,
        remote_id: &str,
        transition: TransitionKind,
        context: &Fields,
    ) -> Result<(), GatewayError>;
}
