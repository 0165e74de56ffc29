//! Transfer Resolver
//!
//! Drives each transfer to `enqueued`, referencing its approved recipient:
//!
//! ```text
//! (none) --create--> draft --enqueue--> enqueued
//!    |
//!    +--rejected--> NON_VALID (local, never resubmitted)
//! ```

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::error::GatewayError;
use super::gateway::LedgerGateway;
use super::recipients::RecipientSet;
use super::status::{Enrollment, NON_VALID, TRANSFER_ENQUEUED, Validation};
use super::types::{
    BankContext, EntityKind, Fields, RecipientId, RemoteEntity, Transfer, TransferIdx,
    TransferState, TransitionKind,
};

/// Loaded transfers with their remote linkage
#[derive(Debug, Clone, Default)]
pub struct TransferBook {
    transfers: Vec<Transfer>,
    states: Vec<TransferState>,
}

impl TransferBook {
    /// Pair each transfer with the recipient it was linked to at load time
    pub fn new(transfers: Vec<Transfer>, links: Vec<RecipientId>) -> Self {
        debug_assert_eq!(transfers.len(), links.len());
        let states = links.into_iter().map(TransferState::new).collect();
        Self { transfers, states }
    }

    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    /// Indices in load order
    pub fn indices(&self) -> impl Iterator<Item = TransferIdx> + use<> {
        (0..self.transfers.len()).map(TransferIdx)
    }

    pub fn transfers(&self) -> &[Transfer] {
        &self.transfers
    }

    pub fn states(&self) -> &[TransferState] {
        &self.states
    }

    pub fn transfer(&self, idx: TransferIdx) -> &Transfer {
        &self.transfers[idx.index()]
    }

    pub fn state(&self, idx: TransferIdx) -> &TransferState {
        &self.states[idx.index()]
    }

    fn state_mut(&mut self, idx: TransferIdx) -> &mut TransferState {
        &mut self.states[idx.index()]
    }

    pub fn status(&self, idx: TransferIdx) -> Option<&str> {
        self.state(idx).remote_status.as_deref()
    }

    fn record(&mut self, idx: TransferIdx, entity: &RemoteEntity) {
        let state = self.state_mut(idx);
        if state.remote_id.is_none() {
            state.remote_id = Some(entity.id.clone());
        }
        state.remote_status = Some(entity.status.clone());
    }

    fn forget_remote(&mut self, idx: TransferIdx) {
        let state = self.state_mut(idx);
        state.remote_id = None;
        state.remote_status = None;
    }

    fn mark_invalid(&mut self, idx: TransferIdx) {
        self.state_mut(idx).remote_status = Some(NON_VALID.to_string());
    }
}

/// Drives transfers through creation and enqueueing
pub struct TransferResolver {
    gateway: Arc<dyn LedgerGateway>,
    context: BankContext,
}

impl TransferResolver {
    pub fn new(gateway: Arc<dyn LedgerGateway>, context: BankContext) -> Self {
        Self { gateway, context }
    }

    fn key_context(&self) -> Fields {
        let mut context = Fields::new();
        context.insert(
            "bank_key_id".into(),
            Value::String(self.context.bank_key_id.clone()),
        );
        context
    }

    /// Check whether a transfer is enqueued remotely
    pub async fn validate(&self, book: &mut TransferBook, idx: TransferIdx) -> Validation {
        match book.status(idx) {
            Some(TRANSFER_ENQUEUED) => return Validation::Settled,
            Some(NON_VALID) => return Validation::Unsettled,
            _ => {}
        }

        let Some(remote_id) = book.state(idx).remote_id.clone() else {
            return Validation::Unsettled;
        };

        match self.gateway.get(EntityKind::Transfer, &remote_id).await {
            Ok(entity) => {
                book.record(idx, &entity);
                if entity.in_flight() {
                    debug!(
                        transfer = %idx,
                        remote_id = %remote_id,
                        transition = entity.transition.as_deref().unwrap_or_default(),
                        "Transfer transition in flight"
                    );
                    Validation::Pending
                } else if entity.status == TRANSFER_ENQUEUED {
                    Validation::Settled
                } else {
                    Validation::Unsettled
                }
            }
            Err(GatewayError::NotFound(_)) => {
                warn!(transfer = %idx, remote_id = %remote_id, "Transfer vanished remotely, will recreate");
                book.forget_remote(idx);
                Validation::Unsettled
            }
            Err(e) => {
                warn!(transfer = %idx, remote_id = %remote_id, code = e.code(), error = %e, "Transfer lookup failed");
                Validation::Deferred
            }
        }
    }

    /// Create the transfer remotely, or enqueue an existing one
    ///
    /// The transfer's recipient must already be approved: creation payloads
    /// embed the recipient's remote id.
    pub async fn enroll(
        &self,
        book: &mut TransferBook,
        idx: TransferIdx,
        recipients: &RecipientSet,
    ) -> Enrollment {
        if book.status(idx) == Some(NON_VALID) {
            return Enrollment::Skipped;
        }

        if let Some(remote_id) = book.state(idx).remote_id.clone() {
            return self.enqueue(book, idx, &remote_id).await;
        }

        let recipient = book.state(idx).recipient;
        if recipients.is_invalid(recipient) {
            warn!(transfer = %idx, recipient = %recipient, "Recipient rejected by processor, marking transfer NON_VALID");
            book.mark_invalid(idx);
            return Enrollment::Skipped;
        }
        let Some(recipient_id) = recipients
            .remote_id(recipient)
            .filter(|_| recipients.is_approved(recipient))
        else {
            warn!(transfer = %idx, recipient = %recipient, "Recipient not approved yet, deferring transfer");
            return Enrollment::Skipped;
        };

        let transfer = book.transfer(idx);
        let mut payload = Fields::new();
        payload.insert("bank_payroll_id".into(), Value::Null);
        payload.insert(
            "bank_key_id".into(),
            Value::String(self.context.bank_key_id.clone()),
        );
        payload.insert(
            "description".into(),
            Value::String(transfer.description.clone()),
        );
        payload.insert("amount".into(), Value::from(transfer.amount));
        payload.insert(
            "sender_id".into(),
            Value::String(self.context.bank_account_id.clone()),
        );
        payload.insert("recipient_id".into(), Value::String(recipient_id.to_string()));

        match self.gateway.create(EntityKind::Transfer, &payload).await {
            Ok(entity) => {
                info!(
                    transfer = %idx,
                    local_id = transfer.id,
                    remote_id = %entity.id,
                    status = %entity.status,
                    "Transfer created"
                );
                book.record(idx, &entity);
                if entity.in_flight() || entity.status == TRANSFER_ENQUEUED {
                    return Enrollment::Submitted;
                }
                self.enqueue(book, idx, &entity.id).await
            }
            Err(e) if e.is_rejection() => {
                error!(transfer = %idx, local_id = transfer.id, error = %e, "Transfer rejected by processor, marking NON_VALID");
                book.mark_invalid(idx);
                Enrollment::Skipped
            }
            Err(e) => {
                error!(transfer = %idx, local_id = transfer.id, code = e.code(), error = %e, "Transfer creation failed");
                Enrollment::Skipped
            }
        }
    }

    async fn enqueue(&self, book: &mut TransferBook, idx: TransferIdx, remote_id: &str) -> Enrollment {
        match self
            .gateway
            .transition(EntityKind::Transfer, remote_id, TransitionKind::Enqueue, &self.key_context())
            .await
        {
            Ok(()) => {
                info!(transfer = %idx, remote_id, "Transfer enqueue requested");
                Enrollment::Submitted
            }
            Err(GatewayError::NotFound(_)) => {
                warn!(transfer = %idx, remote_id, "Transfer vanished remotely, will recreate");
                book.forget_remote(idx);
                Enrollment::Skipped
            }
            Err(e) => {
                warn!(transfer = %idx, remote_id, code = e.code(), error = %e, "Transfer enqueue failed");
                Enrollment::Skipped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::gateway::MockGateway;
    use crate::reconcile::gateway::mock::Op;
    use crate::reconcile::recipients::{Normalizer, RecipientResolver};
    use crate::reconcile::types::Beneficiary;

    struct Fixture {
        gw: Arc<MockGateway>,
        resolver: TransferResolver,
        book: TransferBook,
        recipients: RecipientSet,
    }

    /// One transfer whose recipient is already approved remotely
    async fn fixture(description: &str) -> Fixture {
        let gw = Arc::new(MockGateway::new());
        let context = BankContext::new("key_1", "acc_1");
        let recipient_resolver =
            RecipientResolver::new(gw.clone(), context.clone(), Normalizer::default());

        let transfers = vec![Transfer::new(
            10,
            2500,
            description,
            Beneficiary {
                legal_id: "11.111.111-1".into(),
                first_name: "Ana".into(),
                last_name: "Rojas".into(),
                bank: "bci".into(),
                ..Default::default()
            },
        )];
        let (mut recipients, links) = recipient_resolver.derive_and_load(&transfers);
        gw.seed(
            EntityKind::Recipient,
            recipients.recipient(RecipientId(0)).to_fields(),
            "approved",
        );
        recipient_resolver
            .validate(&mut recipients, RecipientId(0))
            .await;

        Fixture {
            resolver: TransferResolver::new(gw.clone(), context),
            book: TransferBook::new(transfers, links),
            recipients,
            gw,
        }
    }

    #[tokio::test]
    async fn test_create_then_enqueue() {
        let mut f = fixture("rent").await;
        let idx = TransferIdx(0);

        assert_eq!(f.resolver.validate(&mut f.book, idx).await, Validation::Unsettled);
        assert_eq!(
            f.resolver.enroll(&mut f.book, idx, &f.recipients).await,
            Enrollment::Submitted
        );
        assert_eq!(f.gw.count(EntityKind::Transfer, Op::Create), 1);
        assert_eq!(f.gw.count(EntityKind::Transfer, Op::Transition), 1);

        let payload = &f.gw.created_payloads(EntityKind::Transfer)[0];
        assert_eq!(payload["description"], "rent");
        assert_eq!(payload["amount"], 2500);
        assert_eq!(payload["sender_id"], "acc_1");
        assert_eq!(payload["recipient_id"], f.recipients.remote_id(RecipientId(0)).unwrap());
        assert!(payload["bank_payroll_id"].is_null());

        assert_eq!(f.resolver.validate(&mut f.book, idx).await, Validation::Settled);
        assert_eq!(f.book.status(idx), Some("enqueued"));
    }

    #[tokio::test]
    async fn test_enqueued_short_circuits() {
        let mut f = fixture("rent").await;
        let idx = TransferIdx(0);
        f.resolver.enroll(&mut f.book, idx, &f.recipients).await;
        f.resolver.validate(&mut f.book, idx).await;

        let calls = f.gw.total_calls();
        assert_eq!(f.resolver.validate(&mut f.book, idx).await, Validation::Settled);
        assert_eq!(f.gw.total_calls(), calls);
    }

    #[tokio::test]
    async fn test_existing_remote_id_is_enqueued_not_recreated() {
        let mut f = fixture("rent").await;
        let idx = TransferIdx(0);
        f.gw.set_transition_polls(3);

        f.resolver.enroll(&mut f.book, idx, &f.recipients).await;
        let remote_id = f.book.state(idx).remote_id.clone();
        assert_eq!(f.resolver.validate(&mut f.book, idx).await, Validation::Pending);

        f.resolver.enroll(&mut f.book, idx, &f.recipients).await;
        assert_eq!(f.gw.count(EntityKind::Transfer, Op::Create), 1);
        assert_eq!(f.gw.count(EntityKind::Transfer, Op::Transition), 2);
        assert_eq!(f.book.state(idx).remote_id, remote_id);
    }

    #[tokio::test]
    async fn test_rejected_payload_is_absorbed() {
        let mut f = fixture("").await;
        f.gw.reject_transfers_where(|payload| payload["description"] == "");
        let idx = TransferIdx(0);

        assert_eq!(
            f.resolver.enroll(&mut f.book, idx, &f.recipients).await,
            Enrollment::Skipped
        );
        assert_eq!(f.book.status(idx), Some("NON_VALID"));
        assert!(f.book.state(idx).remote_id.is_none());

        let calls = f.gw.total_calls();
        assert_eq!(
            f.resolver.enroll(&mut f.book, idx, &f.recipients).await,
            Enrollment::Skipped
        );
        assert_eq!(f.resolver.validate(&mut f.book, idx).await, Validation::Unsettled);
        assert_eq!(f.gw.total_calls(), calls);
    }

    #[tokio::test]
    async fn test_transport_failure_is_retried() {
        let mut f = fixture("rent").await;
        f.gw.fail_next_creates(1);
        let idx = TransferIdx(0);

        assert_eq!(
            f.resolver.enroll(&mut f.book, idx, &f.recipients).await,
            Enrollment::Skipped
        );
        assert!(f.book.state(idx).remote_id.is_none());
        assert!(f.book.status(idx).is_none());

        assert_eq!(
            f.resolver.enroll(&mut f.book, idx, &f.recipients).await,
            Enrollment::Submitted
        );
        assert_eq!(f.gw.entity_count(EntityKind::Transfer), 1);
    }

    #[tokio::test]
    async fn test_vanished_remote_id_is_recreated() {
        let mut f = fixture("rent").await;
        f.gw.set_transition_polls(5);
        let idx = TransferIdx(0);

        f.resolver.enroll(&mut f.book, idx, &f.recipients).await;
        let first = f.book.state(idx).remote_id.clone().unwrap();
        f.gw.remove(EntityKind::Transfer, &first);

        assert_eq!(f.resolver.validate(&mut f.book, idx).await, Validation::Unsettled);
        assert!(f.book.state(idx).remote_id.is_none());

        f.resolver.enroll(&mut f.book, idx, &f.recipients).await;
        let second = f.book.state(idx).remote_id.clone().unwrap();
        assert_ne!(first, second);
        assert_eq!(f.gw.count(EntityKind::Transfer, Op::Create), 2);
    }

    #[tokio::test]
    async fn test_unapproved_recipient_blocks_creation() {
        let gw = Arc::new(MockGateway::new());
        let context = BankContext::new("key_1", "acc_1");
        let recipient_resolver =
            RecipientResolver::new(gw.clone(), context.clone(), Normalizer::default());
        let transfers = vec![Transfer::new(1, 100, "x", Beneficiary::default())];
        let (recipients, links) = recipient_resolver.derive_and_load(&transfers);
        let mut book = TransferBook::new(transfers, links);
        let resolver = TransferResolver::new(gw.clone(), context);

        assert_eq!(
            resolver.enroll(&mut book, TransferIdx(0), &recipients).await,
            Enrollment::Skipped
        );
        assert_eq!(gw.total_calls(), 0);
        assert!(book.status(TransferIdx(0)).is_none());
    }
}
