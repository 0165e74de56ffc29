//! Recipient Resolver
//!
//! Derives canonical recipients from a transfer batch, deduplicates them and
//! drives each one to `approved`:
//!
//! ```text
//! (none) --create--> draft --enroll--> approved
//!    |                 |
//!    +--rejected--> NON_VALID (local)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::error::GatewayError;
use super::gateway::LedgerGateway;
use super::status::{Enrollment, NON_VALID, RECIPIENT_APPROVED, Validation};
use super::types::{
    BankContext, EntityKind, Fields, Recipient, RecipientId, RecipientState, Transfer,
    TransitionKind,
};

/// Maps the local store's account type and bank vocabularies onto the
/// processor's ids. Unmapped values pass through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalizer {
    account_types: HashMap<String, String>,
    banks: HashMap<String, String>,
}

impl Normalizer {
    pub fn new(account_types: HashMap<String, String>, banks: HashMap<String, String>) -> Self {
        Self {
            account_types,
            banks,
        }
    }

    pub fn account_type(&self, raw: &str) -> String {
        self.account_types
            .get(raw)
            .cloned()
            .unwrap_or_else(|| raw.to_string())
    }

    pub fn bank(&self, raw: &str) -> String {
        self.banks.get(raw).cloned().unwrap_or_else(|| raw.to_string())
    }

    /// Canonical recipient of a transfer
    pub fn recipient_of(&self, transfer: &Transfer) -> Recipient {
        let b = &transfer.beneficiary;
        Recipient {
            rut: b.legal_id.clone(),
            email: b.email.clone(),
            name: format!("{} {}", b.first_name, b.last_name),
            account_number: b.account_number.clone(),
            account_type: self.account_type(&b.account_type),
            bank_id: self.bank(&b.bank),
        }
    }
}

/// Distinct recipients of a batch with their remote linkage
#[derive(Debug, Clone, Default)]
pub struct RecipientSet {
    recipients: Vec<Recipient>,
    states: Vec<RecipientState>,
}

impl RecipientSet {
    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    /// Ids in first-appearance order
    pub fn ids(&self) -> impl Iterator<Item = RecipientId> + use<> {
        (0..self.recipients.len()).map(RecipientId)
    }

    pub fn recipient(&self, id: RecipientId) -> &Recipient {
        &self.recipients[id.index()]
    }

    pub fn state(&self, id: RecipientId) -> &RecipientState {
        &self.states[id.index()]
    }

    fn state_mut(&mut self, id: RecipientId) -> &mut RecipientState {
        &mut self.states[id.index()]
    }

    /// Remote id a transfer can reference, once the recipient exists remotely
    pub fn remote_id(&self, id: RecipientId) -> Option<&str> {
        self.state(id).remote_id.as_deref()
    }

    pub fn is_approved(&self, id: RecipientId) -> bool {
        self.state(id).remote_status.as_deref() == Some(RECIPIENT_APPROVED)
    }

    pub fn is_invalid(&self, id: RecipientId) -> bool {
        self.state(id).remote_status.as_deref() == Some(NON_VALID)
    }

    /// Record an observed remote entity without ever replacing a cached id
    fn observe(&mut self, id: RecipientId, remote_id: &str, status: &str, in_flight: bool) {
        let state = self.state_mut(id);
        match state.remote_id.as_deref() {
            Some(cached) if cached != remote_id => {
                warn!(
                    recipient = %id,
                    cached,
                    observed = remote_id,
                    "Ignoring observation of a different remote recipient"
                );
                return;
            }
            Some(_) => {}
            None => state.remote_id = Some(remote_id.to_string()),
        }
        state.remote_status = Some(status.to_string());
        state.last_seen_transition = in_flight;
    }

    fn forget_remote(&mut self, id: RecipientId) {
        *self.state_mut(id) = RecipientState::default();
    }

    fn mark_invalid(&mut self, id: RecipientId) {
        self.state_mut(id).remote_status = Some(NON_VALID.to_string());
    }
}

/// Drives recipients through creation and enrollment
pub struct RecipientResolver {
    gateway: Arc<dyn LedgerGateway>,
    context: BankContext,
    normalizer: Normalizer,
}

impl RecipientResolver {
    pub fn new(gateway: Arc<dyn LedgerGateway>, context: BankContext, normalizer: Normalizer) -> Self {
        Self {
            gateway,
            context,
            normalizer,
        }
    }

    /// Derive the distinct recipients of a batch
    ///
    /// Returns the set (first-appearance order, empty states) and, for each
    /// transfer in input order, the id of its recipient.
    pub fn derive_and_load(&self, transfers: &[Transfer]) -> (RecipientSet, Vec<RecipientId>) {
        let mut index: HashMap<Recipient, RecipientId> = HashMap::with_capacity(transfers.len());
        let mut set = RecipientSet::default();
        let mut links = Vec::with_capacity(transfers.len());

        for transfer in transfers {
            let recipient = self.normalizer.recipient_of(transfer);
            let id = *index.entry(recipient.clone()).or_insert_with(|| {
                set.recipients.push(recipient);
                set.states.push(RecipientState::default());
                RecipientId(set.recipients.len() - 1)
            });
            links.push(id);
        }

        debug!(
            transfers = transfers.len(),
            recipients = set.len(),
            "Derived distinct recipients"
        );
        (set, links)
    }

    /// Query filter: recipient fields scoped to the payer account
    fn query(&self, recipient: &Recipient) -> Fields {
        let mut filter = Fields::new();
        filter.insert(
            "owner_id".into(),
            Value::String(self.context.bank_account_id.clone()),
        );
        filter.extend(recipient.to_fields());
        filter
    }

    /// Check whether a recipient is approved remotely
    pub async fn validate(&self, set: &mut RecipientSet, id: RecipientId) -> Validation {
        if set.is_approved(id) {
            return Validation::Settled;
        }
        if set.is_invalid(id) {
            return Validation::Unsettled;
        }

        let filter = self.query(set.recipient(id));
        let matches = match self.gateway.list(EntityKind::Recipient, &filter).await {
            Ok(matches) => matches,
            Err(e) => {
                warn!(recipient = %id, code = e.code(), error = %e, "Recipient lookup failed");
                return Validation::Deferred;
            }
        };

        // listings lag behind creates; only an enroll NotFound drops a cached id
        let found = match set.remote_id(id) {
            Some(cached) => {
                let listed = matches.iter().find(|e| e.id == cached);
                if listed.is_none() {
                    warn!(recipient = %id, cached, "Cached recipient not listed yet, keeping linkage");
                    return Validation::Unsettled;
                }
                listed
            }
            None => matches.first(),
        };

        let Some(entity) = found else {
            debug!(recipient = %id, "Recipient not found remotely");
            return Validation::Unsettled;
        };

        set.observe(id, &entity.id, &entity.status, entity.in_flight());
        if entity.in_flight() {
            debug!(
                recipient = %id,
                remote_id = %entity.id,
                transition = entity.transition.as_deref().unwrap_or_default(),
                "Recipient transition in flight"
            );
            Validation::Pending
        } else if entity.status == RECIPIENT_APPROVED {
            Validation::Settled
        } else {
            Validation::Unsettled
        }
    }

    /// Create the recipient remotely, or enroll an existing draft
    pub async fn enroll(&self, set: &mut RecipientSet, id: RecipientId) -> Enrollment {
        if set.is_invalid(id) {
            return Enrollment::Skipped;
        }

        if let Some(remote_id) = set.remote_id(id).map(str::to_string) {
            let mut context = Fields::new();
            context.insert(
                "owner_id".into(),
                Value::String(self.context.bank_account_id.clone()),
            );
            context.insert(
                "bank_key_id".into(),
                Value::String(self.context.bank_key_id.clone()),
            );

            return match self
                .gateway
                .transition(EntityKind::Recipient, &remote_id, TransitionKind::Enroll, &context)
                .await
            {
                Ok(()) => {
                    info!(recipient = %id, remote_id = %remote_id, "Recipient enroll requested");
                    Enrollment::Submitted
                }
                Err(GatewayError::NotFound(_)) => {
                    warn!(recipient = %id, remote_id = %remote_id, "Recipient vanished remotely, will recreate");
                    set.forget_remote(id);
                    Enrollment::Skipped
                }
                Err(e) => {
                    warn!(recipient = %id, remote_id = %remote_id, code = e.code(), error = %e, "Recipient enroll failed");
                    Enrollment::Skipped
                }
            };
        }

        let recipient = set.recipient(id);
        let mut payload = Fields::new();
        payload.insert("alias".into(), Value::String(recipient.name.clone()));
        payload.insert(
            "bank_key_id".into(),
            Value::String(self.context.bank_key_id.clone()),
        );
        payload.extend(recipient.to_fields());

        match self.gateway.create(EntityKind::Recipient, &payload).await {
            Ok(entity) => {
                info!(recipient = %id, remote_id = %entity.id, status = %entity.status, "Recipient created");
                set.observe(id, &entity.id, &entity.status, entity.in_flight());
                Enrollment::Pending
            }
            Err(e) if e.is_rejection() => {
                error!(recipient = %id, error = %e, "Recipient rejected by processor, marking NON_VALID");
                set.mark_invalid(id);
                Enrollment::Skipped
            }
            Err(e) => {
                error!(recipient = %id, code = e.code(), error = %e, "Recipient creation failed");
                Enrollment::Skipped
            }
        }
    }
}
