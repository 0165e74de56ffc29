//! Mock gateway for testing
//!
//! In-memory processor: created recipients start as `draft` and become
//! `approved` on enroll; created transfers start as `draft` and become
//! `enqueued` on enqueue. Transitions can be configured to stay in flight for
//! a number of observations before settling.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::LedgerGateway;
use crate::reconcile::error::GatewayError;
use crate::reconcile::status::{RECIPIENT_APPROVED, TRANSFER_ENQUEUED};
use crate::reconcile::types::{EntityKind, Fields, RemoteEntity, TransitionKind};

/// Gateway operation, for call accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    List,
    Get,
    Create,
    Transition,
}

type RejectRule = Box<dyn Fn(&Fields) -> bool + Send + Sync>;

struct StoredEntity {
    kind: EntityKind,
    id: String,
    status: String,
    fields: Fields,
    /// Transition in flight and the status it settles into
    in_flight: Option<(String, String)>,
    /// Observations left before the in-flight transition settles
    polls_left: usize,
}

impl StoredEntity {
    /// Snapshot as seen by a caller; advances in-flight transitions
    fn observe(&mut self) -> RemoteEntity {
        let snapshot = RemoteEntity {
            id: self.id.clone(),
            status: self.status.clone(),
            transition: self.in_flight.as_ref().map(|(name, _)| name.clone()),
        };
        if self.in_flight.is_some() {
            if self.polls_left == 0 {
                if let Some((_, target)) = self.in_flight.take() {
                    self.status = target;
                }
            } else {
                self.polls_left -= 1;
            }
        }
        snapshot
    }

    fn matches(&self, filter: &Fields) -> bool {
        filter
            .iter()
            .all(|(key, value)| self.fields.get(key).is_none_or(|stored| stored == value))
    }
}

#[derive(Default)]
struct MockState {
    entities: Vec<StoredEntity>,
    next_id: usize,
    calls: HashMap<(EntityKind, Op), usize>,
    created_payloads: Vec<(EntityKind, Fields)>,
}

pub struct MockGateway {
    state: Mutex<MockState>,
    reject_recipient: Mutex<Option<RejectRule>>,
    reject_transfer: Mutex<Option<RejectRule>>,
    /// Number of upcoming create calls that fail with a transport error
    failing_creates: Mutex<usize>,
    /// Number of upcoming list calls that return nothing
    lagging_lists: Mutex<usize>,
    /// Observations a transition stays in flight after being requested
    transition_polls: Mutex<usize>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            reject_recipient: Mutex::new(None),
            reject_transfer: Mutex::new(None),
            failing_creates: Mutex::new(0),
            lagging_lists: Mutex::new(0),
            transition_polls: Mutex::new(0),
        }
    }

    /// Reject recipient creation when the rule matches the payload
    pub fn reject_recipients_where(&self, rule: impl Fn(&Fields) -> bool + Send + Sync + 'static) {
        *self.reject_recipient.lock().unwrap() = Some(Box::new(rule));
    }

    /// Reject transfer creation when the rule matches the payload
    pub fn reject_transfers_where(&self, rule: impl Fn(&Fields) -> bool + Send + Sync + 'static) {
        *self.reject_transfer.lock().unwrap() = Some(Box::new(rule));
    }

    pub fn fail_next_creates(&self, count: usize) {
        *self.failing_creates.lock().unwrap() = count;
    }

    /// Simulate an eventually consistent listing that misses recent creates
    pub fn lag_next_lists(&self, count: usize) {
        *self.lagging_lists.lock().unwrap() = count;
    }

    pub fn set_transition_polls(&self, polls: usize) {
        *self.transition_polls.lock().unwrap() = polls;
    }

    /// Insert an entity that already exists remotely
    pub fn seed(&self, kind: EntityKind, fields: Fields, status: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let id = Self::allocate_id(&mut state, kind);
        state.entities.push(StoredEntity {
            kind,
            id: id.clone(),
            status: status.to_string(),
            fields,
            in_flight: None,
            polls_left: 0,
        });
        id
    }

    /// Drop an entity so later lookups fail with `NotFound`
    pub fn remove(&self, kind: EntityKind, remote_id: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .entities
            .retain(|e| !(e.kind == kind && e.id == remote_id));
    }

    pub fn status_of(&self, kind: EntityKind, remote_id: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .entities
            .iter()
            .find(|e| e.kind == kind && e.id == remote_id)
            .map(|e| e.status.clone())
    }

    pub fn count(&self, kind: EntityKind, op: Op) -> usize {
        let state = self.state.lock().unwrap();
        state.calls.get(&(kind, op)).copied().unwrap_or(0)
    }

    /// Total calls of any kind
    pub fn total_calls(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.calls.values().sum()
    }

    pub fn entity_count(&self, kind: EntityKind) -> usize {
        let state = self.state.lock().unwrap();
        state.entities.iter().filter(|e| e.kind == kind).count()
    }

    pub fn created_payloads(&self, kind: EntityKind) -> Vec<Fields> {
        let state = self.state.lock().unwrap();
        state
            .created_payloads
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    fn allocate_id(state: &mut MockState, kind: EntityKind) -> String {
        state.next_id += 1;
        match kind {
            EntityKind::Recipient => format!("rcp_{}", state.next_id),
            EntityKind::Transfer => format!("tx_{}", state.next_id),
        }
    }

    fn record(state: &mut MockState, kind: EntityKind, op: Op) {
        *state.calls.entry((kind, op)).or_default() += 1;
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerGateway for MockGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn list(&self, kind: EntityKind, filter: &Fields) -> Result<Vec<RemoteEntity>, GatewayError> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, kind, Op::List);
        {
            let mut lagging = self.lagging_lists.lock().unwrap();
            if *lagging > 0 {
                *lagging -= 1;
                return Ok(Vec::new());
            }
        }
        Ok(state
            .entities
            .iter_mut()
            .filter(|e| e.kind == kind && e.matches(filter))
            .map(|e| e.observe())
            .collect())
    }

    async fn get(&self, kind: EntityKind, remote_id: &str) -> Result<RemoteEntity, GatewayError> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, kind, Op::Get);
        state
            .entities
            .iter_mut()
            .find(|e| e.kind == kind && e.id == remote_id)
            .map(|e| e.observe())
            .ok_or_else(|| GatewayError::NotFound(remote_id.to_string()))
    }

    async fn create(&self, kind: EntityKind, payload: &Fields) -> Result<RemoteEntity, GatewayError> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, kind, Op::Create);

        {
            let mut failing = self.failing_creates.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(GatewayError::Transport("Mock connection reset".to_string()));
            }
        }

        let rule = match kind {
            EntityKind::Recipient => self.reject_recipient.lock().unwrap(),
            EntityKind::Transfer => self.reject_transfer.lock().unwrap(),
        };
        if rule.as_ref().is_some_and(|reject| reject(payload)) {
            return Err(GatewayError::RejectedPayload {
                status: 400,
                message: "Mock validation failure".to_string(),
            });
        }

        state.created_payloads.push((kind, payload.clone()));
        let id = Self::allocate_id(&mut state, kind);
        state.entities.push(StoredEntity {
            kind,
            id: id.clone(),
            status: "draft".to_string(),
            fields: payload.clone(),
            in_flight: None,
            polls_left: 0,
        });
        Ok(RemoteEntity::new(id, "draft"))
    }

    async fn transition(
        &self,
        kind: EntityKind,
        remote_id: &str,
        transition: TransitionKind,
        _context: &Fields,
    ) -> Result<(), GatewayError> {
        let polls = *self.transition_polls.lock().unwrap();
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, kind, Op::Transition);

        let entity = state
            .entities
            .iter_mut()
            .find(|e| e.kind == kind && e.id == remote_id)
            .ok_or_else(|| GatewayError::NotFound(remote_id.to_string()))?;

        let target = match transition {
            TransitionKind::Enroll => RECIPIENT_APPROVED,
            TransitionKind::Enqueue => TRANSFER_ENQUEUED,
        };
        if polls == 0 {
            entity.status = target.to_string();
        } else {
            entity.in_flight = Some((format!("{}ing", transition.as_str()), target.to_string()));
            entity.polls_left = polls - 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recipient_fields() -> Fields {
        let mut fields = Fields::new();
        fields.insert("rut".into(), json!("11.111.111-1"));
        fields.insert("name".into(), json!("Ana Rojas"));
        fields
    }

    #[tokio::test]
    async fn test_mock_create_and_enroll() {
        let gw = MockGateway::new();
        let created = gw
            .create(EntityKind::Recipient, &recipient_fields())
            .await
            .unwrap();
        assert_eq!(created.status, "draft");

        gw.transition(
            EntityKind::Recipient,
            &created.id,
            TransitionKind::Enroll,
            &Fields::new(),
        )
        .await
        .unwrap();
        assert_eq!(
            gw.status_of(EntityKind::Recipient, &created.id).as_deref(),
            Some("approved")
        );
        assert_eq!(gw.count(EntityKind::Recipient, Op::Create), 1);
        assert_eq!(gw.count(EntityKind::Recipient, Op::Transition), 1);
    }

    #[tokio::test]
    async fn test_mock_list_ignores_unknown_filter_keys() {
        let gw = MockGateway::new();
        gw.seed(EntityKind::Recipient, recipient_fields(), "approved");

        let mut filter = recipient_fields();
        filter.insert("owner_id".into(), json!("acc_1"));
        let found = gw.list(EntityKind::Recipient, &filter).await.unwrap();
        assert_eq!(found.len(), 1);

        filter.insert("name".into(), json!("Someone Else"));
        let found = gw.list(EntityKind::Recipient, &filter).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_mock_in_flight_transition() {
        let gw = MockGateway::new();
        gw.set_transition_polls(1);
        let id = gw.seed(EntityKind::Transfer, Fields::new(), "draft");

        gw.transition(EntityKind::Transfer, &id, TransitionKind::Enqueue, &Fields::new())
            .await
            .unwrap();

        let first = gw.get(EntityKind::Transfer, &id).await.unwrap();
        assert!(first.in_flight());
        assert_eq!(first.status, "draft");

        let second = gw.get(EntityKind::Transfer, &id).await.unwrap();
        assert!(!second.in_flight());
        assert_eq!(second.status, "enqueued");
    }

    #[tokio::test]
    async fn test_mock_not_found() {
        let gw = MockGateway::new();
        let err = gw.get(EntityKind::Transfer, "tx_404").await.unwrap_err();
        assert_eq!(err, GatewayError::NotFound("tx_404".into()));
    }
}
