use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::config::DispatchConfig;
use crate::workflows::dispatch::domain::{
    AcceptanceToken, Assignee, AssignmentMode, AssignmentPolicy, Candidate, CandidateContact,
    CandidateId, CandidateKind, Commission, CustomerDetails, FallbackBehavior, Offer, OfferId,
    OfferStatus, Order, OrderId, OrderStatus, OrderSummary, PolicyId, PostalRange, Profession,
};
use crate::workflows::dispatch::matcher::CoveragePolicy;
use crate::workflows::dispatch::memory::InMemoryDispatchStore;
use crate::workflows::dispatch::repository::{
    CandidateDirectory, CommissionRepository, NotificationError, Notifier, OfferRepository,
    OrderRepository, PolicyStore, RepositoryError,
};
use crate::workflows::dispatch::service::DispatchService;

pub(super) fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn dispatch_config() -> DispatchConfig {
    DispatchConfig {
        commission_rate: Decimal::new(10, 2),
        unscoped_candidates: CoveragePolicy::Include,
        offer_ttl: None,
    }
}

pub(super) fn order(id: &str, profession: &str, postal_code: Option<&str>) -> Order {
    Order::new(
        id,
        "water damage",
        profession,
        CustomerDetails {
            name: "Erika Mustermann".to_string(),
            postal_code: postal_code.map(str::to_string),
            city: Some("Mönchengladbach".to_string()),
        },
        fixed_now(),
    )
}

pub(super) fn policy(
    id: u64,
    profession: &str,
    prefix: Option<&str>,
    mode: AssignmentMode,
) -> AssignmentPolicy {
    AssignmentPolicy {
        id: PolicyId(id),
        profession: Profession::new(profession),
        postal_prefix: prefix.map(str::to_string),
        mode,
        broadcast_fan_out: 3,
        fallback: FallbackBehavior::InternalOnly,
        active: true,
    }
}

pub(super) fn broadcast_policy(
    id: u64,
    profession: &str,
    fan_out: usize,
    fallback: FallbackBehavior,
) -> AssignmentPolicy {
    AssignmentPolicy {
        broadcast_fan_out: fan_out,
        fallback,
        ..policy(id, profession, None, AssignmentMode::Broadcast)
    }
}

pub(super) fn partner(id: &str, professions: &[&str]) -> Candidate {
    Candidate {
        id: CandidateId(id.to_string()),
        kind: CandidateKind::Partner,
        display_name: format!("Partner {id}"),
        professions: professions.iter().map(|p| Profession::new(p)).collect::<BTreeSet<_>>(),
        coverage: None,
        verified: true,
        rating: None,
        contact: CandidateContact {
            email: Some(format!("{id}@partners.example")),
            phone: None,
        },
    }
}

pub(super) fn craftsman(id: &str, professions: &[&str]) -> Candidate {
    Candidate {
        kind: CandidateKind::Craftsman,
        display_name: format!("Craftsman {id}"),
        ..partner(id, professions)
    }
}

pub(super) fn covering(mut candidate: Candidate, start: &str, end: &str) -> Candidate {
    candidate
        .coverage
        .get_or_insert_with(Vec::new)
        .push(PostalRange::new(start, end));
    candidate
}

pub(super) fn sent_offer(
    id: &str,
    order_id: &str,
    candidate_id: &str,
    created_at: DateTime<Utc>,
) -> Offer {
    Offer {
        id: OfferId(id.to_string()),
        order_id: OrderId(order_id.to_string()),
        candidate_id: CandidateId(candidate_id.to_string()),
        candidate_kind: CandidateKind::Partner,
        status: OfferStatus::Sent,
        token: AcceptanceToken::generate(),
        created_at,
        responded_at: None,
    }
}

pub(super) fn build_service(
    store: InMemoryDispatchStore,
) -> (
    DispatchService<InMemoryDispatchStore, MemoryNotifier>,
    Arc<InMemoryDispatchStore>,
    Arc<MemoryNotifier>,
) {
    build_service_with(store, dispatch_config())
}

pub(super) fn build_service_with(
    store: InMemoryDispatchStore,
    config: DispatchConfig,
) -> (
    DispatchService<InMemoryDispatchStore, MemoryNotifier>,
    Arc<InMemoryDispatchStore>,
    Arc<MemoryNotifier>,
) {
    let store = Arc::new(store);
    let notifier = Arc::new(MemoryNotifier::default());
    let service = DispatchService::new(store.clone(), notifier.clone(), &config);
    (service, store, notifier)
}

#[derive(Default, Clone)]
pub(super) struct MemoryNotifier {
    events: Arc<Mutex<Vec<(CandidateContact, OrderSummary)>>>,
}

impl MemoryNotifier {
    pub(super) fn events(&self) -> Vec<(CandidateContact, OrderSummary)> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(
        &self,
        contact: &CandidateContact,
        summary: &OrderSummary,
    ) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push((contact.clone(), summary.clone()));
        Ok(())
    }
}

pub(super) struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn notify(
        &self,
        _contact: &CandidateContact,
        _summary: &OrderSummary,
    ) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp relay offline".to_string()))
    }
}

/// Store whose every call fails, to check error propagation.
pub(super) struct UnavailableStore;

fn offline<T>() -> Result<T, RepositoryError> {
    Err(RepositoryError::Unavailable("database offline".to_string()))
}

impl PolicyStore for UnavailableStore {
    fn policies_for(
        &self,
        _profession: &Profession,
    ) -> Result<Vec<AssignmentPolicy>, RepositoryError> {
        offline()
    }
}

impl CandidateDirectory for UnavailableStore {
    fn candidates_for(&self, _profession: &Profession) -> Result<Vec<Candidate>, RepositoryError> {
        offline()
    }
}

impl OrderRepository for UnavailableStore {
    fn fetch_order(&self, _id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        offline()
    }

    fn assign_if_unassigned(
        &self,
        _id: &OrderId,
        _assignee: &Assignee,
        _status: OrderStatus,
        _at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        offline()
    }
}

impl OfferRepository for UnavailableStore {
    fn insert_offer(&self, _offer: Offer) -> Result<Offer, RepositoryError> {
        offline()
    }

    fn fetch_offer(&self, _id: &OfferId) -> Result<Option<Offer>, RepositoryError> {
        offline()
    }

    fn fetch_offer_by_token(
        &self,
        _token: &AcceptanceToken,
    ) -> Result<Option<Offer>, RepositoryError> {
        offline()
    }

    fn offers_for_order(&self, _order_id: &OrderId) -> Result<Vec<Offer>, RepositoryError> {
        offline()
    }

    fn transition_offer(
        &self,
        _id: &OfferId,
        _from: OfferStatus,
        _to: OfferStatus,
        _at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        offline()
    }
}

impl CommissionRepository for UnavailableStore {
    fn upsert_commission(&self, _commission: Commission) -> Result<Commission, RepositoryError> {
        offline()
    }

    fn commission_for_order(
        &self,
        _order_id: &OrderId,
    ) -> Result<Option<Commission>, RepositoryError> {
        offline()
    }
}

/// Which offer inserts a [`ScriptedStore`] refuses.
pub(super) enum OfferFailures {
    Never,
    For(&'static str),
    Always,
}

/// In-memory store with injectable interference: a competing assignment that lands just
/// before the next conditional write, and refused offer inserts.
pub(super) struct ScriptedStore {
    inner: InMemoryDispatchStore,
    rival: Mutex<Option<Assignee>>,
    offer_failures: OfferFailures,
}

impl ScriptedStore {
    pub(super) fn new(inner: InMemoryDispatchStore) -> Self {
        Self {
            inner,
            rival: Mutex::new(None),
            offer_failures: OfferFailures::Never,
        }
    }

    pub(super) fn with_rival(self, rival: Assignee) -> Self {
        *self.rival.lock().expect("rival mutex poisoned") = Some(rival);
        self
    }

    pub(super) fn rejecting_offers(mut self, failures: OfferFailures) -> Self {
        self.offer_failures = failures;
        self
    }
}

impl PolicyStore for ScriptedStore {
    fn policies_for(
        &self,
        profession: &Profession,
    ) -> Result<Vec<AssignmentPolicy>, RepositoryError> {
        self.inner.policies_for(profession)
    }
}

impl CandidateDirectory for ScriptedStore {
    fn candidates_for(&self, profession: &Profession) -> Result<Vec<Candidate>, RepositoryError> {
        self.inner.candidates_for(profession)
    }
}

impl OrderRepository for ScriptedStore {
    fn fetch_order(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        self.inner.fetch_order(id)
    }

    fn assign_if_unassigned(
        &self,
        id: &OrderId,
        assignee: &Assignee,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let rival = self.rival.lock().expect("rival mutex poisoned").take();
        if let Some(rival) = rival {
            self.inner
                .assign_if_unassigned(id, &rival, OrderStatus::InProgress, at)?;
        }
        self.inner.assign_if_unassigned(id, assignee, status, at)
    }
}

impl OfferRepository for ScriptedStore {
    fn insert_offer(&self, offer: Offer) -> Result<Offer, RepositoryError> {
        let refused = match self.offer_failures {
            OfferFailures::Never => false,
            OfferFailures::For(candidate) => offer.candidate_id.0 == candidate,
            OfferFailures::Always => true,
        };
        if refused {
            return Err(RepositoryError::Unavailable("offer table offline".to_string()));
        }
        self.inner.insert_offer(offer)
    }

    fn fetch_offer(&self, id: &OfferId) -> Result<Option<Offer>, RepositoryError> {
        self.inner.fetch_offer(id)
    }

    fn fetch_offer_by_token(
        &self,
        token: &AcceptanceToken,
    ) -> Result<Option<Offer>, RepositoryError> {
        self.inner.fetch_offer_by_token(token)
    }

    fn offers_for_order(&self, order_id: &OrderId) -> Result<Vec<Offer>, RepositoryError> {
        self.inner.offers_for_order(order_id)
    }

    fn transition_offer(
        &self,
        id: &OfferId,
        from: OfferStatus,
        to: OfferStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        self.inner.transition_offer(id, from, to, at)
    }
}

impl CommissionRepository for ScriptedStore {
    fn upsert_commission(&self, commission: Commission) -> Result<Commission, RepositoryError> {
        self.inner.upsert_commission(commission)
    }

    fn commission_for_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<Commission>, RepositoryError> {
        self.inner.commission_for_order(order_id)
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 16 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
