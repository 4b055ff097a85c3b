use claim_dispatch::error::AppError;
use claim_dispatch::workflows::dispatch::{
    AssignmentPolicy, Candidate, CandidateContact, InMemoryDispatchStore, NotificationError,
    Notifier, Order, OrderSummary,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Seed data for the in-memory store.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct Fixtures {
    #[serde(default)]
    pub(crate) policies: Vec<AssignmentPolicy>,
    #[serde(default)]
    pub(crate) candidates: Vec<Candidate>,
    #[serde(default)]
    pub(crate) orders: Vec<Order>,
}

impl Fixtures {
    pub(crate) fn from_path(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub(crate) fn from_reader<R: Read>(reader: R) -> Result<Self, AppError> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub(crate) fn into_store(self) -> InMemoryDispatchStore {
        let counts = (self.policies.len(), self.candidates.len(), self.orders.len());
        let store = self
            .policies
            .into_iter()
            .fold(InMemoryDispatchStore::new(), |store, policy| {
                store.with_policy(policy)
            });
        let store = self
            .candidates
            .into_iter()
            .fold(store, |store, candidate| store.with_candidate(candidate));
        let store = self
            .orders
            .into_iter()
            .fold(store, |store, order| store.with_order(order));
        info!(
            policies = counts.0,
            candidates = counts.1,
            orders = counts.2,
            "seeded dispatch store"
        );
        store
    }
}

/// Stand-in for the e-mail/SMS gateway: logs the notice and keeps it for inspection.
#[derive(Default, Clone)]
pub(crate) struct LoggingNotifier {
    sent: Arc<Mutex<Vec<(CandidateContact, OrderSummary)>>>,
}

impl LoggingNotifier {
    pub(crate) fn sent(&self) -> Vec<(CandidateContact, OrderSummary)> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

impl Notifier for LoggingNotifier {
    fn notify(
        &self,
        contact: &CandidateContact,
        summary: &OrderSummary,
    ) -> Result<(), NotificationError> {
        let recipient = contact
            .email
            .as_deref()
            .or(contact.phone.as_deref())
            .ok_or(NotificationError::NoContact)?;
        info!(
            order_id = %summary.order_id,
            recipient,
            offer = summary.offer_token.is_some(),
            "notification dispatched"
        );
        self.sent
            .lock()
            .map_err(|_| NotificationError::Transport("outbox lock poisoned".to_string()))?
            .push((contact.clone(), summary.clone()));
        Ok(())
    }
}
