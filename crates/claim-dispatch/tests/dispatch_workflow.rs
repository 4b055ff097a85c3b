//! End-to-end scenarios for order dispatch, driven through the public service facade
//! against the in-memory store.

mod common {
    use std::collections::BTreeSet;
    use std::sync::{Arc, Mutex};

    use chrono::Utc;

    use claim_dispatch::config::DispatchConfig;
    use claim_dispatch::workflows::dispatch::{
        AssignmentMode, AssignmentPolicy, Candidate, CandidateContact, CandidateId,
        CandidateKind, CustomerDetails, DispatchService, FallbackBehavior, InMemoryDispatchStore,
        NotificationError, Notifier, Order, OrderSummary, PolicyId, Profession,
    };

    pub(super) type Service = DispatchService<InMemoryDispatchStore, RecordingNotifier>;

    #[derive(Default)]
    pub(super) struct RecordingNotifier {
        sent: Mutex<Vec<OrderSummary>>,
    }

    impl RecordingNotifier {
        pub(super) fn sent(&self) -> Vec<OrderSummary> {
            self.sent.lock().expect("notifier mutex poisoned").clone()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(
            &self,
            _contact: &CandidateContact,
            summary: &OrderSummary,
        ) -> Result<(), NotificationError> {
            self.sent
                .lock()
                .expect("notifier mutex poisoned")
                .push(summary.clone());
            Ok(())
        }
    }

    pub(super) fn plumbing_order(id: &str, postal_code: &str) -> Order {
        Order::new(
            id,
            "burst pipe",
            "plumbing",
            CustomerDetails {
                name: "Max Mustermann".to_string(),
                postal_code: Some(postal_code.to_string()),
                city: Some("Mönchengladbach".to_string()),
            },
            Utc::now(),
        )
    }

    pub(super) fn plumbing_policy(
        id: u64,
        prefix: Option<&str>,
        mode: AssignmentMode,
        fan_out: usize,
    ) -> AssignmentPolicy {
        AssignmentPolicy {
            id: PolicyId(id),
            profession: Profession::new("plumbing"),
            postal_prefix: prefix.map(str::to_string),
            mode,
            broadcast_fan_out: fan_out,
            fallback: FallbackBehavior::InternalOnly,
            active: true,
        }
    }

    pub(super) fn plumber(id: &str) -> Candidate {
        Candidate {
            id: CandidateId(id.to_string()),
            kind: CandidateKind::Partner,
            display_name: format!("Plumber {id}"),
            professions: BTreeSet::from([Profession::new("plumbing")]),
            coverage: None,
            verified: true,
            rating: None,
            contact: CandidateContact {
                email: Some(format!("{}@example.com", id.to_lowercase())),
                phone: None,
            },
        }
    }

    pub(super) fn service(store: InMemoryDispatchStore) -> (Arc<Service>, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let service = DispatchService::new(
            Arc::new(store),
            notifier.clone(),
            &DispatchConfig::default(),
        );
        (Arc::new(service), notifier)
    }
}

use std::sync::Barrier;

use common::*;
use rust_decimal_macros::dec;

use claim_dispatch::workflows::dispatch::{
    AssignmentMode, AssignmentReason, CandidateId, DispatchError, InMemoryDispatchStore,
    OfferDecision, OfferRef, OfferStatus, OrderId, OrderStatus, Profession,
};

#[test]
fn auto_policy_assigns_the_only_candidate() {
    let store = InMemoryDispatchStore::new()
        .with_policy(plumbing_policy(1, Some("41"), AssignmentMode::Auto, 1))
        .with_candidate(plumber("C1"))
        .with_order(plumbing_order("order-41", "41061"));
    let (service, notifier) = service(store);
    let order_id = OrderId("order-41".to_string());

    let outcome = service.assign(&order_id).expect("assign succeeds");

    assert!(outcome.made);
    assert!(outcome.offers.is_empty());
    let order = service.order(&order_id).expect("order present");
    assert_eq!(order.assigned_partner, Some(CandidateId("C1".to_string())));
    assert_eq!(order.status, OrderStatus::InProgress);
    assert!(service.offers_for(&order_id).expect("offers").is_empty());
    assert_eq!(notifier.sent().len(), 1);
}

#[test]
fn broadcast_first_acceptance_wins() {
    let store = InMemoryDispatchStore::new()
        .with_policy(plumbing_policy(1, None, AssignmentMode::Broadcast, 3))
        .with_candidate(plumber("A"))
        .with_candidate(plumber("B"))
        .with_candidate(plumber("C"))
        .with_order(plumbing_order("order-b", "10115"));
    let (service, notifier) = service(store);
    let order_id = OrderId("order-b".to_string());

    let outcome = service.assign(&order_id).expect("broadcast succeeds");
    assert_eq!(outcome.reason, AssignmentReason::OffersSent);
    assert_eq!(outcome.offers.len(), 3);
    assert_eq!(notifier.sent().len(), 3);

    let find = |candidate: &str| {
        outcome
            .offers
            .iter()
            .find(|offer| offer.candidate_id.0 == candidate)
            .expect("offer present")
            .clone()
    };

    let b = find("B");
    service
        .respond_to_offer(&OfferRef::Token(b.token.clone()), OfferDecision::Accept)
        .expect("B accepts");

    let order = service.order(&order_id).expect("order present");
    assert_eq!(order.assigned_partner, Some(CandidateId("B".to_string())));

    for offer in service.offers_for(&order_id).expect("offers") {
        let expected = if offer.candidate_id.0 == "B" {
            OfferStatus::Accepted
        } else {
            OfferStatus::Expired
        };
        assert_eq!(offer.status, expected, "offer for {}", offer.candidate_id);
    }

    let err = service
        .respond_to_offer(&OfferRef::Id(find("A").id), OfferDecision::Accept)
        .expect_err("A is too late");
    assert!(err.is_conflict());
}

#[test]
fn concurrent_accepts_across_threads_pick_one_winner() {
    const FAN_OUT: usize = 6;
    let mut store = InMemoryDispatchStore::new()
        .with_policy(plumbing_policy(1, None, AssignmentMode::Broadcast, FAN_OUT))
        .with_order(plumbing_order("order-race", "41061"));
    for index in 0..FAN_OUT {
        store = store.with_candidate(plumber(&format!("P{index}")));
    }
    let (service, _) = service(store);
    let order_id = OrderId("order-race".to_string());
    let offers = service.assign(&order_id).expect("broadcast").offers;
    assert_eq!(offers.len(), FAN_OUT);

    let barrier = Barrier::new(FAN_OUT);
    let results: Vec<Result<_, DispatchError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = offers
            .iter()
            .map(|offer| {
                let service = service.clone();
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    service.respond_to_offer(&OfferRef::Id(offer.id.clone()), OfferDecision::Accept)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("thread completes"))
            .collect()
    });

    let winners = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(results
        .iter()
        .filter_map(|result| result.as_ref().err())
        .all(|err| err.is_conflict()));
}

#[test]
fn policy_resolution_prefers_prefix_rows() {
    let store = InMemoryDispatchStore::new()
        .with_policy(plumbing_policy(1, None, AssignmentMode::Manual, 1))
        .with_policy(plumbing_policy(2, Some("41"), AssignmentMode::Broadcast, 2));
    let (service, _) = service(store);

    let specific = service
        .resolve_policy(&Profession::new("plumbing"), Some("41460"))
        .expect("resolves");
    assert_eq!(specific.mode, AssignmentMode::Broadcast);

    let fallback = service
        .resolve_policy(&Profession::new("plumbing"), Some("80331"))
        .expect("resolves");
    assert_eq!(fallback.mode, AssignmentMode::Manual);
}

#[test]
fn reinvoicing_keeps_a_single_commission() {
    let store = InMemoryDispatchStore::new()
        .with_policy(plumbing_policy(1, None, AssignmentMode::Auto, 1))
        .with_candidate(plumber("C1"))
        .with_order(plumbing_order("order-c", "41061"));
    let (service, _) = service(store);
    let order_id = OrderId("order-c".to_string());
    service.assign(&order_id).expect("assign");

    service
        .record_commission(&order_id, dec!(1500))
        .expect("first invoice");
    service
        .record_commission(&order_id, dec!(1200))
        .expect("corrected invoice");

    let commission = service
        .commission_for(&order_id)
        .expect("lookup")
        .expect("commission present");
    assert_eq!(commission.gross_amount, dec!(1200));
    assert_eq!(commission.amount, dec!(120.00));
}
