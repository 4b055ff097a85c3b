use crate::infra::LoggingNotifier;
use chrono::Utc;
use clap::Args;
use claim_dispatch::config::DispatchConfig;
use claim_dispatch::error::AppError;
use claim_dispatch::workflows::dispatch::{
    AssignmentMode, AssignmentOutcome, AssignmentPolicy, Candidate, CandidateContact, CandidateId,
    CandidateKind, CustomerDetails, DispatchService, FallbackBehavior, InMemoryDispatchStore,
    OfferDecision, OfferRef, Order, OrderId, PolicyId, PostalRange, Profession,
};
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::sync::Arc;

type DemoService = DispatchService<InMemoryDispatchStore, LoggingNotifier>;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Gross invoice amount used for the commission step (defaults to 1500.00)
    #[arg(long)]
    pub(crate) gross_amount: Option<Decimal>,
    /// Candidate whose broadcast offer is accepted (defaults to the first offer)
    #[arg(long)]
    pub(crate) accept: Option<String>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        gross_amount,
        accept,
    } = args;
    let gross_amount = gross_amount.unwrap_or_else(|| Decimal::new(150_000, 2));

    let notifier = Arc::new(LoggingNotifier::default());
    let config = DispatchConfig::default();
    let service = DispatchService::new(Arc::new(demo_store()), notifier.clone(), &config);

    println!("Claim dispatch demo");
    println!("Commission rate: {}", config.commission_rate);

    println!("\nScenario 1: auto assignment (plumbing, 41061)");
    let outcome = service.assign(&OrderId("order-auto".to_string()))?;
    render_outcome(&outcome);

    println!("\nScenario 2: broadcast with first acceptance (electrical, 41460)");
    let broadcast_id = OrderId("order-broadcast".to_string());
    let outcome = service.assign(&broadcast_id)?;
    render_outcome(&outcome);

    let chosen = match &accept {
        Some(candidate) => outcome
            .offers
            .iter()
            .find(|offer| offer.candidate_id.0 == *candidate),
        None => outcome.offers.first(),
    };
    if let Some(offer) = chosen {
        let accepted =
            service.respond_to_offer(&OfferRef::Token(offer.token.clone()), OfferDecision::Accept)?;
        println!("- {} accepted offer {}", accepted.candidate_id, accepted.id);
        render_offers(&service, &broadcast_id)?;
        record_commission(&service, &broadcast_id, gross_amount)?;
    } else {
        println!("- no offer accepted");
    }

    let notices = notifier.sent();
    println!("\nNotifications sent: {}", notices.len());
    for (contact, summary) in notices {
        let recipient = contact
            .email
            .or(contact.phone)
            .unwrap_or_else(|| "<none>".to_string());
        let kind = if summary.offer_token.is_some() {
            "offer"
        } else {
            "assignment"
        };
        println!("- {recipient}: {kind} for {}", summary.order_id);
    }

    Ok(())
}

fn render_outcome(outcome: &AssignmentOutcome) {
    println!("- reason: {:?} | assignment made: {}", outcome.reason, outcome.made);
    if let Some(assignee) = &outcome.assignee {
        println!("- assignee: {} ({})", assignee.id, assignee.kind.label());
    }
    for offer in &outcome.offers {
        println!("- offer {} -> {}", offer.id, offer.candidate_id);
    }
    if let Some(note) = &outcome.note {
        println!("- note: {note}");
    }
}

fn render_offers(service: &DemoService, order_id: &OrderId) -> Result<(), AppError> {
    let order = service.order(order_id)?;
    println!(
        "- order {} is {} with partner {}",
        order.id,
        order.status.label(),
        order
            .assigned_partner
            .map(|id| id.to_string())
            .unwrap_or_else(|| "<none>".to_string())
    );
    for offer in service.offers_for(order_id)? {
        println!("  {} {} -> {}", offer.id, offer.candidate_id, offer.status.label());
    }
    Ok(())
}

fn record_commission(
    service: &DemoService,
    order_id: &OrderId,
    gross_amount: Decimal,
) -> Result<(), AppError> {
    match service.record_commission(order_id, gross_amount)? {
        Some(commission) => println!(
            "- commission {} on gross {} for {} ({:?})",
            commission.amount, commission.gross_amount, commission.partner_id, commission.status
        ),
        None => println!("- no partner assigned; commission skipped"),
    }
    Ok(())
}

fn demo_store() -> InMemoryDispatchStore {
    let now = Utc::now();
    let customer = |name: &str, postal_code: &str, city: &str| CustomerDetails {
        name: name.to_string(),
        postal_code: Some(postal_code.to_string()),
        city: Some(city.to_string()),
    };

    InMemoryDispatchStore::new()
        .with_policy(policy(1, "plumbing", Some("41"), AssignmentMode::Auto, 1))
        .with_policy(policy(2, "electrical", None, AssignmentMode::Manual, 1))
        .with_policy(policy(3, "electrical", Some("41"), AssignmentMode::Broadcast, 3))
        .with_candidate(candidate("K-100", CandidateKind::Craftsman, "plumbing", 4.8))
        .with_candidate(candidate("P-200", CandidateKind::Partner, "electrical", 4.6))
        .with_candidate(candidate("P-201", CandidateKind::Partner, "electrical", 4.2))
        .with_candidate(candidate("P-202", CandidateKind::Partner, "electrical", 3.9))
        .with_order(Order::new(
            "order-auto",
            "burst pipe",
            "plumbing",
            customer("Max Mustermann", "41061", "Mönchengladbach"),
            now,
        ))
        .with_order(Order::new(
            "order-broadcast",
            "short circuit",
            "electrical",
            customer("Erika Musterfrau", "41460", "Neuss"),
            now,
        ))
}

fn policy(
    id: u64,
    profession: &str,
    prefix: Option<&str>,
    mode: AssignmentMode,
    fan_out: usize,
) -> AssignmentPolicy {
    AssignmentPolicy {
        id: PolicyId(id),
        profession: Profession::new(profession),
        postal_prefix: prefix.map(str::to_string),
        mode,
        broadcast_fan_out: fan_out,
        fallback: FallbackBehavior::InternalOnly,
        active: true,
    }
}

fn candidate(id: &str, kind: CandidateKind, profession: &str, rating: f32) -> Candidate {
    Candidate {
        id: CandidateId(id.to_string()),
        kind,
        display_name: format!("{} {id}", kind.label()),
        professions: BTreeSet::from([Profession::new(profession)]),
        coverage: Some(vec![PostalRange::new("40000", "41999")]),
        verified: true,
        rating: Some(rating),
        contact: CandidateContact {
            email: Some(format!("{}@dispatch.example", id.to_lowercase())),
            phone: None,
        },
    }
}
