use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier wrapper for damage-claim orders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub String);

/// Identifier shared by craftsmen and affiliate partners.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidateId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OfferId(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyId(pub u64);

/// Opaque, unguessable secret handed to a broadcast recipient.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AcceptanceToken(pub String);

impl AcceptanceToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

macro_rules! display_inner {
    ($($ty:ty),+) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        })+
    };
}

display_inner!(OrderId, CandidateId, OfferId, PolicyId);

/// Trade category needed to service an order, normalised to lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Profession(String);

impl Profession {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Profession {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Profession {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<Profession> for String {
    fn from(value: Profession) -> Self {
        value.0
    }
}

impl fmt::Display for Profession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Customer data embedded in the claim; only the postal code matters for routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub name: String,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    InProgress,
    OfferSent,
    Accepted,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const fn label(self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::OfferSent => "offer_sent",
            OrderStatus::Accepted => "accepted",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

/// A damage claim awaiting or holding a handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub damage_type: String,
    pub profession: Profession,
    pub customer: CustomerDetails,
    pub status: OrderStatus,
    #[serde(default)]
    pub assigned_craftsman: Option<CandidateId>,
    #[serde(default)]
    pub assigned_partner: Option<CandidateId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        id: impl Into<String>,
        damage_type: impl Into<String>,
        profession: impl Into<Profession>,
        customer: CustomerDetails,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId(id.into()),
            damage_type: damage_type.into(),
            profession: profession.into(),
            customer,
            status: OrderStatus::New,
            assigned_craftsman: None,
            assigned_partner: None,
            created_at,
            updated_at: created_at,
        }
    }

    pub fn postal_code(&self) -> Option<&str> {
        self.customer
            .postal_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
    }

    /// The handler currently responsible for the order. A partner takes precedence.
    pub fn active_assignee(&self) -> Option<Assignee> {
        if let Some(id) = &self.assigned_partner {
            return Some(Assignee::partner(id.clone()));
        }
        self.assigned_craftsman
            .as_ref()
            .map(|id| Assignee::craftsman(id.clone()))
    }

    pub fn is_assigned(&self) -> bool {
        self.assigned_partner.is_some() || self.assigned_craftsman.is_some()
    }

    pub fn summary(&self) -> OrderSummary {
        OrderSummary {
            order_id: self.id.clone(),
            damage_type: self.damage_type.clone(),
            profession: self.profession.clone(),
            postal_code: self.postal_code().map(str::to_string),
            city: self.customer.city.clone(),
            offer_token: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    Craftsman,
    Partner,
}

impl CandidateKind {
    pub const fn label(self) -> &'static str {
        match self {
            CandidateKind::Craftsman => "craftsman",
            CandidateKind::Partner => "partner",
        }
    }
}

/// Reference to whoever holds an order; the kind selects the order field written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignee {
    pub kind: CandidateKind,
    pub id: CandidateId,
}

impl Assignee {
    pub fn craftsman(id: CandidateId) -> Self {
        Self {
            kind: CandidateKind::Craftsman,
            id,
        }
    }

    pub fn partner(id: CandidateId) -> Self {
        Self {
            kind: CandidateKind::Partner,
            id,
        }
    }
}

/// Inclusive postal-code interval served by a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalRange {
    pub start: String,
    pub end: String,
}

impl PostalRange {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn contains(&self, postal_code: &str) -> bool {
        let code = postal_code.trim();
        let start = self.start.trim();
        let end = self.end.trim();
        compare_postal(code, start) != Ordering::Less
            && compare_postal(code, end) != Ordering::Greater
    }
}

fn compare_postal(left: &str, right: &str) -> Ordering {
    let numeric = |value: &str| !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit());
    if left.len() == right.len() && numeric(left) && numeric(right) {
        if let (Ok(l), Ok(r)) = (left.parse::<u64>(), right.parse::<u64>()) {
            return l.cmp(&r);
        }
    }
    left.cmp(right)
}

/// How a candidate can be reached by the notification collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CandidateContact {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Partner or craftsman able to service one or more professions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub kind: CandidateKind,
    pub display_name: String,
    pub professions: BTreeSet<Profession>,
    /// `None` means no service-area record exists for this candidate.
    #[serde(default)]
    pub coverage: Option<Vec<PostalRange>>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub rating: Option<f32>,
    #[serde(default)]
    pub contact: CandidateContact,
}

impl Candidate {
    pub fn serves(&self, profession: &Profession) -> bool {
        self.professions.contains(profession)
    }

    pub fn assignee(&self) -> Assignee {
        Assignee {
            kind: self.kind,
            id: self.id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMode {
    Manual,
    Auto,
    Broadcast,
    #[serde(other)]
    Unrecognized,
}

impl AssignmentMode {
    pub const fn label(&self) -> &'static str {
        match self {
            AssignmentMode::Manual => "manual",
            AssignmentMode::Auto => "auto",
            AssignmentMode::Broadcast => "broadcast",
            AssignmentMode::Unrecognized => "unrecognized",
        }
    }
}

/// What broadcast does when nobody matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackBehavior {
    InternalOnly,
    Manual,
}

/// Rule row keyed by (profession, postal prefix or wildcard).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentPolicy {
    pub id: PolicyId,
    pub profession: Profession,
    /// `None` is the wildcard row for the profession.
    #[serde(default)]
    pub postal_prefix: Option<String>,
    pub mode: AssignmentMode,
    #[serde(default = "default_fan_out")]
    pub broadcast_fan_out: usize,
    #[serde(default = "default_fallback")]
    pub fallback: FallbackBehavior,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_fan_out() -> usize {
    3
}

fn default_fallback() -> FallbackBehavior {
    FallbackBehavior::InternalOnly
}

fn default_active() -> bool {
    true
}

impl AssignmentPolicy {
    pub fn is_wildcard(&self) -> bool {
        self.postal_prefix.is_none()
    }

    pub fn fan_out(&self) -> usize {
        self.broadcast_fan_out.max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Sent,
    Accepted,
    Declined,
    Expired,
}

impl OfferStatus {
    pub const fn label(self) -> &'static str {
        match self {
            OfferStatus::Sent => "sent",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Declined => "declined",
            OfferStatus::Expired => "expired",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, OfferStatus::Sent)
    }
}

/// Broadcast proposal to a single candidate for a single order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub order_id: OrderId,
    pub candidate_id: CandidateId,
    pub candidate_kind: CandidateKind,
    pub status: OfferStatus,
    pub token: AcceptanceToken,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl Offer {
    pub fn assignee(&self) -> Assignee {
        Assignee {
            kind: self.candidate_kind,
            id: self.candidate_id.clone(),
        }
    }
}

/// Either handle a recipient may present when responding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfferRef {
    Id(OfferId),
    Token(AcceptanceToken),
}

impl OfferRef {
    /// Tokens are 32 hex characters; anything else is treated as an offer id.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.len() == 32 && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            OfferRef::Token(AcceptanceToken(raw.to_string()))
        } else {
            OfferRef::Id(OfferId(raw.to_string()))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferDecision {
    Accept,
    Decline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommissionStatus {
    Pending,
    Paid,
}

/// Monetary record tying a partner to a billed order; unique per order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commission {
    pub partner_id: CandidateId,
    pub order_id: OrderId,
    pub gross_amount: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
    pub status: CommissionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload handed to the notification collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub damage_type: String,
    pub profession: Profession,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offer_token: Option<AcceptanceToken>,
}
