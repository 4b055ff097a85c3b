use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use crate::error::status_for;

use super::domain::{OfferDecision, OfferRef, OrderId, Profession};
use super::error::DispatchError;
use super::repository::{DispatchStore, Notifier};
use super::service::DispatchService;

/// Router builder exposing the dispatch operations over HTTP.
pub fn dispatch_router<S, N>(service: Arc<DispatchService<S, N>>) -> Router
where
    S: DispatchStore + 'static,
    N: Notifier + 'static,
{
    Router::new()
        .route(
            "/api/v1/dispatch/policies/resolve",
            get(resolve_handler::<S, N>),
        )
        .route(
            "/api/v1/dispatch/orders/:order_id",
            get(order_handler::<S, N>),
        )
        .route(
            "/api/v1/dispatch/orders/:order_id/assign",
            post(assign_handler::<S, N>),
        )
        .route(
            "/api/v1/dispatch/orders/:order_id/offers",
            get(offers_handler::<S, N>),
        )
        .route(
            "/api/v1/dispatch/orders/:order_id/commission",
            post(commission_handler::<S, N>),
        )
        .route(
            "/api/v1/dispatch/offers/:offer_ref/respond",
            post(respond_handler::<S, N>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResolveQuery {
    pub(crate) profession: String,
    #[serde(default)]
    pub(crate) postal_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RespondRequest {
    pub(crate) decision: OfferDecision,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommissionRequest {
    pub(crate) gross_amount: Decimal,
}

fn error_response(error: DispatchError) -> Response {
    let kind = error.kind();
    let payload = json!({
        "error": error.to_string(),
        "kind": kind.label(),
    });
    (status_for(kind), axum::Json(payload)).into_response()
}

pub(crate) async fn resolve_handler<S, N>(
    State(service): State<Arc<DispatchService<S, N>>>,
    Query(query): Query<ResolveQuery>,
) -> Response
where
    S: DispatchStore + 'static,
    N: Notifier + 'static,
{
    let profession = Profession::new(&query.profession);
    match service.resolve_policy(&profession, query.postal_code.as_deref()) {
        Ok(policy) => (StatusCode::OK, axum::Json(policy)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn order_handler<S, N>(
    State(service): State<Arc<DispatchService<S, N>>>,
    Path(order_id): Path<String>,
) -> Response
where
    S: DispatchStore + 'static,
    N: Notifier + 'static,
{
    match service.order(&OrderId(order_id)) {
        Ok(order) => (StatusCode::OK, axum::Json(order)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn assign_handler<S, N>(
    State(service): State<Arc<DispatchService<S, N>>>,
    Path(order_id): Path<String>,
) -> Response
where
    S: DispatchStore + 'static,
    N: Notifier + 'static,
{
    match service.assign(&OrderId(order_id)) {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn offers_handler<S, N>(
    State(service): State<Arc<DispatchService<S, N>>>,
    Path(order_id): Path<String>,
) -> Response
where
    S: DispatchStore + 'static,
    N: Notifier + 'static,
{
    match service.offers_for(&OrderId(order_id)) {
        Ok(offers) => (StatusCode::OK, axum::Json(offers)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn respond_handler<S, N>(
    State(service): State<Arc<DispatchService<S, N>>>,
    Path(offer_ref): Path<String>,
    axum::Json(request): axum::Json<RespondRequest>,
) -> Response
where
    S: DispatchStore + 'static,
    N: Notifier + 'static,
{
    match service.respond_to_offer(&OfferRef::parse(&offer_ref), request.decision) {
        Ok(offer) => (StatusCode::OK, axum::Json(offer)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn commission_handler<S, N>(
    State(service): State<Arc<DispatchService<S, N>>>,
    Path(order_id): Path<String>,
    axum::Json(request): axum::Json<CommissionRequest>,
) -> Response
where
    S: DispatchStore + 'static,
    N: Notifier + 'static,
{
    match service.record_commission(&OrderId(order_id), request.gross_amount) {
        Ok(Some(commission)) => (StatusCode::OK, axum::Json(commission)).into_response(),
        Ok(None) => (StatusCode::OK, axum::Json(json!({ "recorded": false }))).into_response(),
        Err(error) => error_response(error),
    }
}
