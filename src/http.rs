// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! REST adapter over the engines.
//!
//! Authentication happens upstream: the caller's user id arrives in the
//! `x-user-id` header. Errors render as `{ "error": <message>, "code": <code> }`
//! with the status of the error's [`ErrorKind`](crate::ErrorKind).

use crate::account::User;
use crate::analytics::{CreatorAnalytics, creator_analytics};
use crate::base::{PayoutId, SelfServiceRole, TransactionId, TxRef, UserId};
use crate::error::LedgerError;
use crate::ledger::{DEFAULT_PER_PAGE, Ledger, Page};
use crate::money::Money;
use crate::payout::Payout;
use crate::payouts::PayoutEngine;
use crate::tips::{CheckoutSession, TipEngine, TipRequest, TipStatusView};
use crate::transaction::{Transaction, TransactionKind, TransactionStatus};
use crate::transfers::{
    Refund, TipHistory, TransactionDetail, TransactionFilter, TransferEngine,
};
use axum::body::Bytes;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::error;

const USER_HEADER: &str = "x-user-id";
const SIGNATURE_HEADERS: [&str; 2] = ["x-chapa-signature", "chapa-signature"];

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub tips: Arc<TipEngine>,
    pub payouts: Arc<PayoutEngine>,
    pub transfers: Arc<TransferEngine>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/register", post(register))
        .route("/api/creator/{id}/tips", post(create_tip))
        .route("/api/tips/{tx_ref}/status", get(tip_status))
        .route("/api/chapa/webhook", post(chapa_webhook))
        .route("/api/payouts", post(request_payout).get(list_payouts))
        .route("/api/payouts/{id}/approve", put(approve_payout))
        .route("/api/payouts/{id}/reject", put(reject_payout))
        .route("/api/payouts/{id}/mark-paid", put(mark_payout_paid))
        .route("/api/creator/analytics", get(analytics))
        .route("/api/tips", post(send_tip))
        .route("/api/tips/sent", get(sent_tips))
        .route("/api/tips/received", get(received_tips))
        .route("/api/transactions", get(list_transactions))
        .route("/api/transactions/{id}", get(show_transaction))
        .route("/api/transactions/{id}/refund", post(refund_transaction))
        .with_state(state)
}

// === Errors ===

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

pub enum AppError {
    Ledger(LedgerError),
    Unauthenticated,
    BadRequest(String),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        AppError::Ledger(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Ledger(err) => {
                let status = StatusCode::from_u16(err.kind().http_status())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (status, err.code(), err.to_string())
            }
            AppError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                format!("missing or invalid {USER_HEADER} header"),
            ),
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", message),
        };

        if status.is_server_error() {
            error!(%status, code, %message, "request failed");
        }

        (
            status,
            Json(ErrorResponse {
                error: message,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

// === Extractors ===

/// The authenticated caller.
pub struct Actor(pub UserId);

/// The caller, when the request carries one.
pub struct MaybeActor(pub Option<UserId>);

fn user_from_headers(headers: &HeaderMap) -> Result<Option<UserId>, AppError> {
    let Some(value) = headers.get(USER_HEADER) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|id| Some(UserId(id)))
        .ok_or(AppError::Unauthenticated)
}

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        user_from_headers(&parts.headers)?
            .map(Actor)
            .ok_or(AppError::Unauthenticated)
    }
}

impl<S> FromRequestParts<S> for MaybeActor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        user_from_headers(&parts.headers).map(MaybeActor)
    }
}

// === DTOs ===

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: SelfServiceRole,
}

#[derive(Debug, Deserialize)]
pub struct CreateTipRequest {
    pub amount: Money,
    pub message: Option<String>,
    #[serde(default)]
    pub anonymous: bool,
}

#[derive(Debug, Deserialize)]
pub struct PayoutRequest {
    pub amount: Money,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendTipRequest {
    pub receiver_id: UserId,
    pub amount: Money,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

impl PageQuery {
    fn page(&self) -> usize {
        self.page.unwrap_or(1)
    }

    fn per_page(&self) -> usize {
        self.per_page.unwrap_or(DEFAULT_PER_PAGE)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TransactionQuery {
    pub status: Option<TransactionStatus>,
    #[serde(rename = "type")]
    pub kind: Option<TransactionKind>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

// === Handlers ===

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = state
        .ledger
        .register(&request.name, &request.email, request.role)?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn create_tip(
    State(state): State<AppState>,
    MaybeActor(tipper): MaybeActor,
    Path(creator_id): Path<u64>,
    Json(request): Json<CreateTipRequest>,
) -> Result<(StatusCode, Json<CheckoutSession>), AppError> {
    let session = state
        .tips
        .create_tip(TipRequest {
            creator_id: UserId(creator_id),
            tipper_id: tipper,
            amount: request.amount,
            message: request.message,
            anonymous: request.anonymous,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn tip_status(
    State(state): State<AppState>,
    Path(tx_ref): Path<String>,
) -> Result<Json<TipStatusView>, AppError> {
    Ok(Json(state.tips.tip_status(&TxRef::from_gateway(tx_ref))?))
}

async fn chapa_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let signature = SIGNATURE_HEADERS
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|value| value.to_str().ok());

    let outcome = state.tips.confirm_from_webhook(&body, signature).await?;
    Ok(Json(json!({ "status": "ok", "outcome": outcome })))
}

async fn request_payout(
    State(state): State<AppState>,
    Actor(creator): Actor,
    Json(request): Json<PayoutRequest>,
) -> Result<(StatusCode, Json<Payout>), AppError> {
    let payout = state
        .payouts
        .request_payout(creator, request.amount, request.note)?;
    Ok((StatusCode::CREATED, Json(payout)))
}

async fn list_payouts(
    State(state): State<AppState>,
    Actor(admin): Actor,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Payout>>, AppError> {
    Ok(Json(state.payouts.list_payouts(
        admin,
        query.page(),
        query.per_page(),
    )?))
}

async fn approve_payout(
    State(state): State<AppState>,
    Actor(admin): Actor,
    Path(id): Path<u64>,
) -> Result<Json<Payout>, AppError> {
    Ok(Json(state.payouts.approve(PayoutId(id), admin)?))
}

async fn reject_payout(
    State(state): State<AppState>,
    Actor(admin): Actor,
    Path(id): Path<u64>,
    body: Bytes,
) -> Result<Json<Payout>, AppError> {
    // The body is optional; an empty one rejects without a reason.
    let reason = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        serde_json::from_slice::<RejectRequest>(&body)
            .map_err(|e| AppError::BadRequest(e.to_string()))?
            .reason
    };
    Ok(Json(state.payouts.reject(PayoutId(id), admin, reason)?))
}

async fn mark_payout_paid(
    State(state): State<AppState>,
    Actor(admin): Actor,
    Path(id): Path<u64>,
) -> Result<Json<Payout>, AppError> {
    Ok(Json(state.payouts.mark_paid(PayoutId(id), admin)?))
}

async fn analytics(
    State(state): State<AppState>,
    Actor(creator): Actor,
) -> Result<Json<CreatorAnalytics>, AppError> {
    Ok(Json(creator_analytics(&state.ledger, creator)?))
}

async fn send_tip(
    State(state): State<AppState>,
    Actor(sender): Actor,
    Json(request): Json<SendTipRequest>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let tx = state.transfers.send_tip(
        sender,
        request.receiver_id,
        request.amount,
        request.description,
    )?;
    Ok((StatusCode::CREATED, Json(tx)))
}

async fn sent_tips(
    State(state): State<AppState>,
    Actor(user): Actor,
    Query(query): Query<PageQuery>,
) -> Json<TipHistory> {
    Json(state.transfers.sent_tips(user, query.page(), query.per_page()))
}

async fn received_tips(
    State(state): State<AppState>,
    Actor(user): Actor,
    Query(query): Query<PageQuery>,
) -> Json<TipHistory> {
    Json(state.transfers.received_tips(user, query.page(), query.per_page()))
}

async fn list_transactions(
    State(state): State<AppState>,
    Actor(user): Actor,
    Query(query): Query<TransactionQuery>,
) -> Json<Page<Transaction>> {
    let filter = TransactionFilter {
        status: query.status,
        kind: query.kind,
    };
    Json(state.transfers.list_for(
        user,
        filter,
        query.page.unwrap_or(1),
        query.per_page.unwrap_or(DEFAULT_PER_PAGE),
    ))
}

async fn show_transaction(
    State(state): State<AppState>,
    Actor(user): Actor,
    Path(id): Path<u64>,
) -> Result<Json<TransactionDetail>, AppError> {
    Ok(Json(state.transfers.show(TransactionId(id), user)?))
}

async fn refund_transaction(
    State(state): State<AppState>,
    Actor(user): Actor,
    Path(id): Path<u64>,
) -> Result<Json<Refund>, AppError> {
    Ok(Json(state.transfers.refund(TransactionId(id), user)?))
}
