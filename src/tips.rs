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

//! Tip lifecycle engine.
//!
//! A tip is created `pending`, a hosted checkout is opened at the gateway,
//! and the gateway later calls back through a signed webhook. The webhook
//! body is never trusted for the outcome: the engine asks the gateway to
//! verify the referenced transaction and settles the tip from that answer.
//!
//! # Settlement
//!
//! | Tip status | Verified status | Effect |
//! |------------|-----------------|--------|
//! | absent | any | none (logged) |
//! | malformed ref | not asked | none (logged) |
//! | `succeeded` | any | none; duplicate deliveries are expected |
//! | `pending`/`failed` | `success`/`successful` | `succeeded`, creator credited |
//! | `pending`/`failed` | anything else | `failed` |

use crate::base::{TipId, TxRef, UserId};
use crate::clock::Clock;
use crate::config::Settings;
use crate::error::LedgerError;
use crate::gateway::{
    CheckoutRequest, PayerInfo, PaymentGateway, Verification, WebhookAuthenticator,
    extract_reference,
};
use crate::ledger::Ledger;
use crate::money::Money;
use crate::tip::{MAX_MESSAGE_LEN, Tip, TipStatus, validate_tip_amount};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{error, info, warn};

/// A tipper's request to pay a creator.
#[derive(Debug, Clone, PartialEq)]
pub struct TipRequest {
    pub creator_id: UserId,
    /// `None` when the payer is not signed in.
    pub tipper_id: Option<UserId>,
    pub amount: Money,
    pub message: Option<String>,
    /// Hide the tipper's identity from the creator.
    pub anonymous: bool,
}

/// Hosted checkout opened for a new tip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutSession {
    pub checkout_url: Option<String>,
    pub tx_ref: TxRef,
    pub tip_id: TipId,
}

/// Public status of a tip, for polling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TipStatusView {
    pub tx_ref: TxRef,
    pub status: TipStatus,
    pub amount: Money,
    pub message: Option<String>,
}

/// What a webhook delivery did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// Tip succeeded and the creator was credited
    Credited,
    /// Gateway reported a non-success status
    MarkedFailed,
    /// Tip had already succeeded; nothing changed
    AlreadySucceeded,
    /// No tip carries the reference; nothing changed
    UnknownReference,
}

pub struct TipEngine {
    ledger: Arc<Ledger>,
    gateway: Arc<dyn PaymentGateway>,
    authenticator: WebhookAuthenticator,
    settings: Settings,
    clock: Arc<dyn Clock>,
}

impl TipEngine {
    pub fn new(
        ledger: Arc<Ledger>,
        gateway: Arc<dyn PaymentGateway>,
        settings: Settings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let authenticator = WebhookAuthenticator::new(settings.webhook_secret.clone());
        if !authenticator.has_secret() {
            warn!("no webhook secret configured; every webhook will be rejected");
        }
        Self {
            ledger,
            gateway,
            authenticator,
            settings,
            clock,
        }
    }

    /// Creates a pending tip and opens a gateway checkout for it.
    ///
    /// The tip row is kept whatever the gateway answers, with the raw
    /// response attached, so failed initializations stay auditable.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidTipAmount`] - amount is not a preset and outside `[10, 50000]`.
    /// - [`LedgerError::Validation`] - message too long.
    /// - [`LedgerError::CreatorNotFound`] - no creator with that id.
    /// - [`LedgerError::UserNotFound`] - the tipper does not exist.
    /// - [`LedgerError::Gateway`] - checkout could not be initialized.
    pub async fn create_tip(&self, request: TipRequest) -> Result<CheckoutSession, LedgerError> {
        validate_tip_amount(request.amount)?;
        let message = normalize_message(request.message)?;

        let creator = self
            .ledger
            .user(request.creator_id)
            .filter(|user| user.is_creator())
            .ok_or(LedgerError::CreatorNotFound(request.creator_id))?;
        let tipper = request
            .tipper_id
            .map(|id| self.ledger.user(id).ok_or(LedgerError::UserNotFound(id)))
            .transpose()?;

        let tip = Tip::pending(
            self.ledger.next_tip_id(),
            tipper.as_ref().map(|user| user.id),
            creator.id,
            request.amount,
            self.settings.currency.clone(),
            message,
            request.anonymous,
            self.clock.now(),
        );
        let tx_ref = tip.tx_ref.clone();
        let tip_id = tip.id;
        self.ledger.atomically(|uow| {
            uow.insert_tip(tip.clone());
            Ok(())
        })?;

        let description = tip
            .message
            .clone()
            .unwrap_or_else(|| format!("Tip to {}", creator.name));
        let checkout = CheckoutRequest {
            tx_ref: tx_ref.clone(),
            amount: tip.amount,
            currency: tip.currency.clone(),
            payer: PayerInfo {
                email: tipper.as_ref().map(|user| user.email.clone()),
                first_name: tipper.as_ref().map(|user| user.name.clone()),
                last_name: None,
            },
            callback_url: self.settings.gateway.callback_url.clone(),
            return_url: self.settings.gateway.return_url.clone(),
            title: creator.name.clone(),
            description: sanitize_description(&description),
        };

        match self.gateway.initialize_checkout(&checkout).await {
            Ok(checkout) => {
                self.record_gateway_response(&tx_ref, checkout.raw);
                info!(%tx_ref, tip = %tip_id, "checkout initialized");
                Ok(CheckoutSession {
                    checkout_url: checkout.checkout_url,
                    tx_ref,
                    tip_id,
                })
            }
            Err(err) => {
                let payload = err
                    .payload()
                    .cloned()
                    .unwrap_or_else(|| json!({ "error": err.to_string() }));
                self.record_gateway_response(&tx_ref, payload);
                error!(%tx_ref, error = %err, "failed to initialize payment");
                Err(err.into())
            }
        }
    }

    fn record_gateway_response(&self, tx_ref: &TxRef, payload: Value) {
        let at = self.clock.now();
        let recorded = self.ledger.atomically(|uow| {
            if let Some(tip) = uow.lock_tip(tx_ref) {
                let tip = uow.tip_mut(tip);
                tip.gateway_response = Some(payload);
                tip.updated_at = at;
            }
            Ok(())
        });
        if let Err(err) = recorded {
            warn!(%tx_ref, error = %err, "could not record gateway response");
        }
    }

    /// Current status of a tip, by its correlation key.
    pub fn tip_status(&self, tx_ref: &TxRef) -> Result<TipStatusView, LedgerError> {
        let tip = self
            .ledger
            .tip_by_ref(tx_ref)
            .ok_or_else(|| LedgerError::TipNotFound(tx_ref.to_string()))?;
        Ok(TipStatusView {
            tx_ref: tip.tx_ref,
            status: tip.status,
            amount: tip.amount,
            message: tip.message,
        })
    }

    /// Handles a gateway webhook delivery.
    ///
    /// Unknown references and already-succeeded tips resolve as `Ok` so the
    /// gateway stops retrying.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidSignature`] - secret or signature missing, or mismatch. Nothing changes.
    /// - [`LedgerError::MalformedWebhook`] - body is not JSON.
    /// - [`LedgerError::MissingReference`] - no `tx_ref`/`reference` in any accepted shape.
    /// - [`LedgerError::Gateway`] - verification call failed. Nothing changes.
    pub async fn confirm_from_webhook(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, LedgerError> {
        if !self.authenticator.authenticate(raw_body, signature) {
            warn!(
                signature_present = signature.is_some(),
                "chapa webhook signature rejected"
            );
            return Err(LedgerError::InvalidSignature);
        }

        let body: Value = serde_json::from_slice(raw_body)
            .map_err(|e| LedgerError::MalformedWebhook(e.to_string()))?;
        let Some(tx_ref) = extract_reference(&body) else {
            warn!(payload = %body, "chapa webhook payload missing tx_ref");
            return Err(LedgerError::MissingReference);
        };
        if !tx_ref.is_well_formed() {
            warn!(tx_ref = ?tx_ref.as_str(), "webhook tx_ref is not one the engine issues");
            return Ok(WebhookOutcome::UnknownReference);
        }

        let verification = self.gateway.verify_transaction(&tx_ref).await.map_err(|err| {
            error!(%tx_ref, error = %err, "chapa verify failed");
            err
        })?;

        self.settle(&tx_ref, verification)
    }

    /// Applies a verified gateway status to the tip, crediting at most once.
    fn settle(
        &self,
        tx_ref: &TxRef,
        verification: Verification,
    ) -> Result<WebhookOutcome, LedgerError> {
        let at = self.clock.now();
        self.ledger.atomically(|uow| {
            let Some(handle) = uow.lock_tip(tx_ref) else {
                warn!(%tx_ref, "tip not found for tx_ref");
                return Ok(WebhookOutcome::UnknownReference);
            };

            if uow.tip(handle).status == TipStatus::Succeeded {
                info!(%tx_ref, "tip already succeeded (idempotent)");
                return Ok(WebhookOutcome::AlreadySucceeded);
            }

            if !verification.is_success() {
                uow.tip_mut(handle).fail(verification.raw, at);
                info!(%tx_ref, status = %verification.status, "tip failed");
                return Ok(WebhookOutcome::MarkedFailed);
            }

            let (creator_id, amount) = {
                let tip = uow.tip(handle);
                (tip.creator_id, tip.amount)
            };
            uow.tip_mut(handle).succeed(verification.raw, at);
            let creator = uow.lock_user(creator_id)?;
            uow.user_mut(creator).credit(amount)?;
            info!(%tx_ref, creator = %creator_id, %amount, "tip succeeded, creator credited");
            Ok(WebhookOutcome::Credited)
        })
    }
}

fn normalize_message(message: Option<String>) -> Result<Option<String>, LedgerError> {
    let message = message
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty());
    if message
        .as_ref()
        .is_some_and(|m| m.chars().count() > MAX_MESSAGE_LEN)
    {
        return Err(LedgerError::Validation(format!(
            "message may not exceed {MAX_MESSAGE_LEN} characters"
        )));
    }
    Ok(message)
}

/// Keeps only the characters the gateway accepts in a description.
fn sanitize_description(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') || c.is_whitespace())
        .collect()
}
