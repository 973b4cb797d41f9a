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

//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tip_ledger::{
    Checkout, CheckoutRequest, Clock, GatewayError, Ledger, ManualClock, Money, PayoutEngine,
    PaymentGateway, SelfServiceRole, Settings, TipEngine, TransferEngine, TxRef, UserId,
    Verification,
};

pub const WEBHOOK_SECRET: &str = "whsec_integration";

/// In-memory gateway. Verifies every reference as `success` unless told
/// otherwise.
#[derive(Default)]
pub struct FakeGateway {
    statuses: Mutex<HashMap<TxRef, String>>,
    fail_checkout: Mutex<Option<GatewayError>>,
    fail_verify: Mutex<Option<GatewayError>>,
    pub checkouts: Mutex<Vec<CheckoutRequest>>,
    pub verifications: AtomicUsize,
}

impl FakeGateway {
    pub fn set_status(&self, tx_ref: &TxRef, status: &str) {
        self.statuses.lock().insert(tx_ref.clone(), status.to_string());
    }

    pub fn fail_checkout_with(&self, err: GatewayError) {
        *self.fail_checkout.lock() = Some(err);
    }

    pub fn fail_verify_with(&self, err: GatewayError) {
        *self.fail_verify.lock() = Some(err);
    }

    pub fn verification_count(&self) -> usize {
        self.verifications.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn initialize_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<Checkout, GatewayError> {
        self.checkouts.lock().push(request.clone());
        if let Some(err) = self.fail_checkout.lock().clone() {
            return Err(err);
        }
        let url = format!("https://checkout.test/{}", request.tx_ref);
        Ok(Checkout {
            checkout_url: Some(url.clone()),
            raw: json!({"status": "success", "data": {"checkout_url": url}}),
        })
    }

    async fn verify_transaction(&self, tx_ref: &TxRef) -> Result<Verification, GatewayError> {
        self.verifications.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_verify.lock().clone() {
            return Err(err);
        }
        let status = self
            .statuses
            .lock()
            .get(tx_ref)
            .cloned()
            .unwrap_or_else(|| "success".to_string());
        Ok(Verification::from_payload(json!({
            "status": "success",
            "data": {"status": status, "tx_ref": tx_ref.as_str()}
        })))
    }
}

pub struct Platform {
    pub ledger: Arc<Ledger>,
    pub gateway: Arc<FakeGateway>,
    pub clock: Arc<ManualClock>,
    pub tips: Arc<TipEngine>,
    pub payouts: Arc<PayoutEngine>,
    pub transfers: Arc<TransferEngine>,
    pub creator: UserId,
    pub fan: UserId,
    pub admin: UserId,
}

impl Platform {
    pub fn new() -> Self {
        let settings = Settings {
            webhook_secret: Some(WEBHOOK_SECRET.to_string()),
            ..Settings::default()
        };
        Self::with_settings(settings)
    }

    pub fn with_settings(settings: Settings) -> Self {
        let ledger = Arc::new(Ledger::new());
        let gateway = Arc::new(FakeGateway::default());
        let clock = Arc::new(ManualClock::default());
        let dyn_clock: Arc<dyn Clock> = clock.clone();

        let creator = ledger
            .register("Hana Creator", "hana@example.com", SelfServiceRole::Creator)
            .unwrap()
            .id;
        let fan = ledger
            .register("Abebe Fan", "abebe@example.com", SelfServiceRole::Tipper)
            .unwrap()
            .id;
        let admin = ledger.provision_admin("Ops", "ops@example.com").unwrap().id;

        Self {
            tips: Arc::new(TipEngine::new(
                ledger.clone(),
                gateway.clone(),
                settings,
                dyn_clock.clone(),
            )),
            payouts: Arc::new(PayoutEngine::new(ledger.clone(), dyn_clock.clone())),
            transfers: Arc::new(TransferEngine::new(ledger.clone(), dyn_clock)),
            ledger,
            gateway,
            clock,
            creator,
            fan,
            admin,
        }
    }

    pub fn balance(&self, user: UserId) -> Money {
        self.ledger.user(user).unwrap().balance()
    }

    pub fn fund(&self, user: UserId, units: i64) {
        self.ledger.seed_balance(user, Money::from_units(units)).unwrap();
    }
}
