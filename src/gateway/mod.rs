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

//! Payment gateway seam.
//!
//! The tip engine talks to the gateway only through [`PaymentGateway`]:
//! [`ChapaClient`] is the production implementation, tests plug in fakes.
//! Inbound webhook authenticity is checked by [`WebhookAuthenticator`].

mod chapa;
mod webhook;

pub use chapa::ChapaClient;
pub use webhook::{WebhookAuthenticator, extract_reference, sign};

use crate::base::TxRef;
use crate::money::Money;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Verified statuses that count as a successful payment.
const SUCCESS_STATUSES: [&str; 2] = ["success", "successful"];

/// Gateway call failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// The bounded request timeout elapsed
    #[error("gateway request timed out")]
    Timeout,

    /// The gateway could not be reached
    #[error("gateway unreachable: {0}")]
    Transport(String),

    /// The gateway answered with a non-success status
    #[error("gateway rejected the request (HTTP {status})")]
    Rejected { status: u16, payload: Value },

    #[error("malformed gateway response: {0}")]
    Malformed(String),

    #[error("gateway client misconfigured: {0}")]
    Config(String),
}

impl GatewayError {
    /// Raw gateway payload, when the gateway answered at all.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            GatewayError::Rejected { payload, .. } => Some(payload),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

/// Payer details forwarded to the hosted checkout.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PayerInfo {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Everything needed to open a hosted checkout for one tip.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub tx_ref: TxRef,
    pub amount: Money,
    pub currency: String,
    pub payer: PayerInfo,
    pub callback_url: Option<String>,
    pub return_url: Option<String>,
    pub title: String,
    pub description: String,
}

/// Successful checkout initialization.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkout {
    pub checkout_url: Option<String>,
    /// Full gateway response, kept on the tip for audit.
    pub raw: Value,
}

/// Gateway-side view of a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    /// Lower-cased gateway status (`success`, `failed`, `pending`, ...).
    pub status: String,
    pub raw: Value,
}

impl Verification {
    /// Reads the status from `data.status`, falling back to the top-level
    /// `status`.
    pub fn from_payload(raw: Value) -> Self {
        let status = raw
            .get("data")
            .and_then(|data| data.get("status"))
            .and_then(Value::as_str)
            .or_else(|| raw.get("status").and_then(Value::as_str))
            .unwrap_or_default()
            .to_lowercase();
        Self { status, raw }
    }

    pub fn is_success(&self) -> bool {
        SUCCESS_STATUSES.contains(&self.status.as_str())
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a hosted checkout for `request.tx_ref`.
    async fn initialize_checkout(&self, request: &CheckoutRequest)
    -> Result<Checkout, GatewayError>;

    /// Asks the gateway for the authoritative status of `tx_ref`.
    async fn verify_transaction(&self, tx_ref: &TxRef) -> Result<Verification, GatewayError>;
}
