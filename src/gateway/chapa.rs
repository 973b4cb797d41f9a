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

//! Chapa HTTP client.

use super::{Checkout, CheckoutRequest, GatewayError, PaymentGateway, Verification};
use crate::base::TxRef;
use crate::config::GatewayConfig;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::{Value, json};
use tracing::{error, info};

/// Client for Chapa's `/transaction/initialize` and `/transaction/verify`.
///
/// Every request carries the configured timeout; an expired timeout surfaces
/// as [`GatewayError::Timeout`].
pub struct ChapaClient {
    client: Client,
    base_url: String,
    secret_key: String,
}

impl ChapaClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        if config.base_url.is_empty() {
            return Err(GatewayError::Config("base URL not configured".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
        })
    }

    fn checkout_payload(request: &CheckoutRequest) -> Value {
        json!({
            "amount": request.amount.to_string(),
            "currency": request.currency,
            "tx_ref": request.tx_ref.as_str(),
            "callback_url": request.callback_url,
            "return_url": request.return_url,
            "email": request.payer.email.as_deref().map(str::trim),
            "first_name": request.payer.first_name.as_deref().map(str::trim),
            "last_name": request.payer.last_name.as_deref().unwrap_or_default(),
            "customization": {
                "title": request.title.trim(),
                "description": request.description,
            },
        })
    }
}

/// Reads the body as JSON, keeping non-JSON bodies as a string value.
async fn read_body(response: Response) -> Result<Value, GatewayError> {
    let text = response.text().await?;
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

#[async_trait]
impl PaymentGateway for ChapaClient {
    async fn initialize_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<Checkout, GatewayError> {
        let payload = Self::checkout_payload(request);
        info!(tx_ref = %request.tx_ref, %payload, "chapa initialize request");

        let response = self
            .client
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        let body = read_body(response).await?;
        info!(tx_ref = %request.tx_ref, response = %body, "chapa initialize response");

        let accepted = body.get("status").and_then(Value::as_str) == Some("success");
        if !status.is_success() || !accepted {
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                payload: body,
            });
        }

        let checkout_url = body
            .get("data")
            .and_then(|data| data.get("checkout_url"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Checkout {
            checkout_url,
            raw: body,
        })
    }

    async fn verify_transaction(&self, tx_ref: &TxRef) -> Result<Verification, GatewayError> {
        if !tx_ref.is_well_formed() {
            return Err(GatewayError::Malformed(format!(
                "tx_ref {:?} is not a valid path segment",
                tx_ref.as_str()
            )));
        }

        let response = self
            .client
            .get(format!("{}/transaction/verify/{}", self.base_url, tx_ref))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        let status = response.status();
        let body = read_body(response).await?;

        if !status.is_success() {
            error!(%tx_ref, http_status = status.as_u16(), response = %body, "chapa verify failed");
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                payload: body,
            });
        }

        Ok(Verification::from_payload(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::PayerInfo;
    use crate::money::Money;

    #[test]
    fn rejects_empty_base_url() {
        let config = GatewayConfig::default().with_base_url("");
        assert!(matches!(
            ChapaClient::new(&config),
            Err(GatewayError::Config(_))
        ));
    }

    #[test]
    fn trims_trailing_slash() {
        let config = GatewayConfig::default().with_base_url("http://localhost:9000/v1/");
        let client = ChapaClient::new(&config).unwrap();
        assert_eq!(client.base_url, "http://localhost:9000/v1");
    }

    #[tokio::test]
    async fn verify_refuses_refs_that_would_change_the_path() {
        // Nothing listens here; a request would fail as Transport, not Malformed.
        let config = GatewayConfig::default().with_base_url("http://127.0.0.1:9/v1");
        let client = ChapaClient::new(&config).unwrap();

        for bad in ["tip_1/../../admin", "tip_1?status=success", ""] {
            assert!(matches!(
                client.verify_transaction(&TxRef::from_gateway(bad)).await,
                Err(GatewayError::Malformed(_))
            ));
        }
    }

    #[test]
    fn checkout_payload_shape() {
        let request = CheckoutRequest {
            tx_ref: TxRef::from_gateway("tip_abc"),
            amount: Money::from_units(100),
            currency: "ETB".to_string(),
            payer: PayerInfo {
                email: Some(" fan@example.com ".to_string()),
                first_name: Some("Fan".to_string()),
                last_name: None,
            },
            callback_url: Some("https://example.com/api/chapa/webhook".to_string()),
            return_url: None,
            title: "Creator".to_string(),
            description: "Tip to Creator".to_string(),
        };

        let payload = ChapaClient::checkout_payload(&request);
        assert_eq!(payload["amount"], "100.00");
        assert_eq!(payload["tx_ref"], "tip_abc");
        assert_eq!(payload["email"], "fan@example.com");
        assert_eq!(payload["last_name"], "");
        assert_eq!(payload["return_url"], Value::Null);
        assert_eq!(payload["customization"]["title"], "Creator");
    }
}
