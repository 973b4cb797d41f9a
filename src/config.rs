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

//! Process-wide settings, resolved once at startup and handed to the
//! components that need them.

use std::time::Duration;

/// Connection settings for the Chapa payment gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// API root, e.g. `https://api.chapa.co/v1`.
    pub base_url: String,

    /// Bearer token for `/transaction/*` calls.
    pub secret_key: String,

    /// Upper bound on every gateway call. Expiry is a gateway failure.
    pub timeout: Duration,

    /// Where the gateway delivers webhooks.
    pub callback_url: Option<String>,

    /// Where the payer is sent after checkout.
    pub return_url: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.chapa.co/v1".to_string(),
            secret_key: String::new(),
            timeout: Duration::from_secs(10),
            callback_url: None,
            return_url: None,
        }
    }
}

impl GatewayConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_secret_key(mut self, secret_key: impl Into<String>) -> Self {
        self.secret_key = secret_key.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Settings shared by the engines.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Currency code stamped on every tip.
    pub currency: String,

    pub gateway: GatewayConfig,

    /// Shared secret for webhook HMAC signatures. `None` rejects every webhook.
    pub webhook_secret: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            currency: "ETB".to_string(),
            gateway: GatewayConfig::default(),
            webhook_secret: None,
        }
    }
}
