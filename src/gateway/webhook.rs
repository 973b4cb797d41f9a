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

//! Webhook authentication and payload parsing.

use crate::base::TxRef;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Correlation key names accepted in a webhook body, in preference order.
const REFERENCE_KEYS: [&str; 2] = ["tx_ref", "reference"];

/// Checks webhook signatures: hex HMAC-SHA256 of the raw body under a
/// shared secret.
#[derive(Clone)]
pub struct WebhookAuthenticator {
    secret: Option<String>,
}

impl WebhookAuthenticator {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    /// Returns `true` only when a secret is configured, a signature was
    /// provided, and it matches the body. Comparison is constant-time.
    pub fn authenticate(&self, raw_body: &[u8], signature: Option<&str>) -> bool {
        let Some(secret) = self.secret.as_deref() else {
            return false;
        };
        let Some(signature) = signature.map(str::trim).filter(|s| !s.is_empty()) else {
            return false;
        };
        let Ok(provided) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(raw_body);
        mac.verify_slice(&provided).is_ok()
    }
}

impl std::fmt::Debug for WebhookAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookAuthenticator")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Lower-case hex HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac keys have no length limit"));
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Finds the correlation key in a webhook body.
///
/// Looks at top-level `tx_ref`, then `reference`, then the same two keys
/// under `data`.
pub fn extract_reference(body: &Value) -> Option<TxRef> {
    lookup_reference(body)
        .or_else(|| body.get("data").and_then(lookup_reference))
        .map(TxRef::from_gateway)
}

fn lookup_reference(object: &Value) -> Option<&str> {
    REFERENCE_KEYS.iter().find_map(|key| {
        object
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "whsec_test";

    #[test]
    fn accepts_matching_signature() {
        let auth = WebhookAuthenticator::new(Some(SECRET.to_string()));
        let body = br#"{"tx_ref":"tip_1"}"#;
        let signature = sign(SECRET, body);
        assert!(auth.authenticate(body, Some(&signature)));
        assert!(auth.authenticate(body, Some(&signature.to_uppercase())));
    }

    #[test]
    fn rejects_wrong_or_missing_signature() {
        let auth = WebhookAuthenticator::new(Some(SECRET.to_string()));
        let body = br#"{"tx_ref":"tip_1"}"#;
        assert!(!auth.authenticate(body, Some(&sign("other", body))));
        assert!(!auth.authenticate(body, Some("not-hex")));
        assert!(!auth.authenticate(body, Some("")));
        assert!(!auth.authenticate(body, None));
    }

    #[test]
    fn signature_covers_raw_bytes() {
        let auth = WebhookAuthenticator::new(Some(SECRET.to_string()));
        let signed = br#"{"tx_ref":"tip_1"}"#;
        let reformatted = br#"{ "tx_ref": "tip_1" }"#;
        assert!(!auth.authenticate(reformatted, Some(&sign(SECRET, signed))));
    }

    #[test]
    fn missing_secret_fails_closed() {
        let body = b"{}";
        let signature = sign("", body);
        assert!(!WebhookAuthenticator::new(None).authenticate(body, Some(&signature)));
        assert!(!WebhookAuthenticator::new(Some(String::new())).authenticate(body, Some(&signature)));
    }

    #[test]
    fn extracts_reference_from_every_shape() {
        let cases = [
            (json!({"tx_ref": "a"}), "a"),
            (json!({"reference": "b"}), "b"),
            (json!({"data": {"tx_ref": "c"}}), "c"),
            (json!({"data": {"reference": "d"}}), "d"),
            (json!({"tx_ref": "top", "data": {"tx_ref": "nested"}}), "top"),
            (json!({"tx_ref": "first", "reference": "second"}), "first"),
        ];
        for (body, expected) in cases {
            assert_eq!(extract_reference(&body).unwrap().as_str(), expected);
        }
    }

    #[test]
    fn no_reference_yields_none() {
        assert!(extract_reference(&json!({"event": "charge.success"})).is_none());
        assert!(extract_reference(&json!({"tx_ref": ""})).is_none());
        assert!(extract_reference(&json!({"tx_ref": 12})).is_none());
        assert!(extract_reference(&json!([])).is_none());
    }
}
