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

//! Core identifier types, correlation keys and user roles.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(
    /// Unique identifier for a user (tipper, creator or admin).
    UserId
);
row_id!(
    /// Unique identifier for a gateway-mediated tip.
    TipId
);
row_id!(
    /// Unique identifier for a payout request.
    PayoutId
);
row_id!(
    /// Unique identifier for a direct transfer.
    TransactionId
);
row_id!(
    /// Unique identifier for an itemized fee entry.
    FeeId
);

/// Correlation key matching gateway confirmations to a pending tip.
///
/// Always generated by the engine (`tip_<uuid>`), never accepted from a client
/// when a tip is created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct TxRef(String);

impl TxRef {
    const PREFIX: &'static str = "tip_";

    pub fn generate() -> Self {
        Self(format!("{}{}", Self::PREFIX, Uuid::new_v4()))
    }

    /// Wraps a reference received from the gateway or a status poll.
    pub fn from_gateway(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` when the reference is non-empty and only uses `[A-Za-z0-9_-]`,
    /// so it can sit in a URL path segment as-is.
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique reference attached to a payout (`payout_<uuid>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct PayoutReference(String);

impl PayoutReference {
    const PREFIX: &'static str = "payout_";

    pub fn generate() -> Self {
        Self(format!("{}{}", Self::PREFIX, Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PayoutReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role attached to every user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Tipper,
    Creator,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Tipper => "tipper",
            Role::Creator => "creator",
            Role::Admin => "admin",
        };
        f.write_str(name)
    }
}

/// Roles a user may pick for themselves at registration.
///
/// Admins are provisioned out-of-band and can never be obtained through the
/// public registration path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelfServiceRole {
    #[default]
    Tipper,
    Creator,
}

impl From<SelfServiceRole> for Role {
    fn from(role: SelfServiceRole) -> Self {
        match role {
            SelfServiceRole::Tipper => Role::Tipper,
            SelfServiceRole::Creator => Role::Creator,
        }
    }
}
