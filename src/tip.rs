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

//! Gateway-mediated tips.
//!
//! ```text
//!  Pending ──gateway confirms success──► Succeeded   (creator credited once)
//!     │
//!     └────gateway confirms failure────► Failed
//! ```

use crate::base::{TipId, TxRef, UserId};
use crate::error::LedgerError;
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Amounts offered as one-tap presets.
pub const PRESET_AMOUNTS: [i64; 6] = [20, 50, 100, 150, 200, 500];

/// Smallest free-form tip, in whole currency units.
pub const MINIMUM_TIP: i64 = 10;

/// Largest tip, in whole currency units.
pub const MAXIMUM_TIP: i64 = 50_000;

/// Longest message accepted with a tip.
pub const MAX_MESSAGE_LEN: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TipStatus {
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tip {
    pub id: TipId,
    pub tipper_id: Option<UserId>,
    pub creator_id: UserId,
    pub amount: Money,
    pub currency: String,
    pub status: TipStatus,
    pub message: Option<String>,
    pub tx_ref: TxRef,
    /// Last raw payload received from the gateway, kept for audit.
    pub gateway_response: Option<Value>,
    pub anonymous: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tip {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn pending(
        id: TipId,
        tipper_id: Option<UserId>,
        creator_id: UserId,
        amount: Money,
        currency: String,
        message: Option<String>,
        anonymous: bool,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            tipper_id,
            creator_id,
            amount,
            currency,
            status: TipStatus::Pending,
            message,
            tx_ref: TxRef::generate(),
            gateway_response: None,
            anonymous,
            created_at: at,
            updated_at: at,
        }
    }

    pub(crate) fn succeed(&mut self, payload: Value, at: DateTime<Utc>) {
        self.status = TipStatus::Succeeded;
        self.gateway_response = Some(payload);
        self.updated_at = at;
    }

    pub(crate) fn fail(&mut self, payload: Value, at: DateTime<Utc>) {
        self.status = TipStatus::Failed;
        self.gateway_response = Some(payload);
        self.updated_at = at;
    }
}

/// Accepts a preset amount or anything in `[MINIMUM_TIP, MAXIMUM_TIP]`.
pub fn validate_tip_amount(amount: Money) -> Result<(), LedgerError> {
    let minimum = Money::from_units(MINIMUM_TIP);
    let maximum = Money::from_units(MAXIMUM_TIP);
    let is_preset = PRESET_AMOUNTS
        .iter()
        .any(|preset| Money::from_units(*preset) == amount);
    if is_preset || (minimum..=maximum).contains(&amount) {
        Ok(())
    } else {
        Err(LedgerError::InvalidTipAmount {
            minimum: minimum.to_string(),
            maximum: maximum.to_string(),
        })
    }
}
