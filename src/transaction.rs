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

//! Direct sender → receiver transfers and their fee schedule.
//!
//! Transactions follow a state machine:
//! - [`Pending`] → [`Processing`] → [`Completed`] (via process)
//! - [`Pending`] → [`Failed`] (when processing errors)
//! - [`Completed`] → [`Refunded`] (via refund, within [`REFUND_WINDOW_HOURS`])
//!
//! [`Pending`]: TransactionStatus::Pending
//! [`Processing`]: TransactionStatus::Processing
//! [`Completed`]: TransactionStatus::Completed
//! [`Failed`]: TransactionStatus::Failed
//! [`Refunded`]: TransactionStatus::Refunded

use crate::base::{FeeId, TransactionId, UserId};
use crate::money::Money;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Hours after processing during which a sender may refund.
pub const REFUND_WINDOW_HOURS: i64 = 24;

const PLATFORM_FEE_RATE: Decimal = dec!(0.05);
const PLATFORM_FEE_MIN: i64 = 5;
const PLATFORM_FEE_MAX: i64 = 100;
const PROCESSING_FEE_RATE: Decimal = dec!(0.02);
const PROCESSING_FEE_MIN: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Tip,
    Subscription,
    Refund,
    Payout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
}

impl TransactionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Processing => "Processing",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Refunded => "Refunded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub amount: Money,
    pub platform_fee: Money,
    pub net_amount: Money,
    pub transaction_type: TransactionKind,
    pub status: TransactionStatus,
    pub description: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub(crate) fn pending_tip(
        id: TransactionId,
        sender_id: UserId,
        receiver_id: UserId,
        amount: Money,
        description: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            sender_id,
            receiver_id,
            amount,
            platform_fee: Money::ZERO,
            net_amount: amount,
            transaction_type: TransactionKind::Tip,
            status: TransactionStatus::Pending,
            description,
            processed_at: None,
            created_at: at,
        }
    }

    pub fn involves(&self, user: UserId) -> bool {
        self.sender_id == user || self.receiver_id == user
    }

    /// Checks the refund preconditions, returning the reason when they fail.
    pub fn refund_blocker(&self, now: DateTime<Utc>) -> Option<&'static str> {
        if self.status != TransactionStatus::Completed {
            return Some("transaction not completed");
        }
        match self.processed_at {
            Some(at) if now - at <= Duration::hours(REFUND_WINDOW_HOURS) => None,
            Some(_) => Some("refund period expired (24 hours)"),
            None => Some("transaction not processed"),
        }
    }

    pub fn is_refundable(&self, now: DateTime<Utc>) -> bool {
        self.refund_blocker(now).is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeType {
    Platform,
    Processing,
    Stripe,
}

/// Itemized fee deducted while processing a transaction. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeEntry {
    pub id: FeeId,
    pub transaction_id: TransactionId,
    pub fee_type: FeeType,
    pub amount: Money,
    /// Nominal rate in percent (`5.00` for five percent).
    pub percentage: Option<Decimal>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fees owed on a transfer amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeBreakdown {
    pub platform_fee: Money,
    pub processing_fee: Money,
    pub total_fees: Money,
    pub net_amount: Money,
}

impl FeeBreakdown {
    /// Platform fee is 5% clamped to `[5, 100]`; processing fee is 2% with a
    /// floor of `2`. The receiver gets what remains.
    pub fn for_amount(amount: Money) -> Self {
        let platform_fee = amount
            .apply_rate(PLATFORM_FEE_RATE)
            .clamp(
                Money::from_units(PLATFORM_FEE_MIN),
                Money::from_units(PLATFORM_FEE_MAX),
            );
        let processing_fee = amount
            .apply_rate(PROCESSING_FEE_RATE)
            .max(Money::from_units(PROCESSING_FEE_MIN));
        let total_fees = platform_fee + processing_fee;

        Self {
            platform_fee,
            processing_fee,
            total_fees,
            net_amount: amount - total_fees,
        }
    }

    pub(crate) fn entries(
        &self,
        transaction_id: TransactionId,
        ids: (FeeId, FeeId),
        at: DateTime<Utc>,
    ) -> [FeeEntry; 2] {
        [
            FeeEntry {
                id: ids.0,
                transaction_id,
                fee_type: FeeType::Platform,
                amount: self.platform_fee,
                percentage: Some(dec!(5.00)),
                description: Some("Platform fee (5%)".to_string()),
                created_at: at,
            },
            FeeEntry {
                id: ids.1,
                transaction_id,
                fee_type: FeeType::Processing,
                amount: self.processing_fee,
                percentage: Some(dec!(2.00)),
                description: Some("Processing fee (2%)".to_string()),
                created_at: at,
            },
        ]
    }
}
