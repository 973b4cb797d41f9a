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

//! Creator payout requests.
//!
//! The balance is debited when the payout is requested, so only a rejection
//! moves money again (a refund).
//!
//! ```text
//!  Pending ──approve──► Approved ──mark paid──► Paid
//!     │
//!     └────reject────► Rejected   (amount refunded to creator)
//! ```

use crate::base::{PayoutId, PayoutReference, UserId};
use crate::error::LedgerError;
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Smallest payout a creator can request, in whole currency units.
pub const MINIMUM_PAYOUT: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Pending,
    Approved,
    Rejected,
    Paid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payout {
    pub id: PayoutId,
    pub creator_id: UserId,
    pub amount: Money,
    pub status: PayoutStatus,
    pub reference: PayoutReference,
    /// Admin who last acted on the payout.
    pub admin_id: Option<UserId>,
    pub note: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Payout {
    pub(crate) fn pending(
        id: PayoutId,
        creator_id: UserId,
        amount: Money,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            creator_id,
            amount,
            status: PayoutStatus::Pending,
            reference: PayoutReference::generate(),
            admin_id: None,
            note,
            processed_at: None,
            created_at: at,
        }
    }

    pub(crate) fn approve(&mut self, admin: UserId, at: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.status != PayoutStatus::Pending {
            return Err(LedgerError::PayoutNotPending);
        }
        self.status = PayoutStatus::Approved;
        self.admin_id = Some(admin);
        self.processed_at = Some(at);
        Ok(())
    }

    /// Marks the payout rejected. The caller refunds the creator.
    pub(crate) fn reject(
        &mut self,
        admin: UserId,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if self.status != PayoutStatus::Pending {
            return Err(LedgerError::PayoutNotPending);
        }
        self.status = PayoutStatus::Rejected;
        self.admin_id = Some(admin);
        if reason.is_some() {
            self.note = reason;
        }
        self.processed_at = Some(at);
        Ok(())
    }

    pub(crate) fn mark_paid(&mut self, admin: UserId, at: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.status != PayoutStatus::Approved {
            return Err(LedgerError::PayoutNotApproved);
        }
        self.status = PayoutStatus::Paid;
        self.admin_id = Some(admin);
        self.processed_at = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> Payout {
        Payout::pending(
            PayoutId(1),
            UserId(10),
            Money::from_units(60),
            Some("monthly".to_string()),
            Utc::now(),
        )
    }

    #[test]
    fn approve_then_mark_paid() {
        let mut payout = pending();
        payout.approve(UserId(99), Utc::now()).unwrap();
        assert_eq!(payout.status, PayoutStatus::Approved);
        assert_eq!(payout.admin_id, Some(UserId(99)));

        payout.mark_paid(UserId(98), Utc::now()).unwrap();
        assert_eq!(payout.status, PayoutStatus::Paid);
        assert_eq!(payout.admin_id, Some(UserId(98)));
    }

    #[test]
    fn mark_paid_requires_approval() {
        let mut payout = pending();
        assert_eq!(
            payout.mark_paid(UserId(99), Utc::now()),
            Err(LedgerError::PayoutNotApproved)
        );
        assert_eq!(payout.status, PayoutStatus::Pending);
    }

    #[test]
    fn terminal_states_reject_further_actions() {
        let mut rejected = pending();
        rejected.reject(UserId(99), None, Utc::now()).unwrap();
        assert_eq!(
            rejected.approve(UserId(99), Utc::now()),
            Err(LedgerError::PayoutNotPending)
        );
        assert_eq!(
            rejected.reject(UserId(99), None, Utc::now()),
            Err(LedgerError::PayoutNotPending)
        );

        let mut approved = pending();
        approved.approve(UserId(99), Utc::now()).unwrap();
        assert_eq!(
            approved.reject(UserId(99), None, Utc::now()),
            Err(LedgerError::PayoutNotPending)
        );
    }

    #[test]
    fn reject_reason_replaces_note_only_when_given() {
        let mut kept = pending();
        kept.reject(UserId(99), None, Utc::now()).unwrap();
        assert_eq!(kept.note.as_deref(), Some("monthly"));

        let mut replaced = pending();
        replaced
            .reject(UserId(99), Some("bank details missing".to_string()), Utc::now())
            .unwrap();
        assert_eq!(replaced.note.as_deref(), Some("bank details missing"));
    }
}
