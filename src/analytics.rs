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

//! Creator dashboard figures, computed from committed tips.

use crate::base::{Role, UserId};
use crate::error::LedgerError;
use crate::ledger::Ledger;
use crate::money::Money;
use crate::tip::TipStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatorAnalytics {
    /// Tips in any status.
    pub total_tips: usize,
    /// Sum of succeeded tips.
    pub total_amount: Money,
    pub last_tip: Option<DateTime<Utc>>,
    /// Name of the tipper with the largest succeeded sum. `None` when that
    /// sum belongs to anonymous-origin tips.
    pub top_tipper: Option<String>,
    pub balance: Money,
}

/// # Errors
///
/// [`LedgerError::Forbidden`] unless `creator_id` is a creator.
pub fn creator_analytics(ledger: &Ledger, creator_id: UserId) -> Result<CreatorAnalytics, LedgerError> {
    let creator = ledger
        .user(creator_id)
        .ok_or(LedgerError::UserNotFound(creator_id))?;
    match creator.role {
        Role::Creator => {}
        Role::Tipper | Role::Admin => return Err(LedgerError::Forbidden("creators only")),
    }

    let tips = ledger.tips_where(|tip| tip.creator_id == creator_id);
    let succeeded: Vec<_> = tips
        .iter()
        .filter(|tip| tip.status == TipStatus::Succeeded)
        .collect();

    let mut by_tipper: HashMap<Option<UserId>, Money> = HashMap::new();
    for tip in &succeeded {
        *by_tipper.entry(tip.tipper_id).or_default() += tip.amount;
    }
    // Ties go to the lowest tipper id so the answer is stable.
    let top_tipper = by_tipper
        .into_iter()
        .max_by(|(a_id, a_sum), (b_id, b_sum)| a_sum.cmp(b_sum).then_with(|| b_id.cmp(a_id)))
        .and_then(|(tipper, _)| tipper)
        .and_then(|id| ledger.user(id))
        .map(|user| user.name);

    Ok(CreatorAnalytics {
        total_tips: tips.len(),
        total_amount: succeeded.iter().map(|tip| tip.amount).sum(),
        last_tip: succeeded.iter().map(|tip| tip.created_at).max(),
        top_tipper,
        balance: creator.balance(),
    })
}
