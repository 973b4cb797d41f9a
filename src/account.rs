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

//! User accounts and balance movements.
//!
//! A [`User`] carries the one balance every engine moves money against.
//! Balances are only mutated through [`User::credit`] and [`User::debit`],
//! inside a unit of work holding the user's row lock.
//!
//! # Example
//!
//! ```
//! use tip_ledger::{Ledger, Money, SelfServiceRole};
//!
//! let ledger = Ledger::new();
//! let creator = ledger
//!     .register("Abebe", "abebe@example.com", SelfServiceRole::Creator)
//!     .unwrap();
//! assert_eq!(creator.balance(), Money::ZERO);
//! ```

use crate::base::{Role, UserId};
use crate::error::LedgerError;
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    balance: Money,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub(crate) fn new(id: UserId, name: String, email: String, role: Role) -> Self {
        Self {
            id,
            name,
            email,
            role,
            balance: Money::ZERO,
            created_at: Utc::now(),
        }
    }

    pub fn balance(&self) -> Money {
        self.balance
    }

    pub fn is_creator(&self) -> bool {
        matches!(self.role, Role::Creator)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }

    /// Best-effort affordability check; the authoritative one is [`User::debit`].
    pub fn can_send_tip(&self, amount: Money) -> bool {
        self.balance >= amount
    }

    fn assert_invariants(&self) {
        debug_assert!(
            !self.balance.is_negative(),
            "Invariant violated: balance of user {} went negative: {}",
            self.id,
            self.balance
        );
    }

    /// Increases the balance.
    pub(crate) fn credit(&mut self, amount: Money) -> Result<(), LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::Validation(
                "amount must be positive".to_string(),
            ));
        }
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Validation("balance would overflow".to_string()))?;
        self.assert_invariants();
        Ok(())
    }

    /// Decreases the balance, refusing to take it below zero.
    pub(crate) fn debit(&mut self, amount: Money) -> Result<(), LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::Validation(
                "amount must be positive".to_string(),
            ));
        }
        self.balance = self
            .balance
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientFunds)?;
        self.assert_invariants();
        Ok(())
    }
}
