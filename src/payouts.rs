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

//! Payout lifecycle engine.
//!
//! The creator's balance is debited when the payout is requested, so the
//! visible balance already reflects outstanding withdrawals. Admins then
//! move the payout through its state machine:
//!
//! ```text
//! pending --approve--> approved --mark_paid--> paid
//!    \
//!     `----reject (refunds the creator)----> rejected
//! ```

use crate::account::User;
use crate::base::{PayoutId, Role, UserId};
use crate::clock::Clock;
use crate::error::LedgerError;
use crate::ledger::{Ledger, Page};
use crate::money::Money;
use crate::payout::{MINIMUM_PAYOUT, Payout};
use crate::tip::MAX_MESSAGE_LEN;
use std::sync::Arc;
use tracing::info;

pub struct PayoutEngine {
    ledger: Arc<Ledger>,
    clock: Arc<dyn Clock>,
}

impl PayoutEngine {
    pub fn new(ledger: Arc<Ledger>, clock: Arc<dyn Clock>) -> Self {
        Self { ledger, clock }
    }

    /// Debits `amount` from the creator and opens a pending payout.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] - amount below the minimum or note too long.
    /// - [`LedgerError::Forbidden`] - requester is not a creator.
    /// - [`LedgerError::InsufficientFunds`] - balance is below `amount`.
    pub fn request_payout(
        &self,
        creator_id: UserId,
        amount: Money,
        note: Option<String>,
    ) -> Result<Payout, LedgerError> {
        if amount < Money::from_units(MINIMUM_PAYOUT) {
            return Err(LedgerError::Validation(format!(
                "amount must be at least {}",
                Money::from_units(MINIMUM_PAYOUT)
            )));
        }
        if note
            .as_ref()
            .is_some_and(|n| n.chars().count() > MAX_MESSAGE_LEN)
        {
            return Err(LedgerError::Validation(format!(
                "note may not exceed {MAX_MESSAGE_LEN} characters"
            )));
        }

        let at = self.clock.now();
        let payout = self.ledger.atomically(|uow| {
            let creator = uow.lock_user(creator_id)?;
            if !uow.user(creator).is_creator() {
                return Err(LedgerError::Forbidden("only creators can request payouts"));
            }
            uow.user_mut(creator).debit(amount)?;

            let payout = Payout::pending(uow.ledger().next_payout_id(), creator_id, amount, note, at);
            uow.insert_payout(payout.clone());
            Ok(payout)
        })?;

        info!(payout = %payout.id, creator = %creator_id, %amount, "payout requested");
        Ok(payout)
    }

    /// # Errors
    ///
    /// [`LedgerError::Forbidden`] for non-admins, [`LedgerError::PayoutNotPending`]
    /// unless the payout is pending.
    pub fn approve(&self, payout_id: PayoutId, admin_id: UserId) -> Result<Payout, LedgerError> {
        self.require_admin(admin_id)?;
        let at = self.clock.now();
        let payout = self.ledger.atomically(|uow| {
            let payout = uow.lock_payout(payout_id)?;
            uow.payout_mut(payout).approve(admin_id, at)?;
            Ok(uow.payout(payout).clone())
        })?;

        info!(payout = %payout_id, admin = %admin_id, "payout approved");
        Ok(payout)
    }

    /// Rejects a pending payout and credits its amount back to the creator
    /// in the same unit of work.
    ///
    /// A `None` reason keeps the creator's original note.
    pub fn reject(
        &self,
        payout_id: PayoutId,
        admin_id: UserId,
        reason: Option<String>,
    ) -> Result<Payout, LedgerError> {
        self.require_admin(admin_id)?;
        let at = self.clock.now();
        let payout = self.ledger.atomically(|uow| {
            let payout = uow.lock_payout(payout_id)?;
            uow.payout_mut(payout).reject(admin_id, reason, at)?;

            let (creator_id, amount) = {
                let payout = uow.payout(payout);
                (payout.creator_id, payout.amount)
            };
            let creator = uow.lock_user(creator_id)?;
            uow.user_mut(creator).credit(amount)?;
            Ok(uow.payout(payout).clone())
        })?;

        info!(
            payout = %payout_id,
            admin = %admin_id,
            creator = %payout.creator_id,
            amount = %payout.amount,
            "payout rejected, creator refunded"
        );
        Ok(payout)
    }

    /// # Errors
    ///
    /// [`LedgerError::PayoutNotApproved`] unless the payout is approved.
    pub fn mark_paid(&self, payout_id: PayoutId, admin_id: UserId) -> Result<Payout, LedgerError> {
        self.require_admin(admin_id)?;
        let at = self.clock.now();
        let payout = self.ledger.atomically(|uow| {
            let payout = uow.lock_payout(payout_id)?;
            uow.payout_mut(payout).mark_paid(admin_id, at)?;
            Ok(uow.payout(payout).clone())
        })?;

        info!(payout = %payout_id, admin = %admin_id, "payout marked paid");
        Ok(payout)
    }

    /// All payouts, newest first. Admin only.
    pub fn list_payouts(
        &self,
        admin_id: UserId,
        page: usize,
        per_page: usize,
    ) -> Result<Page<Payout>, LedgerError> {
        self.require_admin(admin_id)?;
        let mut payouts = self.ledger.payouts_where(|_| true);
        payouts.reverse();
        Ok(Page::paginate(payouts, page, per_page))
    }

    fn require_admin(&self, user_id: UserId) -> Result<User, LedgerError> {
        let user = self
            .ledger
            .user(user_id)
            .ok_or(LedgerError::UserNotFound(user_id))?;
        match user.role {
            Role::Admin => Ok(user),
            Role::Creator | Role::Tipper => Err(LedgerError::Forbidden("admin only")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::SelfServiceRole;
    use crate::clock::SystemClock;
    use crate::payout::PayoutStatus;

    struct Fixture {
        ledger: Arc<Ledger>,
        engine: PayoutEngine,
        creator: UserId,
        admin: UserId,
    }

    fn fixture(balance: i64) -> Fixture {
        let ledger = Arc::new(Ledger::new());
        let creator = ledger
            .register("Creator", "creator@example.com", SelfServiceRole::Creator)
            .unwrap()
            .id;
        let admin = ledger.provision_admin("Admin", "admin@example.com").unwrap().id;
        ledger.seed_balance(creator, Money::from_units(balance)).unwrap();
        let engine = PayoutEngine::new(ledger.clone(), Arc::new(SystemClock));
        Fixture {
            ledger,
            engine,
            creator,
            admin,
        }
    }

    fn balance(f: &Fixture) -> Money {
        f.ledger.user(f.creator).unwrap().balance()
    }

    #[test]
    fn request_debits_immediately() {
        let f = fixture(100);
        let payout = f
            .engine
            .request_payout(f.creator, Money::from_units(60), Some("rent".into()))
            .unwrap();

        assert_eq!(payout.status, PayoutStatus::Pending);
        assert_eq!(balance(&f), Money::from_units(40));
        assert!(payout.reference.as_str().starts_with("payout_"));
    }

    #[test]
    fn request_rejects_overdraw_without_side_effects() {
        let f = fixture(50);
        let result = f.engine.request_payout(f.creator, Money::from_units(60), None);
        assert_eq!(result, Err(LedgerError::InsufficientFunds));
        assert_eq!(balance(&f), Money::from_units(50));
        assert!(f.ledger.payouts_where(|_| true).is_empty());
    }

    #[test]
    fn request_validates_amount_and_role() {
        let f = fixture(50);
        assert!(matches!(
            f.engine.request_payout(f.creator, Money::new(99), None),
            Err(LedgerError::Validation(_))
        ));
        assert_eq!(
            f.engine.request_payout(f.admin, Money::from_units(1), None),
            Err(LedgerError::Forbidden("only creators can request payouts"))
        );
    }

    #[test]
    fn reject_restores_balance_and_keeps_note_without_reason() {
        let f = fixture(100);
        let payout = f
            .engine
            .request_payout(f.creator, Money::new(3333), Some("march".into()))
            .unwrap();

        let rejected = f.engine.reject(payout.id, f.admin, None).unwrap();
        assert_eq!(rejected.status, PayoutStatus::Rejected);
        assert_eq!(rejected.note.as_deref(), Some("march"));
        assert_eq!(rejected.admin_id, Some(f.admin));
        assert_eq!(balance(&f), Money::from_units(100));
    }

    #[test]
    fn approve_then_mark_paid_moves_no_money() {
        let f = fixture(100);
        let payout = f.engine.request_payout(f.creator, Money::from_units(30), None).unwrap();

        f.engine.approve(payout.id, f.admin).unwrap();
        let paid = f.engine.mark_paid(payout.id, f.admin).unwrap();

        assert_eq!(paid.status, PayoutStatus::Paid);
        assert!(paid.processed_at.is_some());
        assert_eq!(balance(&f), Money::from_units(70));
    }

    #[test]
    fn state_machine_is_enforced() {
        let f = fixture(100);
        let payout = f.engine.request_payout(f.creator, Money::from_units(30), None).unwrap();

        assert_eq!(
            f.engine.mark_paid(payout.id, f.admin),
            Err(LedgerError::PayoutNotApproved)
        );
        f.engine.reject(payout.id, f.admin, Some("duplicate".into())).unwrap();
        assert_eq!(
            f.engine.approve(payout.id, f.admin),
            Err(LedgerError::PayoutNotPending)
        );
        assert_eq!(
            f.engine.reject(payout.id, f.admin, None),
            Err(LedgerError::PayoutNotPending)
        );
        assert_eq!(balance(&f), Money::from_units(100));
    }

    #[test]
    fn only_admins_drive_payouts() {
        let f = fixture(100);
        let payout = f.engine.request_payout(f.creator, Money::from_units(30), None).unwrap();

        assert_eq!(
            f.engine.approve(payout.id, f.creator),
            Err(LedgerError::Forbidden("admin only"))
        );
        assert!(f.engine.list_payouts(f.creator, 1, 20).is_err());
        assert_eq!(
            f.engine.approve(PayoutId(999), f.admin),
            Err(LedgerError::PayoutNotFound(PayoutId(999)))
        );
    }

    #[test]
    fn list_is_newest_first() {
        let f = fixture(100);
        let first = f.engine.request_payout(f.creator, Money::from_units(1), None).unwrap();
        let second = f.engine.request_payout(f.creator, Money::from_units(2), None).unwrap();

        let page = f.engine.list_payouts(f.admin, 1, 20).unwrap();
        let ids: Vec<_> = page.data.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }
}
