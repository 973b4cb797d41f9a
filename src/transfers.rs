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

//! Direct transfer engine.
//!
//! A sender pays a creator straight out of their ledger balance. Processing
//! deducts the platform and processing fees from the receiver's share; the
//! fee spread is retained by the platform and is not returned on refund.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tip_ledger::{Ledger, Money, SelfServiceRole, SystemClock, TransferEngine};
//!
//! let ledger = Arc::new(Ledger::new());
//! let fan = ledger.register("Fan", "fan@example.com", SelfServiceRole::Tipper).unwrap();
//! let creator = ledger.register("Hana", "hana@example.com", SelfServiceRole::Creator).unwrap();
//! ledger.seed_balance(fan.id, Money::from_units(1000)).unwrap();
//!
//! let engine = TransferEngine::new(ledger.clone(), Arc::new(SystemClock));
//! let tx = engine.send_tip(fan.id, creator.id, Money::from_units(1000), None).unwrap();
//!
//! assert_eq!(tx.platform_fee, Money::from_units(50));
//! assert_eq!(tx.net_amount, Money::from_units(930));
//! assert_eq!(ledger.user(creator.id).unwrap().balance(), Money::from_units(930));
//! ```

use crate::base::{TransactionId, UserId};
use crate::clock::Clock;
use crate::error::LedgerError;
use crate::ledger::{Ledger, Page};
use crate::money::Money;
use crate::tip::MAX_MESSAGE_LEN;
use crate::transaction::{
    FeeBreakdown, FeeEntry, Transaction, TransactionKind, TransactionStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Smallest direct transfer.
pub const MINIMUM_TRANSFER: i64 = 10;
/// Largest direct transfer.
pub const MAXIMUM_TRANSFER: i64 = 50_000;

/// Optional filters for [`TransferEngine::list_for`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TransactionFilter {
    pub status: Option<TransactionStatus>,
    #[serde(rename = "type")]
    pub kind: Option<TransactionKind>,
}

impl TransactionFilter {
    fn matches(&self, tx: &Transaction) -> bool {
        self.status.is_none_or(|status| tx.status == status)
            && self.kind.is_none_or(|kind| tx.transaction_type == kind)
    }
}

/// A transaction as seen by one of its parties.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionDetail {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub status_label: &'static str,
    pub fees: Vec<FeeEntry>,
    pub is_refundable: bool,
}

/// Tip transfers of one user, newest first, with the completed total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TipHistory {
    #[serde(flatten)]
    pub page: Page<Transaction>,
    pub total_completed: usize,
    pub total_amount: Money,
}

/// Refund receipt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Refund {
    pub transaction_id: TransactionId,
    pub status: TransactionStatus,
    pub refunded_amount: Money,
    pub refunded_at: DateTime<Utc>,
}

pub struct TransferEngine {
    ledger: Arc<Ledger>,
    clock: Arc<dyn Clock>,
}

impl TransferEngine {
    pub fn new(ledger: Arc<Ledger>, clock: Arc<dyn Clock>) -> Self {
        Self { ledger, clock }
    }

    /// Creates a pending tip transfer and processes it right away.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] - amount outside `[10, 50000]` or description too long.
    /// - [`LedgerError::UserNotFound`] - sender or receiver does not exist.
    /// - [`LedgerError::InvalidReceiver`] - receiver is not a creator.
    /// - [`LedgerError::CannotTipSelf`] - sender and receiver are the same user.
    /// - [`LedgerError::InsufficientFunds`] - sender cannot cover `amount`.
    /// - [`LedgerError::ProcessingFailed`] - processing failed; the transaction is left `failed`.
    pub fn send_tip(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        amount: Money,
        description: Option<String>,
    ) -> Result<Transaction, LedgerError> {
        if amount < Money::from_units(MINIMUM_TRANSFER) || amount > Money::from_units(MAXIMUM_TRANSFER)
        {
            return Err(LedgerError::Validation(format!(
                "amount must be between {} and {}",
                Money::from_units(MINIMUM_TRANSFER),
                Money::from_units(MAXIMUM_TRANSFER)
            )));
        }
        if description
            .as_ref()
            .is_some_and(|d| d.chars().count() > MAX_MESSAGE_LEN)
        {
            return Err(LedgerError::Validation(format!(
                "description may not exceed {MAX_MESSAGE_LEN} characters"
            )));
        }

        let sender = self
            .ledger
            .user(sender_id)
            .ok_or(LedgerError::UserNotFound(sender_id))?;
        let receiver = self
            .ledger
            .user(receiver_id)
            .ok_or(LedgerError::UserNotFound(receiver_id))?;
        if !receiver.is_creator() {
            return Err(LedgerError::InvalidReceiver);
        }
        if sender.id == receiver.id {
            return Err(LedgerError::CannotTipSelf);
        }
        if !sender.can_send_tip(amount) {
            return Err(LedgerError::InsufficientFunds);
        }

        let at = self.clock.now();
        let id = self.ledger.atomically(|uow| {
            let tx = Transaction::pending_tip(
                uow.ledger().next_transaction_id(),
                sender_id,
                receiver_id,
                amount,
                description,
                at,
            );
            let id = tx.id;
            uow.insert_transaction(tx);
            Ok(id)
        })?;

        self.process(id)
    }

    /// Settles a pending transfer: fees, sender debit, receiver credit.
    ///
    /// Balances and fee entries move in one unit of work. If anything in it
    /// fails, none of it is applied and the transaction is marked `failed`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::TransactionNotFound`] - no such transaction.
    /// - [`LedgerError::TransactionNotPending`] - already processed; nothing changes.
    /// - [`LedgerError::ProcessingFailed`] - processing failed and the transaction is now `failed`.
    pub fn process(&self, id: TransactionId) -> Result<Transaction, LedgerError> {
        let at = self.clock.now();
        let result = self.ledger.atomically(|uow| {
            let handle = uow.lock_transaction(id)?;
            if uow.transaction(handle).status != TransactionStatus::Pending {
                return Err(LedgerError::TransactionNotPending);
            }

            let fees = FeeBreakdown::for_amount(uow.transaction(handle).amount);
            {
                let tx = uow.transaction_mut(handle);
                tx.status = TransactionStatus::Processing;
                tx.processed_at = Some(at);
                tx.platform_fee = fees.platform_fee;
                tx.net_amount = fees.net_amount;
            }
            if !fees.net_amount.is_positive() {
                return Err(LedgerError::Validation(
                    "fees exceed the transfer amount".to_string(),
                ));
            }

            let (sender_id, receiver_id, amount) = {
                let tx = uow.transaction(handle);
                (tx.sender_id, tx.receiver_id, tx.amount)
            };
            let (sender, receiver) = uow.lock_user_pair(sender_id, receiver_id)?;
            uow.user_mut(sender).debit(amount)?;
            uow.user_mut(receiver).credit(fees.net_amount)?;

            let fee_ids = (uow.ledger().next_fee_id(), uow.ledger().next_fee_id());
            for entry in fees.entries(id, fee_ids, at) {
                uow.insert_fee(entry);
            }

            let tx = uow.transaction_mut(handle);
            tx.status = TransactionStatus::Completed;
            Ok(tx.clone())
        });

        match result {
            Ok(tx) => {
                info!(
                    transaction = %id,
                    sender = %tx.sender_id,
                    receiver = %tx.receiver_id,
                    amount = %tx.amount,
                    net = %tx.net_amount,
                    "transfer completed"
                );
                Ok(tx)
            }
            Err(err @ (LedgerError::TransactionNotFound | LedgerError::TransactionNotPending)) => {
                Err(err)
            }
            Err(err) => {
                self.mark_failed(id);
                error!(transaction = %id, error = %err, "transfer processing failed");
                Err(LedgerError::ProcessingFailed(err.to_string()))
            }
        }
    }

    fn mark_failed(&self, id: TransactionId) {
        let marked = self.ledger.atomically(|uow| {
            let handle = uow.lock_transaction(id)?;
            uow.transaction_mut(handle).status = TransactionStatus::Failed;
            Ok(())
        });
        if let Err(err) = marked {
            warn!(transaction = %id, error = %err, "could not mark transfer failed");
        }
    }

    /// Reverses the principal of a completed transfer within the refund
    /// window. Fees are not returned.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::TransactionNotFound`] - no such transaction.
    /// - [`LedgerError::Forbidden`] - `actor` is not the sender.
    /// - [`LedgerError::NotRefundable`] - not completed, or outside the window.
    /// - [`LedgerError::RefundFailed`] - the balance reversal failed; nothing moved.
    pub fn refund(&self, id: TransactionId, actor: UserId) -> Result<Refund, LedgerError> {
        let now = self.clock.now();
        let result = self.ledger.atomically(|uow| {
            let handle = uow.lock_transaction(id)?;
            let (sender_id, receiver_id, amount, net_amount) = {
                let tx = uow.transaction(handle);
                if tx.sender_id != actor {
                    return Err(LedgerError::Forbidden(
                        "you can only refund your own transactions",
                    ));
                }
                if let Some(reason) = tx.refund_blocker(now) {
                    return Err(LedgerError::NotRefundable(reason));
                }
                (tx.sender_id, tx.receiver_id, tx.amount, tx.net_amount)
            };

            let (sender, receiver) = uow.lock_user_pair(sender_id, receiver_id)?;
            uow.user_mut(sender).credit(amount)?;
            uow.user_mut(receiver).debit(net_amount)?;

            let tx = uow.transaction_mut(handle);
            tx.status = TransactionStatus::Refunded;
            tx.processed_at = Some(now);
            Ok(Refund {
                transaction_id: id,
                status: tx.status,
                refunded_amount: amount,
                refunded_at: now,
            })
        });

        match result {
            Ok(refund) => {
                info!(transaction = %id, amount = %refund.refunded_amount, "transfer refunded");
                Ok(refund)
            }
            Err(
                err @ (LedgerError::TransactionNotFound
                | LedgerError::Forbidden(_)
                | LedgerError::NotRefundable(_)),
            ) => Err(err),
            Err(err) => {
                error!(transaction = %id, error = %err, "transfer refund failed");
                Err(LedgerError::RefundFailed(err.to_string()))
            }
        }
    }

    /// A transaction with its fees, visible only to its sender and receiver.
    pub fn show(&self, id: TransactionId, viewer: UserId) -> Result<TransactionDetail, LedgerError> {
        let transaction = self
            .ledger
            .transaction(id)
            .filter(|tx| tx.involves(viewer))
            .ok_or(LedgerError::TransactionNotFound)?;

        Ok(TransactionDetail {
            status_label: transaction.status.label(),
            fees: self.ledger.fees_for(id),
            is_refundable: transaction.is_refundable(self.clock.now()),
            transaction,
        })
    }

    /// Transactions `user` sent or received, newest first.
    pub fn list_for(
        &self,
        user: UserId,
        filter: TransactionFilter,
        page: usize,
        per_page: usize,
    ) -> Page<Transaction> {
        let mut items = self
            .ledger
            .transactions_where(|tx| tx.involves(user) && filter.matches(tx));
        items.reverse();
        Page::paginate(items, page, per_page)
    }

    /// Tip transfers `user` sent. The total sums the gross amount of
    /// completed ones.
    pub fn sent_tips(&self, user: UserId, page: usize, per_page: usize) -> TipHistory {
        let tips = self
            .ledger
            .transactions_where(|tx| tx.sender_id == user && tx.transaction_type == TransactionKind::Tip);
        history(tips, |tx| tx.amount, page, per_page)
    }

    /// Tip transfers `user` received. The total sums the net amount of
    /// completed ones.
    pub fn received_tips(&self, user: UserId, page: usize, per_page: usize) -> TipHistory {
        let tips = self.ledger.transactions_where(|tx| {
            tx.receiver_id == user && tx.transaction_type == TransactionKind::Tip
        });
        history(tips, |tx| tx.net_amount, page, per_page)
    }
}

fn history(
    mut tips: Vec<Transaction>,
    counted: fn(&Transaction) -> Money,
    page: usize,
    per_page: usize,
) -> TipHistory {
    let completed: Vec<&Transaction> = tips
        .iter()
        .filter(|tx| tx.status == TransactionStatus::Completed)
        .collect();
    let total_completed = completed.len();
    let total_amount = completed.into_iter().map(counted).sum();

    tips.reverse();
    TipHistory {
        page: Page::paginate(tips, page, per_page),
        total_completed,
        total_amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::SelfServiceRole;
    use crate::clock::ManualClock;
    use chrono::Duration;

    struct Fixture {
        ledger: Arc<Ledger>,
        clock: Arc<ManualClock>,
        engine: TransferEngine,
        fan: UserId,
        creator: UserId,
    }

    fn fixture(fan_balance: i64) -> Fixture {
        let ledger = Arc::new(Ledger::new());
        let fan = ledger
            .register("Fan", "fan@example.com", SelfServiceRole::Tipper)
            .unwrap()
            .id;
        let creator = ledger
            .register("Creator", "creator@example.com", SelfServiceRole::Creator)
            .unwrap()
            .id;
        ledger.seed_balance(fan, Money::from_units(fan_balance)).unwrap();
        let clock = Arc::new(ManualClock::default());
        let engine = TransferEngine::new(ledger.clone(), clock.clone());
        Fixture {
            ledger,
            clock,
            engine,
            fan,
            creator,
        }
    }

    fn balance(f: &Fixture, user: UserId) -> Money {
        f.ledger.user(user).unwrap().balance()
    }

    #[test]
    fn send_tip_applies_fees() {
        let f = fixture(100);
        let tx = f.engine.send_tip(f.fan, f.creator, Money::from_units(50), None).unwrap();

        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.platform_fee, Money::from_units(5));
        assert_eq!(tx.net_amount, Money::from_units(43));
        assert_eq!(balance(&f, f.fan), Money::from_units(50));
        assert_eq!(balance(&f, f.creator), Money::from_units(43));

        let fees = f.ledger.fees_for(tx.id);
        assert_eq!(fees.len(), 2);
        assert_eq!(fees[1].amount, Money::from_units(2));
    }

    #[test]
    fn send_tip_guards() {
        let f = fixture(100);
        let other_fan = f
            .ledger
            .register("Other", "other@example.com", SelfServiceRole::Tipper)
            .unwrap()
            .id;

        assert!(matches!(
            f.engine.send_tip(f.fan, f.creator, Money::new(999), None),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            f.engine.send_tip(f.fan, f.creator, Money::from_units(50_001), None),
            Err(LedgerError::Validation(_))
        ));
        assert_eq!(
            f.engine.send_tip(f.fan, other_fan, Money::from_units(10), None),
            Err(LedgerError::InvalidReceiver)
        );
        assert_eq!(
            f.engine.send_tip(f.creator, f.creator, Money::from_units(10), None),
            Err(LedgerError::CannotTipSelf)
        );
        assert_eq!(
            f.engine.send_tip(f.fan, f.creator, Money::from_units(101), None),
            Err(LedgerError::InsufficientFunds)
        );
        assert!(f.ledger.transactions_where(|_| true).is_empty());
    }

    #[test]
    fn processing_twice_is_rejected() {
        let f = fixture(100);
        let tx = f.engine.send_tip(f.fan, f.creator, Money::from_units(20), None).unwrap();
        assert_eq!(f.engine.process(tx.id), Err(LedgerError::TransactionNotPending));
        assert_eq!(
            f.ledger.transaction(tx.id).unwrap().status,
            TransactionStatus::Completed
        );
    }

    #[test]
    fn failed_processing_marks_failed_and_moves_nothing() {
        let f = fixture(20);
        let at = f.clock.now();
        let id = f
            .ledger
            .atomically(|uow| {
                let tx = Transaction::pending_tip(
                    uow.ledger().next_transaction_id(),
                    f.fan,
                    f.creator,
                    Money::from_units(50),
                    None,
                    at,
                );
                let id = tx.id;
                uow.insert_transaction(tx);
                Ok(id)
            })
            .unwrap();

        assert_eq!(
            f.engine.process(id),
            Err(LedgerError::ProcessingFailed("insufficient balance".to_string()))
        );

        let tx = f.ledger.transaction(id).unwrap();
        assert_eq!(tx.status, TransactionStatus::Failed);
        assert_eq!(balance(&f, f.fan), Money::from_units(20));
        assert_eq!(balance(&f, f.creator), Money::ZERO);
        assert!(f.ledger.fees_for(id).is_empty());
        assert_eq!(f.engine.process(id), Err(LedgerError::TransactionNotPending));
    }

    #[test]
    fn refund_window_is_inclusive() {
        let f = fixture(100);
        let tx = f.engine.send_tip(f.fan, f.creator, Money::from_units(50), None).unwrap();

        f.clock.advance(Duration::hours(24));
        let refund = f.engine.refund(tx.id, f.fan).unwrap();
        assert_eq!(refund.refunded_amount, Money::from_units(50));
        assert_eq!(balance(&f, f.fan), Money::from_units(100));
        assert_eq!(balance(&f, f.creator), Money::ZERO);

        assert_eq!(
            f.engine.refund(tx.id, f.fan),
            Err(LedgerError::NotRefundable("transaction not completed"))
        );
    }

    #[test]
    fn refund_after_window_fails() {
        let f = fixture(100);
        let tx = f.engine.send_tip(f.fan, f.creator, Money::from_units(50), None).unwrap();

        f.clock.advance(Duration::hours(24) + Duration::seconds(1));
        assert_eq!(
            f.engine.refund(tx.id, f.fan),
            Err(LedgerError::NotRefundable("refund period expired (24 hours)"))
        );
        assert_eq!(balance(&f, f.creator), Money::from_units(43));
    }

    #[test]
    fn only_sender_refunds() {
        let f = fixture(100);
        let tx = f.engine.send_tip(f.fan, f.creator, Money::from_units(50), None).unwrap();
        assert!(matches!(
            f.engine.refund(tx.id, f.creator),
            Err(LedgerError::Forbidden(_))
        ));
    }

    #[test]
    fn refund_fails_when_receiver_spent_the_funds() {
        let f = fixture(100);
        let tx = f.engine.send_tip(f.fan, f.creator, Money::from_units(50), None).unwrap();
        f.ledger
            .atomically(|uow| {
                let creator = uow.lock_user(f.creator)?;
                uow.user_mut(creator).debit(Money::from_units(40))
            })
            .unwrap();

        assert!(matches!(
            f.engine.refund(tx.id, f.fan),
            Err(LedgerError::RefundFailed(_))
        ));
        assert_eq!(balance(&f, f.fan), Money::from_units(50));
        assert_eq!(
            f.ledger.transaction(tx.id).unwrap().status,
            TransactionStatus::Completed
        );
    }

    #[test]
    fn show_is_limited_to_parties() {
        let f = fixture(100);
        let stranger = f
            .ledger
            .register("Stranger", "stranger@example.com", SelfServiceRole::Tipper)
            .unwrap()
            .id;
        let tx = f.engine.send_tip(f.fan, f.creator, Money::from_units(50), None).unwrap();

        let detail = f.engine.show(tx.id, f.creator).unwrap();
        assert_eq!(detail.fees.len(), 2);
        assert!(detail.is_refundable);
        assert_eq!(detail.status_label, "Completed");
        assert_eq!(
            f.engine.show(tx.id, stranger),
            Err(LedgerError::TransactionNotFound)
        );
    }

    #[test]
    fn histories_total_completed_tips() {
        let f = fixture(1000);
        f.engine.send_tip(f.fan, f.creator, Money::from_units(50), None).unwrap();
        let second = f.engine.send_tip(f.fan, f.creator, Money::from_units(100), None).unwrap();

        let sent = f.engine.sent_tips(f.fan, 1, 20);
        assert_eq!(sent.total_completed, 2);
        assert_eq!(sent.total_amount, Money::from_units(150));
        assert_eq!(sent.page.data[0].id, second.id);

        let received = f.engine.received_tips(f.creator, 1, 20);
        assert_eq!(received.total_amount, Money::from_units(43 + 93));

        let filter = TransactionFilter {
            status: Some(TransactionStatus::Refunded),
            kind: None,
        };
        assert_eq!(f.engine.list_for(f.fan, filter, 1, 20).total, 0);
    }
}
