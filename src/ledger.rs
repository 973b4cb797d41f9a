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

//! Ledger store: durable records with row-level locking.
//!
//! All ledger mutations happen inside [`Ledger::atomically`], which hands
//! the caller a [`UnitOfWork`]. Rows locked through the unit stay exclusively
//! held until the unit finishes. When the closure returns `Ok` the staged
//! inserts are published and the locks released; on `Err` (or a panic) every
//! locked row is restored to the value it had when it was locked, so no
//! partial effect is ever observable.
//!
//! # Example
//!
//! ```
//! use tip_ledger::{Ledger, LedgerError, Money, SelfServiceRole};
//!
//! let ledger = Ledger::new();
//! let creator = ledger
//!     .register("Hana", "hana@example.com", SelfServiceRole::Creator)
//!     .unwrap();
//! ledger.seed_balance(creator.id, Money::from_units(100)).unwrap();
//!
//! // A failing unit leaves the balance untouched.
//! let result: Result<(), LedgerError> = ledger.atomically(|uow| {
//!     let _user = uow.lock_user(creator.id)?;
//!     Err(LedgerError::InsufficientFunds)
//! });
//! assert!(result.is_err());
//! assert_eq!(ledger.user(creator.id).unwrap().balance(), Money::from_units(100));
//! ```
//!
//! # Lock ordering
//!
//! Units lock the domain row (tip, payout, transaction) first and users last;
//! units touching two users lock them in ascending id order via
//! [`UnitOfWork::lock_user_pair`].

use crate::account::User;
use crate::base::{
    FeeId, PayoutId, PayoutReference, Role, SelfServiceRole, TipId, TransactionId, TxRef, UserId,
};
use crate::error::LedgerError;
use crate::money::Money;
use crate::payout::Payout;
use crate::table::{RowGuard, RowTable};
use crate::tip::Tip;
use crate::transaction::{FeeEntry, Transaction};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Default page size for listings.
pub const DEFAULT_PER_PAGE: usize = 20;
const MAX_PER_PAGE: usize = 100;
const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Default)]
struct Sequences {
    user: AtomicU64,
    tip: AtomicU64,
    payout: AtomicU64,
    transaction: AtomicU64,
    fee: AtomicU64,
}

fn next(counter: &AtomicU64) -> u64 {
    counter.fetch_add(1, Ordering::Relaxed) + 1
}

/// In-process ledger store.
///
/// # Invariants
///
/// - `tx_ref`, payout `reference` and email are unique.
/// - A committed balance is never negative.
/// - Ids are assigned from monotonic sequences, so id order is creation order.
///   Ids consumed by a rolled-back unit are not reused.
pub struct Ledger {
    users: RowTable<UserId, User>,
    emails: DashMap<String, UserId>,
    tips: RowTable<TipId, Tip>,
    tip_refs: DashMap<TxRef, TipId>,
    payouts: RowTable<PayoutId, Payout>,
    payout_refs: DashMap<PayoutReference, PayoutId>,
    transactions: RowTable<TransactionId, Transaction>,
    fees: DashMap<TransactionId, Vec<FeeEntry>>,
    sequences: Sequences,
}

impl Ledger {
    pub fn new() -> Self {
        Ledger {
            users: RowTable::new(),
            emails: DashMap::new(),
            tips: RowTable::new(),
            tip_refs: DashMap::new(),
            payouts: RowTable::new(),
            payout_refs: DashMap::new(),
            transactions: RowTable::new(),
            fees: DashMap::new(),
            sequences: Sequences::default(),
        }
    }

    /// Public sign-up. Only tipper and creator accounts can be created here.
    pub fn register(
        &self,
        name: &str,
        email: &str,
        role: SelfServiceRole,
    ) -> Result<User, LedgerError> {
        self.insert_user(name, email, role.into())
    }

    /// Creates an admin account. Reserved for out-of-band provisioning
    /// (startup flags, operator tooling).
    pub fn provision_admin(&self, name: &str, email: &str) -> Result<User, LedgerError> {
        let admin = self.insert_user(name, email, Role::Admin)?;
        info!(user = %admin.id, "admin provisioned");
        Ok(admin)
    }

    fn insert_user(&self, name: &str, email: &str, role: Role) -> Result<User, LedgerError> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(LedgerError::Validation(format!(
                "name must be between 1 and {MAX_NAME_LEN} characters"
            )));
        }
        let email = email.trim().to_lowercase();
        if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
            return Err(LedgerError::Validation("email is invalid".to_string()));
        }

        let id = UserId(next(&self.sequences.user));
        match self.emails.entry(email.clone()) {
            Entry::Occupied(_) => return Err(LedgerError::Duplicate("email")),
            Entry::Vacant(entry) => {
                entry.insert(id);
            }
        }

        let user = User::new(id, name.to_string(), email, role);
        self.users.insert(id, user.clone());
        debug!(user = %id, role = %role, "user created");
        Ok(user)
    }

    /// Credits funds loaded from outside the ledger (seeding, manual top-up).
    pub fn seed_balance(&self, id: UserId, amount: Money) -> Result<Money, LedgerError> {
        self.atomically(|uow| {
            let user = uow.lock_user(id)?;
            uow.user_mut(user).credit(amount)?;
            Ok(uow.user(user).balance())
        })
    }

    /// Removes a user, cascading to the rows they own.
    ///
    /// Tips received and payouts requested are deleted, as are transfers the
    /// user sent or received (with their fee entries). Tips the user sent
    /// become anonymous-origin (`tipper_id = None`), and payouts the user
    /// acted on as admin lose their `admin_id`.
    pub fn delete_user(&self, id: UserId) -> Result<User, LedgerError> {
        let user = self.users.remove(&id).ok_or(LedgerError::UserNotFound(id))?;
        self.emails.remove(&user.email);

        for tip_id in self.tips.keys_where(|tip| tip.creator_id == id) {
            if let Some(tip) = self.tips.remove(&tip_id) {
                self.tip_refs.remove(&tip.tx_ref);
            }
        }
        for tip_id in self.tips.keys_where(|tip| tip.tipper_id == Some(id)) {
            if let Some(mut tip) = self.tips.lock(&tip_id) {
                tip.tipper_id = None;
            }
        }

        for payout_id in self.payouts.keys_where(|payout| payout.creator_id == id) {
            if let Some(payout) = self.payouts.remove(&payout_id) {
                self.payout_refs.remove(&payout.reference);
            }
        }
        for payout_id in self.payouts.keys_where(|payout| payout.admin_id == Some(id)) {
            if let Some(mut payout) = self.payouts.lock(&payout_id) {
                payout.admin_id = None;
            }
        }

        for transaction_id in self.transactions.keys_where(|tx| tx.involves(id)) {
            self.transactions.remove(&transaction_id);
            self.fees.remove(&transaction_id);
        }

        info!(user = %id, "user deleted");
        Ok(user)
    }

    pub fn user(&self, id: UserId) -> Option<User> {
        self.users.snapshot(&id)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn tip(&self, id: TipId) -> Option<Tip> {
        self.tips.snapshot(&id)
    }

    pub fn tip_by_ref(&self, tx_ref: &TxRef) -> Option<Tip> {
        let id = self.tip_refs.get(tx_ref).map(|entry| *entry.value())?;
        self.tip(id)
    }

    /// Tips matching `filter`, oldest first.
    pub fn tips_where<F>(&self, filter: F) -> Vec<Tip>
    where
        F: Fn(&Tip) -> bool,
    {
        self.tips.select(filter)
    }

    pub fn payout(&self, id: PayoutId) -> Option<Payout> {
        self.payouts.snapshot(&id)
    }

    /// Payouts matching `filter`, oldest first.
    pub fn payouts_where<F>(&self, filter: F) -> Vec<Payout>
    where
        F: Fn(&Payout) -> bool,
    {
        self.payouts.select(filter)
    }

    pub fn transaction(&self, id: TransactionId) -> Option<Transaction> {
        self.transactions.snapshot(&id)
    }

    /// Transactions matching `filter`, oldest first.
    pub fn transactions_where<F>(&self, filter: F) -> Vec<Transaction>
    where
        F: Fn(&Transaction) -> bool,
    {
        self.transactions.select(filter)
    }

    pub fn fees_for(&self, id: TransactionId) -> Vec<FeeEntry> {
        self.fees
            .get(&id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub(crate) fn next_tip_id(&self) -> TipId {
        TipId(next(&self.sequences.tip))
    }

    pub(crate) fn next_payout_id(&self) -> PayoutId {
        PayoutId(next(&self.sequences.payout))
    }

    pub(crate) fn next_transaction_id(&self) -> TransactionId {
        TransactionId(next(&self.sequences.transaction))
    }

    pub(crate) fn next_fee_id(&self) -> FeeId {
        FeeId(next(&self.sequences.fee))
    }

    /// Runs `work` as one atomic unit of work.
    ///
    /// # Errors
    ///
    /// Returns whatever `work` fails with, after restoring every row it
    /// locked. Also returns [`LedgerError::Duplicate`] if a staged insert
    /// clashes with a unique key at commit, in which case nothing is applied.
    pub fn atomically<R, F>(&self, work: F) -> Result<R, LedgerError>
    where
        F: FnOnce(&mut UnitOfWork<'_>) -> Result<R, LedgerError>,
    {
        let mut uow = UnitOfWork::new(self);
        let value = work(&mut uow)?;
        uow.commit()?;
        Ok(value)
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a user row locked by a [`UnitOfWork`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockedUser(usize);

/// Handle to a tip row locked by a [`UnitOfWork`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockedTip(usize);

/// Handle to a payout row locked by a [`UnitOfWork`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockedPayout(usize);

/// Handle to a transaction row locked by a [`UnitOfWork`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockedTransaction(usize);

struct Held<K, T> {
    key: K,
    guard: RowGuard<T>,
    /// Row as committed when the lock was taken.
    before: T,
}

fn hold<K, T>(held: &mut Vec<Held<K, T>>, table: &RowTable<K, T>, key: K) -> Option<usize>
where
    K: Eq + std::hash::Hash + Ord + Copy,
    T: Clone,
{
    if let Some(index) = held.iter().position(|row| row.key == key) {
        return Some(index);
    }
    let guard = table.lock(&key)?;
    let before = (*guard).clone();
    held.push(Held { key, guard, before });
    Some(held.len() - 1)
}

fn restore<K, T: Clone>(held: &mut [Held<K, T>]) {
    for row in held.iter_mut().rev() {
        *row.guard = row.before.clone();
    }
}

enum Staged {
    Tip(Tip),
    Payout(Payout),
    Transaction(Transaction),
    Fee(FeeEntry),
}

/// One atomic unit of work over the ledger.
///
/// Rows created in a unit are staged and only become visible, and lockable,
/// once the unit commits.
pub struct UnitOfWork<'l> {
    ledger: &'l Ledger,
    users: Vec<Held<UserId, User>>,
    tips: Vec<Held<TipId, Tip>>,
    payouts: Vec<Held<PayoutId, Payout>>,
    transactions: Vec<Held<TransactionId, Transaction>>,
    staged: Vec<Staged>,
    committed: bool,
}

impl<'l> UnitOfWork<'l> {
    fn new(ledger: &'l Ledger) -> Self {
        Self {
            ledger,
            users: Vec::new(),
            tips: Vec::new(),
            payouts: Vec::new(),
            transactions: Vec::new(),
            staged: Vec::new(),
            committed: false,
        }
    }

    /// Locks a user row for the rest of the unit.
    pub fn lock_user(&mut self, id: UserId) -> Result<LockedUser, LedgerError> {
        hold(&mut self.users, &self.ledger.users, id)
            .map(LockedUser)
            .ok_or(LedgerError::UserNotFound(id))
    }

    /// Locks two users in ascending id order, returning handles in argument
    /// order.
    pub fn lock_user_pair(
        &mut self,
        first: UserId,
        second: UserId,
    ) -> Result<(LockedUser, LockedUser), LedgerError> {
        if first <= second {
            let a = self.lock_user(first)?;
            let b = self.lock_user(second)?;
            Ok((a, b))
        } else {
            let b = self.lock_user(second)?;
            let a = self.lock_user(first)?;
            Ok((a, b))
        }
    }

    /// Locks the tip carrying `tx_ref`, or returns `None` if no such tip.
    pub fn lock_tip(&mut self, tx_ref: &TxRef) -> Option<LockedTip> {
        let id = self.ledger.tip_refs.get(tx_ref).map(|entry| *entry.value())?;
        hold(&mut self.tips, &self.ledger.tips, id).map(LockedTip)
    }

    pub fn lock_payout(&mut self, id: PayoutId) -> Result<LockedPayout, LedgerError> {
        hold(&mut self.payouts, &self.ledger.payouts, id)
            .map(LockedPayout)
            .ok_or(LedgerError::PayoutNotFound(id))
    }

    pub fn lock_transaction(
        &mut self,
        id: TransactionId,
    ) -> Result<LockedTransaction, LedgerError> {
        hold(&mut self.transactions, &self.ledger.transactions, id)
            .map(LockedTransaction)
            .ok_or(LedgerError::TransactionNotFound)
    }

    pub fn user(&self, handle: LockedUser) -> &User {
        &self.users[handle.0].guard
    }

    pub(crate) fn user_mut(&mut self, handle: LockedUser) -> &mut User {
        &mut self.users[handle.0].guard
    }

    pub fn tip(&self, handle: LockedTip) -> &Tip {
        &self.tips[handle.0].guard
    }

    pub(crate) fn tip_mut(&mut self, handle: LockedTip) -> &mut Tip {
        &mut self.tips[handle.0].guard
    }

    pub fn payout(&self, handle: LockedPayout) -> &Payout {
        &self.payouts[handle.0].guard
    }

    pub(crate) fn payout_mut(&mut self, handle: LockedPayout) -> &mut Payout {
        &mut self.payouts[handle.0].guard
    }

    pub fn transaction(&self, handle: LockedTransaction) -> &Transaction {
        &self.transactions[handle.0].guard
    }

    pub(crate) fn transaction_mut(&mut self, handle: LockedTransaction) -> &mut Transaction {
        &mut self.transactions[handle.0].guard
    }

    pub(crate) fn insert_tip(&mut self, tip: Tip) {
        self.staged.push(Staged::Tip(tip));
    }

    pub(crate) fn insert_payout(&mut self, payout: Payout) {
        self.staged.push(Staged::Payout(payout));
    }

    pub(crate) fn insert_transaction(&mut self, transaction: Transaction) {
        self.staged.push(Staged::Transaction(transaction));
    }

    pub(crate) fn insert_fee(&mut self, fee: FeeEntry) {
        self.staged.push(Staged::Fee(fee));
    }

    pub(crate) fn ledger(&self) -> &'l Ledger {
        self.ledger
    }

    /// Publishes staged rows and marks the unit committed. Row locks are
    /// released when the unit drops.
    ///
    /// Tip and payout rows are inserted before their `tx_ref` / reference
    /// index entries, so a key found in an index always resolves to a row.
    fn commit(mut self) -> Result<(), LedgerError> {
        let mut tips = Vec::new();
        let mut payouts = Vec::new();
        let mut transactions = Vec::new();
        let mut fees = Vec::new();
        for staged in std::mem::take(&mut self.staged) {
            match staged {
                Staged::Tip(tip) => tips.push(tip),
                Staged::Payout(payout) => payouts.push(payout),
                Staged::Transaction(transaction) => transactions.push(transaction),
                Staged::Fee(fee) => fees.push(fee),
            }
        }

        let tip_keys: Vec<(TxRef, TipId)> =
            tips.iter().map(|tip| (tip.tx_ref.clone(), tip.id)).collect();
        let payout_keys: Vec<(PayoutReference, PayoutId)> = payouts
            .iter()
            .map(|payout| (payout.reference.clone(), payout.id))
            .collect();

        for tip in tips {
            let inserted = self.ledger.tips.insert(tip.id, tip);
            debug_assert!(inserted, "sequence produced a duplicate tip id");
        }
        for payout in payouts {
            let inserted = self.ledger.payouts.insert(payout.id, payout);
            debug_assert!(inserted, "sequence produced a duplicate payout id");
        }

        if let Err(err) = self.publish_unique_keys(&tip_keys, &payout_keys) {
            for (_, id) in &tip_keys {
                self.ledger.tips.remove(id);
            }
            for (_, id) in &payout_keys {
                self.ledger.payouts.remove(id);
            }
            return Err(err);
        }

        for transaction in transactions {
            let inserted = self.ledger.transactions.insert(transaction.id, transaction);
            debug_assert!(inserted, "sequence produced a duplicate transaction id");
        }
        for fee in fees {
            self.ledger
                .fees
                .entry(fee.transaction_id)
                .or_default()
                .push(fee);
        }

        self.committed = true;
        Ok(())
    }

    /// Claims `tx_ref` and payout references for the unit's new rows, all or
    /// nothing.
    fn publish_unique_keys(
        &self,
        tips: &[(TxRef, TipId)],
        payouts: &[(PayoutReference, PayoutId)],
    ) -> Result<(), LedgerError> {
        let mut claimed_refs: Vec<&TxRef> = Vec::new();
        let mut claimed_references: Vec<&PayoutReference> = Vec::new();

        let clash = 'claim: {
            for (tx_ref, id) in tips {
                match self.ledger.tip_refs.entry(tx_ref.clone()) {
                    Entry::Occupied(_) => break 'claim Some("tx_ref"),
                    Entry::Vacant(entry) => {
                        entry.insert(*id);
                        claimed_refs.push(tx_ref);
                    }
                }
            }
            for (reference, id) in payouts {
                match self.ledger.payout_refs.entry(reference.clone()) {
                    Entry::Occupied(_) => break 'claim Some("payout reference"),
                    Entry::Vacant(entry) => {
                        entry.insert(*id);
                        claimed_references.push(reference);
                    }
                }
            }
            None
        };

        if let Some(key) = clash {
            for tx_ref in claimed_refs {
                self.ledger.tip_refs.remove(tx_ref);
            }
            for reference in claimed_references {
                self.ledger.payout_refs.remove(reference);
            }
            return Err(LedgerError::Duplicate(key));
        }
        Ok(())
    }
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let locked = self.users.len() + self.tips.len() + self.payouts.len() + self.transactions.len();
        if locked > 0 || !self.staged.is_empty() {
            debug!(locked, staged = self.staged.len(), "rolling back unit of work");
        }
        restore(&mut self.users);
        restore(&mut self.tips);
        restore(&mut self.payouts);
        restore(&mut self.transactions);
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub current_page: usize,
    pub last_page: usize,
    pub per_page: usize,
    pub total: usize,
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Slices `items` into 1-based pages of `per_page` (clamped to `1..=100`).
    pub fn paginate(items: Vec<T>, page: usize, per_page: usize) -> Self {
        let per_page = per_page.clamp(1, MAX_PER_PAGE);
        let current_page = page.max(1);
        let total = items.len();
        let last_page = total.div_ceil(per_page).max(1);
        let data = items
            .into_iter()
            .skip((current_page - 1) * per_page)
            .take(per_page)
            .collect();

        Self {
            data,
            current_page,
            last_page,
            per_page,
            total,
            has_more: current_page < last_page,
        }
    }
}
