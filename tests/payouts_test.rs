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

//! Integration tests for payouts under concurrency.

mod common;

use common::Platform;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use tip_ledger::{LedgerError, Money, PayoutStatus};

#[test]
fn concurrent_requests_never_overdraw() {
    let p = Platform::new();
    p.fund(p.creator, 100);

    let succeeded = Arc::new(AtomicUsize::new(0));
    let insufficient = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let payouts = p.payouts.clone();
            let creator = p.creator;
            let succeeded = succeeded.clone();
            let insufficient = insufficient.clone();
            thread::spawn(move || {
                match payouts.request_payout(creator, Money::from_decimal(dec!(60.00)), None) {
                    Ok(_) => succeeded.fetch_add(1, Ordering::SeqCst),
                    Err(LedgerError::InsufficientFunds) => insufficient.fetch_add(1, Ordering::SeqCst),
                    Err(e) => panic!("unexpected error: {e}"),
                };
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(succeeded.load(Ordering::SeqCst), 1);
    assert_eq!(insufficient.load(Ordering::SeqCst), 1);
    assert_eq!(p.balance(p.creator), Money::from_decimal(dec!(40.00)));
    assert_eq!(p.ledger.payouts_where(|_| true).len(), 1);
}

#[test]
fn many_small_requests_drain_exactly() {
    let p = Platform::new();
    p.fund(p.creator, 100);

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let payouts = p.payouts.clone();
            let creator = p.creator;
            thread::spawn(move || payouts.request_payout(creator, Money::from_units(3), None).is_ok())
        })
        .collect();
    let granted = handles
        .into_iter()
        .filter_map(|h| h.join().ok())
        .filter(|ok| *ok)
        .count();

    assert_eq!(granted, 33);
    assert_eq!(p.balance(p.creator), Money::from_units(1));
}

#[test]
fn request_then_reject_round_trips_balance() {
    let p = Platform::new();
    p.fund(p.creator, 100);
    p.ledger
        .seed_balance(p.creator, Money::from_decimal(dec!(0.37)))
        .unwrap();
    let before = p.balance(p.creator);

    let payout = p
        .payouts
        .request_payout(p.creator, Money::from_decimal(dec!(99.99)), None)
        .unwrap();
    p.payouts
        .reject(payout.id, p.admin, Some("bank details mismatch".into()))
        .unwrap();

    assert_eq!(p.balance(p.creator), before);
    let payout = p.ledger.payout(payout.id).unwrap();
    assert_eq!(payout.status, PayoutStatus::Rejected);
    assert_eq!(payout.note.as_deref(), Some("bank details mismatch"));
}

#[test]
fn concurrent_admin_actions_apply_once() {
    let p = Platform::new();
    p.fund(p.creator, 100);
    let payout = p
        .payouts
        .request_payout(p.creator, Money::from_units(40), None)
        .unwrap();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let payouts = p.payouts.clone();
            let admin = p.admin;
            thread::spawn(move || {
                if i % 2 == 0 {
                    payouts.reject(payout.id, admin, None).is_ok()
                } else {
                    payouts.approve(payout.id, admin).is_ok()
                }
            })
        })
        .collect();
    let applied = handles
        .into_iter()
        .filter_map(|h| h.join().ok())
        .filter(|ok| *ok)
        .count();

    assert_eq!(applied, 1);
    let status = p.ledger.payout(payout.id).unwrap().status;
    let expected = match status {
        PayoutStatus::Rejected => Money::from_units(100),
        PayoutStatus::Approved => Money::from_units(60),
        other => panic!("unexpected status {other:?}"),
    };
    assert_eq!(p.balance(p.creator), expected);
}

#[test]
fn approve_then_mark_paid_never_double_debits() {
    let p = Platform::new();
    p.fund(p.creator, 100);
    let payout = p
        .payouts
        .request_payout(p.creator, Money::from_units(25), None)
        .unwrap();

    assert_eq!(
        p.payouts.mark_paid(payout.id, p.admin),
        Err(LedgerError::PayoutNotApproved)
    );
    p.payouts.approve(payout.id, p.admin).unwrap();
    p.payouts.mark_paid(payout.id, p.admin).unwrap();
    assert_eq!(
        p.payouts.mark_paid(payout.id, p.admin),
        Err(LedgerError::PayoutNotApproved)
    );
    assert_eq!(p.balance(p.creator), Money::from_units(75));
}

#[test]
fn payouts_and_tips_for_different_creators_do_not_interfere() {
    let p = Platform::new();
    let other = p
        .ledger
        .register("Other Creator", "other@example.com", tip_ledger::SelfServiceRole::Creator)
        .unwrap()
        .id;
    p.fund(p.creator, 1000);

    let handles: Vec<_> = (0..100)
        .map(|i| {
            let ledger = p.ledger.clone();
            let payouts = p.payouts.clone();
            let creator = p.creator;
            thread::spawn(move || {
                if i % 2 == 0 {
                    ledger.seed_balance(other, Money::from_units(1)).unwrap();
                } else {
                    payouts.request_payout(creator, Money::from_units(10), None).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(p.balance(other), Money::from_units(50));
    assert_eq!(p.balance(p.creator), Money::from_units(500));
}
