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

//! # Tip Ledger
//!
//! Ledger consistency engine for a creator tipping platform. Tippers pay
//! creators through a hosted gateway checkout, creators withdraw their
//! balance through admin-approved payouts, and users can also transfer
//! balance to creators directly with itemized fees.
//!
//! ## Core Components
//!
//! - [`Ledger`]: in-process store with row-level locking and atomic units of work
//! - [`TipEngine`]: pending tip, gateway checkout, webhook-verified settlement
//! - [`PayoutEngine`]: debit-at-request payouts with an admin state machine
//! - [`TransferEngine`]: direct transfers with fees and a 24 hour refund window
//! - [`Money`]: exact two-decimal currency amounts
//! - [`LedgerError`]: error taxonomy with HTTP status mapping
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use tip_ledger::{Ledger, Money, PayoutEngine, SelfServiceRole, SystemClock};
//!
//! let ledger = Arc::new(Ledger::new());
//! let creator = ledger
//!     .register("Hana", "hana@example.com", SelfServiceRole::Creator)
//!     .unwrap();
//! let admin = ledger.provision_admin("Ops", "ops@example.com").unwrap();
//! ledger.seed_balance(creator.id, Money::from_units(100)).unwrap();
//!
//! let payouts = PayoutEngine::new(ledger.clone(), Arc::new(SystemClock));
//! let payout = payouts
//!     .request_payout(creator.id, Money::from_units(60), None)
//!     .unwrap();
//! assert_eq!(ledger.user(creator.id).unwrap().balance(), Money::from_units(40));
//!
//! // Rejecting refunds the creator in the same unit of work.
//! payouts.reject(payout.id, admin.id, Some("wrong account".into())).unwrap();
//! assert_eq!(ledger.user(creator.id).unwrap().balance(), Money::from_units(100));
//! ```
//!
//! ## Thread Safety
//!
//! Every mutation runs inside [`Ledger::atomically`], holding exclusive row
//! locks until it commits or rolls back. Unrelated rows proceed in parallel;
//! there is no global lock.

pub mod account;
pub mod analytics;
mod base;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod ledger;
mod money;
pub mod payout;
pub mod payouts;
mod table;
pub mod tip;
pub mod tips;
pub mod transaction;
pub mod transfers;

pub use account::User;
pub use analytics::{CreatorAnalytics, creator_analytics};
pub use base::{
    FeeId, PayoutId, PayoutReference, Role, SelfServiceRole, TipId, TransactionId, TxRef, UserId,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{GatewayConfig, Settings};
pub use error::{ErrorKind, LedgerError};
pub use gateway::{
    Checkout, CheckoutRequest, ChapaClient, GatewayError, PayerInfo, PaymentGateway, Verification,
    WebhookAuthenticator,
};
pub use ledger::{Ledger, Page, UnitOfWork};
pub use money::Money;
pub use payout::{Payout, PayoutStatus};
pub use payouts::PayoutEngine;
pub use tip::{Tip, TipStatus};
pub use tips::{CheckoutSession, TipEngine, TipRequest, TipStatusView, WebhookOutcome};
pub use transaction::{
    FeeBreakdown, FeeEntry, FeeType, Transaction, TransactionKind, TransactionStatus,
};
pub use transfers::{TransactionFilter, TransferEngine};
