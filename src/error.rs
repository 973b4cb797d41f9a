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

//! Error types for ledger operations.

use crate::gateway::GatewayError;
use thiserror::Error;

/// Coarse classification of a [`LedgerError`], used to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    NotFound,
    StateConflict,
    InsufficientFunds,
    Gateway,
    Signature,
    Internal,
}

impl ErrorKind {
    /// HTTP status the web layer reports for this kind.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::Validation | ErrorKind::InsufficientFunds => 422,
            ErrorKind::Authorization | ErrorKind::Signature => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::StateConflict => 400,
            ErrorKind::Gateway | ErrorKind::Internal => 500,
        }
    }
}

/// Ledger operation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// Malformed or out-of-range input
    #[error("{0}")]
    Validation(String),

    /// Tip amount is neither a preset nor within `[minimum, maximum]`
    #[error("invalid amount: must be one of the presets or between {minimum} and {maximum}")]
    InvalidTipAmount { minimum: String, maximum: String },

    /// Caller lacks the role or ownership the operation requires
    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("user {0} not found")]
    UserNotFound(crate::UserId),

    #[error("creator {0} not found")]
    CreatorNotFound(crate::UserId),

    #[error("tip {0} not found")]
    TipNotFound(String),

    #[error("payout {0} not found")]
    PayoutNotFound(crate::PayoutId),

    #[error("transaction not found")]
    TransactionNotFound,

    /// Balance cannot cover the requested debit
    #[error("insufficient balance")]
    InsufficientFunds,

    #[error("payout not pending")]
    PayoutNotPending,

    #[error("payout must be approved first")]
    PayoutNotApproved,

    #[error("transaction is not pending")]
    TransactionNotPending,

    #[error("transaction cannot be refunded: {0}")]
    NotRefundable(&'static str),

    #[error("you can only tip creators")]
    InvalidReceiver,

    #[error("you cannot tip yourself")]
    CannotTipSelf,

    /// A unique key (`tx_ref`, payout reference, email) is already taken
    #[error("duplicate {0}")]
    Duplicate(&'static str),

    /// Webhook correlation key is missing from every accepted payload shape
    #[error("tx_ref missing")]
    MissingReference,

    #[error("invalid webhook payload: {0}")]
    MalformedWebhook(String),

    /// Webhook secret or signature missing, or the signature does not match
    #[error("invalid signature")]
    InvalidSignature,

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Transfer processing failed; the transaction has been marked failed
    #[error("failed to process tip: {0}")]
    ProcessingFailed(String),

    /// Refund could not be applied; no balance moved
    #[error("failed to refund transaction: {0}")]
    RefundFailed(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Validation(_)
            | LedgerError::InvalidTipAmount { .. }
            | LedgerError::Duplicate(_)
            | LedgerError::MalformedWebhook(_) => ErrorKind::Validation,
            LedgerError::Forbidden(_) => ErrorKind::Authorization,
            LedgerError::UserNotFound(_)
            | LedgerError::CreatorNotFound(_)
            | LedgerError::TipNotFound(_)
            | LedgerError::PayoutNotFound(_)
            | LedgerError::TransactionNotFound => ErrorKind::NotFound,
            LedgerError::InsufficientFunds => ErrorKind::InsufficientFunds,
            LedgerError::PayoutNotPending
            | LedgerError::PayoutNotApproved
            | LedgerError::TransactionNotPending
            | LedgerError::NotRefundable(_)
            | LedgerError::InvalidReceiver
            | LedgerError::CannotTipSelf
            | LedgerError::MissingReference => ErrorKind::StateConflict,
            LedgerError::InvalidSignature => ErrorKind::Signature,
            LedgerError::Gateway(_) => ErrorKind::Gateway,
            LedgerError::ProcessingFailed(_) | LedgerError::RefundFailed(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "VALIDATION_FAILED",
            LedgerError::InvalidTipAmount { .. } => "INVALID_AMOUNT",
            LedgerError::Forbidden(_) => "FORBIDDEN",
            LedgerError::UserNotFound(_) => "USER_NOT_FOUND",
            LedgerError::CreatorNotFound(_) => "CREATOR_NOT_FOUND",
            LedgerError::TipNotFound(_) => "TIP_NOT_FOUND",
            LedgerError::PayoutNotFound(_) => "PAYOUT_NOT_FOUND",
            LedgerError::TransactionNotFound => "TRANSACTION_NOT_FOUND",
            LedgerError::InsufficientFunds => "INSUFFICIENT_BALANCE",
            LedgerError::PayoutNotPending => "PAYOUT_NOT_PENDING",
            LedgerError::PayoutNotApproved => "PAYOUT_NOT_APPROVED",
            LedgerError::TransactionNotPending => "TRANSACTION_NOT_PENDING",
            LedgerError::NotRefundable(_) => "NOT_REFUNDABLE",
            LedgerError::InvalidReceiver => "INVALID_RECEIVER",
            LedgerError::CannotTipSelf => "CANNOT_TIP_SELF",
            LedgerError::Duplicate(_) => "DUPLICATE",
            LedgerError::MissingReference => "TX_REF_MISSING",
            LedgerError::MalformedWebhook(_) => "MALFORMED_WEBHOOK",
            LedgerError::InvalidSignature => "INVALID_SIGNATURE",
            LedgerError::Gateway(_) => "GATEWAY_ERROR",
            LedgerError::ProcessingFailed(_) => "PROCESSING_FAILED",
            LedgerError::RefundFailed(_) => "REFUND_FAILED",
        }
    }
}
