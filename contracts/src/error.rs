//! Error types for the settlement ledger.
//!
//! Every ledger entry point that can fail returns a [`LedgerError`]. Each
//! variant names the precise failure; [`LedgerError::kind`] folds them into
//! the coarse [`ErrorKind`] taxonomy that callers (relay daemons, hosts)
//! branch on. A returned error always means the call had no effect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::Address;
use crate::config::Amount;

/// Coarse classification of ledger failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or out-of-range argument.
    InvalidInput,
    /// Caller lacks the role the entry point requires.
    Authorization,
    /// The entity is not in a state that allows the call.
    StateConflict,
    /// A balance, allowance, stake or channel balance is too low.
    InsufficientFunds,
    /// The ledger is paused.
    Paused,
}

/// The role an entry point demands of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Owner,
    RelayOperator,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Owner => write!(f, "owner"),
            Role::RelayOperator => write!(f, "relay operator"),
        }
    }
}

/// Errors returned by ledger operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// The endpoint IP is not a strict dotted-quad IPv4 address.
    #[error("invalid endpoint: '{0}' is not a dotted-quad IPv4 address")]
    InvalidEndpoint(String),

    /// Rating outside the accepted range.
    #[error("invalid score {score}: accepted range is [{min}, {max}]")]
    InvalidScore { score: u8, min: u8, max: u8 },

    /// A zero amount where a positive one is required.
    #[error("amount must be non-zero")]
    ZeroAmount,

    /// The zero address where a real account is required.
    #[error("the zero address cannot hold this role")]
    ZeroAddress,

    /// A usage report with no minutes.
    #[error("usage report must cover at least one minute")]
    ZeroUsage,

    /// An accumulation would exceed the integer width.
    #[error("arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),

    /// The caller does not hold the required role.
    #[error("unauthorized: {caller} is not the {required}")]
    Unauthorized { caller: Address, required: Role },

    /// A call signed as one of the ledger's own accounts (custody, faucet).
    #[error("{0} is a ledger-held account and cannot originate calls")]
    SystemAccount(Address),

    #[error("node {0} is already registered")]
    AlreadyRegistered(Address),

    #[error("node {0} is not registered")]
    NotRegistered(Address),

    /// The node has never been registered.
    #[error("unknown node {0}")]
    UnknownNode(Address),

    /// The node exists but is deregistered.
    #[error("node {0} is not active")]
    NodeNotActive(Address),

    #[error("channel {client} -> {node} is already open")]
    ChannelAlreadyOpen { client: Address, node: Address },

    #[error("channel {client} -> {node} is not open")]
    ChannelNotOpen { client: Address, node: Address },

    /// Rating a node the caller never opened a channel with.
    #[error("{client} has never opened a channel with {node}")]
    NoChannelHistory { client: Address, node: Address },

    #[error("channel {client} -> {node} has already been rated")]
    AlreadyRated { client: Address, node: Address },

    /// The report's expected nonce does not match the channel.
    #[error("nonce mismatch: report expected {expected}, channel is at {actual}")]
    NonceMismatch { expected: u64, actual: u64 },

    #[error("insufficient balance: {account} holds {available}, needs {required}")]
    InsufficientBalance {
        account: Address,
        available: Amount,
        required: Amount,
    },

    #[error("insufficient allowance: {spender} may spend {allowed} of {owner}, needs {required}")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        allowed: Amount,
        required: Amount,
    },

    #[error("insufficient stake: balance {available} below required stake {required}")]
    InsufficientStake { available: Amount, required: Amount },

    #[error("channel funding {amount} below minimum {minimum}")]
    BelowMinimumFunding { amount: Amount, minimum: Amount },

    #[error("insufficient channel balance: cost {cost}, balance {balance}")]
    InsufficientChannelBalance { cost: Amount, balance: Amount },

    /// Faucet claimed too recently.
    #[error("faucet cooldown: next claim allowed at {retry_at}")]
    FaucetCooldown { retry_at: DateTime<Utc> },

    #[error("ledger is paused")]
    ContractPaused,

    /// Claims on custody exceed what custody actually holds.
    #[error("custody violation: held {held}, claimed {claimed}")]
    CustodyViolation { held: Amount, claimed: Amount },
}

impl LedgerError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        use LedgerError::*;
        match self {
            InvalidEndpoint(_)
            | InvalidScore { .. }
            | ZeroAmount
            | ZeroAddress
            | ZeroUsage
            | ArithmeticOverflow(_) => ErrorKind::InvalidInput,
            Unauthorized { .. } | SystemAccount(_) | NoChannelHistory { .. } => {
                ErrorKind::Authorization
            }
            AlreadyRegistered(_)
            | NotRegistered(_)
            | UnknownNode(_)
            | NodeNotActive(_)
            | ChannelAlreadyOpen { .. }
            | ChannelNotOpen { .. }
            | AlreadyRated { .. }
            | NonceMismatch { .. }
            | FaucetCooldown { .. }
            | CustodyViolation { .. } => ErrorKind::StateConflict,
            InsufficientBalance { .. }
            | InsufficientAllowance { .. }
            | InsufficientStake { .. }
            | BelowMinimumFunding { .. }
            | InsufficientChannelBalance { .. } => ErrorKind::InsufficientFunds,
            ContractPaused => ErrorKind::Paused,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type LedgerResult<T> = Result<T, LedgerError>;
