//! # ClearNet Contracts
//!
//! The settlement core of the ClearNet bandwidth marketplace. Nodes stake
//! CLR to list service, clients fund per-node payment channels, and relay
//! operators report usage that debits channels and pays nodes.
//!
//! - **Token Ledger** ([`token`]): the CLR balance store every other
//!   component moves funds through.
//! - **Node Registry** ([`registry`]): staked providers, pricing, counters
//!   and reputation.
//! - **Payment Channels** ([`channel`]): prepaid `(client, node)` balances
//!   with a nonce that turns settlement into a compare-and-swap.
//! - **Settlement & Access Control** ([`settlement`], [`access`]): relay
//!   gated usage reports, ratings, pause and ownership.
//!
//! [`ClearNet`] composes them. It is a plain value: hosts run it behind a
//! [`SerialExecutor`], persist it with [`LedgerStore`] and feed it
//! [`LedgerCall`]s.
//!
//! ## Design Principles
//!
//! 1. Amounts are `u128` with 18 decimals; all accumulation is checked.
//! 2. Every entry point validates before its first write. A rejected call
//!    changes nothing.
//! 3. Custody holds exactly the stakes, channel balances and treasury it
//!    backs.
//! 4. Every public type is serializable (serde) for call logs and snapshots.

pub mod access;
pub mod address;
pub mod call;
pub mod channel;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod faucet;
pub mod ledger;
pub mod registry;
pub mod settlement;
pub mod storage;
pub mod token;

pub use address::Address;
pub use call::{CallOutcome, LedgerCall};
pub use config::{Amount, LedgerConfig};
pub use error::{ErrorKind, LedgerError, LedgerResult};
pub use events::LedgerEvent;
pub use executor::SerialExecutor;
pub use ledger::{CallContext, ClearNet, ContractStats, CustodyReport};
pub use settlement::{SettlementReceipt, UsageReport};
pub use storage::{LedgerStore, StoreError};
