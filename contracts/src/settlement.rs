//! # Settlement
//!
//! Relay operators report minutes a client consumed on a node; settlement
//! turns each report into a debit on the channel, a payout to the node and
//! a fee for the treasury.
//!
//! ## Report lifecycle
//!
//! ```text
//!   relay computes report against channel nonce N
//!        |
//!        v
//!   settle_usage(client, node, minutes, N)
//!        |
//!        +-- channel.nonce != N ----> NonceMismatch (no state change)
//!        |
//!        +-- cost > balance --------> InsufficientChannelBalance
//!        |
//!        v
//!   balance -= cost, nonce = N + 1
//!   node paid `cost - fee`, treasury += fee
//! ```
//!
//! The fee is `floor(cost * fee_bps / 10_000)`; rounding favours the node.
//!
//! Ratings live here too: a client that has held a channel with a node may
//! rate it once per channel incarnation.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::address::Address;
use crate::config::{Amount, BPS_DENOMINATOR};
use crate::error::{LedgerError, LedgerResult};
use crate::events::LedgerEvent;
use crate::ledger::{CallContext, ClearNet};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A usage report as submitted by a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReport {
    pub client: Address,
    pub node: Address,
    pub minutes_used: u64,
    /// Channel nonce the report was computed against.
    pub expected_nonce: u64,
}

/// How a settled cost divides between node and treasury.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub payout: Amount,
    pub fee: Amount,
}

/// Splits `cost` into a node payout and a protocol fee of `fee_bps` basis
/// points, rounding the fee down.
///
/// `fee_bps` above [`BPS_DENOMINATOR`] is treated as 100 %.
pub fn split_fee(cost: Amount, fee_bps: u32) -> FeeSplit {
    let bps = Amount::from(fee_bps.min(BPS_DENOMINATOR));
    let denom = Amount::from(BPS_DENOMINATOR);
    // Split the multiplication so `cost * bps` cannot overflow.
    let fee = (cost / denom) * bps + (cost % denom) * bps / denom;
    FeeSplit {
        payout: cost - fee,
        fee,
    }
}

/// Result of an accepted settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub client: Address,
    pub node: Address,
    pub minutes: u64,
    pub cost: Amount,
    pub payout: Amount,
    pub fee: Amount,
    /// Channel nonce after the settlement; the next report must carry it.
    pub nonce: u64,
    /// Channel balance after the debit.
    pub remaining_balance: Amount,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

impl ClearNet {
    /// Applies a usage report. Relay operators only.
    ///
    /// # Errors
    ///
    /// In check order: [`LedgerError::ContractPaused`],
    /// [`LedgerError::Unauthorized`], [`LedgerError::ZeroUsage`],
    /// [`LedgerError::ChannelNotOpen`], [`LedgerError::NonceMismatch`],
    /// [`LedgerError::UnknownNode`] / [`LedgerError::ArithmeticOverflow`]
    /// from pricing, [`LedgerError::InsufficientChannelBalance`].
    pub fn settle_usage(
        &mut self,
        ctx: &CallContext,
        client: Address,
        node: Address,
        minutes_used: u64,
        expected_nonce: u64,
    ) -> LedgerResult<SettlementReceipt> {
        self.access.ensure_not_paused()?;
        if let Err(err) = self.access.require_relay_operator(&ctx.sender) {
            warn!(caller = %ctx.sender, client = %client, node = %node, "settlement from non-relay rejected");
            return Err(err);
        }
        if minutes_used == 0 {
            return Err(LedgerError::ZeroUsage);
        }

        let channel = self.channels.open_channel(&client, &node)?;
        if channel.nonce != expected_nonce {
            warn!(
                relay = %ctx.sender,
                client = %client,
                node = %node,
                expected = expected_nonce,
                actual = channel.nonce,
                "stale usage report rejected"
            );
            return Err(LedgerError::NonceMismatch {
                expected: expected_nonce,
                actual: channel.nonce,
            });
        }
        let balance = channel.balance;

        let cost = self.registry.calculate_cost(&node, minutes_used)?;
        if cost > balance {
            return Err(LedgerError::InsufficientChannelBalance { cost, balance });
        }

        let split = split_fee(cost, self.config.protocol_fee_bps);
        let totals = self.registry.usage_totals(&node, minutes_used, split.payout)?;
        let treasury = self
            .treasury
            .checked_add(split.fee)
            .ok_or(LedgerError::ArithmeticOverflow("treasury"))?;
        self.token.check_transfer(&self.custody, &node, split.payout)?;

        let remaining_balance = balance - cost;
        let nonce = self
            .channels
            .compare_and_swap(&client, &node, expected_nonce, remaining_balance)?;
        self.token.transfer(&self.custody, &node, split.payout)?;
        self.registry.commit_usage(&node, totals, ctx.timestamp);
        self.treasury = treasury;

        info!(
            relay = %ctx.sender,
            client = %client,
            node = %node,
            minutes = minutes_used,
            cost = %cost,
            fee = %split.fee,
            nonce,
            "usage settled"
        );
        self.emit(LedgerEvent::UsageSettled {
            client,
            node,
            minutes: minutes_used,
            cost,
            payout: split.payout,
            fee: split.fee,
            nonce,
        });

        Ok(SettlementReceipt {
            client,
            node,
            minutes: minutes_used,
            cost,
            payout: split.payout,
            fee: split.fee,
            nonce,
            remaining_balance,
        })
    }

    /// [`settle_usage`](Self::settle_usage) taking a [`UsageReport`].
    pub fn settle_report(
        &mut self,
        ctx: &CallContext,
        report: UsageReport,
    ) -> LedgerResult<SettlementReceipt> {
        self.settle_usage(
            ctx,
            report.client,
            report.node,
            report.minutes_used,
            report.expected_nonce,
        )
    }

    /// Rates `node` on behalf of the caller. Returns the node's new
    /// reputation.
    ///
    /// The caller must have (or have had) a channel with the node, and may
    /// rate once per channel incarnation.
    pub fn rate_node(&mut self, ctx: &CallContext, node: Address, score: u8) -> LedgerResult<u64> {
        self.access.ensure_not_paused()?;
        let (min, max) = (self.config.min_rating, self.config.max_rating);
        if score < min || score > max {
            return Err(LedgerError::InvalidScore { score, min, max });
        }
        if self.registry.get(&node).is_none() {
            return Err(LedgerError::UnknownNode(node));
        }
        self.channels.ensure_can_rate(&ctx.sender, &node)?;

        let reputation = self.registry.record_rating(
            &node,
            score,
            self.config.initial_reputation,
            (self.config.min_reputation, self.config.max_reputation),
        )?;
        self.channels.mark_rated(&ctx.sender, &node)?;

        info!(client = %ctx.sender, node = %node, score, reputation, "node rated");
        self.emit(LedgerEvent::NodeRated {
            client: ctx.sender,
            node,
            score,
            reputation,
        });
        Ok(reputation)
    }
}
