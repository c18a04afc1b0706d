//! Typed entry-point dispatch.
//!
//! [`LedgerCall`] names every mutating entry point with its arguments, so a
//! sequence of calls can be written to a log, shipped to a host and replayed
//! against a ledger with [`ClearNet::execute`]. The JSON form is externally
//! tagged:
//!
//! ```json
//! { "settle_usage": { "client": "0x…", "node": "0x…", "minutes_used": 60, "expected_nonce": 0 } }
//! ```

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::config::Amount;
use crate::error::LedgerResult;
use crate::ledger::{CallContext, ClearNet};
use crate::settlement::{SettlementReceipt, UsageReport};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerCall {
    Mint { to: Address, amount: Amount },
    Burn { amount: Amount },
    Transfer { to: Address, amount: Amount },
    Approve { spender: Address, amount: Amount },
    TransferFrom { owner: Address, to: Address, amount: Amount },
    ClaimFaucet,
    RegisterNode { ip: String, port: u16, price_per_minute: Amount },
    DeregisterNode,
    UpdatePrice { price_per_minute: Amount },
    OpenPaymentChannel { node: Address, amount: Amount },
    TopUpChannel { node: Address, amount: Amount },
    ClosePaymentChannel { node: Address },
    SettleUsage(UsageReport),
    RateNode { node: Address, score: u8 },
    AddRelayOperator { operator: Address },
    RemoveRelayOperator { operator: Address },
    Pause,
    Unpause,
    TransferOwnership { new_owner: Address },
}

impl LedgerCall {
    /// Entry-point name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            LedgerCall::Mint { .. } => "mint",
            LedgerCall::Burn { .. } => "burn",
            LedgerCall::Transfer { .. } => "transfer",
            LedgerCall::Approve { .. } => "approve",
            LedgerCall::TransferFrom { .. } => "transfer_from",
            LedgerCall::ClaimFaucet => "claim_faucet",
            LedgerCall::RegisterNode { .. } => "register_node",
            LedgerCall::DeregisterNode => "deregister_node",
            LedgerCall::UpdatePrice { .. } => "update_price",
            LedgerCall::OpenPaymentChannel { .. } => "open_payment_channel",
            LedgerCall::TopUpChannel { .. } => "top_up_channel",
            LedgerCall::ClosePaymentChannel { .. } => "close_payment_channel",
            LedgerCall::SettleUsage(_) => "settle_usage",
            LedgerCall::RateNode { .. } => "rate_node",
            LedgerCall::AddRelayOperator { .. } => "add_relay_operator",
            LedgerCall::RemoveRelayOperator { .. } => "remove_relay_operator",
            LedgerCall::Pause => "pause",
            LedgerCall::Unpause => "unpause",
            LedgerCall::TransferOwnership { .. } => "transfer_ownership",
        }
    }
}

/// What an accepted call returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Unit,
    /// An amount paid out or now held: faucet claim, refund, new balance.
    Amount(Amount),
    Reputation(u64),
    Settled(SettlementReceipt),
}

impl ClearNet {
    /// Runs one call to completion.
    pub fn execute(&mut self, ctx: &CallContext, call: LedgerCall) -> LedgerResult<CallOutcome> {
        let outcome = match call {
            LedgerCall::Mint { to, amount } => {
                self.mint(ctx, to, amount)?;
                CallOutcome::Unit
            }
            LedgerCall::Burn { amount } => {
                self.burn(ctx, amount)?;
                CallOutcome::Unit
            }
            LedgerCall::Transfer { to, amount } => {
                self.transfer(ctx, to, amount)?;
                CallOutcome::Unit
            }
            LedgerCall::Approve { spender, amount } => {
                self.approve(ctx, spender, amount)?;
                CallOutcome::Unit
            }
            LedgerCall::TransferFrom { owner, to, amount } => {
                self.transfer_from(ctx, owner, to, amount)?;
                CallOutcome::Unit
            }
            LedgerCall::ClaimFaucet => CallOutcome::Amount(self.claim_faucet(ctx)?),
            LedgerCall::RegisterNode {
                ip,
                port,
                price_per_minute,
            } => {
                self.register_node(ctx, &ip, port, price_per_minute)?;
                CallOutcome::Unit
            }
            LedgerCall::DeregisterNode => CallOutcome::Amount(self.deregister_node(ctx)?),
            LedgerCall::UpdatePrice { price_per_minute } => {
                self.update_price(ctx, price_per_minute)?;
                CallOutcome::Unit
            }
            LedgerCall::OpenPaymentChannel { node, amount } => {
                self.open_payment_channel(ctx, node, amount)?;
                CallOutcome::Unit
            }
            LedgerCall::TopUpChannel { node, amount } => {
                CallOutcome::Amount(self.top_up_channel(ctx, node, amount)?)
            }
            LedgerCall::ClosePaymentChannel { node } => {
                CallOutcome::Amount(self.close_payment_channel(ctx, node)?)
            }
            LedgerCall::SettleUsage(report) => CallOutcome::Settled(self.settle_report(ctx, report)?),
            LedgerCall::RateNode { node, score } => {
                CallOutcome::Reputation(self.rate_node(ctx, node, score)?)
            }
            LedgerCall::AddRelayOperator { operator } => {
                self.add_relay_operator(ctx, operator)?;
                CallOutcome::Unit
            }
            LedgerCall::RemoveRelayOperator { operator } => {
                self.remove_relay_operator(ctx, operator)?;
                CallOutcome::Unit
            }
            LedgerCall::Pause => {
                self.pause(ctx)?;
                CallOutcome::Unit
            }
            LedgerCall::Unpause => {
                self.unpause(ctx)?;
                CallOutcome::Unit
            }
            LedgerCall::TransferOwnership { new_owner } => {
                self.transfer_ownership(ctx, new_owner)?;
                CallOutcome::Unit
            }
        };
        Ok(outcome)
    }
}
