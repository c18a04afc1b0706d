//! Ledger events.
//!
//! Every accepted mutation appends one [`LedgerEvent`] to the ledger's
//! queue. Hosts drain the queue after each call and forward the events to
//! logs or subscribers. Events are a notification stream, not state: they
//! are not part of the persisted snapshot.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::config::Amount;
use crate::registry::Endpoint;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEvent {
    TokensMinted {
        to: Address,
        amount: Amount,
    },
    TokensBurned {
        from: Address,
        amount: Amount,
    },
    Transfer {
        from: Address,
        to: Address,
        amount: Amount,
    },
    Approval {
        owner: Address,
        spender: Address,
        amount: Amount,
    },
    FaucetClaimed {
        to: Address,
        amount: Amount,
    },
    NodeRegistered {
        node: Address,
        endpoint: Endpoint,
        price_per_minute: Amount,
        stake: Amount,
    },
    NodeDeregistered {
        node: Address,
        refunded: Amount,
    },
    PriceUpdated {
        node: Address,
        old_price: Amount,
        new_price: Amount,
    },
    ChannelOpened {
        client: Address,
        node: Address,
        amount: Amount,
    },
    ChannelToppedUp {
        client: Address,
        node: Address,
        amount: Amount,
        balance: Amount,
    },
    ChannelClosed {
        client: Address,
        node: Address,
        refunded: Amount,
    },
    UsageSettled {
        client: Address,
        node: Address,
        minutes: u64,
        cost: Amount,
        payout: Amount,
        fee: Amount,
        nonce: u64,
    },
    NodeRated {
        client: Address,
        node: Address,
        score: u8,
        reputation: u64,
    },
    RelayOperatorAdded {
        operator: Address,
    },
    RelayOperatorRemoved {
        operator: Address,
    },
    Paused {
        by: Address,
    },
    Unpaused {
        by: Address,
    },
    OwnershipTransferred {
        previous: Address,
        new: Address,
    },
}

impl LedgerEvent {
    /// Short snake_case name, for log lines and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::TokensMinted { .. } => "tokens_minted",
            LedgerEvent::TokensBurned { .. } => "tokens_burned",
            LedgerEvent::Transfer { .. } => "transfer",
            LedgerEvent::Approval { .. } => "approval",
            LedgerEvent::FaucetClaimed { .. } => "faucet_claimed",
            LedgerEvent::NodeRegistered { .. } => "node_registered",
            LedgerEvent::NodeDeregistered { .. } => "node_deregistered",
            LedgerEvent::PriceUpdated { .. } => "price_updated",
            LedgerEvent::ChannelOpened { .. } => "channel_opened",
            LedgerEvent::ChannelToppedUp { .. } => "channel_topped_up",
            LedgerEvent::ChannelClosed { .. } => "channel_closed",
            LedgerEvent::UsageSettled { .. } => "usage_settled",
            LedgerEvent::NodeRated { .. } => "node_rated",
            LedgerEvent::RelayOperatorAdded { .. } => "relay_operator_added",
            LedgerEvent::RelayOperatorRemoved { .. } => "relay_operator_removed",
            LedgerEvent::Paused { .. } => "paused",
            LedgerEvent::Unpaused { .. } => "unpaused",
            LedgerEvent::OwnershipTransferred { .. } => "ownership_transferred",
        }
    }
}
