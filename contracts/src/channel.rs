//! # Payment Channel Ledger
//!
//! A channel is a prepaid balance a client dedicates to one node. Usage is
//! reported against it off-chain and settled in batches, so the client does
//! not pay per minute.
//!
//! Channels are keyed by `(client, node)`: a client may hold one open
//! channel with each of any number of nodes. Records are kept after close so
//! that clients keep their rating history with the node.
//!
//! ## Nonce as version counter
//!
//! `nonce` starts at 0 and moves by exactly one per accepted settlement.
//! Settlement is a compare-and-swap on it ([`ChannelLedger::compare_and_swap`]):
//! a report names the nonce it was computed against, and it is applied only
//! if the channel is still at that version. Replays and racing relays fail
//! with [`LedgerError::NonceMismatch`] instead of double-charging.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::config::Amount;
use crate::error::{LedgerError, LedgerResult};

/// Channel lifecycle: `Closed --open--> Open --settle*--> Open --close--> Closed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentChannel {
    /// Funded but not yet spent.
    pub balance: Amount,
    /// Accepted settlements since the channel was (re)opened.
    pub nonce: u64,
    pub open: bool,
    /// Whether the client has rated the node during this incarnation.
    pub rated: bool,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLedger {
    /// `client -> (node -> channel)`.
    channels: BTreeMap<Address, BTreeMap<Address, PaymentChannel>>,
}

impl ChannelLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the channel record, open or closed.
    pub fn get(&self, client: &Address, node: &Address) -> Option<&PaymentChannel> {
        self.channels.get(client).and_then(|by_node| by_node.get(node))
    }

    /// Returns the channel if it is open.
    pub fn open_channel(&self, client: &Address, node: &Address) -> LedgerResult<&PaymentChannel> {
        match self.get(client, node) {
            Some(channel) if channel.open => Ok(channel),
            _ => Err(LedgerError::ChannelNotOpen {
                client: *client,
                node: *node,
            }),
        }
    }

    fn open_channel_mut(
        &mut self,
        client: &Address,
        node: &Address,
    ) -> LedgerResult<&mut PaymentChannel> {
        match self
            .channels
            .get_mut(client)
            .and_then(|by_node| by_node.get_mut(node))
        {
            Some(channel) if channel.open => Ok(channel),
            _ => Err(LedgerError::ChannelNotOpen {
                client: *client,
                node: *node,
            }),
        }
    }

    /// Fails with [`LedgerError::ChannelAlreadyOpen`] if the pair has an
    /// open channel.
    pub fn ensure_not_open(&self, client: &Address, node: &Address) -> LedgerResult<()> {
        if self.get(client, node).is_some_and(|c| c.open) {
            return Err(LedgerError::ChannelAlreadyOpen {
                client: *client,
                node: *node,
            });
        }
        Ok(())
    }

    /// Opens (or reopens) a channel whose funding has already been pulled.
    ///
    /// Reopening starts a fresh incarnation: nonce back to 0, rating flag
    /// cleared.
    pub fn open(&mut self, client: Address, node: Address, amount: Amount, at: DateTime<Utc>) {
        self.channels.entry(client).or_default().insert(
            node,
            PaymentChannel {
                balance: amount,
                nonce: 0,
                open: true,
                rated: false,
                opened_at: at,
                closed_at: None,
            },
        );
    }

    /// Balance the channel would hold after adding `amount`.
    pub fn topped_up_balance(
        &self,
        client: &Address,
        node: &Address,
        amount: Amount,
    ) -> LedgerResult<Amount> {
        self.open_channel(client, node)?
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow("channel balance"))
    }

    /// Writes a balance produced by [`topped_up_balance`](Self::topped_up_balance).
    /// Leaves the nonce alone.
    pub fn set_topped_up_balance(
        &mut self,
        client: &Address,
        node: &Address,
        balance: Amount,
    ) -> LedgerResult<()> {
        self.open_channel_mut(client, node)?.balance = balance;
        Ok(())
    }

    /// Applies a settlement if the channel is still at `expected_nonce`.
    ///
    /// On success the balance becomes `new_balance` and the nonce advances
    /// by one; the new nonce is returned. On mismatch nothing changes.
    pub fn compare_and_swap(
        &mut self,
        client: &Address,
        node: &Address,
        expected_nonce: u64,
        new_balance: Amount,
    ) -> LedgerResult<u64> {
        let channel = self.open_channel_mut(client, node)?;
        if channel.nonce != expected_nonce {
            return Err(LedgerError::NonceMismatch {
                expected: expected_nonce,
                actual: channel.nonce,
            });
        }
        let next = channel
            .nonce
            .checked_add(1)
            .ok_or(LedgerError::ArithmeticOverflow("channel nonce"))?;

        channel.balance = new_balance;
        channel.nonce = next;
        Ok(next)
    }

    /// Closes the channel and returns the balance to refund.
    ///
    /// The nonce is left as is; it only resets when the pair reopens.
    pub fn close(&mut self, client: &Address, node: &Address, at: DateTime<Utc>) -> LedgerResult<Amount> {
        let channel = self.open_channel_mut(client, node)?;
        let refund = channel.balance;
        channel.balance = 0;
        channel.open = false;
        channel.closed_at = Some(at);
        Ok(refund)
    }

    /// Flags the current incarnation as rated.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NoChannelHistory`] if the pair never had a channel,
    /// [`LedgerError::AlreadyRated`] if this incarnation was already rated.
    pub fn mark_rated(&mut self, client: &Address, node: &Address) -> LedgerResult<()> {
        let channel = self
            .channels
            .get_mut(client)
            .and_then(|by_node| by_node.get_mut(node))
            .ok_or(LedgerError::NoChannelHistory {
                client: *client,
                node: *node,
            })?;
        if channel.rated {
            return Err(LedgerError::AlreadyRated {
                client: *client,
                node: *node,
            });
        }
        channel.rated = true;
        Ok(())
    }

    /// Checks [`mark_rated`](Self::mark_rated) would succeed.
    pub fn ensure_can_rate(&self, client: &Address, node: &Address) -> LedgerResult<()> {
        match self.get(client, node) {
            None => Err(LedgerError::NoChannelHistory {
                client: *client,
                node: *node,
            }),
            Some(channel) if channel.rated => Err(LedgerError::AlreadyRated {
                client: *client,
                node: *node,
            }),
            Some(_) => Ok(()),
        }
    }

    /// Every channel record as `(client, node, channel)`.
    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Address, &PaymentChannel)> {
        self.channels.iter().flat_map(|(client, by_node)| {
            by_node
                .iter()
                .map(move |(node, channel)| (client, node, channel))
        })
    }

    /// Number of open channels.
    pub fn open_count(&self) -> usize {
        self.iter().filter(|(_, _, c)| c.open).count()
    }

    /// Sum of balances held by open channels.
    pub fn total_open_balance(&self) -> Amount {
        self.iter()
            .filter(|(_, _, c)| c.open)
            .fold(0u128, |acc, (_, _, c)| acc.saturating_add(c.balance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (Address, Address) {
        (Address::derive("client"), Address::derive("node"))
    }

    #[test]
    fn open_then_close_refunds_full_balance() {
        let (client, node) = pair();
        let mut ledger = ChannelLedger::new();
        ledger.open(client, node, 100, Utc::now());
        assert_eq!(ledger.open_count(), 1);
        assert_eq!(ledger.close(&client, &node, Utc::now()).unwrap(), 100);
        assert_eq!(ledger.open_count(), 0);
        assert!(!ledger.get(&client, &node).unwrap().open);
    }

    #[test]
    fn compare_and_swap_advances_nonce_once() {
        let (client, node) = pair();
        let mut ledger = ChannelLedger::new();
        ledger.open(client, node, 100, Utc::now());

        assert_eq!(ledger.compare_and_swap(&client, &node, 0, 90).unwrap(), 1);
        let err = ledger.compare_and_swap(&client, &node, 0, 80).unwrap_err();
        assert_eq!(err, LedgerError::NonceMismatch { expected: 0, actual: 1 });

        let channel = ledger.get(&client, &node).unwrap();
        assert_eq!((channel.balance, channel.nonce), (90, 1));
    }

    #[test]
    fn closed_channel_rejects_everything() {
        let (client, node) = pair();
        let mut ledger = ChannelLedger::new();
        ledger.open(client, node, 100, Utc::now());
        ledger.close(&client, &node, Utc::now()).unwrap();

        assert!(matches!(
            ledger.compare_and_swap(&client, &node, 0, 0),
            Err(LedgerError::ChannelNotOpen { .. })
        ));
        assert!(ledger.topped_up_balance(&client, &node, 1).is_err());
        assert!(ledger.close(&client, &node, Utc::now()).is_err());
    }

    #[test]
    fn reopen_resets_nonce_and_rating() {
        let (client, node) = pair();
        let mut ledger = ChannelLedger::new();
        ledger.open(client, node, 100, Utc::now());
        ledger.compare_and_swap(&client, &node, 0, 50).unwrap();
        ledger.mark_rated(&client, &node).unwrap();
        ledger.close(&client, &node, Utc::now()).unwrap();
        assert_eq!(ledger.get(&client, &node).unwrap().nonce, 1);

        ledger.open(client, node, 20, Utc::now());
        let channel = ledger.get(&client, &node).unwrap();
        assert_eq!((channel.nonce, channel.balance, channel.rated), (0, 20, false));
    }

    #[test]
    fn channels_are_per_pair() {
        let client = Address::derive("client");
        let (n1, n2) = (Address::derive("n1"), Address::derive("n2"));
        let mut ledger = ChannelLedger::new();
        ledger.open(client, n1, 10, Utc::now());
        ledger.ensure_not_open(&client, &n2).unwrap();
        ledger.open(client, n2, 15, Utc::now());
        assert!(ledger.ensure_not_open(&client, &n1).is_err());
        assert_eq!(ledger.total_open_balance(), 25);
    }

    #[test]
    fn rating_requires_history_and_is_once_per_incarnation() {
        let (client, node) = pair();
        let mut ledger = ChannelLedger::new();
        assert!(matches!(
            ledger.mark_rated(&client, &node),
            Err(LedgerError::NoChannelHistory { .. })
        ));
        ledger.open(client, node, 10, Utc::now());
        ledger.ensure_can_rate(&client, &node).unwrap();
        ledger.mark_rated(&client, &node).unwrap();
        assert!(matches!(
            ledger.ensure_can_rate(&client, &node),
            Err(LedgerError::AlreadyRated { .. })
        ));
    }
}
