//! # Node Registry
//!
//! Tracks staked service providers: where to reach them, what they charge,
//! how much collateral they have locked, and how they have performed.
//!
//! Node records live in an arena keyed by operator address and are never
//! removed; deregistration only flips `active` and releases the stake, so
//! lifetime counters survive and historical cost queries keep working.
//! Membership of the active set is tracked separately by [`ActiveIndex`],
//! which preserves registration order.
//!
//! The registry does not move funds. Stake pulls and refunds are done by
//! the ledger against the token ledger; this module only records claims.

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::config::{Amount, REPUTATION_SCALE};
use crate::error::{LedgerError, LedgerResult};

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// Network location of a node's service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl Endpoint {
    /// Validates `ip` as a strict dotted quad and pairs it with `port`.
    pub fn parse(ip: &str, port: u16) -> LedgerResult<Self> {
        let ip = parse_dotted_quad(ip).ok_or_else(|| LedgerError::InvalidEndpoint(ip.to_string()))?;
        Ok(Self { ip, port })
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Parses exactly four `.`-separated decimal octets, each 0..=255.
///
/// Rejects empty segments, signs, whitespace, non-digits, leading zeros
/// (`"01"`) and anything that is not four segments long.
pub fn parse_dotted_quad(s: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut segments = s.split('.');

    for octet in octets.iter_mut() {
        let segment = segments.next()?;
        if segment.is_empty() || segment.len() > 3 {
            return None;
        }
        if !segment.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if segment.len() > 1 && segment.starts_with('0') {
            return None;
        }
        let value: u16 = segment.parse().ok()?;
        *octet = u8::try_from(value).ok()?;
    }

    if segments.next().is_some() {
        return None;
    }
    Some(Ipv4Addr::from(octets))
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A service provider's record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Operator address; also the registry key.
    pub operator: Address,
    pub endpoint: Endpoint,
    pub active: bool,
    /// Collateral currently locked. Zero once deregistered.
    pub stake: Amount,
    pub price_per_minute: Amount,
    /// Fixed-point score, scaled by [`REPUTATION_SCALE`].
    pub reputation: u64,
    pub total_minutes_served: u64,
    pub total_earnings: Amount,
    /// Time of the last settlement against this node.
    pub last_activity: Option<DateTime<Utc>>,
    pub rating_sum: u64,
    pub rating_count: u64,
    /// Time of the most recent registration.
    pub registered_at: DateTime<Utc>,
}

/// Parameters for a registration the ledger has already paid for.
#[derive(Debug, Clone, Copy)]
pub struct Registration {
    pub operator: Address,
    pub endpoint: Endpoint,
    pub price_per_minute: Amount,
    pub stake: Amount,
    pub initial_reputation: u64,
    pub at: DateTime<Utc>,
}

/// Node counters after a settlement, computed before anything is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageTotals {
    pub total_minutes_served: u64,
    pub total_earnings: Amount,
}

/// Reputation as a running average of all ratings plus the initial score
/// counted as one virtual rating, clamped to `[min, max]`.
///
/// Ratings are whole stars; each contributes `score * REPUTATION_SCALE`.
pub fn blended_reputation(
    initial: u64,
    rating_sum: u64,
    rating_count: u64,
    min: u64,
    max: u64,
) -> u64 {
    let numerator = u128::from(initial) + u128::from(rating_sum) * u128::from(REPUTATION_SCALE);
    let denominator = u128::from(rating_count) + 1;
    let average = u64::try_from(numerator / denominator).unwrap_or(u64::MAX);
    average.clamp(min, max)
}

// ---------------------------------------------------------------------------
// ActiveIndex
// ---------------------------------------------------------------------------

/// Tombstones tolerated beyond the live count before compacting.
const COMPACTION_SLACK: usize = 16;

/// Ordered set of active operators.
///
/// Removal leaves a tombstone instead of shifting, so it is O(1) and the
/// survivors keep their registration order. The slot vector is compacted
/// once tombstones outnumber live entries (plus a small slack), which keeps
/// iteration O(active count) amortized. Serialized as the plain ordered
/// list of live entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Address>", into = "Vec<Address>")]
pub struct ActiveIndex {
    slots: Vec<Option<Address>>,
    position: HashMap<Address, usize>,
    live: usize,
}

impl ActiveIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `address`. Returns `false` if it is already present.
    pub fn insert(&mut self, address: Address) -> bool {
        if self.position.contains_key(&address) {
            return false;
        }
        self.position.insert(address, self.slots.len());
        self.slots.push(Some(address));
        self.live += 1;
        true
    }

    /// Removes `address`. Returns `false` if it was not present.
    pub fn remove(&mut self, address: &Address) -> bool {
        let Some(idx) = self.position.remove(address) else {
            return false;
        };
        self.slots[idx] = None;
        self.live -= 1;

        if self.slots.len() > 2 * self.live + COMPACTION_SLACK {
            self.compact();
        }
        true
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.position.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Live entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.slots.iter().flatten()
    }

    /// Number of slots including tombstones.
    pub fn capacity_used(&self) -> usize {
        self.slots.len()
    }

    fn compact(&mut self) {
        self.slots.retain(Option::is_some);
        self.position.clear();
        for (idx, slot) in self.slots.iter().enumerate() {
            if let Some(address) = slot {
                self.position.insert(*address, idx);
            }
        }
    }
}

impl PartialEq for ActiveIndex {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for ActiveIndex {}

impl From<Vec<Address>> for ActiveIndex {
    fn from(addresses: Vec<Address>) -> Self {
        let mut index = ActiveIndex::new();
        for address in addresses {
            index.insert(address);
        }
        index
    }
}

impl From<ActiveIndex> for Vec<Address> {
    fn from(index: ActiveIndex) -> Self {
        index.iter().copied().collect()
    }
}

// ---------------------------------------------------------------------------
// NodeRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRegistry {
    /// Every node ever registered, keyed by operator.
    nodes: BTreeMap<Address, Node>,
    active: ActiveIndex,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails with [`LedgerError::AlreadyRegistered`] if `operator` is active.
    pub fn ensure_not_active(&self, operator: &Address) -> LedgerResult<()> {
        if self.active.contains(operator) {
            return Err(LedgerError::AlreadyRegistered(*operator));
        }
        Ok(())
    }

    /// Returns the node if it is registered and active.
    pub fn active_node(&self, operator: &Address) -> LedgerResult<&Node> {
        match self.nodes.get(operator) {
            Some(node) if node.active => Ok(node),
            Some(_) => Err(LedgerError::NodeNotActive(*operator)),
            None => Err(LedgerError::UnknownNode(*operator)),
        }
    }

    /// Records a paid-for registration.
    ///
    /// A returning operator keeps its lifetime counters and reputation;
    /// endpoint, price and stake are replaced.
    pub fn activate(&mut self, reg: Registration) {
        self.nodes
            .entry(reg.operator)
            .and_modify(|node| {
                node.endpoint = reg.endpoint;
                node.price_per_minute = reg.price_per_minute;
                node.stake = reg.stake;
                node.active = true;
                node.registered_at = reg.at;
            })
            .or_insert_with(|| Node {
                operator: reg.operator,
                endpoint: reg.endpoint,
                active: true,
                stake: reg.stake,
                price_per_minute: reg.price_per_minute,
                reputation: reg.initial_reputation,
                total_minutes_served: 0,
                total_earnings: 0,
                last_activity: None,
                rating_sum: 0,
                rating_count: 0,
                registered_at: reg.at,
            });
        self.active.insert(reg.operator);
    }

    /// Returns the stake a deregistration would release.
    pub fn releasable_stake(&self, operator: &Address) -> LedgerResult<Amount> {
        match self.nodes.get(operator) {
            Some(node) if node.active => Ok(node.stake),
            _ => Err(LedgerError::NotRegistered(*operator)),
        }
    }

    /// Marks the node inactive, zeroes its stake and drops it from the
    /// active index. Returns the released stake.
    pub fn deactivate(&mut self, operator: &Address) -> LedgerResult<Amount> {
        let node = match self.nodes.get_mut(operator) {
            Some(node) if node.active => node,
            _ => return Err(LedgerError::NotRegistered(*operator)),
        };
        let stake = node.stake;
        node.active = false;
        node.stake = 0;
        self.active.remove(operator);
        Ok(stake)
    }

    pub fn get(&self, operator: &Address) -> Option<&Node> {
        self.nodes.get(operator)
    }

    /// Active operators in registration order.
    pub fn active_nodes(&self) -> Vec<Address> {
        self.active.iter().copied().collect()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// All records, active or not.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// `price_per_minute * minutes` for any node ever registered.
    pub fn calculate_cost(&self, operator: &Address, minutes: u64) -> LedgerResult<Amount> {
        let node = self
            .nodes
            .get(operator)
            .ok_or(LedgerError::UnknownNode(*operator))?;
        node.price_per_minute
            .checked_mul(Amount::from(minutes))
            .ok_or(LedgerError::ArithmeticOverflow("usage cost"))
    }

    /// Sets a new per-minute price on an active node.
    pub fn update_price(&mut self, operator: &Address, price_per_minute: Amount) -> LedgerResult<Amount> {
        let node = match self.nodes.get_mut(operator) {
            Some(node) if node.active => node,
            _ => return Err(LedgerError::NotRegistered(*operator)),
        };
        let old = node.price_per_minute;
        node.price_per_minute = price_per_minute;
        Ok(old)
    }

    /// Computes the node's counters after serving `minutes` for `payout`,
    /// without writing them.
    pub fn usage_totals(
        &self,
        operator: &Address,
        minutes: u64,
        payout: Amount,
    ) -> LedgerResult<UsageTotals> {
        let node = self
            .nodes
            .get(operator)
            .ok_or(LedgerError::UnknownNode(*operator))?;
        Ok(UsageTotals {
            total_minutes_served: node
                .total_minutes_served
                .checked_add(minutes)
                .ok_or(LedgerError::ArithmeticOverflow("minutes served"))?,
            total_earnings: node
                .total_earnings
                .checked_add(payout)
                .ok_or(LedgerError::ArithmeticOverflow("node earnings"))?,
        })
    }

    /// Writes counters produced by [`usage_totals`](Self::usage_totals).
    pub fn commit_usage(&mut self, operator: &Address, totals: UsageTotals, at: DateTime<Utc>) {
        if let Some(node) = self.nodes.get_mut(operator) {
            node.total_minutes_served = totals.total_minutes_served;
            node.total_earnings = totals.total_earnings;
            node.last_activity = Some(at);
        }
    }

    /// Adds a rating and recomputes reputation. Returns the new reputation.
    pub fn record_rating(
        &mut self,
        operator: &Address,
        score: u8,
        initial: u64,
        bounds: (u64, u64),
    ) -> LedgerResult<u64> {
        let node = self
            .nodes
            .get_mut(operator)
            .ok_or(LedgerError::UnknownNode(*operator))?;

        let rating_sum = node
            .rating_sum
            .checked_add(u64::from(score))
            .ok_or(LedgerError::ArithmeticOverflow("rating sum"))?;
        let rating_count = node
            .rating_count
            .checked_add(1)
            .ok_or(LedgerError::ArithmeticOverflow("rating count"))?;

        node.rating_sum = rating_sum;
        node.rating_count = rating_count;
        node.reputation = blended_reputation(initial, rating_sum, rating_count, bounds.0, bounds.1);
        Ok(node.reputation)
    }

    /// Sum of stakes held by active nodes.
    pub fn total_active_stake(&self) -> Amount {
        self.nodes
            .values()
            .filter(|n| n.active)
            .fold(0u128, |acc, n| acc.saturating_add(n.stake))
    }

    /// Minutes served across every node ever registered.
    pub fn total_minutes_served(&self) -> u128 {
        self.nodes
            .values()
            .map(|n| u128::from(n.total_minutes_served))
            .sum()
    }
}
