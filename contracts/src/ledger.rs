//! # ClearNet Ledger
//!
//! [`ClearNet`] composes the token ledger, node registry, channel ledger,
//! access control and treasury into one state machine and exposes the
//! entry points external collaborators call.
//!
//! ## Execution model
//!
//! Calls are assumed to arrive strictly ordered from a single writer; each
//! runs to completion before the next is observed. Every entry point checks
//! all of its preconditions before its first write, and the writes that
//! follow cannot fail, so a rejected call leaves no trace. In particular a
//! fund pull is never followed by a failing step: stake is not taken
//! without a node being created.
//!
//! ## Custody
//!
//! Stakes, open channel balances and the treasury are all held by one
//! token account, [`ClearNet::custody_address`]. Settlement pays the node's
//! share out of custody immediately and keeps the fee, so custody always
//! equals the sum of outstanding claims ([`ClearNet::custody_report`]).
//!
//! Settlement, rating and access-control entry points are implemented in
//! [`crate::settlement`] and [`crate::access`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::access::AccessControl;
use crate::address::Address;
use crate::channel::{ChannelLedger, PaymentChannel};
use crate::config::{Amount, ConfigError, LedgerConfig, CUSTODY_ACCOUNT_LABEL};
use crate::error::{LedgerError, LedgerResult};
use crate::events::LedgerEvent;
use crate::faucet::Faucet;
use crate::registry::{Endpoint, Node, NodeRegistry, Registration};
use crate::token::TokenLedger;

// ---------------------------------------------------------------------------
// Call context
// ---------------------------------------------------------------------------

/// Who is calling, and when.
///
/// Supplied by the execution environment. The ledger never reads the wall
/// clock itself, so replaying the same calls yields the same state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    pub sender: Address,
    pub timestamp: DateTime<Utc>,
}

impl CallContext {
    pub fn new(sender: Address, timestamp: DateTime<Utc>) -> Self {
        Self { sender, timestamp }
    }

    /// Context stamped with the current wall-clock time.
    pub fn now(sender: Address) -> Self {
        Self::new(sender, Utc::now())
    }
}

// ---------------------------------------------------------------------------
// Read models
// ---------------------------------------------------------------------------

/// Aggregate counters, all derived from per-entity records on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractStats {
    pub total_active_nodes: u64,
    pub total_open_channels: u64,
    pub total_minutes: u128,
    pub treasury_balance: Amount,
}

/// Custody balance against the claims it backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyReport {
    /// Token balance of the custody account.
    pub held: Amount,
    pub active_stake: Amount,
    pub open_channel_balance: Amount,
    pub treasury: Amount,
}

impl CustodyReport {
    /// Sum of all claims on custody.
    pub fn claimed(&self) -> Amount {
        self.active_stake
            .saturating_add(self.open_channel_balance)
            .saturating_add(self.treasury)
    }

    /// `held >= claimed`.
    pub fn is_solvent(&self) -> bool {
        self.held >= self.claimed()
    }
}

// ---------------------------------------------------------------------------
// ClearNet
// ---------------------------------------------------------------------------

/// The settlement ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearNet {
    pub(crate) config: LedgerConfig,
    pub(crate) custody: Address,
    pub(crate) token: TokenLedger,
    pub(crate) faucet: Faucet,
    pub(crate) registry: NodeRegistry,
    pub(crate) channels: ChannelLedger,
    pub(crate) access: AccessControl,
    pub(crate) treasury: Amount,
    #[serde(skip)]
    pub(crate) events: Vec<LedgerEvent>,
}

impl ClearNet {
    /// Creates a ledger owned by `owner`, who also receives the token's
    /// initial supply.
    pub fn new(owner: Address, config: LedgerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let token = TokenLedger::new(owner, config.initial_supply);
        let faucet = Faucet::new(&config);
        info!(owner = %owner, supply = %config.initial_supply, "ledger created");

        Ok(Self {
            custody: Address::derive(CUSTODY_ACCOUNT_LABEL),
            token,
            faucet,
            registry: NodeRegistry::new(),
            channels: ChannelLedger::new(),
            access: AccessControl::new(owner),
            treasury: 0,
            events: Vec::new(),
            config,
        })
    }

    pub(crate) fn emit(&mut self, event: LedgerEvent) {
        debug!(event = event.name(), "ledger event");
        self.events.push(event);
    }

    /// Rejects calls whose sender is the custody or faucet account. Their
    /// balances move only through the ledger's own bookkeeping.
    fn ensure_external_sender(&self, ctx: &CallContext) -> LedgerResult<()> {
        if ctx.sender == self.custody || ctx.sender == self.faucet.account() {
            warn!(sender = %ctx.sender, "call from ledger-held account rejected");
            return Err(LedgerError::SystemAccount(ctx.sender));
        }
        Ok(())
    }

    // -- Token entry points -------------------------------------------------

    /// Mints new tokens. Owner of the token only.
    pub fn mint(&mut self, ctx: &CallContext, to: Address, amount: Amount) -> LedgerResult<()> {
        self.token.mint(&ctx.sender, &to, amount)?;
        self.emit(LedgerEvent::TokensMinted { to, amount });
        Ok(())
    }

    /// Burns the caller's own tokens.
    pub fn burn(&mut self, ctx: &CallContext, amount: Amount) -> LedgerResult<()> {
        self.ensure_external_sender(ctx)?;
        self.token.burn(&ctx.sender, amount)?;
        self.emit(LedgerEvent::TokensBurned {
            from: ctx.sender,
            amount,
        });
        Ok(())
    }

    pub fn transfer(&mut self, ctx: &CallContext, to: Address, amount: Amount) -> LedgerResult<()> {
        self.ensure_external_sender(ctx)?;
        self.token.transfer(&ctx.sender, &to, amount)?;
        self.emit(LedgerEvent::Transfer {
            from: ctx.sender,
            to,
            amount,
        });
        Ok(())
    }

    pub fn approve(&mut self, ctx: &CallContext, spender: Address, amount: Amount) -> LedgerResult<()> {
        self.ensure_external_sender(ctx)?;
        self.token.approve(&ctx.sender, &spender, amount);
        self.emit(LedgerEvent::Approval {
            owner: ctx.sender,
            spender,
            amount,
        });
        Ok(())
    }

    pub fn transfer_from(
        &mut self,
        ctx: &CallContext,
        owner: Address,
        to: Address,
        amount: Amount,
    ) -> LedgerResult<()> {
        self.ensure_external_sender(ctx)?;
        self.token.transfer_from(&ctx.sender, &owner, &to, amount)?;
        self.emit(LedgerEvent::Transfer {
            from: owner,
            to,
            amount,
        });
        Ok(())
    }

    /// Pays the caller one faucet claim.
    pub fn claim_faucet(&mut self, ctx: &CallContext) -> LedgerResult<Amount> {
        self.ensure_external_sender(ctx)?;
        let amount = self.faucet.claim(&mut self.token, &ctx.sender, ctx.timestamp)?;
        self.emit(LedgerEvent::FaucetClaimed {
            to: ctx.sender,
            amount,
        });
        Ok(amount)
    }

    // -- Node registry entry points -----------------------------------------

    /// Registers the caller as a node, pulling the minimum stake.
    ///
    /// The caller must have approved the custody account for at least the
    /// stake.
    ///
    /// # Errors
    ///
    /// In check order: [`LedgerError::ContractPaused`],
    /// [`LedgerError::InvalidEndpoint`], [`LedgerError::AlreadyRegistered`],
    /// [`LedgerError::InsufficientStake`], then
    /// [`LedgerError::InsufficientAllowance`] from the pull.
    pub fn register_node(
        &mut self,
        ctx: &CallContext,
        ip: &str,
        port: u16,
        price_per_minute: Amount,
    ) -> LedgerResult<()> {
        self.access.ensure_not_paused()?;
        let endpoint = Endpoint::parse(ip, port)?;
        self.registry.ensure_not_active(&ctx.sender)?;

        let stake = self.config.min_stake;
        let available = self.token.balance_of(&ctx.sender);
        if available < stake {
            return Err(LedgerError::InsufficientStake {
                available,
                required: stake,
            });
        }

        self.token
            .transfer_from(&self.custody, &ctx.sender, &self.custody, stake)?;
        self.registry.activate(Registration {
            operator: ctx.sender,
            endpoint,
            price_per_minute,
            stake,
            initial_reputation: self.config.initial_reputation,
            at: ctx.timestamp,
        });

        info!(node = %ctx.sender, %endpoint, price_per_minute = %price_per_minute, "node registered");
        self.emit(LedgerEvent::NodeRegistered {
            node: ctx.sender,
            endpoint,
            price_per_minute,
            stake,
        });
        Ok(())
    }

    /// Deregisters the caller's node and refunds its stake. Channels that
    /// reference the node stay open until their clients close them.
    pub fn deregister_node(&mut self, ctx: &CallContext) -> LedgerResult<Amount> {
        self.access.ensure_not_paused()?;
        let stake = self.registry.releasable_stake(&ctx.sender)?;

        self.token.transfer(&self.custody, &ctx.sender, stake)?;
        self.registry.deactivate(&ctx.sender)?;

        info!(node = %ctx.sender, refunded = %stake, "node deregistered");
        self.emit(LedgerEvent::NodeDeregistered {
            node: ctx.sender,
            refunded: stake,
        });
        Ok(stake)
    }

    /// Changes the caller's per-minute price for future settlements.
    pub fn update_price(&mut self, ctx: &CallContext, price_per_minute: Amount) -> LedgerResult<()> {
        self.access.ensure_not_paused()?;
        let old_price = self.registry.update_price(&ctx.sender, price_per_minute)?;

        info!(node = %ctx.sender, old_price = %old_price, new_price = %price_per_minute, "price updated");
        self.emit(LedgerEvent::PriceUpdated {
            node: ctx.sender,
            old_price,
            new_price: price_per_minute,
        });
        Ok(())
    }

    // -- Payment channel entry points ---------------------------------------

    /// Opens a channel from the caller to `node`, funded with `amount`.
    ///
    /// # Errors
    ///
    /// In check order: [`LedgerError::ContractPaused`],
    /// [`LedgerError::BelowMinimumFunding`], [`LedgerError::UnknownNode`] /
    /// [`LedgerError::NodeNotActive`], [`LedgerError::ChannelAlreadyOpen`],
    /// then [`LedgerError::InsufficientBalance`] /
    /// [`LedgerError::InsufficientAllowance`] from the pull.
    pub fn open_payment_channel(
        &mut self,
        ctx: &CallContext,
        node: Address,
        amount: Amount,
    ) -> LedgerResult<()> {
        self.access.ensure_not_paused()?;
        let minimum = self.config.min_channel_amount;
        if amount < minimum {
            return Err(LedgerError::BelowMinimumFunding { amount, minimum });
        }
        self.registry.active_node(&node)?;
        self.channels.ensure_not_open(&ctx.sender, &node)?;

        self.token
            .transfer_from(&self.custody, &ctx.sender, &self.custody, amount)?;
        self.channels.open(ctx.sender, node, amount, ctx.timestamp);

        info!(client = %ctx.sender, node = %node, amount = %amount, "channel opened");
        self.emit(LedgerEvent::ChannelOpened {
            client: ctx.sender,
            node,
            amount,
        });
        Ok(())
    }

    /// Adds funds to an open channel. The nonce is untouched.
    pub fn top_up_channel(
        &mut self,
        ctx: &CallContext,
        node: Address,
        amount: Amount,
    ) -> LedgerResult<Amount> {
        self.access.ensure_not_paused()?;
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let balance = self.channels.topped_up_balance(&ctx.sender, &node, amount)?;

        self.token
            .transfer_from(&self.custody, &ctx.sender, &self.custody, amount)?;
        self.channels
            .set_topped_up_balance(&ctx.sender, &node, balance)?;

        info!(client = %ctx.sender, node = %node, amount = %amount, balance = %balance, "channel topped up");
        self.emit(LedgerEvent::ChannelToppedUp {
            client: ctx.sender,
            node,
            amount,
            balance,
        });
        Ok(balance)
    }

    /// Closes the caller's channel with `node` and refunds what is left.
    pub fn close_payment_channel(&mut self, ctx: &CallContext, node: Address) -> LedgerResult<Amount> {
        self.access.ensure_not_paused()?;
        let refund = self.channels.open_channel(&ctx.sender, &node)?.balance;

        self.token.transfer(&self.custody, &ctx.sender, refund)?;
        self.channels.close(&ctx.sender, &node, ctx.timestamp)?;

        info!(client = %ctx.sender, node = %node, refunded = %refund, "channel closed");
        self.emit(LedgerEvent::ChannelClosed {
            client: ctx.sender,
            node,
            refunded: refund,
        });
        Ok(refund)
    }

    // -- Reads ---------------------------------------------------------------

    /// The node record, active or not.
    pub fn node_info(&self, node: &Address) -> Option<&Node> {
        self.registry.get(node)
    }

    /// Active operators in registration order.
    pub fn active_nodes(&self) -> Vec<Address> {
        self.registry.active_nodes()
    }

    pub fn payment_channel_info(&self, client: &Address, node: &Address) -> Option<&PaymentChannel> {
        self.channels.get(client, node)
    }

    /// `price_per_minute(node) * minutes`. Answers for deregistered nodes
    /// too; fails only for nodes never registered.
    pub fn calculate_cost(&self, node: &Address, minutes: u64) -> LedgerResult<Amount> {
        self.registry.calculate_cost(node, minutes)
    }

    pub fn contract_stats(&self) -> ContractStats {
        ContractStats {
            total_active_nodes: self.registry.active_count() as u64,
            total_open_channels: self.channels.open_count() as u64,
            total_minutes: self.registry.total_minutes_served(),
            treasury_balance: self.treasury,
        }
    }

    pub fn is_relay_operator(&self, address: &Address) -> bool {
        self.access.is_relay_operator(address)
    }

    pub fn paused(&self) -> bool {
        self.access.paused()
    }

    pub fn owner(&self) -> Address {
        self.access.owner()
    }

    pub fn treasury(&self) -> Amount {
        self.treasury
    }

    /// Token account holding stakes, channel balances and the treasury.
    pub fn custody_address(&self) -> Address {
        self.custody
    }

    pub fn token(&self) -> &TokenLedger {
        &self.token
    }

    pub fn faucet(&self) -> &Faucet {
        &self.faucet
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // -- Audit -------------------------------------------------------------

    pub fn custody_report(&self) -> CustodyReport {
        CustodyReport {
            held: self.token.balance_of(&self.custody),
            active_stake: self.registry.total_active_stake(),
            open_channel_balance: self.channels.total_open_balance(),
            treasury: self.treasury,
        }
    }

    /// Fails with [`LedgerError::CustodyViolation`] if claims exceed custody.
    pub fn verify_custody(&self) -> LedgerResult<CustodyReport> {
        let report = self.custody_report();
        if !report.is_solvent() {
            return Err(LedgerError::CustodyViolation {
                held: report.held,
                claimed: report.claimed(),
            });
        }
        Ok(report)
    }

    // -- Events ------------------------------------------------------------

    /// Events queued since the last drain.
    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Removes and returns the queued events.
    pub fn drain_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }
}
