//! # Access Control
//!
//! Roles are checked explicitly at the top of each entry point against a
//! small capability set: one owner, a set of relay operators, and a pause
//! flag. Node operators and channel clients are not stored here; they are
//! implied by registry and channel records.
//!
//! Owner administration (relay membership, ownership transfer, pause
//! control) remains available while the ledger is paused so a compromised
//! relay can be removed during an incident.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::address::Address;
use crate::error::{LedgerError, LedgerResult, Role};
use crate::events::LedgerEvent;
use crate::ledger::{CallContext, ClearNet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    owner: Address,
    relay_operators: BTreeSet<Address>,
    paused: bool,
}

impl AccessControl {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            relay_operators: BTreeSet::new(),
            paused: false,
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    pub fn is_relay_operator(&self, address: &Address) -> bool {
        self.relay_operators.contains(address)
    }

    pub fn relay_operators(&self) -> impl Iterator<Item = &Address> {
        self.relay_operators.iter()
    }

    pub fn require_owner(&self, caller: &Address) -> LedgerResult<()> {
        if *caller != self.owner {
            return Err(LedgerError::Unauthorized {
                caller: *caller,
                required: Role::Owner,
            });
        }
        Ok(())
    }

    pub fn require_relay_operator(&self, caller: &Address) -> LedgerResult<()> {
        if !self.relay_operators.contains(caller) {
            return Err(LedgerError::Unauthorized {
                caller: *caller,
                required: Role::RelayOperator,
            });
        }
        Ok(())
    }

    pub fn ensure_not_paused(&self) -> LedgerResult<()> {
        if self.paused {
            return Err(LedgerError::ContractPaused);
        }
        Ok(())
    }
}

impl ClearNet {
    /// Grants the relay role. Owner only. Idempotent.
    pub fn add_relay_operator(&mut self, ctx: &CallContext, operator: Address) -> LedgerResult<()> {
        self.access.require_owner(&ctx.sender)?;
        if self.access.relay_operators.insert(operator) {
            info!(operator = %operator, "relay operator added");
            self.emit(LedgerEvent::RelayOperatorAdded { operator });
        }
        Ok(())
    }

    /// Revokes the relay role. Owner only. Idempotent.
    pub fn remove_relay_operator(&mut self, ctx: &CallContext, operator: Address) -> LedgerResult<()> {
        self.access.require_owner(&ctx.sender)?;
        if self.access.relay_operators.remove(&operator) {
            info!(operator = %operator, "relay operator removed");
            self.emit(LedgerEvent::RelayOperatorRemoved { operator });
        }
        Ok(())
    }

    /// Stops every gated entry point. Owner only.
    pub fn pause(&mut self, ctx: &CallContext) -> LedgerResult<()> {
        self.access.require_owner(&ctx.sender)?;
        if !self.access.paused {
            self.access.paused = true;
            warn!(by = %ctx.sender, "ledger paused");
            self.emit(LedgerEvent::Paused { by: ctx.sender });
        }
        Ok(())
    }

    pub fn unpause(&mut self, ctx: &CallContext) -> LedgerResult<()> {
        self.access.require_owner(&ctx.sender)?;
        if self.access.paused {
            self.access.paused = false;
            info!(by = %ctx.sender, "ledger unpaused");
            self.emit(LedgerEvent::Unpaused { by: ctx.sender });
        }
        Ok(())
    }

    /// Hands ledger ownership to `new_owner`. Token mint authority is not
    /// affected.
    pub fn transfer_ownership(&mut self, ctx: &CallContext, new_owner: Address) -> LedgerResult<()> {
        self.access.require_owner(&ctx.sender)?;
        if new_owner.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        let previous = self.access.owner;
        self.access.owner = new_owner;
        info!(previous = %previous, new = %new_owner, "ownership transferred");
        self.emit(LedgerEvent::OwnershipTransferred {
            previous,
            new: new_owner,
        });
        Ok(())
    }

    /// The relay operator set, in address order.
    pub fn relay_operators(&self) -> Vec<Address> {
        self.access.relay_operators().copied().collect()
    }
}
