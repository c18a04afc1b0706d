//! # Token Ledger
//!
//! The fungible asset every other component moves. Balances here are the
//! sole source of truth for funds: node stakes, channel balances and the
//! treasury are only *claims* on the balance of the ledger's custody
//! account.
//!
//! ## Security Model
//!
//! - **Mint gating**: only the owner recorded at construction may mint.
//! - **Burn authorization**: holders burn their own balance; there is no
//!   admin burn.
//! - **Delegated spending**: `transfer_from` requires a prior `approve` and
//!   consumes the allowance.
//! - **Supply tracking**: supply and balances change together; every
//!   addition is checked, every subtraction is preceded by a sufficiency
//!   check, so no operation wraps or goes negative.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::config::{Amount, TOKEN_DECIMALS, TOKEN_NAME, TOKEN_SYMBOL};
use crate::error::{LedgerError, LedgerResult, Role};

/// Balance, allowance and supply bookkeeping for the CLR token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenLedger {
    name: String,
    symbol: String,
    decimals: u8,
    /// Sole minter.
    owner: Address,
    total_supply: Amount,
    balances: BTreeMap<Address, Amount>,
    /// `owner -> (spender -> remaining allowance)`.
    allowances: BTreeMap<Address, BTreeMap<Address, Amount>>,
}

impl TokenLedger {
    /// Creates the token and mints `initial_supply` to `owner`.
    pub fn new(owner: Address, initial_supply: Amount) -> Self {
        let mut balances = BTreeMap::new();
        if initial_supply > 0 {
            balances.insert(owner, initial_supply);
        }
        Self {
            name: TOKEN_NAME.to_string(),
            symbol: TOKEN_SYMBOL.to_string(),
            decimals: TOKEN_DECIMALS,
            owner,
            total_supply: initial_supply,
            balances,
            allowances: BTreeMap::new(),
        }
    }

    /// Mints `amount` to `to`. Owner only.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unauthorized`] if `caller` is not the owner.
    /// Returns [`LedgerError::ArithmeticOverflow`] if supply would overflow.
    pub fn mint(&mut self, caller: &Address, to: &Address, amount: Amount) -> LedgerResult<()> {
        if *caller != self.owner {
            return Err(LedgerError::Unauthorized {
                caller: *caller,
                required: Role::Owner,
            });
        }

        let new_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow("token supply"))?;
        let new_balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow("token balance"))?;

        self.total_supply = new_supply;
        self.balances.insert(*to, new_balance);
        Ok(())
    }

    /// Burns `amount` of the caller's own balance.
    pub fn burn(&mut self, caller: &Address, amount: Amount) -> LedgerResult<()> {
        let balance = self.balance_of(caller);
        if balance < amount {
            return Err(LedgerError::InsufficientBalance {
                account: *caller,
                available: balance,
                required: amount,
            });
        }

        self.set_balance(caller, balance - amount);
        // Supply is at least every individual balance.
        self.total_supply -= amount;
        Ok(())
    }

    /// Moves `amount` from the caller to `to`.
    pub fn transfer(&mut self, caller: &Address, to: &Address, amount: Amount) -> LedgerResult<()> {
        self.move_balance(caller, to, amount)
    }

    /// Sets the allowance `spender` may draw from the caller's balance.
    /// Overwrites any previous allowance.
    pub fn approve(&mut self, caller: &Address, spender: &Address, amount: Amount) {
        let entry = self.allowances.entry(*caller).or_default();
        if amount == 0 {
            entry.remove(spender);
        } else {
            entry.insert(*spender, amount);
        }
        if entry.is_empty() {
            self.allowances.remove(caller);
        }
    }

    /// Moves `amount` from `owner` to `to` on behalf of `spender`, consuming
    /// allowance.
    ///
    /// Balance is checked before allowance, so an underfunded owner always
    /// sees [`LedgerError::InsufficientBalance`].
    pub fn transfer_from(
        &mut self,
        spender: &Address,
        owner: &Address,
        to: &Address,
        amount: Amount,
    ) -> LedgerResult<()> {
        let available = self.balance_of(owner);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                account: *owner,
                available,
                required: amount,
            });
        }

        let allowed = self.allowance(owner, spender);
        if allowed < amount {
            return Err(LedgerError::InsufficientAllowance {
                owner: *owner,
                spender: *spender,
                allowed,
                required: amount,
            });
        }

        self.move_balance(owner, to, amount)?;
        self.approve(owner, spender, allowed - amount);
        Ok(())
    }

    /// Returns the balance of `address`, or 0.
    pub fn balance_of(&self, address: &Address) -> Amount {
        self.balances.get(address).copied().unwrap_or(0)
    }

    /// Returns the remaining allowance of `spender` over `owner`'s balance.
    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(owner)
            .and_then(|a| a.get(spender))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// The minting authority.
    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Sum of all balances. Equals [`total_supply`](Self::total_supply)
    /// unless the bookkeeping is broken.
    pub fn sum_of_balances(&self) -> Amount {
        self.balances
            .values()
            .fold(0u128, |acc, b| acc.saturating_add(*b))
    }

    /// Number of addresses holding a non-zero balance.
    pub fn holder_count(&self) -> usize {
        self.balances.len()
    }

    /// Checks that `transfer(from, to, amount)` would succeed, without
    /// moving anything.
    pub fn check_transfer(&self, from: &Address, to: &Address, amount: Amount) -> LedgerResult<()> {
        let from_balance = self.balance_of(from);
        if from_balance < amount {
            return Err(LedgerError::InsufficientBalance {
                account: *from,
                available: from_balance,
                required: amount,
            });
        }
        if from != to {
            self.balance_of(to)
                .checked_add(amount)
                .ok_or(LedgerError::ArithmeticOverflow("token balance"))?;
        }
        Ok(())
    }

    fn move_balance(&mut self, from: &Address, to: &Address, amount: Amount) -> LedgerResult<()> {
        self.check_transfer(from, to, amount)?;
        if from == to {
            return Ok(());
        }

        let from_balance = self.balance_of(from);
        let to_balance = self.balance_of(to);
        self.set_balance(from, from_balance - amount);
        self.set_balance(to, to_balance + amount);
        Ok(())
    }

    fn set_balance(&mut self, address: &Address, amount: Amount) {
        if amount == 0 {
            self.balances.remove(address);
        } else {
            self.balances.insert(*address, amount);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{INITIAL_SUPPLY, ONE_TOKEN};

    fn owner() -> Address {
        Address::derive("owner")
    }

    fn token() -> TokenLedger {
        TokenLedger::new(owner(), INITIAL_SUPPLY)
    }

    #[test]
    fn metadata_and_initial_supply() {
        let t = token();
        assert_eq!(t.name(), "ClearNet Token");
        assert_eq!(t.symbol(), "CLR");
        assert_eq!(t.decimals(), 18);
        assert_eq!(t.balance_of(&owner()), 10_000_000 * ONE_TOKEN);
        assert_eq!(t.total_supply(), t.sum_of_balances());
    }

    #[test]
    fn owner_mint_increases_supply_and_balance() {
        let mut t = token();
        let user = Address::derive("user1");
        t.mint(&owner(), &user, 1_000 * ONE_TOKEN).unwrap();
        assert_eq!(t.balance_of(&user), 1_000 * ONE_TOKEN);
        assert_eq!(t.total_supply(), INITIAL_SUPPLY + 1_000 * ONE_TOKEN);
    }

    #[test]
    fn non_owner_mint_rejected() {
        let mut t = token();
        let user = Address::derive("user1");
        let err = t.mint(&user, &user, 1).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Unauthorized {
                required: Role::Owner,
                ..
            }
        ));
        assert_eq!(t.balance_of(&user), 0);
    }

    #[test]
    fn mint_overflow_rejected_without_mutation() {
        let mut t = token();
        let err = t.mint(&owner(), &owner(), Amount::MAX).unwrap_err();
        assert_eq!(err, LedgerError::ArithmeticOverflow("token supply"));
        assert_eq!(t.total_supply(), INITIAL_SUPPLY);
    }

    #[test]
    fn transfer_and_burn() {
        let mut t = token();
        let (u1, u2) = (Address::derive("user1"), Address::derive("user2"));
        t.mint(&owner(), &u1, 1_000 * ONE_TOKEN).unwrap();
        t.transfer(&u1, &u2, 100 * ONE_TOKEN).unwrap();
        assert_eq!(t.balance_of(&u2), 100 * ONE_TOKEN);

        t.burn(&u2, 50 * ONE_TOKEN).unwrap();
        assert_eq!(t.balance_of(&u2), 50 * ONE_TOKEN);
        assert_eq!(t.total_supply(), t.sum_of_balances());
    }

    #[test]
    fn overdraft_rejected() {
        let mut t = token();
        let (u1, u2) = (Address::derive("user1"), Address::derive("user2"));
        let err = t.transfer(&u1, &u2, 1).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert!(t.burn(&u1, 1).is_err());
    }

    #[test]
    fn transfer_from_consumes_allowance() {
        let mut t = token();
        let (holder, spender, sink) = (
            Address::derive("holder"),
            Address::derive("spender"),
            Address::derive("sink"),
        );
        t.mint(&owner(), &holder, 500).unwrap();
        t.approve(&holder, &spender, 300);

        t.transfer_from(&spender, &holder, &sink, 200).unwrap();
        assert_eq!(t.allowance(&holder, &spender), 100);
        assert_eq!(t.balance_of(&sink), 200);

        let err = t.transfer_from(&spender, &holder, &sink, 150).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientAllowance { allowed: 100, .. }));
        assert_eq!(t.balance_of(&holder), 300);
    }

    #[test]
    fn transfer_from_reports_balance_before_allowance() {
        let mut t = token();
        let (holder, spender) = (Address::derive("holder"), Address::derive("spender"));
        t.mint(&owner(), &holder, 10).unwrap();
        let err = t.transfer_from(&spender, &holder, &spender, 20).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
    }

    #[test]
    fn approve_zero_clears_entry() {
        let mut t = token();
        let (holder, spender) = (Address::derive("holder"), Address::derive("spender"));
        t.approve(&holder, &spender, 5);
        t.approve(&holder, &spender, 0);
        assert_eq!(t.allowance(&holder, &spender), 0);
    }
}
