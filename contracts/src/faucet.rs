//! # Test-token Faucet
//!
//! Hands out a fixed amount of CLR to anyone who asks, at most once per
//! cooldown window per address. The faucet's funds are an ordinary token
//! balance held under a derived account; topping it up is a plain
//! transfer to [`Faucet::account`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::config::{Amount, LedgerConfig, FAUCET_ACCOUNT_LABEL};
use crate::error::{LedgerError, LedgerResult};
use crate::token::TokenLedger;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Faucet {
    account: Address,
    claim_amount: Amount,
    cooldown_secs: u64,
    last_claim: BTreeMap<Address, DateTime<Utc>>,
}

impl Faucet {
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            account: Address::derive(FAUCET_ACCOUNT_LABEL),
            claim_amount: config.faucet_claim_amount,
            cooldown_secs: config.faucet_cooldown_secs,
            last_claim: BTreeMap::new(),
        }
    }

    /// Token account holding the faucet's funds.
    pub fn account(&self) -> Address {
        self.account
    }

    pub fn claim_amount(&self) -> Amount {
        self.claim_amount
    }

    /// Minimum time between two claims by the same address.
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.cooldown_secs).unwrap_or(i64::MAX))
    }

    /// Earliest time `address` may claim again, if it is cooling down.
    pub fn next_claim_at(&self, address: &Address) -> Option<DateTime<Utc>> {
        let cooldown = self.cooldown();
        self.last_claim
            .get(address)
            .and_then(|last| last.checked_add_signed(cooldown))
    }

    /// Transfers one claim's worth of tokens to `caller`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::FaucetCooldown`] if `caller` claimed within the
    /// cooldown window, and [`LedgerError::InsufficientBalance`] if the
    /// faucet is drained.
    pub fn claim(
        &mut self,
        token: &mut TokenLedger,
        caller: &Address,
        now: DateTime<Utc>,
    ) -> LedgerResult<Amount> {
        if let Some(retry_at) = self.next_claim_at(caller) {
            if now < retry_at {
                return Err(LedgerError::FaucetCooldown { retry_at });
            }
        }

        token.transfer(&self.account, caller, self.claim_amount)?;
        self.last_claim.insert(*caller, now);
        Ok(self.claim_amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ONE_TOKEN;
    use chrono::Duration;

    fn funded() -> (Faucet, TokenLedger, Address) {
        let owner = Address::derive("owner");
        let mut token = TokenLedger::new(owner, 1_000 * ONE_TOKEN);
        let faucet = Faucet::new(&LedgerConfig::default());
        token.transfer(&owner, &faucet.account(), 250 * ONE_TOKEN).unwrap();
        (faucet, token, owner)
    }

    #[test]
    fn claim_pays_fixed_amount() {
        let (mut faucet, mut token, _) = funded();
        let tester = Address::derive("tester");
        let paid = faucet.claim(&mut token, &tester, Utc::now()).unwrap();
        assert_eq!(paid, 100 * ONE_TOKEN);
        assert_eq!(token.balance_of(&tester), 100 * ONE_TOKEN);
    }

    #[test]
    fn second_claim_inside_cooldown_rejected() {
        let (mut faucet, mut token, _) = funded();
        let tester = Address::derive("tester");
        let t0 = Utc::now();
        assert_eq!(faucet.cooldown(), Duration::hours(24));
        faucet.claim(&mut token, &tester, t0).unwrap();

        let err = faucet
            .claim(&mut token, &tester, t0 + Duration::hours(1))
            .unwrap_err();
        assert!(matches!(err, LedgerError::FaucetCooldown { .. }));

        faucet
            .claim(&mut token, &tester, t0 + Duration::hours(24))
            .unwrap();
        assert_eq!(token.balance_of(&tester), 200 * ONE_TOKEN);
    }

    #[test]
    fn drained_faucet_rejects_without_recording_claim() {
        let (mut faucet, mut token, _) = funded();
        let now = Utc::now();
        faucet.claim(&mut token, &Address::derive("a"), now).unwrap();
        faucet.claim(&mut token, &Address::derive("b"), now).unwrap();

        let late = Address::derive("c");
        let err = faucet.claim(&mut token, &late, now).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert!(faucet.next_claim_at(&late).is_none());
    }
}
