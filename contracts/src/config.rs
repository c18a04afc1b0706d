//! # Ledger Policy & Constants
//!
//! Every policy number the ledger enforces lives here. The constants are the
//! defaults; [`LedgerConfig`] carries the tunable subset so a host can load
//! different values for a devnet without recompiling.
//!
//! Amounts are denominated in the token's smallest unit. With 18 decimals,
//! one whole CLR is `10^18` units, which is why [`Amount`] is `u128`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fungible token amount in smallest units.
pub type Amount = u128;

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// Human-readable token name.
pub const TOKEN_NAME: &str = "ClearNet Token";

/// Ticker symbol.
pub const TOKEN_SYMBOL: &str = "CLR";

/// Decimal places. Fixed; every amount literal in the ledger assumes it.
pub const TOKEN_DECIMALS: u8 = 18;

/// One whole token in smallest units.
pub const ONE_TOKEN: Amount = 1_000_000_000_000_000_000;

/// Supply minted to the owner when the token ledger is created.
pub const INITIAL_SUPPLY: Amount = 10_000_000 * ONE_TOKEN;

// ---------------------------------------------------------------------------
// Node registry
// ---------------------------------------------------------------------------

/// Collateral locked by every registered node.
pub const MIN_STAKE: Amount = 1_000 * ONE_TOKEN;

/// Reputation is a fixed-point score scaled by this factor (3000 = 3.000).
pub const REPUTATION_SCALE: u64 = 1_000;

/// Reputation assigned on first registration.
pub const INITIAL_REPUTATION: u64 = 3_000;

/// Lower reputation bound.
pub const MIN_REPUTATION: u64 = 0;

/// Upper reputation bound.
pub const MAX_REPUTATION: u64 = 5_000;

/// Lowest accepted client rating.
pub const MIN_RATING: u8 = 1;

/// Highest accepted client rating.
pub const MAX_RATING: u8 = 5;

// ---------------------------------------------------------------------------
// Payment channels & settlement
// ---------------------------------------------------------------------------

/// Smallest amount a channel can be opened with.
pub const MIN_CHANNEL_AMOUNT: Amount = 10 * ONE_TOKEN;

/// Protocol fee in basis points of every settled cost. 200 bps = 2%.
pub const PROTOCOL_FEE_BPS: u32 = 200;

/// Basis-point denominator.
pub const BPS_DENOMINATOR: u32 = 10_000;

// ---------------------------------------------------------------------------
// Faucet
// ---------------------------------------------------------------------------

/// Amount handed out per faucet claim.
pub const FAUCET_CLAIM_AMOUNT: Amount = 100 * ONE_TOKEN;

/// Minimum spacing between two claims by the same address.
pub const FAUCET_COOLDOWN: Duration = Duration::from_secs(24 * 60 * 60);

// ---------------------------------------------------------------------------
// System accounts
// ---------------------------------------------------------------------------

/// Label of the account that custodies stakes, channel balances and the
/// treasury. See [`crate::address::Address::derive`].
pub const CUSTODY_ACCOUNT_LABEL: &str = "clearnet/custody";

/// Label of the faucet's token account.
pub const FAUCET_ACCOUNT_LABEL: &str = "clearnet/faucet";

// ---------------------------------------------------------------------------
// LedgerConfig
// ---------------------------------------------------------------------------

/// Errors raised while validating a [`LedgerConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("min_stake must be non-zero")]
    ZeroStake,

    #[error("min_channel_amount must be non-zero")]
    ZeroChannelMinimum,

    #[error("protocol_fee_bps {0} exceeds {BPS_DENOMINATOR}")]
    FeeTooHigh(u32),

    #[error("reputation bounds inverted: min {min} > max {max}")]
    InvertedReputationBounds { min: u64, max: u64 },

    #[error("initial reputation {initial} outside [{min}, {max}]")]
    InitialReputationOutOfBounds { initial: u64, min: u64, max: u64 },

    #[error("rating range inverted or starts at zero: [{min}, {max}]")]
    InvalidRatingRange { min: u8, max: u8 },
}

/// Tunable ledger policy.
///
/// Constructed from the module constants by [`Default`]. Hosts may load a
/// JSON override; missing fields fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Supply minted to the owner at genesis.
    pub initial_supply: Amount,
    /// Stake pulled from every registering node.
    pub min_stake: Amount,
    /// Smallest channel opening amount.
    pub min_channel_amount: Amount,
    /// Fee retained by the treasury, in basis points.
    pub protocol_fee_bps: u32,
    /// Reputation assigned on first registration.
    pub initial_reputation: u64,
    /// Lower reputation clamp.
    pub min_reputation: u64,
    /// Upper reputation clamp.
    pub max_reputation: u64,
    /// Lowest accepted rating.
    pub min_rating: u8,
    /// Highest accepted rating.
    pub max_rating: u8,
    /// Amount per faucet claim.
    pub faucet_claim_amount: Amount,
    /// Seconds between two claims by the same address.
    pub faucet_cooldown_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            initial_supply: INITIAL_SUPPLY,
            min_stake: MIN_STAKE,
            min_channel_amount: MIN_CHANNEL_AMOUNT,
            protocol_fee_bps: PROTOCOL_FEE_BPS,
            initial_reputation: INITIAL_REPUTATION,
            min_reputation: MIN_REPUTATION,
            max_reputation: MAX_REPUTATION,
            min_rating: MIN_RATING,
            max_rating: MAX_RATING,
            faucet_claim_amount: FAUCET_CLAIM_AMOUNT,
            faucet_cooldown_secs: FAUCET_COOLDOWN.as_secs(),
        }
    }
}

impl LedgerConfig {
    /// Checks that the policy is internally consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_stake == 0 {
            return Err(ConfigError::ZeroStake);
        }
        if self.min_channel_amount == 0 {
            return Err(ConfigError::ZeroChannelMinimum);
        }
        if self.protocol_fee_bps > BPS_DENOMINATOR {
            return Err(ConfigError::FeeTooHigh(self.protocol_fee_bps));
        }
        if self.min_reputation > self.max_reputation {
            return Err(ConfigError::InvertedReputationBounds {
                min: self.min_reputation,
                max: self.max_reputation,
            });
        }
        if self.initial_reputation < self.min_reputation
            || self.initial_reputation > self.max_reputation
        {
            return Err(ConfigError::InitialReputationOutOfBounds {
                initial: self.initial_reputation,
                min: self.min_reputation,
                max: self.max_reputation,
            });
        }
        if self.min_rating == 0 || self.min_rating > self.max_rating {
            return Err(ConfigError::InvalidRatingRange {
                min: self.min_rating,
                max: self.max_rating,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(LedgerConfig::default().validate(), Ok(()));
    }

    #[test]
    fn constants_match_token_scale() {
        assert_eq!(ONE_TOKEN, 10u128.pow(TOKEN_DECIMALS as u32));
        assert_eq!(MIN_STAKE, 1_000 * 10u128.pow(18));
        assert_eq!(MIN_CHANNEL_AMOUNT, 10 * 10u128.pow(18));
    }

    #[test]
    fn excessive_fee_rejected() {
        let config = LedgerConfig {
            protocol_fee_bps: 10_001,
            ..LedgerConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::FeeTooHigh(10_001)));
    }

    #[test]
    fn initial_reputation_must_sit_inside_bounds() {
        let config = LedgerConfig {
            initial_reputation: 6_000,
            ..LedgerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InitialReputationOutOfBounds { .. })
        ));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: LedgerConfig = serde_json::from_str(r#"{"protocol_fee_bps": 500}"#).unwrap();
        assert_eq!(config.protocol_fee_bps, 500);
        assert_eq!(config.min_stake, MIN_STAKE);
    }
}
