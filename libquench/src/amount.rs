use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub const PICONERO: u64 = 1_000_000_000_000;
pub const WEI: u128 = 1_000_000_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MoneroAmount {
    amount: u64,
}

impl MoneroAmount {
    /// Creates a new `MoneroAmount` from a value in piconero.
    pub fn from_piconero(amount: u64) -> Self {
        MoneroAmount { amount }
    }

    /// Converts the `MoneroAmount` to piconero.
    pub fn to_piconero(&self) -> u64 {
        self.amount
    }

    /// Creates a new `MoneroAmount` from a string representing whole XMR units.
    /// Returns `None` if the string is not a valid number representation.
    pub fn from_xmr(xmr: &str) -> Option<Self> {
        let amount = parse_decimal(xmr, 12)? as u64;
        Some(MoneroAmount { amount })
    }

    /// Converts the `MoneroAmount` to whole XMR units as a floating-point value.
    pub fn to_xmr(&self) -> f64 {
        self.amount as f64 / PICONERO as f64
    }

    pub fn checked_add(&self, other: MoneroAmount) -> Option<MoneroAmount> {
        self.amount.checked_add(other.amount).map(MoneroAmount::from_piconero)
    }

    pub fn checked_sub(&self, other: MoneroAmount) -> Option<MoneroAmount> {
        self.amount.checked_sub(other.amount).map(MoneroAmount::from_piconero)
    }

    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }
}

impl Display for MoneroAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.9} XMR", self.to_xmr())
    }
}

/// An amount of ether, denominated in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EtherAmount {
    wei: u128,
}

impl EtherAmount {
    pub fn from_wei(wei: u128) -> Self {
        EtherAmount { wei }
    }

    pub fn to_wei(&self) -> u128 {
        self.wei
    }

    /// Creates a new `EtherAmount` from a string representing whole ETH units.
    pub fn from_eth(eth: &str) -> Option<Self> {
        let wei = parse_decimal(eth, 18)?;
        Some(EtherAmount { wei })
    }

    pub fn to_eth(&self) -> f64 {
        self.wei as f64 / WEI as f64
    }

    /// The big-endian 32-byte representation used in contract call data.
    pub fn to_be_bytes32(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[16..].copy_from_slice(&self.wei.to_be_bytes());
        out
    }

    pub fn checked_add(&self, other: EtherAmount) -> Option<EtherAmount> {
        self.wei.checked_add(other.wei).map(EtherAmount::from_wei)
    }

    pub fn checked_sub(&self, other: EtherAmount) -> Option<EtherAmount> {
        self.wei.checked_sub(other.wei).map(EtherAmount::from_wei)
    }

    pub fn is_zero(&self) -> bool {
        self.wei == 0
    }
}

impl Display for EtherAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.9} ETH", self.to_eth())
    }
}

/// An exchange rate between the two assets, stored as wei per whole XMR so
/// that conversions stay in integer arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    wei_per_xmr: u128,
}

impl ExchangeRate {
    /// Parses a rate given in ETH per XMR, e.g. "0.05".
    pub fn from_eth_per_xmr(rate: &str) -> Option<Self> {
        let wei_per_xmr = parse_decimal(rate, 18)?;
        if wei_per_xmr == 0 {
            return None;
        }
        Some(ExchangeRate { wei_per_xmr })
    }

    /// The amount of ether corresponding to `xmr` at this rate.
    pub fn eth_for(&self, xmr: MoneroAmount) -> Option<EtherAmount> {
        let wei = self.wei_per_xmr.checked_mul(xmr.to_piconero() as u128)? / PICONERO as u128;
        Some(EtherAmount::from_wei(wei))
    }

    /// The amount of monero corresponding to `eth` at this rate.
    pub fn xmr_for(&self, eth: EtherAmount) -> Option<MoneroAmount> {
        let pico = eth.to_wei().checked_mul(PICONERO as u128)? / self.wei_per_xmr;
        u64::try_from(pico).ok().map(MoneroAmount::from_piconero)
    }
}

impl Display for ExchangeRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6} ETH/XMR", self.wei_per_xmr as f64 / WEI as f64)
    }
}

/// Parses a non-negative decimal string into its smallest-unit integer
/// representation with `decimals` fractional digits.
fn parse_decimal(s: &str, decimals: usize) -> Option<u128> {
    let mut parts = s.split('.');
    let whole = parts.next()?.parse::<u128>().ok()?;
    let fraction = if let Some(frac_str) = parts.next() {
        if parts.next().is_some() {
            return None; // More than one decimal point is invalid
        }
        if frac_str.len() > decimals {
            return None;
        }
        let mut padded = frac_str.to_string();
        while padded.len() < decimals {
            padded.push('0');
        }
        padded.parse::<u128>().ok()?
    } else {
        0
    };
    let unit = 10u128.checked_pow(decimals as u32)?;
    whole.checked_mul(unit)?.checked_add(fraction)
}
