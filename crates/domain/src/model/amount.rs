use std::fmt;

use thiserror::Error;

/// Integer amount in a chain's smallest unit (satoshi, wei) together with the
/// number of decimals of its display unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Amount {
    base_units: u128,
    decimals: u8,
}

impl Amount {
    pub fn new(base_units: u128, decimals: u8) -> Self {
        Self {
            base_units,
            decimals,
        }
    }

    pub fn zero(decimals: u8) -> Self {
        Self::new(0, decimals)
    }

    pub fn base_units(&self) -> u128 {
        self.base_units
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn checked_add(self, other: Amount) -> Result<Amount, AmountError> {
        if self.decimals != other.decimals {
            return Err(AmountError::DecimalsMismatch(self.decimals, other.decimals));
        }
        self.base_units
            .checked_add(other.base_units)
            .map(|sum| Amount::new(sum, self.decimals))
            .ok_or(AmountError::Overflow)
    }

    /// Parses a `0x`-prefixed hex quantity as used by Ethereum JSON-RPC.
    pub fn from_hex_quantity(value: &str, decimals: u8) -> Result<Amount, AmountError> {
        let digits = value
            .strip_prefix("0x")
            .ok_or_else(|| AmountError::InvalidHex(value.to_string()))?;
        if digits.is_empty() {
            return Ok(Amount::zero(decimals));
        }
        u128::from_str_radix(digits, 16)
            .map(|units| Amount::new(units, decimals))
            .map_err(|_| AmountError::InvalidHex(value.to_string()))
    }
}

/// Renders the display unit with trailing zeros trimmed: `35_000_000` sats is `0.35`.
impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = 10u128.pow(u32::from(self.decimals));
        let whole = self.base_units / scale;
        let fraction = self.base_units % scale;
        if fraction == 0 {
            return write!(f, "{whole}");
        }
        let padded = format!("{:0width$}", fraction, width = usize::from(self.decimals));
        write!(f, "{whole}.{}", padded.trim_end_matches('0'))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount overflow")]
    Overflow,
    #[error("cannot add amounts with {0} and {1} decimals")]
    DecimalsMismatch(u8, u8),
    #[error("invalid hex quantity `{0}`")]
    InvalidHex(String),
}
