//! Token amounts
//!
//! Amounts are integers in the token's smallest unit. Protocol tokens use 18 decimals, so a
//! single whole token is `10^18`, which is why the inner value is a `u128`.
//!
//! Amounts always serialize as a decimal string so they survive any JSON consumer without
//! being coerced into a float.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Number of decimals used by the protocol tokens
pub const DECIMALS: u32 = 18;

/// Amount Error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Amount overflow
    #[error("Amount Overflow")]
    AmountOverflow,
    /// Invalid amount
    #[error("Invalid Amount: {0}")]
    InvalidAmount(String),
    /// Too many fractional digits
    #[error("Amount `{0}` has more than {1} decimals")]
    TooManyDecimals(String, u32),
}

/// Token amount in the smallest unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Amount(u128);

impl Amount {
    /// Amount zero
    pub const ZERO: Amount = Amount(0);

    /// Amount one
    pub const ONE: Amount = Amount(1);

    /// Largest representable amount, used for unlimited approvals
    pub const MAX: Amount = Amount(u128::MAX);

    /// One whole token (`10^18`)
    pub const WAD: Amount = Amount(1_000_000_000_000_000_000);

    /// Create a new amount from a raw value
    pub const fn new(value: u128) -> Self {
        Self(value)
    }

    /// Raw value
    #[inline(always)]
    pub fn value(&self) -> u128 {
        self.0
    }

    /// `true` if amount is zero
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition for Amount. Returns None if overflow occurs.
    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Checked subtraction for Amount. Returns None if overflow occurs.
    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Checked multiplication for Amount. Returns None if overflow occurs.
    pub fn checked_mul(self, other: Amount) -> Option<Amount> {
        self.0.checked_mul(other.0).map(Amount)
    }

    /// Parse a human readable decimal (`"1.25"`) into the smallest unit
    ///
    /// ```
    /// use loanflow_common::Amount;
    ///
    /// let amount = Amount::from_decimal("1.5", 18).unwrap();
    /// assert_eq!(amount.value(), 1_500_000_000_000_000_000);
    /// ```
    pub fn from_decimal(s: &str, decimals: u32) -> Result<Self, Error> {
        let s = s.trim();
        let (whole, fraction) = match s.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (s, ""),
        };

        if whole.is_empty() && fraction.is_empty() {
            return Err(Error::InvalidAmount(s.to_string()));
        }

        if fraction.len() > decimals as usize {
            return Err(Error::TooManyDecimals(s.to_string(), decimals));
        }

        let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if !all_digits(whole) || !all_digits(fraction) {
            return Err(Error::InvalidAmount(s.to_string()));
        }

        let scale = 10u128
            .checked_pow(decimals)
            .ok_or(Error::AmountOverflow)?;

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| Error::AmountOverflow)?
        };

        let fraction: u128 = if fraction.is_empty() {
            0
        } else {
            let padded = format!("{fraction:0<width$}", width = decimals as usize);
            padded.parse().map_err(|_| Error::AmountOverflow)?
        };

        whole
            .checked_mul(scale)
            .and_then(|w| w.checked_add(fraction))
            .map(Amount)
            .ok_or(Error::AmountOverflow)
    }

    /// Format as a human readable decimal, trimming trailing zeros
    pub fn to_decimal(&self, decimals: u32) -> String {
        let Some(scale) = 10u128.checked_pow(decimals) else {
            return self.0.to_string();
        };

        let whole = self.0 / scale;
        let fraction = self.0 % scale;

        if fraction == 0 {
            return whole.to_string();
        }

        let fraction = format!("{fraction:0>width$}", width = decimals as usize);
        format!("{whole}.{}", fraction.trim_end_matches('0'))
    }
}

impl FromStr for Amount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::InvalidAmount(s.to_string()));
        }

        let value = s.parse::<u128>().map_err(|_| Error::AmountOverflow)?;
        Ok(Amount(value))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(value.into())
    }
}

impl From<u128> for Amount {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl From<Amount> for u128 {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct AmountVisitor;

        impl Visitor<'_> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a decimal string or a non-negative integer")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Amount::from_str(value).map_err(E::custom)
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(Amount::from(value))
            }

            fn visit_u128<E>(self, value: u128) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(Amount::from(value))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                u64::try_from(value)
                    .map(Amount::from)
                    .map_err(|_| E::custom(Error::InvalidAmount(value.to_string())))
            }

            fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Err(E::custom(Error::InvalidAmount(format!(
                    "{value} is not an integer amount"
                ))))
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}
