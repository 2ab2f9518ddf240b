//! Account addresses and position identifiers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::util::hex;

/// 20 byte account or contract address
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 20]);

impl Address {
    /// Zero address
    pub const ZERO: Address = Address([0u8; 20]);

    /// Create address from bytes
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Address bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Address with every byte set to `byte`, handy for fixtures
    pub const fn repeat_byte(byte: u8) -> Self {
        Self([byte; 20])
    }
}

impl FromStr for Address {
    type Err = hex::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(hex::decode_fixed(s)?))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Address::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Identifier of a trove (a borrow position), a 256 bit integer
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TroveId([u8; 32]);

impl TroveId {
    /// Create trove id from big endian bytes
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Big endian bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive the trove id an owner gets for a given owner index
    ///
    /// Mirrors the on-chain scheme closely enough for planning: the id is unique per
    /// `(owner, index)` pair and stable across calls.
    pub fn derive(owner: &Address, index: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[..20].copy_from_slice(owner.as_bytes());
        bytes[24..].copy_from_slice(&index.to_be_bytes());
        Self(bytes)
    }
}

impl FromStr for TroveId {
    type Err = hex::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(hex::decode_padded(s)?))
    }
}

impl fmt::Display for TroveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TroveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TroveId({self})")
    }
}

impl Serialize for TroveId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TroveId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        TroveId::from_str(&s).map_err(serde::de::Error::custom)
    }
}
