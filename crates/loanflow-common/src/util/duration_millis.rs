//! Serde helper for a [`Duration`] written as whole milliseconds
//!
//! Use with `#[serde(with = "loanflow_common::util::duration_millis")]`.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Serialize as milliseconds, saturating at `u64::MAX`
pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis().try_into().unwrap_or(u64::MAX))
}

/// Deserialize from milliseconds
pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    Ok(Duration::from_millis(u64::deserialize(deserializer)?))
}
