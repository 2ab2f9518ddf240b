//! Read model boundary
//!
//! The indexer the rest of the client reads positions from. It trails the chain, so flows wait
//! on it before reporting completion.

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::address::{Address, TroveId};
use crate::amount::Amount;
use crate::error::Error;

/// Trove as seen by the indexer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedTrove {
    /// Trove id
    pub id: TroveId,
    /// Collateral branch
    pub branch_id: u32,
    /// Owner
    pub owner: Address,
    /// Collateral
    pub coll: Amount,
    /// Debt
    pub debt: Amount,
    /// Block the trove was last updated at
    pub updated_at_block: u64,
}

/// Indexer
#[async_trait]
pub trait ReadModel: Debug + Send + Sync {
    /// Last block the indexer processed
    async fn indexed_block(&self) -> Result<u64, Error>;

    /// Look up a trove
    async fn trove(&self, branch_id: u32, trove_id: &TroveId)
        -> Result<Option<IndexedTrove>, Error>;
}
