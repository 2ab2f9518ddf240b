//! Protocol deployment
//!
//! Contract addresses the flows call into. A deployment has protocol wide contracts and one
//! branch per collateral type.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::Error;

/// Contracts of one collateral branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    /// Branch index
    pub id: u32,
    /// Collateral symbol
    pub symbol: String,
    /// Collateral token
    pub coll_token: Address,
    /// Borrower operations
    pub borrower_operations: Address,
    /// Trove manager
    pub trove_manager: Address,
    /// Stability pool
    pub stability_pool: Address,
    /// Leverage zapper
    pub leverage_zapper: Address,
}

/// Protocol deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    /// Stablecoin
    pub bold_token: Address,
    /// Governance token
    pub lqty_token: Address,
    /// Governance staking
    pub lqty_staking: Address,
    /// Redemption entry point
    pub collateral_registry: Address,
    /// Collateral branches
    pub branches: Vec<Branch>,
}

impl Deployment {
    /// Look up a branch
    pub fn branch(&self, id: u32) -> Result<&Branch, Error> {
        self.branches
            .iter()
            .find(|branch| branch.id == id)
            .ok_or(Error::UnknownBranch(id))
    }
}
