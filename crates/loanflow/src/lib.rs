//! Transaction flow engine for lending protocol clients
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

pub mod loanflow_database {
    //! Loanflow Database
    pub use loanflow_common::database::{
        DbTransactionFinalizer, DynKVStore, Error, KVStore, KVStoreDatabase, KVStoreTransaction,
        MemoryDatabase,
    };
}

pub mod flows;
pub mod manager;
pub mod orchestrator;
pub mod store;

#[cfg(test)]
mod test_utils;

/// Re-export common types
#[doc(hidden)]
pub use loanflow_common::{
    address, amount, chain, contracts,
    error::{self, Error},
    flow, read_model, util, Address, Amount, ChainClient, Deployment, FlowId, FlowRequest,
    FlowStep, Flowstate, ReadModel, StepStatus, TroveId,
};

#[doc(hidden)]
pub use flows::{FlowContext, FlowDeclaration, FlowRegistry};
#[doc(hidden)]
pub use manager::{FlowManager, FlowManagerBuilder, FlowSubscription};
#[doc(hidden)]
pub use orchestrator::{CommitOutcome, CommitRejection, PostFlowCheckSettings};
#[doc(hidden)]
pub use store::RestoreOutcome;

/// Re-export futures::Stream
pub use futures::{Stream, StreamExt};
