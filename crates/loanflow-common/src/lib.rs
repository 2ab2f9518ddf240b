//! Loanflow shared types and traits.
//!
//! This crate is the base the other loanflow crates build on: token amounts and addresses, flow
//! requests and step state, the chain and read-model boundaries the engine calls into, the
//! protocol deployment description and the key-value storage traits.

pub mod address;
pub mod amount;
pub mod chain;
pub mod contracts;
pub mod database;
pub mod error;
pub mod flow;
pub mod read_model;
pub mod state;
pub mod util;

pub use address::{Address, TroveId};
pub use amount::Amount;
pub use chain::{CallArg, ChainClient, ContractCall, Log, ReadCall, Receipt, ReceiptStatus};
pub use contracts::{Branch, Deployment};
pub use error::Error;
pub use flow::{FlowId, FlowRequest, FlowStep, Flowstate, StepStatus};
pub use read_model::{IndexedTrove, ReadModel};
// re-exporting external crates
pub use parking_lot;
