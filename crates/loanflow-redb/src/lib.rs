//! Redb storage backend for loanflow

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

pub mod error;
mod kv;

pub use error::Error;
pub use kv::FlowRedbDatabase;
