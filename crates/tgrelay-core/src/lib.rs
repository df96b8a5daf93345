//! Core domain + application logic for the Telegram group relay.
//!
//! The crate is transport-agnostic. The MTProto client, the
//! message store and the human operator live behind ports (traits) implemented
//! in adapter crates.

pub mod app;
pub mod auth;
pub mod config;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod operator;
pub mod rate_limit;
pub mod recovery;
pub mod relay;
pub mod rpc;
pub mod selector;
pub mod store;
pub mod watermark;

#[cfg(test)]
pub(crate) mod test_support;

pub use errors::{Error, Result};
