//! Outbound call dialer and call-leg correlator driving Asterisk over ARI.
//!
//! Originates calls through a SIP trunk, bridges each one to a local
//! extension that dials an agent, records the conversation, correlates
//! asynchronous ARI events into a coherent per-call timeline, and persists
//! a structured summary of every call.

pub mod config;
pub mod core;
pub mod error;
pub mod protocols;
pub mod services;
pub mod utils;

pub use error::{Error, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
