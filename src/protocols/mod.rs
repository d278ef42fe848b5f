//! Protocol integrations for the outbound dialer.

pub mod ari;

pub use ari::{AriClient, AriEvent, AriEventStream, HttpAriClient};
