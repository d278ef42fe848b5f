//! Top-level orchestration for the outbound dialer.

pub mod dialer;

pub use dialer::Dialer;
