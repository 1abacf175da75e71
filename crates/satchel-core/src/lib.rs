//! Core types and errors for the satchel portal client.
//!
//! This crate provides the foundation shared by the identity, signing,
//! and client crates:
//!
//! - **Errors**: the full failure taxonomy with [`SatchelError`]
//! - **Types**: wire-level protocol values ([`SignedHeaders`], routing
//!   rules, registration response envelopes)

mod error;
mod types;

pub use error::{Result, SatchelError};
pub use types::*;
