//! Signed API client and device registration for the satchel portal.
//!
//! [`RegistrationFlow`] establishes a signing identity (imported PKCS#12
//! bundle or locally generated self-signed certificate) and persists it;
//! [`SignedApiClient`] then wraps every outgoing call with the standard
//! envelope, a reachability precheck, and the active signing scheme.
//!
//! This subsystem performs no retries or backoff; retry policy belongs to
//! the caller.

mod client;
mod reachability;
mod registration;

pub use client::{SignedApiClient, SignedApiClientBuilder};
pub use reachability::{AlwaysReachable, FixedReachability, ReachabilityProbe};
pub use registration::{RegistrationConfig, RegistrationFlow, RegistrationState};
