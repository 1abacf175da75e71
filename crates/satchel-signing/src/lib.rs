//! Request canonicalization and signing for the satchel portal client.
//!
//! Two incompatible protocols share one `sign` contract:
//!
//! - [`SigningScheme::Legacy`] — SHA-1 over the whole serialized body,
//!   paired with the server-assigned credential token
//! - [`SigningScheme::HttpSignature`] — SHA-256 over a canonical view of
//!   the request (path, body digest, date), rendered as a single
//!   `keyId=...` header
//!
//! The [`SigningEnvelope`] carries the standard per-request body fields
//! both protocols expect.

mod canonical;
mod envelope;
mod scheme;

pub use canonical::{body_digest, extract_canonical_url, signing_date, CanonicalRequest};
pub use envelope::{EnvelopeStatics, SigningEnvelope};
pub use scheme::SigningScheme;
