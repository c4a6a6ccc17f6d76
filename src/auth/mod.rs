//! Credential and role management.
//!
//! A [`Session`] owns the client set used for every remote call and knows
//! how to swap it for assumed-role credentials, restore the ambient ones,
//! and recover from credentials that expire in the middle of an operation.

mod session;

pub use session::{ASSUME_ROLE_DURATION_SECS, MFA_ASSUME_ROLE_DURATION_SECS, Session};
