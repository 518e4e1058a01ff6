//! Business logic services
//!
//! Operations spanning the owning-resource tables and the secret store.

pub mod cascade;

pub use cascade::{CascadeDeleter, CascadeFailure, CascadeOutcome};
