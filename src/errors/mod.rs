//! # Error Handling
//!
//! Error types shared by every secret-store backend. Each backend maps its own
//! failures (SQL, key-value transport, external secret service) onto one
//! taxonomy so callers can react without knowing which backend is deployed.

pub mod types;

pub use types::{AuthStoreError, DecodeError, Result};
