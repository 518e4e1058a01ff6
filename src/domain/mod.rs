//! # Domain Model
//!
//! Authentication records, their owning resources and listing filters.

pub mod authentication;
pub mod filter;

pub use authentication::{
    Authentication, AuthenticationEvent, AuthenticationId, AuthenticationPatch,
    AvailabilityStatus, NewAuthentication, ResourceType,
};
pub use filter::{Filter, FilterField, FilterOperation, FilterSet, Page, SortBy, SortDirection};
