//! # haven-shared
//!
//! Domain vocabulary shared by the store and the server: typed ids, the
//! enums that describe a tenant's dynamic field definitions, the
//! tagged attribute value, capability scopes and constants.
//!
//! Nothing in this crate performs I/O.

pub mod constants;
pub mod error;
pub mod field;
pub mod scope;
pub mod types;
pub mod value;

pub use error::DomainError;
