//! # haven-store
//!
//! SQLite storage for Haven case files.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection`, runs migrations on open, and provides typed CRUD
//! helpers for every domain model. The dynamic attribute engine lives here
//! as well:
//!
//! - [`fields`]: the per-crew field registry (ordering, metadata, API content)
//! - [`lists`]: lookup lists and the linked-list resolver
//! - [`attributes`]: the entity-attribute-value pivot and its update diff
//!
//! Every operation that touches tenant data takes the [`CrewId`] explicitly.
//!
//! [`CrewId`]: haven_shared::types::CrewId

pub mod api_logs;
pub mod attributes;
pub mod crews;
pub mod database;
pub mod fields;
pub mod links;
pub mod lists;
pub mod migrations;
pub mod models;
pub mod persons;
pub mod tokens;
pub mod users;

mod error;
mod sql;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
pub use api_logs::truncate_logged;
pub use attributes::AttributeDiff;
pub use fields::FieldSet;
pub use lists::{BoundList, LinkedListResolver, ListRegistry, LookupTable};
pub use sql::parse_event_date;
