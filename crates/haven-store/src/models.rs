//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` so it can be handed directly to the HTTP
//! layer; the `New*` and `*Update` inputs derive `Deserialize` as well.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use haven_shared::field::{DatabaseType, FieldStatus, Requirement};
use haven_shared::scope::ScopeSet;
use haven_shared::types::{
    ApiLogId, CrewId, FieldId, LinkId, ListControlId, ListEntryId, PersonId, UserId,
};

// ---------------------------------------------------------------------------
// Tenancy
// ---------------------------------------------------------------------------

/// A tenant: the isolation boundary for fields, persons and links.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Crew {
    pub id: CrewId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// An operator account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub crew_id: CrewId,
    pub name: String,
    pub email: String,
    pub role_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRole {
    pub id: i64,
    pub name: String,
}

/// A user's request to be moved to another role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleRequest {
    pub id: i64,
    pub user_id: UserId,
    pub role_id: i64,
    /// `None` while pending.
    pub accepted: Option<bool>,
    /// When the request was decided.
    pub granted: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Stored metadata of a capability token. The secret itself is never kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiToken {
    pub id: i64,
    pub user_id: UserId,
    pub name: String,
    pub scopes: ScopeSet,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

/// Who is calling and what they may do, resolved from a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user_id: UserId,
    pub crew_id: CrewId,
    pub scopes: ScopeSet,
}

// ---------------------------------------------------------------------------
// Lookup lists
// ---------------------------------------------------------------------------

/// Definition of a lookup list: which concrete table it reads and which of
/// its columns is shown to people.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListControl {
    pub id: ListControlId,
    pub name: String,
    pub title: String,
    pub displayed_value: String,
}

/// One `(id, display value)` row of a lookup list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListEntry {
    pub id: ListEntryId,
    pub value: String,
}

// ---------------------------------------------------------------------------
// Field
// ---------------------------------------------------------------------------

/// A tenant-scoped attribute definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Field {
    pub id: FieldId,
    pub crew_id: CrewId,
    /// Stable machine key, unique per crew. Used as the key in API payloads.
    pub label: String,
    pub title: String,
    pub placeholder: Option<String>,
    pub database_type: DatabaseType,
    pub html_data_type: String,
    pub android_type: String,
    pub validation_rule: String,
    pub required: Requirement,
    pub status: FieldStatus,
    pub order: i64,
    pub linked_list: Option<ListControlId>,
    pub descriptive_value: bool,
    pub best_descriptive_value: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a field. Derived metadata is computed by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewField {
    pub label: String,
    pub title: String,
    #[serde(default)]
    pub placeholder: Option<String>,
    pub database_type: DatabaseType,
    pub required: Requirement,
    pub status: FieldStatus,
    /// Appended after the crew's last field when absent.
    #[serde(default)]
    pub order: Option<i64>,
    #[serde(default)]
    pub linked_list: Option<ListControlId>,
    #[serde(default)]
    pub descriptive_value: bool,
    #[serde(default)]
    pub best_descriptive_value: bool,
}

/// Editable parts of a field. `database_type` is fixed after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldUpdate {
    pub title: String,
    #[serde(default)]
    pub placeholder: Option<String>,
    pub required: Requirement,
    pub status: FieldStatus,
    pub order: i64,
    #[serde(default)]
    pub linked_list: Option<ListControlId>,
    #[serde(default)]
    pub descriptive_value: bool,
    #[serde(default)]
    pub best_descriptive_value: bool,
}

// ---------------------------------------------------------------------------
// Person
// ---------------------------------------------------------------------------

/// The shell record of a tracked person. Attribute values live in the
/// `field_person` pivot, not here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Person {
    pub id: PersonId,
    pub crew_id: CrewId,
    pub date: DateTime<Utc>,
    pub api_log: Option<ApiLogId>,
    pub application_id: Option<String>,
    pub unique_id: Option<String>,
    pub details: Option<String>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

/// Shell columns supplied when a person is created.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewPerson {
    /// Defaults to now.
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub api_log: Option<ApiLogId>,
    #[serde(default)]
    pub application_id: Option<String>,
    #[serde(default)]
    pub unique_id: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
}

/// Persons sharing one external reference inside a crew.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DuplicatedReference {
    pub unique_id: String,
    pub persons: Vec<PersonId>,
}

// ---------------------------------------------------------------------------
// Link
// ---------------------------------------------------------------------------

/// A directed relationship between two persons of the same crew.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Link {
    pub id: LinkId,
    pub crew_id: CrewId,
    pub from: PersonId,
    pub to: PersonId,
    /// Row id in the `Relation` lookup list.
    pub relation: ListEntryId,
    pub detail: Option<String>,
    pub api_log: Option<ApiLogId>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewLink {
    pub from: PersonId,
    pub to: PersonId,
    pub relation: ListEntryId,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub api_log: Option<ApiLogId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkUpdate {
    pub relation: ListEntryId,
    #[serde(default)]
    pub detail: Option<String>,
}

// ---------------------------------------------------------------------------
// Provenance
// ---------------------------------------------------------------------------

/// Audit record of one API call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiLog {
    pub id: ApiLogId,
    pub crew_id: Option<CrewId>,
    pub user_id: Option<UserId>,
    pub ip: Option<String>,
    pub application_id: Option<String>,
    pub api_type: String,
    pub http_method: String,
    pub payload: Option<String>,
    pub response: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request facts captured when a provenance entry is opened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewApiLog {
    pub crew_id: Option<CrewId>,
    pub user_id: Option<UserId>,
    pub ip: Option<String>,
    pub application_id: Option<String>,
    pub api_type: String,
    pub http_method: String,
    pub payload: Option<String>,
}
