//! Tenant management API: fields, persons, links, lookup lists and the
//! provenance trail of one crew.
//!
//! Callers present an API token; `read` covers the GET routes, `update`
//! everything else. The token's crew scopes every operation.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::Response,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use haven_shared::constants::{API_TYPE_PERSON, MAX_LOGGED_PAYLOAD};
use haven_shared::scope::TokenScope;
use haven_shared::types::{ApiLogId, FieldId, LinkId, ListControlId, PersonId};
use haven_store::{
    parse_event_date, ApiLog, AttributeDiff, DuplicatedReference, Field, FieldUpdate, Link, LinkUpdate, ListControl,
    ListEntry, NewApiLog, NewField, NewLink, NewPerson, Person,
};

use crate::api::AppState;
use crate::auth::require_scope;
use crate::error::ServerError;
use crate::external::batch_response;
use crate::projector::ApiProjector;
use crate::provenance::ClientInfo;

const DEFAULT_LOG_PAGE: u32 = 100;
const MAX_LOG_PAGE: u32 = 1000;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/manage/fields", get(list_fields).post(create_field))
        .route("/manage/fields/:id", get(show_field).put(update_field).delete(delete_field))
        .route("/manage/fields/:id/options", get(field_options))
        .route("/manage/lists", get(list_controls))
        .route("/manage/lists/:id", get(list_contents))
        .route("/manage/persons", get(index_persons).post(create_person))
        .route("/manage/persons/:id", get(show_person).put(update_person).delete(delete_person))
        .route("/manage/persons/:id/purge", delete(purge_person))
        .route("/manage/persons/:id/unique-id", put(fix_unique_id))
        .route("/manage/persons/:id/links", get(person_links))
        .route("/manage/duplicates", get(duplicates))
        .route("/manage/import", post(import_persons))
        .route("/manage/links", get(list_links).post(create_link))
        .route("/manage/links/:id", get(show_link).put(update_link).delete(delete_link))
        .route("/manage/logs", get(list_logs))
        .route("/manage/logs/:id", get(show_log))
}

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

async fn list_fields(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Vec<Field>>, ServerError> {
    let db = state.db()?;
    let principal = require_scope(&db, &headers, TokenScope::Read)?;
    Ok(Json(db.list_fields(principal.crew_id)?))
}

async fn create_field(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(new): Json<NewField>,
) -> Result<(StatusCode, Json<Field>), ServerError> {
    let db = state.db()?;
    let principal = require_scope(&db, &headers, TokenScope::Update)?;
    let field = db.create_field(principal.crew_id, new)?;
    Ok((StatusCode::CREATED, Json(field)))
}

async fn show_field(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<FieldId>,
) -> Result<Json<Field>, ServerError> {
    let db = state.db()?;
    let principal = require_scope(&db, &headers, TokenScope::Read)?;
    Ok(Json(db.get_field(principal.crew_id, id)?))
}

async fn update_field(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<FieldId>,
    Json(update): Json<FieldUpdate>,
) -> Result<Json<Field>, ServerError> {
    let db = state.db()?;
    let principal = require_scope(&db, &headers, TokenScope::Update)?;
    Ok(Json(db.update_field(principal.crew_id, id, update)?))
}

async fn delete_field(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<FieldId>,
) -> Result<StatusCode, ServerError> {
    let db = state.db()?;
    let principal = require_scope(&db, &headers, TokenScope::Update)?;
    if db.delete_field(principal.crew_id, id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServerError::NotFound(format!("field {id}")))
    }
}

#[derive(Debug, Deserialize)]
struct OptionsQuery {
    selected: Option<String>,
}

async fn field_options(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<FieldId>,
    Query(query): Query<OptionsQuery>,
) -> Result<Json<Vec<ListEntry>>, ServerError> {
    let db = state.db()?;
    let principal = require_scope(&db, &headers, TokenScope::Read)?;
    let field = db.get_field(principal.crew_id, id)?;
    Ok(Json(db.candidate_options(&field, query.selected.as_deref())?))
}

// ---------------------------------------------------------------------------
// Lookup lists
// ---------------------------------------------------------------------------

async fn list_controls(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ListControl>>, ServerError> {
    let db = state.db()?;
    require_scope(&db, &headers, TokenScope::Read)?;
    Ok(Json(db.list_controls()?))
}

async fn list_contents(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<ListControlId>,
) -> Result<Json<Vec<ListEntry>>, ServerError> {
    let db = state.db()?;
    require_scope(&db, &headers, TokenScope::Read)?;
    Ok(Json(db.list_contents(id)?))
}

// ---------------------------------------------------------------------------
// Persons
// ---------------------------------------------------------------------------

/// Form body for creating or editing a person. Attributes are keyed by
/// field label.
#[derive(Debug, Default, Deserialize)]
struct PersonForm {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    unique_id: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    attributes: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct PersonSummary {
    id: PersonId,
    date: chrono::DateTime<chrono::Utc>,
    unique_id: Option<String>,
    display_name: String,
    /// Values of the crew's descriptive fields, keyed by label.
    summary: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct PersonDetail {
    person: Person,
    display_name: String,
    attributes: Map<String, Value>,
    links: Vec<Link>,
}

async fn index_persons(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<PersonSummary>>, ServerError> {
    let db = state.db()?;
    let principal = require_scope(&db, &headers, TokenScope::Read)?;
    let crew_id = principal.crew_id;

    let projector = ApiProjector::new(&db, crew_id)?;
    let descriptive = db.descriptive_fields(crew_id)?;
    let mut attributes = db.attributes_by_person(crew_id)?;
    let mut summaries = Vec::new();
    for person in db.list_persons(crew_id)? {
        let values = attributes.remove(&person.id).unwrap_or_default();
        let mut summary = Map::new();
        for field in &descriptive {
            if let Some(raw) = values.get(&field.id) {
                summary.insert(field.label.clone(), projector.project_value(field, raw)?);
            }
        }
        summaries.push(PersonSummary {
            display_name: projector.display_name(&person, &values)?,
            summary,
            id: person.id,
            date: person.date,
            unique_id: person.unique_id,
        });
    }
    Ok(Json(summaries))
}

async fn create_person(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(form): Json<PersonForm>,
) -> Result<(StatusCode, Json<Person>), ServerError> {
    let db = state.db()?;
    let principal = require_scope(&db, &headers, TokenScope::Update)?;
    let crew_id = principal.crew_id;

    let date = match form.date.as_deref() {
        Some(raw) => Some(parse_event_date(raw).ok_or_else(|| ServerError::BadRequest(format!("unreadable date: {raw}")))?),
        None => None,
    };
    let attributes = ApiProjector::new(&db, crew_id)?.attributes_from_labels(&form.attributes)?;
    let person = db.create_with_attributes(
        crew_id,
        &NewPerson {
            date,
            unique_id: form.unique_id,
            details: form.details,
            ..NewPerson::default()
        },
        &attributes,
    )?;
    tracing::info!(crew_id = %crew_id, person_id = %person.id, user_id = %principal.user_id, "person created");
    Ok((StatusCode::CREATED, Json(person)))
}

async fn show_person(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<PersonId>,
) -> Result<Json<PersonDetail>, ServerError> {
    let db = state.db()?;
    let principal = require_scope(&db, &headers, TokenScope::Read)?;
    let crew_id = principal.crew_id;

    let person = db.get_person(crew_id, id)?;
    let values = db.attributes_of(crew_id, id)?;
    let projector = ApiProjector::new(&db, crew_id)?;
    Ok(Json(PersonDetail {
        display_name: projector.display_name(&person, &values)?,
        attributes: projector.project_person(&person, &values)?,
        links: db.links_for_person(crew_id, id)?,
        person,
    }))
}

/// Replace the person's attribute set with the form's. Labels missing from
/// the form are detached.
async fn update_person(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<PersonId>,
    Json(form): Json<PersonForm>,
) -> Result<Json<AttributeDiff>, ServerError> {
    let db = state.db()?;
    let principal = require_scope(&db, &headers, TokenScope::Update)?;
    let crew_id = principal.crew_id;

    let attributes = ApiProjector::new(&db, crew_id)?.attributes_from_labels(&form.attributes)?;
    let diff = db.in_transaction(|db| {
        let diff = db.apply_update(crew_id, id, &attributes)?;
        if form.details.is_some() {
            db.set_person_details(crew_id, id, form.details.as_deref())?;
        }
        Ok(diff)
    })?;
    Ok(Json(diff))
}

async fn delete_person(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<PersonId>,
) -> Result<StatusCode, ServerError> {
    let db = state.db()?;
    let principal = require_scope(&db, &headers, TokenScope::Update)?;
    if db.soft_delete_person(principal.crew_id, id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServerError::NotFound(format!("person {id}")))
    }
}

async fn purge_person(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<PersonId>,
) -> Result<StatusCode, ServerError> {
    let db = state.db()?;
    let principal = require_scope(&db, &headers, TokenScope::Update)?;
    if db.purge_person(principal.crew_id, id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServerError::NotFound(format!("person {id}")))
    }
}

#[derive(Debug, Deserialize)]
struct UniqueIdFix {
    unique_id: String,
}

async fn fix_unique_id(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<PersonId>,
    Json(fix): Json<UniqueIdFix>,
) -> Result<Json<Person>, ServerError> {
    let db = state.db()?;
    let principal = require_scope(&db, &headers, TokenScope::Update)?;
    Ok(Json(db.fix_duplicated_reference(principal.crew_id, id, fix.unique_id.trim())?))
}

async fn person_links(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<PersonId>,
) -> Result<Json<Vec<Link>>, ServerError> {
    let db = state.db()?;
    let principal = require_scope(&db, &headers, TokenScope::Read)?;
    db.get_person(principal.crew_id, id)?;
    Ok(Json(db.links_for_person(principal.crew_id, id)?))
}

async fn duplicates(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<DuplicatedReference>>, ServerError> {
    let db = state.db()?;
    let principal = require_scope(&db, &headers, TokenScope::Read)?;
    Ok(Json(db.find_duplicated_references(principal.crew_id)?))
}

/// Import a JSON file of person records. Goes through the same per-item
/// path as the external batch write and is logged the same way.
async fn import_persons(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    client: ClientInfo,
    Json(items): Json<Vec<Value>>,
) -> Result<Response, ServerError> {
    let db = state.db()?;
    let principal = require_scope(&db, &headers, TokenScope::Update)?;
    if items.len() > state.config.max_batch_items {
        return Err(ServerError::BadRequest(format!(
            "Batch of {} items exceeds the limit of {}",
            items.len(),
            state.config.max_batch_items
        )));
    }

    let mut payload = Value::Array(items.clone()).to_string();
    if payload.len() > MAX_LOGGED_PAYLOAD {
        payload = format!("{} records", items.len());
    }
    let log = db.create_api_log(NewApiLog {
        crew_id: Some(principal.crew_id),
        user_id: Some(principal.user_id),
        ip: client.ip,
        application_id: client.application_id,
        api_type: API_TYPE_PERSON.to_string(),
        http_method: method.as_str().to_string(),
        payload: Some(payload),
    })?;

    let outcome = ApiProjector::new(&db, principal.crew_id)?.project_persons_for_write(&log, &items);
    tracing::info!(
        crew_id = %principal.crew_id,
        api_log = %log.id,
        created = outcome.created.len(),
        failed = outcome.errors.len(),
        "import finished"
    );
    batch_response(&db, &log, outcome)
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

async fn list_links(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Vec<Link>>, ServerError> {
    let db = state.db()?;
    let principal = require_scope(&db, &headers, TokenScope::Read)?;
    Ok(Json(db.list_links(principal.crew_id)?))
}

async fn create_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(new): Json<NewLink>,
) -> Result<(StatusCode, Json<Link>), ServerError> {
    let db = state.db()?;
    let principal = require_scope(&db, &headers, TokenScope::Update)?;
    let link = db.create_link(principal.crew_id, &new)?;
    Ok((StatusCode::CREATED, Json(link)))
}

async fn show_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<LinkId>,
) -> Result<Json<Link>, ServerError> {
    let db = state.db()?;
    let principal = require_scope(&db, &headers, TokenScope::Read)?;
    Ok(Json(db.get_link(principal.crew_id, id)?))
}

async fn update_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<LinkId>,
    Json(update): Json<LinkUpdate>,
) -> Result<Json<Link>, ServerError> {
    let db = state.db()?;
    let principal = require_scope(&db, &headers, TokenScope::Update)?;
    Ok(Json(db.update_link(principal.crew_id, id, &update)?))
}

async fn delete_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<LinkId>,
) -> Result<StatusCode, ServerError> {
    let db = state.db()?;
    let principal = require_scope(&db, &headers, TokenScope::Update)?;
    if db.soft_delete_link(principal.crew_id, id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServerError::NotFound(format!("link {id}")))
    }
}

// ---------------------------------------------------------------------------
// Provenance
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LogsQuery {
    limit: Option<u32>,
}

async fn list_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<ApiLog>>, ServerError> {
    let db = state.db()?;
    let principal = require_scope(&db, &headers, TokenScope::Read)?;
    let limit = query.limit.unwrap_or(DEFAULT_LOG_PAGE).min(MAX_LOG_PAGE);
    Ok(Json(db.list_api_logs(principal.crew_id, limit)?))
}

async fn show_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<ApiLogId>,
) -> Result<Json<ApiLog>, ServerError> {
    let db = state.db()?;
    let principal = require_scope(&db, &headers, TokenScope::Read)?;
    let log = db.get_api_log(id)?;
    if log.crew_id != Some(principal.crew_id) {
        return Err(ServerError::NotFound(format!("api log {id}")));
    }
    Ok(Json(log))
}
