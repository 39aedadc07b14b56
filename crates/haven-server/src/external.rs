//! The token-authenticated API used by mobile clients.
//!
//! Every handler opens a provenance entry before checking the token, see
//! [`crate::provenance::admit`].

use axum::{
    extract::State,
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;

use haven_shared::constants::{API_TYPE_FIELD, API_TYPE_LINK, API_TYPE_PERSON, READ_FORBIDDEN, SEND_FORBIDDEN};
use haven_shared::scope::TokenScope;
use haven_store::{ApiLog, Database};

use crate::api::AppState;
use crate::error::ServerError;
use crate::projector::{ApiProjector, BatchOutcome};
use crate::provenance::{admit, CallSubject, ClientInfo};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/fields", get(get_fields))
        .route("/api/persons", get(get_persons).post(post_persons))
        .route("/api/links", post(post_links))
}

#[derive(Debug, Clone, Copy)]
enum BatchKind {
    Persons,
    Links,
}

impl BatchKind {
    fn api_type(self) -> &'static str {
        match self {
            Self::Persons => API_TYPE_PERSON,
            Self::Links => API_TYPE_LINK,
        }
    }
}

async fn get_fields(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    client: ClientInfo,
) -> Result<Json<Value>, ServerError> {
    let db = state.db()?;
    let subject = CallSubject {
        api_type: API_TYPE_FIELD,
        method: &method,
        payload: None,
    };
    let admitted = admit(&db, &headers, &client, subject, TokenScope::Read, READ_FORBIDDEN)?;

    let content = ApiProjector::new(&db, admitted.principal.crew_id)?.fields_content()?;
    Ok(Json(Value::Object(content)))
}

async fn get_persons(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    client: ClientInfo,
) -> Result<Json<Vec<Value>>, ServerError> {
    let db = state.db()?;
    let subject = CallSubject {
        api_type: API_TYPE_PERSON,
        method: &method,
        payload: None,
    };
    let admitted = admit(&db, &headers, &client, subject, TokenScope::Read, READ_FORBIDDEN)?;
    let crew_id = admitted.principal.crew_id;

    let persons = db.list_persons(crew_id)?;
    let records = ApiProjector::new(&db, crew_id)?.project_for_read(&persons)?;
    tracing::debug!(crew_id = %crew_id, count = records.len(), "persons projected");
    Ok(Json(records))
}

async fn post_persons(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    client: ClientInfo,
    body: String,
) -> Result<Response, ServerError> {
    let db = state.db()?;
    write_batch(&db, &state, &headers, &client, &method, body, BatchKind::Persons)
}

async fn post_links(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    client: ClientInfo,
    body: String,
) -> Result<Response, ServerError> {
    let db = state.db()?;
    write_batch(&db, &state, &headers, &client, &method, body, BatchKind::Links)
}

fn write_batch(
    db: &Database,
    state: &AppState,
    headers: &HeaderMap,
    client: &ClientInfo,
    method: &Method,
    body: String,
    kind: BatchKind,
) -> Result<Response, ServerError> {
    let subject = CallSubject {
        api_type: kind.api_type(),
        method,
        payload: Some(body.clone()),
    };
    let admitted = admit(db, headers, client, subject, TokenScope::Update, SEND_FORBIDDEN)?;
    let log = &admitted.log;

    let items: Vec<Value> = match serde_json::from_str(&body) {
        Ok(items) => items,
        Err(e) => {
            let note = format!("Malformed batch: {e}");
            db.append_api_log_response(log.id, &note)?;
            return Err(ServerError::BadRequest(note));
        }
    };
    if items.len() > state.config.max_batch_items {
        let note = format!(
            "Batch of {} items exceeds the limit of {}",
            items.len(),
            state.config.max_batch_items
        );
        db.append_api_log_response(log.id, &note)?;
        return Err(ServerError::BadRequest(note));
    }

    let projector = ApiProjector::new(db, admitted.principal.crew_id)?;
    let outcome = match kind {
        BatchKind::Persons => projector.project_persons_for_write(log, &items),
        BatchKind::Links => projector.project_links_for_write(log, &items),
    };

    tracing::info!(
        crew_id = %admitted.principal.crew_id,
        api_log = %log.id,
        kind = ?kind,
        created = outcome.created.len(),
        failed = outcome.errors.len(),
        "batch written"
    );

    batch_response(db, log, outcome)
}

/// 201 with the created ids, or 500 with every id and failure note when
/// any item was refused.
pub(crate) fn batch_response(db: &Database, log: &ApiLog, outcome: BatchOutcome) -> Result<Response, ServerError> {
    if outcome.is_success() {
        db.append_api_log_response(log.id, &format!("Created {}", outcome.created.len()))?;
        Ok((StatusCode::CREATED, Json(outcome.created)).into_response())
    } else {
        Ok((StatusCode::INTERNAL_SERVER_ERROR, Json(outcome)).into_response())
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use haven_shared::constants::{BAD_TOKEN_ACCESS, FULL_NAME_LABEL, UNKNOWN_TOKEN};
    use haven_shared::field::{DatabaseType, FieldStatus, Requirement};
    use haven_shared::scope::{ScopeSet, TokenScope};
    use haven_shared::types::CrewId;
    use haven_store::NewField;

    use super::*;
    use crate::api::tests::{json_body, send, test_state};

    /// A crew with a `full_name` field and a member holding a token with
    /// the given scopes.
    fn seed_crew(state: &AppState, name: &str, scopes: &[TokenScope]) -> (CrewId, String) {
        let db = state.db().unwrap();
        let crew = db.create_crew(name).unwrap();
        db.create_field(
            crew.id,
            NewField {
                label: FULL_NAME_LABEL.into(),
                title: "Full name".into(),
                placeholder: None,
                database_type: DatabaseType::String,
                required: Requirement::Required,
                status: FieldStatus::WebsiteAndApp,
                order: None,
                linked_list: None,
                descriptive_value: true,
                best_descriptive_value: true,
            },
        )
        .unwrap();
        let user = db
            .create_user(crew.id, "Operator", &format!("op@{name}.example"), 3)
            .unwrap();
        let (_, secret) = db
            .issue_token(user.id, "tablet", &ScopeSet::new(scopes.iter().copied()))
            .unwrap();
        (crew.id, secret)
    }

    #[tokio::test]
    async fn update_only_token_cannot_read_and_leaves_one_log() {
        let (_dir, state) = test_state();
        let (_, secret) = seed_crew(&state, "north", &[TokenScope::Update]);
        let before = state.db().unwrap().count_api_logs().unwrap();

        let response = send(&state, Method::GET, "/api/persons", Some(&secret), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["error"], READ_FORBIDDEN);

        let db = state.db().unwrap();
        assert_eq!(db.count_api_logs().unwrap(), before + 1);
        let logs: Vec<_> = db
            .conn()
            .prepare("SELECT response FROM api_logs")
            .unwrap()
            .query_map([], |row| row.get::<_, Option<String>>(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(logs, vec![Some(BAD_TOKEN_ACCESS.to_string())]);
    }

    #[tokio::test]
    async fn read_only_token_cannot_send() {
        let (_dir, state) = test_state();
        let (crew, secret) = seed_crew(&state, "north", &[TokenScope::Read]);

        let response = send(
            &state,
            Method::POST,
            "/api/persons",
            Some(&secret),
            Some(json!([{"full_name": "Amina"}])),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["error"], SEND_FORBIDDEN);
        assert!(state.db().unwrap().list_persons(crew).unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_token_is_refused_and_logged() {
        let (_dir, state) = test_state();

        let response = send(&state, Method::GET, "/api/fields", Some("nope"), None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let db = state.db().unwrap();
        let response: Option<String> = db
            .conn()
            .query_row("SELECT response FROM api_logs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(response.as_deref(), Some(UNKNOWN_TOKEN));
    }

    #[tokio::test]
    async fn batch_keeps_good_items_when_one_fails() {
        let (_dir, state) = test_state();
        let (crew, secret) = seed_crew(&state, "north", &[TokenScope::Read, TokenScope::Update]);

        let response = send(
            &state,
            Method::POST,
            "/api/persons",
            Some(&secret),
            Some(json!([
                {"full_name": "Amina", "unique_id": "R-1"},
                {"full_name": "Bilal", "no_such_field": "x"},
                {"full_name": "Chadi", "unique_id": "R-3"}
            ])),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["created"].as_array().unwrap().len(), 2);
        let errors = body["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].as_str().unwrap().contains("no_such_field"));

        let db = state.db().unwrap();
        assert_eq!(db.list_persons(crew).unwrap().len(), 2);
        let log = db.list_api_logs(crew, 10).unwrap().remove(0);
        assert!(log.response.unwrap().starts_with("Error while creating this refugee"));
    }

    #[tokio::test]
    async fn successful_batch_returns_created_ids() {
        let (_dir, state) = test_state();
        let (crew, secret) = seed_crew(&state, "north", &[TokenScope::Update]);

        let response = send(
            &state,
            Method::POST,
            "/api/persons",
            Some(&secret),
            Some(json!([
                {"full_name": "Amina", "unique_id": "R-1"},
                {"full_name": "Samir", "unique_id": "R-2"}
            ])),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(json_body(response).await.as_array().unwrap().len(), 2);

        let response = send(
            &state,
            Method::POST,
            "/api/links",
            Some(&secret),
            Some(json!([{
                "refugee1_full_name": "Amina", "refugee1_unique_id": "R-1",
                "refugee2_full_name": "Samir", "refugee2_unique_id": "R-2",
                "relation": 3, "detail": "brother"
            }])),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(state.db().unwrap().list_links(crew).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reads_never_cross_crews() {
        let (_dir, state) = test_state();
        let (_, north) = seed_crew(&state, "north", &[TokenScope::Read, TokenScope::Update]);
        let (_, south) = seed_crew(&state, "south", &[TokenScope::Read]);

        let response = send(
            &state,
            Method::POST,
            "/api/persons",
            Some(&north),
            Some(json!([{"full_name": "Amina"}])),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = send(&state, Method::GET, "/api/persons", Some(&south), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!([]));

        let response = send(&state, Method::GET, "/api/persons", Some(&north), None).await;
        let records = json_body(response).await;
        assert_eq!(records.as_array().unwrap().len(), 1);
        assert_eq!(records[0]["full_name"], "Amina");
    }

    #[tokio::test]
    async fn field_payload_lists_relations() {
        let (_dir, state) = test_state();
        let (_, secret) = seed_crew(&state, "north", &[TokenScope::Read]);

        let response = send(&state, Method::GET, "/api/fields", Some(&secret), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["fields"][0]["label"], FULL_NAME_LABEL);
        assert!(!body["Relations"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected() {
        let (_dir, mut state) = test_state();
        state.config = std::sync::Arc::new(crate::config::ServerConfig {
            max_batch_items: 1,
            ..(*state.config).clone()
        });
        let (crew, secret) = seed_crew(&state, "north", &[TokenScope::Update]);

        let response = send(
            &state,
            Method::POST,
            "/api/persons",
            Some(&secret),
            Some(json!([{"full_name": "A"}, {"full_name": "B"}])),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(state.db().unwrap().list_persons(crew).unwrap().is_empty());
    }
}
