//! Instance administration behind `ADMIN_TOKEN`: crews, users, roles,
//! role requests, API tokens and lookup list display columns.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use haven_shared::scope::ScopeSet;
use haven_shared::types::{CrewId, ListControlId, UserId};
use haven_store::{ApiToken, Crew, ListControl, RoleRequest, User, UserRole};

use crate::api::AppState;
use crate::auth::verify_admin_token;
use crate::error::ServerError;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/crews", get(list_crews).post(create_crew))
        .route("/admin/crews/:id", get(show_crew).put(rename_crew))
        .route("/admin/crews/:id/users", get(crew_users))
        .route("/admin/roles", get(list_roles))
        .route("/admin/users", post(create_user))
        .route("/admin/users/:id", get(show_user).put(update_user).delete(delete_user))
        .route("/admin/users/:id/crew", put(change_crew))
        .route("/admin/users/:id/tokens", get(list_tokens).post(issue_token))
        .route("/admin/users/:id/role-requests", post(request_role))
        .route("/admin/tokens/:id", delete(revoke_token))
        .route("/admin/role-requests", get(pending_role_requests))
        .route("/admin/role-requests/:id/grant", post(grant_role_request))
        .route("/admin/role-requests/:id/reject", post(reject_role_request))
        .route("/admin/lists/:id", put(set_displayed_value))
}

// ---------------------------------------------------------------------------
// Crews
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CrewRequest {
    name: String,
}

async fn list_crews(headers: HeaderMap, State(state): State<AppState>) -> Result<Json<Vec<Crew>>, ServerError> {
    verify_admin_token(&headers, &state.config)?;
    Ok(Json(state.db()?.list_crews()?))
}

async fn create_crew(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<CrewRequest>,
) -> Result<(StatusCode, Json<Crew>), ServerError> {
    verify_admin_token(&headers, &state.config)?;
    let name = non_empty(&req.name, "name")?;
    let crew = state.db()?.create_crew(name)?;
    info!(crew_id = %crew.id, name = %crew.name, "Admin created crew");
    Ok((StatusCode::CREATED, Json(crew)))
}

async fn show_crew(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<CrewId>,
) -> Result<Json<Crew>, ServerError> {
    verify_admin_token(&headers, &state.config)?;
    Ok(Json(state.db()?.get_crew(id)?))
}

async fn rename_crew(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<CrewId>,
    Json(req): Json<CrewRequest>,
) -> Result<Json<Crew>, ServerError> {
    verify_admin_token(&headers, &state.config)?;
    let name = non_empty(&req.name, "name")?;
    Ok(Json(state.db()?.rename_crew(id, name)?))
}

async fn crew_users(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<CrewId>,
) -> Result<Json<Vec<User>>, ServerError> {
    verify_admin_token(&headers, &state.config)?;
    let db = state.db()?;
    db.get_crew(id)?;
    Ok(Json(db.list_users(id)?))
}

// ---------------------------------------------------------------------------
// Users and roles
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct NewUserRequest {
    crew_id: CrewId,
    name: String,
    email: String,
    role_id: i64,
}

#[derive(Deserialize)]
struct UserUpdateRequest {
    name: String,
    email: String,
}

#[derive(Deserialize)]
struct ChangeCrewRequest {
    crew_id: CrewId,
}

async fn list_roles(headers: HeaderMap, State(state): State<AppState>) -> Result<Json<Vec<UserRole>>, ServerError> {
    verify_admin_token(&headers, &state.config)?;
    Ok(Json(state.db()?.list_user_roles()?))
}

async fn create_user(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<NewUserRequest>,
) -> Result<(StatusCode, Json<User>), ServerError> {
    verify_admin_token(&headers, &state.config)?;
    let name = non_empty(&req.name, "name")?;
    let email = non_empty(&req.email, "email")?;
    let db = state.db()?;
    db.get_crew(req.crew_id)?;
    let user = db.create_user(req.crew_id, name, email, req.role_id)?;
    info!(user_id = %user.id, crew_id = %user.crew_id, "Admin created user");
    Ok((StatusCode::CREATED, Json(user)))
}

async fn show_user(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<Json<User>, ServerError> {
    verify_admin_token(&headers, &state.config)?;
    Ok(Json(state.db()?.get_user(id)?))
}

async fn update_user(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    Json(req): Json<UserUpdateRequest>,
) -> Result<Json<User>, ServerError> {
    verify_admin_token(&headers, &state.config)?;
    let name = non_empty(&req.name, "name")?;
    let email = non_empty(&req.email, "email")?;
    Ok(Json(state.db()?.update_user(id, name, email)?))
}

async fn delete_user(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<StatusCode, ServerError> {
    verify_admin_token(&headers, &state.config)?;
    if state.db()?.delete_user(id)? {
        info!(user_id = %id, "Admin deleted user");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServerError::NotFound(format!("user {id}")))
    }
}

async fn change_crew(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    Json(req): Json<ChangeCrewRequest>,
) -> Result<Json<User>, ServerError> {
    verify_admin_token(&headers, &state.config)?;
    let user = state.db()?.change_crew(id, req.crew_id)?;
    info!(user_id = %id, crew_id = %req.crew_id, "Admin moved user to another crew");
    Ok(Json(user))
}

// ---------------------------------------------------------------------------
// Role requests
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RoleRequestBody {
    role_id: i64,
}

#[derive(Serialize)]
struct RoleRequestResponse {
    /// `None` when the user already holds the role.
    request: Option<RoleRequest>,
}

async fn request_role(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    Json(req): Json<RoleRequestBody>,
) -> Result<Json<RoleRequestResponse>, ServerError> {
    verify_admin_token(&headers, &state.config)?;
    let request = state.db()?.request_role(id, req.role_id)?;
    Ok(Json(RoleRequestResponse { request }))
}

async fn pending_role_requests(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<Vec<RoleRequest>>, ServerError> {
    verify_admin_token(&headers, &state.config)?;
    Ok(Json(state.db()?.pending_role_requests()?))
}

async fn grant_role_request(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<RoleRequest>, ServerError> {
    verify_admin_token(&headers, &state.config)?;
    let request = state.db()?.grant_role_request(id)?;
    info!(request_id = id, user_id = %request.user_id, role_id = request.role_id, "Admin granted role");
    Ok(Json(request))
}

async fn reject_role_request(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<RoleRequest>, ServerError> {
    verify_admin_token(&headers, &state.config)?;
    Ok(Json(state.db()?.reject_role_request(id)?))
}

// ---------------------------------------------------------------------------
// API tokens
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct IssueTokenRequest {
    name: String,
    scopes: ScopeSet,
}

/// The plaintext secret is returned exactly once.
#[derive(Serialize)]
struct IssuedToken {
    token: ApiToken,
    secret: String,
}

async fn issue_token(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    Json(req): Json<IssueTokenRequest>,
) -> Result<(StatusCode, Json<IssuedToken>), ServerError> {
    verify_admin_token(&headers, &state.config)?;
    if req.scopes.is_empty() {
        return Err(ServerError::BadRequest("a token needs at least one scope".into()));
    }
    let db = state.db()?;
    db.get_user(id)?;
    let (token, secret) = db.issue_token(id, non_empty(&req.name, "name")?, &req.scopes)?;
    info!(user_id = %id, token_id = token.id, scopes = %token.scopes, "Admin issued API token");
    Ok((StatusCode::CREATED, Json(IssuedToken { token, secret })))
}

async fn list_tokens(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<Json<Vec<ApiToken>>, ServerError> {
    verify_admin_token(&headers, &state.config)?;
    Ok(Json(state.db()?.list_tokens(id)?))
}

async fn revoke_token(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ServerError> {
    verify_admin_token(&headers, &state.config)?;
    if state.db()?.revoke_token(id)? {
        info!(token_id = id, "Admin revoked API token");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServerError::NotFound(format!("token {id}")))
    }
}

// ---------------------------------------------------------------------------
// Lookup lists
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct DisplayedValueRequest {
    displayed_value: String,
}

async fn set_displayed_value(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<ListControlId>,
    Json(req): Json<DisplayedValueRequest>,
) -> Result<Json<ListControl>, ServerError> {
    verify_admin_token(&headers, &state.config)?;
    Ok(Json(state.db()?.set_displayed_value(id, req.displayed_value.trim())?))
}

fn non_empty<'a>(value: &'a str, what: &str) -> Result<&'a str, ServerError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServerError::BadRequest(format!("{what} must not be empty")));
    }
    Ok(trimmed)
}
