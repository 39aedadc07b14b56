//! Operator accounts, roles and role requests.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use haven_shared::types::{CrewId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{RoleRequest, User, UserRole};
use crate::sql::{parse_col, parse_ts};

impl Database {
    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub fn create_user(&self, crew_id: CrewId, name: &str, email: &str, role_id: i64) -> Result<User> {
        let user = User {
            id: UserId::new(),
            crew_id,
            name: name.to_string(),
            email: email.to_string(),
            role_id,
            created_at: Utc::now(),
        };
        self.conn()
            .execute(
                "INSERT INTO users (id, crew_id, name, email, role_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    user.id.to_string(),
                    user.crew_id.to_string(),
                    user.name,
                    user.email,
                    user.role_id,
                    user.created_at.to_rfc3339(),
                ],
            )
            .map_err(StoreError::from_query)?;
        tracing::info!(user_id = %user.id, crew_id = %crew_id, "user created");
        Ok(user)
    }

    pub fn get_user(&self, id: UserId) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, crew_id, name, email, role_id, created_at FROM users WHERE id = ?1",
                params![id.to_string()],
                row_to_user,
            )
            .map_err(StoreError::from_query)
    }

    pub fn list_users(&self, crew_id: CrewId) -> Result<Vec<User>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, crew_id, name, email, role_id, created_at
             FROM users WHERE crew_id = ?1 ORDER BY name ASC",
        )?;
        let rows = stmt.query_map(params![crew_id.to_string()], row_to_user)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn update_user(&self, id: UserId, name: &str, email: &str) -> Result<User> {
        let affected = self
            .conn()
            .execute(
                "UPDATE users SET name = ?1, email = ?2 WHERE id = ?3",
                params![name, email, id.to_string()],
            )
            .map_err(StoreError::from_query)?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_user(id)
    }

    /// Move a user to another crew ("change team").
    pub fn change_crew(&self, id: UserId, crew_id: CrewId) -> Result<User> {
        // Fail with NotFound rather than a foreign key error.
        self.get_crew(crew_id)?;
        let affected = self.conn().execute(
            "UPDATE users SET crew_id = ?1 WHERE id = ?2",
            params![crew_id.to_string(), id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        tracing::info!(user_id = %id, crew_id = %crew_id, "user changed crew");
        self.get_user(id)
    }

    /// Delete a user. Their tokens and role requests go with them.
    pub fn delete_user(&self, id: UserId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM users WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }

    pub fn list_user_roles(&self) -> Result<Vec<UserRole>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT id, name FROM user_roles ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok(UserRole {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    // ------------------------------------------------------------------
    // Role requests
    // ------------------------------------------------------------------

    /// File a role request. Returns `None` when the user already holds the
    /// requested role.
    pub fn request_role(&self, user_id: UserId, role_id: i64) -> Result<Option<RoleRequest>> {
        let user = self.get_user(user_id)?;
        if user.role_id == role_id {
            return Ok(None);
        }
        let now = Utc::now();
        self.conn()
            .execute(
                "INSERT INTO role_requests (user_id, role_id, created_at) VALUES (?1, ?2, ?3)",
                params![user_id.to_string(), role_id, now.to_rfc3339()],
            )
            .map_err(StoreError::from_query)?;
        let id = self.conn().last_insert_rowid();
        self.get_role_request(id).map(Some)
    }

    pub fn get_role_request(&self, id: i64) -> Result<RoleRequest> {
        self.conn()
            .query_row(
                "SELECT id, user_id, role_id, accepted, granted, created_at
                 FROM role_requests WHERE id = ?1",
                params![id],
                row_to_role_request,
            )
            .map_err(StoreError::from_query)
    }

    pub fn pending_role_requests(&self) -> Result<Vec<RoleRequest>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, user_id, role_id, accepted, granted, created_at
             FROM role_requests WHERE granted IS NULL ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map([], row_to_role_request)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Accept a pending request and give the user the requested role.
    pub fn grant_role_request(&self, id: i64) -> Result<RoleRequest> {
        self.in_transaction(|db| {
            let request = db.decide_role_request(id, true)?;
            db.conn().execute(
                "UPDATE users SET role_id = ?1 WHERE id = ?2",
                params![request.role_id, request.user_id.to_string()],
            )?;
            tracing::info!(request_id = id, user_id = %request.user_id, "role request granted");
            Ok(request)
        })
    }

    /// Close a pending request without touching the user's role.
    pub fn reject_role_request(&self, id: i64) -> Result<RoleRequest> {
        self.decide_role_request(id, false)
    }

    fn decide_role_request(&self, id: i64, accepted: bool) -> Result<RoleRequest> {
        let pending: Option<i64> = self
            .conn()
            .query_row(
                "SELECT id FROM role_requests WHERE id = ?1 AND granted IS NULL",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        if pending.is_none() {
            return Err(StoreError::NotFound);
        }
        self.conn().execute(
            "UPDATE role_requests SET accepted = ?1, granted = ?2 WHERE id = ?3",
            params![accepted, Utc::now().to_rfc3339(), id],
        )?;
        self.get_role_request(id)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id: String = row.get(0)?;
    let crew_id: String = row.get(1)?;
    let created: String = row.get(5)?;
    Ok(User {
        id: parse_col(0, &id)?,
        crew_id: parse_col(1, &crew_id)?,
        name: row.get(2)?,
        email: row.get(3)?,
        role_id: row.get(4)?,
        created_at: parse_ts(5, &created)?,
    })
}

fn row_to_role_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<RoleRequest> {
    let user_id: String = row.get(1)?;
    let granted: Option<String> = row.get(4)?;
    let created: String = row.get(5)?;
    Ok(RoleRequest {
        id: row.get(0)?,
        user_id: parse_col(1, &user_id)?,
        role_id: row.get(2)?,
        accepted: row.get(3)?,
        granted: granted.map(|g| parse_ts(4, &g)).transpose()?,
        created_at: parse_ts(5, &created)?,
    })
}
