//! Provenance: one row per external API call.

use chrono::Utc;
use rusqlite::params;

use haven_shared::constants::MAX_LOGGED_PAYLOAD;
use haven_shared::types::{ApiLogId, CrewId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{ApiLog, NewApiLog};
use crate::sql::{parse_col, parse_opt_col, parse_ts};

const API_LOG_COLUMNS: &str =
    "id, crew_id, user_id, ip, application_id, api_type, http_method, payload, response, created_at";

impl Database {
    /// Open a provenance entry. Oversized payloads are cut on a character
    /// boundary.
    pub fn create_api_log(&self, new: NewApiLog) -> Result<ApiLog> {
        let log = ApiLog {
            id: ApiLogId::new(),
            crew_id: new.crew_id,
            user_id: new.user_id,
            ip: new.ip,
            application_id: new.application_id,
            api_type: new.api_type,
            http_method: new.http_method,
            payload: new.payload.map(truncate_logged),
            response: None,
            created_at: Utc::now(),
        };
        self.conn().execute(
            "INSERT INTO api_logs (id, crew_id, user_id, ip, application_id, api_type, http_method, payload, response, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, ?9)",
            params![
                log.id.to_string(),
                log.crew_id.map(|c| c.to_string()),
                log.user_id.map(|u| u.to_string()),
                log.ip,
                log.application_id,
                log.api_type,
                log.http_method,
                log.payload,
                log.created_at.to_rfc3339(),
            ],
        )?;
        tracing::debug!(
            api_log = %log.id,
            api_type = %log.api_type,
            method = %log.http_method,
            "provenance entry opened"
        );
        Ok(log)
    }

    /// Append a line to the entry's response notes. Each line is cut like a
    /// payload.
    pub fn append_api_log_response(&self, id: ApiLogId, note: &str) -> Result<()> {
        let note = truncate_logged(note.to_string());
        let affected = self.conn().execute(
            "UPDATE api_logs
             SET response = CASE WHEN response IS NULL OR response = '' THEN ?1
                                 ELSE response || char(10) || ?1 END
             WHERE id = ?2",
            params![note, id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn get_api_log(&self, id: ApiLogId) -> Result<ApiLog> {
        self.conn()
            .query_row(
                &format!("SELECT {API_LOG_COLUMNS} FROM api_logs WHERE id = ?1"),
                params![id.to_string()],
                row_to_api_log,
            )
            .map_err(StoreError::from_query)
    }

    /// Most recent entries of a crew.
    pub fn list_api_logs(&self, crew_id: CrewId, limit: u32) -> Result<Vec<ApiLog>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {API_LOG_COLUMNS} FROM api_logs
             WHERE crew_id = ?1
             ORDER BY created_at DESC
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![crew_id.to_string(), limit], row_to_api_log)?;

        let mut logs = Vec::new();
        for row in rows {
            logs.push(row?);
        }
        Ok(logs)
    }

    /// Total number of provenance entries, crew or not.
    pub fn count_api_logs(&self) -> Result<i64> {
        Ok(self
            .conn()
            .query_row("SELECT COUNT(*) FROM api_logs", [], |row| row.get(0))?)
    }
}

/// Cut logged text to [`MAX_LOGGED_PAYLOAD`] bytes on a character boundary.
pub fn truncate_logged(mut text: String) -> String {
    if text.len() > MAX_LOGGED_PAYLOAD {
        let mut cut = MAX_LOGGED_PAYLOAD;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

fn row_to_api_log(row: &rusqlite::Row<'_>) -> rusqlite::Result<ApiLog> {
    let id: String = row.get(0)?;
    let created: String = row.get(9)?;

    Ok(ApiLog {
        id: parse_col(0, &id)?,
        crew_id: parse_opt_col(1, row.get(1)?)?,
        user_id: parse_opt_col(2, row.get(2)?)?,
        ip: row.get(3)?,
        application_id: row.get(4)?,
        api_type: row.get(5)?,
        http_method: row.get(6)?,
        payload: row.get(7)?,
        response: row.get(8)?,
        created_at: parse_ts(9, &created)?,
    })
}
