//! Capability tokens for the external API.
//!
//! Only the BLAKE3 hash of a token secret is stored; the plaintext is
//! returned once, when the token is issued.

use chrono::Utc;
use rand::RngCore;
use rusqlite::{params, OptionalExtension};

use haven_shared::scope::ScopeSet;
use haven_shared::types::UserId;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{ApiToken, Principal};
use crate::sql::{parse_col, parse_ts};

/// Bytes of randomness in a token secret.
const TOKEN_BYTES: usize = 32;

fn hash_secret(secret: &str) -> String {
    blake3::hash(secret.as_bytes()).to_hex().to_string()
}

impl Database {
    /// Issue a new token for `user_id`. Returns the stored metadata and the
    /// plaintext secret.
    pub fn issue_token(&self, user_id: UserId, name: &str, scopes: &ScopeSet) -> Result<(ApiToken, String)> {
        // Fail with NotFound rather than a foreign key error.
        self.get_user(user_id)?;

        let mut raw = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut raw);
        let secret = hex::encode(raw);
        let now = Utc::now();

        self.conn().execute(
            "INSERT INTO api_tokens (user_id, name, token_hash, scopes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user_id.to_string(),
                name,
                hash_secret(&secret),
                scopes.to_string(),
                now.to_rfc3339(),
            ],
        )?;

        let token = ApiToken {
            id: self.conn().last_insert_rowid(),
            user_id,
            name: name.to_string(),
            scopes: scopes.clone(),
            revoked: false,
            created_at: now,
        };
        tracing::info!(token_id = token.id, user_id = %user_id, scopes = %scopes, "api token issued");
        Ok((token, secret))
    }

    /// Resolve a presented secret to the calling principal. Unknown and
    /// revoked tokens resolve to `None`.
    pub fn authenticate(&self, secret: &str) -> Result<Option<Principal>> {
        self.conn()
            .query_row(
                "SELECT t.user_id, u.crew_id, t.scopes
                 FROM api_tokens t JOIN users u ON u.id = t.user_id
                 WHERE t.token_hash = ?1 AND t.revoked = 0",
                params![hash_secret(secret)],
                |row| {
                    let user_id: String = row.get(0)?;
                    let crew_id: String = row.get(1)?;
                    let scopes: String = row.get(2)?;
                    Ok(Principal {
                        user_id: parse_col(0, &user_id)?,
                        crew_id: parse_col(1, &crew_id)?,
                        scopes: parse_col(2, &scopes)?,
                    })
                },
            )
            .optional()
            .map_err(StoreError::Sqlite)
    }

    pub fn list_tokens(&self, user_id: UserId) -> Result<Vec<ApiToken>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, user_id, name, scopes, revoked, created_at
             FROM api_tokens WHERE user_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![user_id.to_string()], |row| {
            let user_id: String = row.get(1)?;
            let scopes: String = row.get(3)?;
            let created: String = row.get(5)?;
            Ok(ApiToken {
                id: row.get(0)?,
                user_id: parse_col(1, &user_id)?,
                name: row.get(2)?,
                scopes: parse_col(3, &scopes)?,
                revoked: row.get(4)?,
                created_at: parse_ts(5, &created)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn revoke_token(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn()
            .execute("UPDATE api_tokens SET revoked = 1 WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use haven_shared::scope::{ScopeSet, TokenScope};

    use crate::database::tests::temp_db;

    #[test]
    fn issued_token_authenticates_with_its_scopes() {
        let (_dir, db) = temp_db();
        let crew = db.create_crew("North").unwrap();
        let user = db.create_user(crew.id, "Ana", "ana@example.org", 3).unwrap();

        let (token, secret) = db
            .issue_token(user.id, "phone", &ScopeSet::new([TokenScope::Read]))
            .unwrap();
        assert_eq!(secret.len(), 64);

        let principal = db.authenticate(&secret).unwrap().unwrap();
        assert_eq!(principal.user_id, user.id);
        assert_eq!(principal.crew_id, crew.id);
        assert!(principal.scopes.allows(TokenScope::Read));
        assert!(!principal.scopes.allows(TokenScope::Update));

        assert!(db.revoke_token(token.id).unwrap());
        assert!(db.authenticate(&secret).unwrap().is_none());
        assert!(db.list_tokens(user.id).unwrap()[0].revoked);
    }

    #[test]
    fn unknown_secret_does_not_resolve() {
        let (_dir, db) = temp_db();
        assert!(db.authenticate("not-a-token").unwrap().is_none());
    }
}
