//! CRUD operations for [`Crew`] records.

use chrono::Utc;
use rusqlite::params;

use haven_shared::types::CrewId;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Crew;
use crate::sql::{parse_col, parse_ts};

impl Database {
    /// Insert a new crew.
    pub fn create_crew(&self, name: &str) -> Result<Crew> {
        let crew = Crew {
            id: CrewId::new(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.conn().execute(
            "INSERT INTO crews (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![crew.id.to_string(), crew.name, crew.created_at.to_rfc3339()],
        )?;
        tracing::info!(crew_id = %crew.id, name = %crew.name, "crew created");
        Ok(crew)
    }

    /// Fetch a single crew.
    pub fn get_crew(&self, id: CrewId) -> Result<Crew> {
        self.conn()
            .query_row(
                "SELECT id, name, created_at FROM crews WHERE id = ?1",
                params![id.to_string()],
                row_to_crew,
            )
            .map_err(StoreError::from_query)
    }

    /// List all crews, ordered by name.
    pub fn list_crews(&self) -> Result<Vec<Crew>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT id, name, created_at FROM crews ORDER BY name ASC")?;
        let rows = stmt.query_map([], row_to_crew)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn rename_crew(&self, id: CrewId, name: &str) -> Result<Crew> {
        let affected = self.conn().execute(
            "UPDATE crews SET name = ?1 WHERE id = ?2",
            params![name, id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_crew(id)
    }
}

fn row_to_crew(row: &rusqlite::Row<'_>) -> rusqlite::Result<Crew> {
    let id: String = row.get(0)?;
    let created: String = row.get(2)?;
    Ok(Crew {
        id: parse_col(0, &id)?,
        name: row.get(1)?,
        created_at: parse_ts(2, &created)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::database::tests::temp_db;
    use crate::StoreError;

    #[test]
    fn create_then_rename() {
        let (_dir, db) = temp_db();
        let crew = db.create_crew("Ocean Viking").unwrap();
        assert_eq!(db.get_crew(crew.id).unwrap().name, "Ocean Viking");

        let renamed = db.rename_crew(crew.id, "Geo Barents").unwrap();
        assert_eq!(renamed.name, "Geo Barents");
        assert_eq!(db.list_crews().unwrap().len(), 1);
    }

    #[test]
    fn missing_crew_is_not_found() {
        let (_dir, db) = temp_db();
        let err = db.get_crew(haven_shared::types::CrewId::new()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }
}
