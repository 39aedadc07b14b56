//! Person shell records: creation, listing, soft deletion and the manual
//! fix-up of colliding external references.
//!
//! Attribute values are handled by [`crate::attributes`].

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use haven_shared::constants::FULL_NAME_LABEL;
use haven_shared::types::{CrewId, PersonId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{DuplicatedReference, NewPerson, Person};
use crate::sql::{parse_col, parse_opt_col, parse_ts};

const PERSON_COLUMNS: &str =
    "id, crew_id, date, api_log, application_id, unique_id, details, deleted, created_at";

impl Database {
    /// Insert the shell row of a person. Callers that also attach attributes
    /// go through [`Database::create_with_attributes`].
    pub(crate) fn insert_person(&self, crew_id: CrewId, new: &NewPerson) -> Result<Person> {
        let now = Utc::now();
        let person = Person {
            id: PersonId::new(),
            crew_id,
            date: new.date.unwrap_or(now),
            api_log: new.api_log,
            application_id: new.application_id.clone(),
            unique_id: new.unique_id.clone(),
            details: new.details.clone(),
            deleted: false,
            created_at: now,
        };
        self.conn().execute(
            "INSERT INTO persons (id, crew_id, date, api_log, application_id, unique_id, details, deleted, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)",
            params![
                person.id.to_string(),
                crew_id.to_string(),
                person.date.to_rfc3339(),
                person.api_log.map(|l| l.to_string()),
                person.application_id,
                person.unique_id,
                person.details,
                person.created_at.to_rfc3339(),
            ],
        )?;
        Ok(person)
    }

    /// Direct lookup. Soft-deleted persons are still returned.
    pub fn get_person(&self, crew_id: CrewId, id: PersonId) -> Result<Person> {
        self.conn()
            .query_row(
                &format!("SELECT {PERSON_COLUMNS} FROM persons WHERE id = ?1 AND crew_id = ?2"),
                params![id.to_string(), crew_id.to_string()],
                row_to_person,
            )
            .map_err(StoreError::from_query)
    }

    /// Listing of the crew's persons: soft-deleted ones excluded, most
    /// recent event date first.
    pub fn list_persons(&self, crew_id: CrewId) -> Result<Vec<Person>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {PERSON_COLUMNS} FROM persons
             WHERE crew_id = ?1 AND deleted = 0
             ORDER BY date DESC, created_at DESC"
        ))?;
        let rows = stmt.query_map(params![crew_id.to_string()], row_to_person)?;

        let mut persons = Vec::new();
        for row in rows {
            persons.push(row?);
        }
        Ok(persons)
    }

    /// Mark a person deleted. The row and its attributes stay readable by id.
    pub fn soft_delete_person(&self, crew_id: CrewId, id: PersonId) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE persons SET deleted = 1 WHERE id = ?1 AND crew_id = ?2",
            params![id.to_string(), crew_id.to_string()],
        )?;
        if affected > 0 {
            tracing::info!(crew_id = %crew_id, person_id = %id, "person soft-deleted");
        }
        Ok(affected > 0)
    }

    /// Erase a person. Attribute rows and links cascade.
    pub fn purge_person(&self, crew_id: CrewId, id: PersonId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM persons WHERE id = ?1 AND crew_id = ?2",
            params![id.to_string(), crew_id.to_string()],
        )?;
        if affected > 0 {
            tracing::info!(crew_id = %crew_id, person_id = %id, "person purged");
        }
        Ok(affected > 0)
    }

    pub fn set_person_details(&self, crew_id: CrewId, id: PersonId, details: Option<&str>) -> Result<()> {
        self.update_person_column(crew_id, id, "details", details.map(str::to_string))
    }

    /// Reassign a person's external reference after a collision was found.
    pub fn fix_duplicated_reference(&self, crew_id: CrewId, id: PersonId, unique_id: &str) -> Result<Person> {
        self.update_person_column(crew_id, id, "unique_id", Some(unique_id.to_string()))?;
        tracing::info!(crew_id = %crew_id, person_id = %id, unique_id, "external reference reassigned");
        self.get_person(crew_id, id)
    }

    /// External references used by more than one live person of the crew.
    pub fn find_duplicated_references(&self, crew_id: CrewId) -> Result<Vec<DuplicatedReference>> {
        let mut stmt = self.conn().prepare(
            "SELECT unique_id, id FROM persons
             WHERE crew_id = ?1 AND deleted = 0 AND unique_id IN (
                 SELECT unique_id FROM persons
                 WHERE crew_id = ?1 AND deleted = 0 AND unique_id IS NOT NULL
                 GROUP BY unique_id HAVING COUNT(*) > 1
             )
             ORDER BY unique_id ASC, created_at ASC",
        )?;
        let rows = stmt.query_map(params![crew_id.to_string()], |row| {
            let unique_id: String = row.get(0)?;
            let id: String = row.get(1)?;
            Ok((unique_id, parse_col::<PersonId>(1, &id)?))
        })?;

        let mut groups: Vec<DuplicatedReference> = Vec::new();
        for row in rows {
            let (unique_id, id) = row?;
            match groups.last_mut() {
                Some(group) if group.unique_id == unique_id => group.persons.push(id),
                _ => groups.push(DuplicatedReference {
                    unique_id,
                    persons: vec![id],
                }),
            }
        }
        Ok(groups)
    }

    /// Find a live person of the crew by full name and external reference.
    /// The first match in creation order wins.
    pub fn find_person_by_reference(
        &self,
        crew_id: CrewId,
        full_name: &str,
        unique_id: &str,
    ) -> Result<Option<PersonId>> {
        let id: Option<String> = self
            .conn()
            .query_row(
                "SELECT p.id FROM persons p
                 JOIN field_person fp ON fp.person_id = p.id
                 JOIN fields f ON f.id = fp.field_id
                 WHERE p.crew_id = ?1 AND p.deleted = 0 AND p.unique_id = ?2
                   AND f.crew_id = ?1 AND f.label = ?3 AND fp.value = ?4
                 ORDER BY p.created_at ASC LIMIT 1",
                params![crew_id.to_string(), unique_id, FULL_NAME_LABEL, full_name],
                |row| row.get(0),
            )
            .optional()?;
        id.map(|s| s.parse().map_err(StoreError::Uuid)).transpose()
    }

    fn update_person_column(
        &self,
        crew_id: CrewId,
        id: PersonId,
        column: &'static str,
        value: Option<String>,
    ) -> Result<()> {
        let affected = self.conn().execute(
            &format!("UPDATE persons SET {column} = ?1 WHERE id = ?2 AND crew_id = ?3"),
            params![value, id.to_string(), crew_id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

fn row_to_person(row: &rusqlite::Row<'_>) -> rusqlite::Result<Person> {
    let id: String = row.get(0)?;
    let crew_id: String = row.get(1)?;
    let date: String = row.get(2)?;
    let created: String = row.get(8)?;

    Ok(Person {
        id: parse_col(0, &id)?,
        crew_id: parse_col(1, &crew_id)?,
        date: parse_ts(2, &date)?,
        api_log: parse_opt_col(3, row.get(3)?)?,
        application_id: row.get(4)?,
        unique_id: row.get(5)?,
        details: row.get(6)?,
        deleted: row.get(7)?,
        created_at: parse_ts(8, &created)?,
    })
}
