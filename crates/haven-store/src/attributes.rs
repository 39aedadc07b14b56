//! The attribute store: `(person, field) -> value` rows in the
//! `field_person` pivot.
//!
//! Values are kept as text and decoded on read through the field's
//! [`DatabaseType`](haven_shared::field::DatabaseType). Writes are checked
//! against the crew's field catalogue so a person can never carry a value
//! for a field owned by another crew.

use std::collections::{BTreeMap, HashMap, HashSet};

use rusqlite::params;
use serde::Serialize;

use haven_shared::types::{CrewId, FieldId, PersonId};
use haven_shared::value::is_blank;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{NewPerson, Person};
use crate::sql::parse_col;

/// What [`Database::apply_update`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttributeDiff {
    pub attached: Vec<FieldId>,
    pub updated: Vec<FieldId>,
    pub detached: Vec<FieldId>,
}

impl AttributeDiff {
    pub fn is_empty(&self) -> bool {
        self.attached.is_empty() && self.updated.is_empty() && self.detached.is_empty()
    }
}

impl Database {
    /// Stored values of one person, keyed by field id.
    pub fn attributes_of(&self, crew_id: CrewId, person: PersonId) -> Result<BTreeMap<FieldId, String>> {
        // Scope check first so a foreign person reads as missing, not empty.
        self.get_person(crew_id, person)?;

        let mut stmt = self
            .conn()
            .prepare("SELECT field_id, value FROM field_person WHERE person_id = ?1")?;
        let rows = stmt.query_map(params![person.to_string()], |row| {
            Ok((row.get::<_, FieldId>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut values = BTreeMap::new();
        for row in rows {
            let (field_id, value) = row?;
            values.insert(field_id, value);
        }
        Ok(values)
    }

    /// Stored values of every person of the crew in one query.
    pub fn attributes_by_person(&self, crew_id: CrewId) -> Result<HashMap<PersonId, BTreeMap<FieldId, String>>> {
        let mut stmt = self.conn().prepare(
            "SELECT fp.person_id, fp.field_id, fp.value FROM field_person fp
             JOIN persons p ON p.id = fp.person_id
             WHERE p.crew_id = ?1",
        )?;
        let rows = stmt.query_map(params![crew_id.to_string()], |row| {
            let person: String = row.get(0)?;
            Ok((
                parse_col::<PersonId>(0, &person)?,
                row.get::<_, FieldId>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut out: HashMap<PersonId, BTreeMap<FieldId, String>> = HashMap::new();
        for row in rows {
            let (person, field_id, value) = row?;
            out.entry(person).or_default().insert(field_id, value);
        }
        Ok(out)
    }

    /// Create a person shell and attach its non-blank values atomically.
    /// A failure on any part leaves no trace.
    pub fn create_with_attributes(
        &self,
        crew_id: CrewId,
        new: &NewPerson,
        attributes: &BTreeMap<FieldId, String>,
    ) -> Result<Person> {
        self.check_field_ownership(crew_id, attributes.keys())?;

        self.in_transaction(|db| {
            let person = db.insert_person(crew_id, new)?;
            for (field_id, value) in attributes {
                if is_blank(value) {
                    continue;
                }
                db.insert_attribute(person.id, *field_id, value)?;
            }
            tracing::debug!(
                crew_id = %crew_id,
                person_id = %person.id,
                attributes = attributes.len(),
                "person created"
            );
            Ok(person)
        })
    }

    /// Reconcile a person's stored values with `incoming`.
    ///
    /// Unchanged values are left alone. Differing non-blank values are
    /// written. Every stored value without a non-blank counterpart in
    /// `incoming` is detached, including fields absent from `incoming`.
    pub fn apply_update(
        &self,
        crew_id: CrewId,
        person: PersonId,
        incoming: &BTreeMap<FieldId, String>,
    ) -> Result<AttributeDiff> {
        self.check_field_ownership(crew_id, incoming.keys())?;

        self.in_transaction(|db| {
            let mut old = db.attributes_of(crew_id, person)?;
            let mut diff = AttributeDiff::default();

            for (field_id, value) in incoming {
                if old.get(field_id) == Some(value) {
                    continue;
                }
                if is_blank(value) {
                    continue;
                }
                if old.remove(field_id).is_some() {
                    db.conn().execute(
                        "UPDATE field_person SET value = ?1 WHERE person_id = ?2 AND field_id = ?3",
                        params![value, person.to_string(), field_id],
                    )?;
                    diff.updated.push(*field_id);
                } else {
                    db.insert_attribute(person, *field_id, value)?;
                    diff.attached.push(*field_id);
                }
            }

            for (field_id, value) in &old {
                let kept = incoming
                    .get(field_id)
                    .is_some_and(|v| v == value && !is_blank(v));
                if kept {
                    continue;
                }
                db.conn().execute(
                    "DELETE FROM field_person WHERE person_id = ?1 AND field_id = ?2",
                    params![person.to_string(), field_id],
                )?;
                diff.detached.push(*field_id);
            }

            if !diff.is_empty() {
                tracing::debug!(
                    crew_id = %crew_id,
                    person_id = %person,
                    attached = diff.attached.len(),
                    updated = diff.updated.len(),
                    detached = diff.detached.len(),
                    "attributes updated"
                );
            }
            Ok(diff)
        })
    }

    fn insert_attribute(&self, person: PersonId, field_id: FieldId, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO field_person (person_id, field_id, value) VALUES (?1, ?2, ?3)",
            params![person.to_string(), field_id, value],
        )?;
        Ok(())
    }

    fn check_field_ownership<'a>(
        &self,
        crew_id: CrewId,
        field_ids: impl Iterator<Item = &'a FieldId>,
    ) -> Result<()> {
        let mut stmt = self.conn().prepare("SELECT id FROM fields WHERE crew_id = ?1")?;
        let owned = stmt
            .query_map(params![crew_id.to_string()], |row| row.get::<_, FieldId>(0))?
            .collect::<rusqlite::Result<HashSet<FieldId>>>()?;

        for field_id in field_ids {
            if !owned.contains(field_id) {
                tracing::warn!(crew_id = %crew_id, field_id, "write to a field outside the crew");
                return Err(StoreError::ForeignField {
                    field_id: *field_id,
                    crew_id,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use haven_shared::types::FieldId;

    use super::AttributeDiff;
    use crate::database::tests::temp_db;
    use crate::fields::tests::add_field;
    use crate::models::NewPerson;
    use crate::StoreError;

    fn values(pairs: &[(FieldId, &str)]) -> BTreeMap<FieldId, String> {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[test]
    fn blank_values_are_not_stored_on_create() {
        let (_dir, db) = temp_db();
        let crew = db.create_crew("North").unwrap();
        let a = add_field(&db, crew.id, "a");
        let b = add_field(&db, crew.id, "b");

        let person = db
            .create_with_attributes(crew.id, &NewPerson::default(), &values(&[(a.id, "1"), (b.id, "  ")]))
            .unwrap();

        assert_eq!(db.attributes_of(crew.id, person.id).unwrap(), values(&[(a.id, "1")]));
    }

    #[test]
    fn update_keeps_unchanged_detaches_blank_and_attaches_new() {
        let (_dir, db) = temp_db();
        let crew = db.create_crew("North").unwrap();
        let a = add_field(&db, crew.id, "a");
        let b = add_field(&db, crew.id, "b");
        let c = add_field(&db, crew.id, "c");
        let person = db
            .create_with_attributes(crew.id, &NewPerson::default(), &values(&[(a.id, "1"), (b.id, "2")]))
            .unwrap();

        let diff = db
            .apply_update(crew.id, person.id, &values(&[(a.id, "1"), (b.id, ""), (c.id, "3")]))
            .unwrap();

        assert_eq!(
            diff,
            AttributeDiff {
                attached: vec![c.id],
                updated: vec![],
                detached: vec![b.id],
            }
        );
        assert_eq!(
            db.attributes_of(crew.id, person.id).unwrap(),
            values(&[(a.id, "1"), (c.id, "3")])
        );
    }

    #[test]
    fn changed_value_is_overwritten_and_absent_field_detached() {
        let (_dir, db) = temp_db();
        let crew = db.create_crew("North").unwrap();
        let a = add_field(&db, crew.id, "a");
        let b = add_field(&db, crew.id, "b");
        let person = db
            .create_with_attributes(crew.id, &NewPerson::default(), &values(&[(a.id, "1"), (b.id, "2")]))
            .unwrap();

        let diff = db.apply_update(crew.id, person.id, &values(&[(a.id, "9")])).unwrap();

        assert_eq!(diff.updated, vec![a.id]);
        assert_eq!(diff.detached, vec![b.id]);
        assert_eq!(db.attributes_of(crew.id, person.id).unwrap(), values(&[(a.id, "9")]));
    }

    #[test]
    fn repeating_an_update_changes_nothing() {
        let (_dir, db) = temp_db();
        let crew = db.create_crew("North").unwrap();
        let a = add_field(&db, crew.id, "a");
        let c = add_field(&db, crew.id, "c");
        let person = db
            .create_with_attributes(crew.id, &NewPerson::default(), &values(&[(a.id, "1")]))
            .unwrap();

        let incoming = values(&[(a.id, "1"), (c.id, "3")]);
        db.apply_update(crew.id, person.id, &incoming).unwrap();
        let first = db.attributes_of(crew.id, person.id).unwrap();

        let diff = db.apply_update(crew.id, person.id, &incoming).unwrap();
        assert!(diff.is_empty());
        assert_eq!(db.attributes_of(crew.id, person.id).unwrap(), first);
    }

    #[test]
    fn foreign_fields_are_rejected_without_partial_writes() {
        let (_dir, db) = temp_db();
        let north = db.create_crew("North").unwrap();
        let south = db.create_crew("South").unwrap();
        let mine = add_field(&db, north.id, "a");
        let theirs = add_field(&db, south.id, "a");
        let person = db
            .create_with_attributes(north.id, &NewPerson::default(), &values(&[(mine.id, "1")]))
            .unwrap();

        let err = db
            .apply_update(north.id, person.id, &values(&[(mine.id, "2"), (theirs.id, "x")]))
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignField { field_id, .. } if field_id == theirs.id));
        assert_eq!(db.attributes_of(north.id, person.id).unwrap(), values(&[(mine.id, "1")]));

        let err = db
            .create_with_attributes(north.id, &NewPerson::default(), &values(&[(theirs.id, "x")]))
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignField { .. }));
        assert_eq!(db.list_persons(north.id).unwrap().len(), 1);
    }

    #[test]
    fn failed_attach_rolls_back_the_shell() {
        let (_dir, db) = temp_db();
        let crew = db.create_crew("North").unwrap();
        let a = add_field(&db, crew.id, "a");

        // Unknown field id trips the foreign key after the shell is written.
        let result = db.in_transaction(|db| {
            let person = db.insert_person(crew.id, &NewPerson::default())?;
            db.insert_attribute(person.id, a.id + 1000, "x")?;
            Ok(person)
        });

        assert!(result.is_err());
        assert!(db.list_persons(crew.id).unwrap().is_empty());
    }

    #[test]
    fn attributes_of_a_foreign_person_are_not_found() {
        let (_dir, db) = temp_db();
        let north = db.create_crew("North").unwrap();
        let south = db.create_crew("South").unwrap();
        let person = db
            .create_with_attributes(north.id, &NewPerson::default(), &BTreeMap::new())
            .unwrap();

        assert!(matches!(
            db.attributes_of(south.id, person.id),
            Err(StoreError::NotFound)
        ));
        assert!(db.attributes_by_person(south.id).unwrap().is_empty());
    }
}
