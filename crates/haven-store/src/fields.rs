//! The per-crew field registry.
//!
//! Fields are the tenant-configurable schema of a person record. Forms and
//! the mobile client read them in a fixed order: requirement level first,
//! then display rank, then id so that ties never depend on storage order.

use std::collections::HashMap;

use chrono::Utc;
use rusqlite::params;

use haven_shared::constants::RESERVED_LABELS;
use haven_shared::field::{derive_metadata, validation_rule, FieldStatus, Requirement};
use haven_shared::types::{CrewId, FieldId};
use haven_shared::DomainError;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Field, FieldUpdate, ListControl, NewField};
use crate::sql::{parse_code, parse_col, parse_ts};

const FIELD_COLUMNS: &str = "id, crew_id, label, title, placeholder, database_type, html_data_type,
     android_type, validation_rule, required, status, \"order\", linked_list,
     descriptive_value, best_descriptive_value, created_at";

impl Database {
    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fields of `crew_id` whose status is strictly above `min_status`,
    /// ordered by `(required, order, id)`.
    pub fn list_active_fields(&self, crew_id: CrewId, min_status: FieldStatus) -> Result<Vec<Field>> {
        self.query_fields(
            &format!(
                "SELECT {FIELD_COLUMNS} FROM fields
                 WHERE crew_id = ?1 AND status > ?2
                 ORDER BY required ASC, \"order\" ASC, id ASC"
            ),
            params![crew_id.to_string(), min_status.code()],
        )
    }

    /// Every field of the crew, in display order.
    pub fn list_fields(&self, crew_id: CrewId) -> Result<Vec<Field>> {
        self.query_fields(
            &format!(
                "SELECT {FIELD_COLUMNS} FROM fields
                 WHERE crew_id = ?1
                 ORDER BY \"order\" ASC, id ASC"
            ),
            params![crew_id.to_string()],
        )
    }

    /// Fields used to summarise a person in listings.
    pub fn descriptive_fields(&self, crew_id: CrewId) -> Result<Vec<Field>> {
        self.query_fields(
            &format!(
                "SELECT {FIELD_COLUMNS} FROM fields
                 WHERE crew_id = ?1 AND descriptive_value = 1
                 ORDER BY \"order\" ASC, id ASC"
            ),
            params![crew_id.to_string()],
        )
    }

    /// The field whose value names a person, if the crew has flagged one.
    pub fn best_descriptive_field(&self, crew_id: CrewId) -> Result<Option<Field>> {
        let mut fields = self.query_fields(
            &format!(
                "SELECT {FIELD_COLUMNS} FROM fields
                 WHERE crew_id = ?1 AND best_descriptive_value = 1
                 ORDER BY \"order\" ASC, id ASC LIMIT 1"
            ),
            params![crew_id.to_string()],
        )?;
        Ok(fields.pop())
    }

    /// Fetch a field of `crew_id`. Fields of other crews are reported as
    /// not found.
    pub fn get_field(&self, crew_id: CrewId, id: FieldId) -> Result<Field> {
        self.conn()
            .query_row(
                &format!("SELECT {FIELD_COLUMNS} FROM fields WHERE id = ?1 AND crew_id = ?2"),
                params![id, crew_id.to_string()],
                row_to_field,
            )
            .map_err(StoreError::from_query)
    }

    /// Snapshot of the crew's fields for the lifetime of one request.
    pub fn field_set(&self, crew_id: CrewId) -> Result<FieldSet> {
        Ok(FieldSet::new(self.list_fields(crew_id)?))
    }

    /// Lookup lists referenced by the crew's fields above `min_status`, in
    /// list id order.
    pub fn used_linked_lists(&self, crew_id: CrewId, min_status: FieldStatus) -> Result<Vec<ListControl>> {
        let mut stmt = self.conn().prepare(
            "SELECT DISTINCT l.id, l.name, l.title, l.displayed_value
             FROM fields f JOIN list_controls l ON l.id = f.linked_list
             WHERE f.crew_id = ?1 AND f.status > ?2
             ORDER BY l.id ASC",
        )?;
        let rows = stmt.query_map(params![crew_id.to_string(), min_status.code()], |row| {
            Ok(ListControl {
                id: row.get(0)?,
                name: row.get(1)?,
                title: row.get(2)?,
                displayed_value: row.get(3)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Display rank for a new field: the requested one, or one past the
    /// crew's current maximum (1 for a crew without fields).
    pub fn resolve_order(&self, crew_id: CrewId, requested: Option<i64>) -> Result<i64> {
        if let Some(order) = requested {
            return Ok(order);
        }
        let max: i64 = self.conn().query_row(
            "SELECT COALESCE(MAX(\"order\"), 0) FROM fields WHERE crew_id = ?1",
            params![crew_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(max + 1)
    }

    // ------------------------------------------------------------------
    // Write
    // ------------------------------------------------------------------

    pub fn create_field(&self, crew_id: CrewId, new: NewField) -> Result<Field> {
        if RESERVED_LABELS.contains(&new.label.as_str()) {
            return Err(DomainError::ReservedLabel(new.label).into());
        }
        if let Some(list) = new.linked_list {
            self.get_list_control(list)?;
        }

        self.in_transaction(|db| {
            let order = db.resolve_order(crew_id, new.order)?;
            let meta = derive_metadata(new.database_type, new.required);
            if new.best_descriptive_value {
                db.clear_best_descriptive(crew_id)?;
            }

            db.conn()
                .execute(
                    "INSERT INTO fields (crew_id, label, title, placeholder, database_type,
                        html_data_type, android_type, validation_rule, required, status,
                        \"order\", linked_list, descriptive_value, best_descriptive_value, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                    params![
                        crew_id.to_string(),
                        new.label,
                        new.title,
                        new.placeholder,
                        new.database_type.as_str(),
                        meta.html_type,
                        meta.android_type,
                        meta.validation_rule,
                        new.required.code(),
                        new.status.code(),
                        order,
                        new.linked_list,
                        new.descriptive_value,
                        new.best_descriptive_value,
                        Utc::now().to_rfc3339(),
                    ],
                )
                .map_err(|e| match StoreError::from_query(e) {
                    StoreError::Conflict(_) => {
                        StoreError::Conflict(format!("field label '{}' already exists", new.label))
                    }
                    other => other,
                })?;

            let id = db.conn().last_insert_rowid();
            tracing::info!(crew_id = %crew_id, field_id = id, label = %new.label, order, "field created");
            db.get_field(crew_id, id)
        })
    }

    /// Update the editable parts of a field. The validation rule is derived
    /// again from the stored type and the new requirement level.
    pub fn update_field(&self, crew_id: CrewId, id: FieldId, update: FieldUpdate) -> Result<Field> {
        let current = self.get_field(crew_id, id)?;
        if let Some(list) = update.linked_list {
            self.get_list_control(list)?;
        }

        self.in_transaction(|db| {
            if update.best_descriptive_value && !current.best_descriptive_value {
                db.clear_best_descriptive(crew_id)?;
            }
            db.conn().execute(
                "UPDATE fields SET title = ?1, placeholder = ?2, required = ?3, status = ?4,
                    \"order\" = ?5, linked_list = ?6, descriptive_value = ?7,
                    best_descriptive_value = ?8, validation_rule = ?9
                 WHERE id = ?10 AND crew_id = ?11",
                params![
                    update.title,
                    update.placeholder,
                    update.required.code(),
                    update.status.code(),
                    update.order,
                    update.linked_list,
                    update.descriptive_value,
                    update.best_descriptive_value,
                    validation_rule(current.database_type, update.required),
                    id,
                    crew_id.to_string(),
                ],
            )?;
            tracing::debug!(crew_id = %crew_id, field_id = id, "field updated");
            db.get_field(crew_id, id)
        })
    }

    /// Hard-delete a field. Attribute values stored under it cascade.
    pub fn delete_field(&self, crew_id: CrewId, id: FieldId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM fields WHERE id = ?1 AND crew_id = ?2",
            params![id, crew_id.to_string()],
        )?;
        if affected > 0 {
            tracing::info!(crew_id = %crew_id, field_id = id, "field deleted");
        }
        Ok(affected > 0)
    }

    fn clear_best_descriptive(&self, crew_id: CrewId) -> Result<()> {
        self.conn().execute(
            "UPDATE fields SET best_descriptive_value = 0 WHERE crew_id = ?1",
            params![crew_id.to_string()],
        )?;
        Ok(())
    }

    fn query_fields(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Field>> {
        let mut stmt = self.conn().prepare(sql)?;
        let rows = stmt.query_map(params, row_to_field)?;

        let mut fields = Vec::new();
        for row in rows {
            fields.push(row?);
        }
        Ok(fields)
    }
}

// ---------------------------------------------------------------------------
// FieldSet
// ---------------------------------------------------------------------------

/// A crew's fields indexed by id and label. Built once per request and
/// dropped with it; never cached across requests.
#[derive(Debug, Clone, Default)]
pub struct FieldSet {
    fields: Vec<Field>,
    by_id: HashMap<FieldId, usize>,
    by_label: HashMap<String, usize>,
}

impl FieldSet {
    pub fn new(fields: Vec<Field>) -> Self {
        let by_id = fields.iter().enumerate().map(|(i, f)| (f.id, i)).collect();
        let by_label = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.label.clone(), i))
            .collect();
        Self {
            fields,
            by_id,
            by_label,
        }
    }

    pub fn by_id(&self, id: FieldId) -> Option<&Field> {
        self.by_id.get(&id).and_then(|&i| self.fields.get(i))
    }

    pub fn by_label(&self, label: &str) -> Option<&Field> {
        self.by_label.get(label).and_then(|&i| self.fields.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    pub fn best_descriptive(&self) -> Option<&Field> {
        self.fields.iter().find(|f| f.best_descriptive_value)
    }
}

fn row_to_field(row: &rusqlite::Row<'_>) -> rusqlite::Result<Field> {
    let crew_id: String = row.get(1)?;
    let database_type: String = row.get(5)?;
    let created: String = row.get(15)?;

    Ok(Field {
        id: row.get(0)?,
        crew_id: parse_col(1, &crew_id)?,
        label: row.get(2)?,
        title: row.get(3)?,
        placeholder: row.get(4)?,
        database_type: parse_col(5, &database_type)?,
        html_data_type: row.get(6)?,
        android_type: row.get(7)?,
        validation_rule: row.get(8)?,
        required: parse_code(9, row.get(9)?, Requirement::from_code)?,
        status: parse_code(10, row.get(10)?, FieldStatus::from_code)?,
        order: row.get(11)?,
        linked_list: row.get(12)?,
        descriptive_value: row.get(13)?,
        best_descriptive_value: row.get(14)?,
        created_at: parse_ts(15, &created)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use haven_shared::field::{DatabaseType, FieldStatus, Requirement};
    use haven_shared::types::CrewId;
    use haven_shared::DomainError;

    use crate::database::tests::temp_db;
    use crate::models::{Field, FieldUpdate, NewField};
    use crate::{Database, StoreError};

    pub(crate) fn new_field(label: &str, required: Requirement, order: Option<i64>) -> NewField {
        NewField {
            label: label.into(),
            title: label.to_uppercase(),
            placeholder: None,
            database_type: DatabaseType::String,
            required,
            status: FieldStatus::WebsiteAndApp,
            order,
            linked_list: None,
            descriptive_value: false,
            best_descriptive_value: false,
        }
    }

    pub(crate) fn add_field(db: &Database, crew: CrewId, label: &str) -> Field {
        db.create_field(crew, new_field(label, Requirement::Advised, None))
            .unwrap()
    }

    #[test]
    fn order_appends_after_current_maximum() {
        let (_dir, db) = temp_db();
        let crew = db.create_crew("North").unwrap();
        for (label, order) in [("a", 5), ("b", 7), ("c", 7), ("d", 10)] {
            db.create_field(crew.id, new_field(label, Requirement::Advised, Some(order)))
                .unwrap();
        }
        assert_eq!(db.resolve_order(crew.id, None).unwrap(), 11);
        assert_eq!(db.resolve_order(crew.id, Some(3)).unwrap(), 3);

        let appended = db
            .create_field(crew.id, new_field("e", Requirement::Advised, None))
            .unwrap();
        assert_eq!(appended.order, 11);
    }

    #[test]
    fn first_field_of_a_crew_gets_order_one() {
        let (_dir, db) = temp_db();
        let crew = db.create_crew("North").unwrap();
        assert_eq!(add_field(&db, crew.id, "full_name").order, 1);
    }

    #[test]
    fn active_fields_sort_by_requirement_then_order_then_id() {
        let (_dir, db) = temp_db();
        let crew = db.create_crew("North").unwrap();
        db.create_field(crew.id, new_field("late", Requirement::Advised, Some(1)))
            .unwrap();
        db.create_field(crew.id, new_field("tie_a", Requirement::Required, Some(2)))
            .unwrap();
        db.create_field(crew.id, new_field("tie_b", Requirement::Required, Some(2)))
            .unwrap();
        db.create_field(crew.id, new_field("first", Requirement::Required, Some(1)))
            .unwrap();
        let mut hidden = new_field("hidden", Requirement::Required, Some(0));
        hidden.status = FieldStatus::Disabled;
        db.create_field(crew.id, hidden).unwrap();

        let labels: Vec<String> = db
            .list_active_fields(crew.id, FieldStatus::Disabled)
            .unwrap()
            .into_iter()
            .map(|f| f.label)
            .collect();
        assert_eq!(labels, vec!["first", "tie_a", "tie_b", "late"]);
    }

    #[test]
    fn fields_never_leak_across_crews() {
        let (_dir, db) = temp_db();
        let north = db.create_crew("North").unwrap();
        let south = db.create_crew("South").unwrap();
        let field = add_field(&db, north.id, "full_name");

        assert!(db
            .list_active_fields(south.id, FieldStatus::Disabled)
            .unwrap()
            .is_empty());
        assert!(matches!(
            db.get_field(south.id, field.id),
            Err(StoreError::NotFound)
        ));
        assert!(!db.delete_field(south.id, field.id).unwrap());
        // Same label is free in another crew.
        add_field(&db, south.id, "full_name");
    }

    #[test]
    fn duplicate_label_in_crew_is_a_conflict() {
        let (_dir, db) = temp_db();
        let crew = db.create_crew("North").unwrap();
        add_field(&db, crew.id, "full_name");
        let err = db
            .create_field(crew.id, new_field("full_name", Requirement::Advised, None))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn record_keys_cannot_be_field_labels() {
        let (_dir, db) = temp_db();
        let crew = db.create_crew("North").unwrap();
        for label in ["id", "date", "application_id"] {
            let err = db
                .create_field(crew.id, new_field(label, Requirement::Advised, None))
                .unwrap_err();
            assert!(matches!(err, StoreError::Domain(DomainError::ReservedLabel(_))));
        }
        assert!(db.list_fields(crew.id).unwrap().is_empty());
        // The external reference may also live in an attribute.
        add_field(&db, crew.id, "unique_id");
    }

    #[test]
    fn metadata_is_derived_on_create_and_rule_on_update() {
        let (_dir, db) = temp_db();
        let crew = db.create_crew("North").unwrap();
        let mut new = new_field("birth", Requirement::Required, None);
        new.database_type = DatabaseType::Date;
        let field = db.create_field(crew.id, new).unwrap();
        assert_eq!(field.html_data_type, "date");
        assert_eq!(field.validation_rule, "required|date");

        let updated = db
            .update_field(
                crew.id,
                field.id,
                FieldUpdate {
                    title: "Birth date".into(),
                    placeholder: Some("YYYY-MM-DD".into()),
                    required: Requirement::Advised,
                    status: FieldStatus::Website,
                    order: 4,
                    linked_list: None,
                    descriptive_value: false,
                    best_descriptive_value: false,
                },
            )
            .unwrap();
        assert_eq!(updated.database_type, DatabaseType::Date);
        assert_eq!(updated.validation_rule, "nullable|date");
        assert_eq!(updated.title, "Birth date");
        assert_eq!(updated.order, 4);
    }

    #[test]
    fn only_one_best_descriptive_field_per_crew() {
        let (_dir, db) = temp_db();
        let crew = db.create_crew("North").unwrap();
        let mut first = new_field("full_name", Requirement::Required, None);
        first.best_descriptive_value = true;
        db.create_field(crew.id, first).unwrap();
        let mut second = new_field("alias", Requirement::Advised, None);
        second.best_descriptive_value = true;
        let second = db.create_field(crew.id, second).unwrap();

        let flagged: Vec<_> = db
            .list_fields(crew.id)
            .unwrap()
            .into_iter()
            .filter(|f| f.best_descriptive_value)
            .collect();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].id, second.id);
        assert_eq!(db.best_descriptive_field(crew.id).unwrap().unwrap().id, second.id);
    }

    #[test]
    fn used_linked_lists_follow_active_fields() {
        let (_dir, db) = temp_db();
        let crew = db.create_crew("North").unwrap();
        let country = db.get_list_control_by_name("Country").unwrap();
        let mut nationality = new_field("nationality", Requirement::Advised, None);
        nationality.linked_list = Some(country.id);
        db.create_field(crew.id, nationality).unwrap();

        let lists = db.used_linked_lists(crew.id, FieldStatus::Website).unwrap();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].name, "Country");
    }

    #[test]
    fn unknown_linked_list_is_rejected() {
        let (_dir, db) = temp_db();
        let crew = db.create_crew("North").unwrap();
        let mut field = new_field("gender", Requirement::Advised, None);
        field.linked_list = Some(999);
        assert!(matches!(
            db.create_field(crew.id, field),
            Err(StoreError::NotFound)
        ));
    }
}
