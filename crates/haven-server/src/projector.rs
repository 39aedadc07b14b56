//! Wire projection of persons, fields and links for the external API.
//!
//! An [`ApiProjector`] is built per request for one crew. It snapshots the
//! crew's field set and owns a [`LinkedListResolver`], so nothing it reads
//! outlives the request.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use haven_shared::constants::{LINK_CREATE_ERROR, PERSON_CREATE_ERROR};
use haven_shared::field::FieldStatus;
use haven_shared::types::{CrewId, FieldId, ListEntryId, PersonId};
use haven_shared::value::{encode_incoming, AttributeValue};
use haven_shared::DomainError;
use haven_store::{
    parse_event_date, truncate_logged, ApiLog, Database, Field, FieldSet, LinkedListResolver, NewLink, NewPerson, Person, StoreError,
};

/// Name of the lookup list every field payload carries.
const RELATION_LIST: &str = "Relation";

/// Keys of a person payload that fill shell columns instead of attributes.
const DATE_KEY: &str = "date";
const UNIQUE_ID_KEY: &str = "unique_id";
const APPLICATION_ID_KEY: &str = "application_id";

/// Why one item of a write batch was refused.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("item is not a JSON object")]
    NotAnObject,

    #[error("unreadable date: {0}")]
    BadDate(String),

    #[error("malformed item: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-item results of a write batch. Items are independent: a failure
/// never undoes the items written before it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub created: Vec<Uuid>,
    pub errors: Vec<String>,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// One link of an API batch. Endpoints are named by full name and external
/// reference, not by internal id. Mobile clients send them as `refugee1_*`
/// and `refugee2_*`.
#[derive(Debug, Deserialize)]
struct LinkItem {
    #[serde(rename = "refugee1_full_name", alias = "from_full_name")]
    from_full_name: String,
    #[serde(rename = "refugee1_unique_id", alias = "from_unique_id")]
    from_unique_id: String,
    #[serde(rename = "refugee2_full_name", alias = "to_full_name")]
    to_full_name: String,
    #[serde(rename = "refugee2_unique_id", alias = "to_unique_id")]
    to_unique_id: String,
    relation: ListEntryId,
    #[serde(default)]
    detail: Option<String>,
}

pub struct ApiProjector<'a> {
    db: &'a Database,
    crew_id: CrewId,
    fields: FieldSet,
    resolver: LinkedListResolver<'a>,
}

impl<'a> ApiProjector<'a> {
    pub fn new(db: &'a Database, crew_id: CrewId) -> Result<Self, StoreError> {
        Ok(Self {
            db,
            crew_id,
            fields: db.field_set(crew_id)?,
            resolver: LinkedListResolver::new(db)?,
        })
    }

    /// The field payload sent to mobile clients: the app-visible fields,
    /// the relation list and every list those fields reference.
    pub fn fields_content(&self) -> Result<Map<String, Value>, StoreError> {
        let mut content = Map::new();
        let fields = self.db.list_active_fields(self.crew_id, FieldStatus::Website)?;
        content.insert("fields".into(), serde_json::to_value(&fields)?);

        if let Some(relations) = self.resolver.registry().by_name(RELATION_LIST) {
            content.insert("Relations".into(), serde_json::to_value(relations.list_contents(self.db)?)?);
        }

        for control in self.db.used_linked_lists(self.crew_id, FieldStatus::Website)? {
            if let Some(list) = self.resolver.registry().get(control.id) {
                content.insert(control.name.clone(), serde_json::to_value(list.list_contents(self.db)?)?);
            }
        }
        Ok(content)
    }

    /// One record per person, attributes keyed by field label with linked
    /// values resolved. Persons of another crew are dropped.
    pub fn project_for_read(&self, persons: &[Person]) -> Result<Vec<Value>, StoreError> {
        let mut attributes = self.db.attributes_by_person(self.crew_id)?;
        let mut records = Vec::with_capacity(persons.len());
        for person in persons {
            if person.crew_id != self.crew_id {
                tracing::warn!(crew_id = %self.crew_id, person_id = %person.id, "foreign person dropped from projection");
                continue;
            }
            let values = attributes.remove(&person.id).unwrap_or_default();
            records.push(Value::Object(self.project_person(person, &values)?));
        }
        Ok(records)
    }

    /// Shell columns first, then one entry per stored attribute. Only
    /// `unique_id` may also be a field label, and writes keep both in step.
    pub fn project_person(
        &self,
        person: &Person,
        values: &BTreeMap<FieldId, String>,
    ) -> Result<Map<String, Value>, StoreError> {
        let mut record = Map::new();
        record.insert("id".into(), serde_json::to_value(person.id)?);
        record.insert(DATE_KEY.into(), serde_json::to_value(person.date)?);
        record.insert(UNIQUE_ID_KEY.into(), serde_json::to_value(&person.unique_id)?);
        record.insert(APPLICATION_ID_KEY.into(), serde_json::to_value(&person.application_id)?);

        for (field_id, raw) in values {
            let Some(field) = self.fields.by_id(*field_id) else {
                continue;
            };
            record.insert(field.label.clone(), self.project_value(field, raw)?);
        }
        Ok(record)
    }

    /// Wire form of one stored value: linked values resolve to their display
    /// string, the rest decode by database type.
    pub fn project_value(&self, field: &Field, raw: &str) -> Result<Value, StoreError> {
        if field.linked_list.is_some() {
            return Ok(Value::String(self.resolver.resolve_display_value(field, raw)?));
        }
        Ok(AttributeValue::decode(field.database_type, raw).to_json())
    }

    /// Value of the crew's best descriptive field, falling back to the
    /// external reference.
    pub fn display_name(&self, person: &Person, values: &BTreeMap<FieldId, String>) -> Result<String, StoreError> {
        if let Some(field) = self.fields.best_descriptive() {
            if let Some(raw) = values.get(&field.id) {
                let shown = self.resolver.resolve_display_value(field, raw)?;
                if !shown.is_empty() {
                    return Ok(shown);
                }
            }
        }
        Ok(person.unique_id.clone().unwrap_or_default())
    }

    /// Translate a label-keyed payload into field ids. Values are encoded
    /// for storage and checked against the field's type; blank values are
    /// left out.
    pub fn attributes_from_labels(&self, payload: &Map<String, Value>) -> Result<BTreeMap<FieldId, String>, ItemError> {
        let mut attributes = BTreeMap::new();
        for (label, value) in payload {
            let field = self
                .fields
                .by_label(label)
                .ok_or_else(|| StoreError::UnknownLabel(label.clone()))?;
            let Some(encoded) = encode_incoming(value) else {
                continue;
            };
            AttributeValue::parse(field.database_type, &encoded)?;
            attributes.insert(field.id, encoded);
        }
        Ok(attributes)
    }

    /// Write a batch of persons. Each item is stored in its own transaction.
    pub fn project_persons_for_write(&self, log: &ApiLog, items: &[Value]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for (index, item) in items.iter().enumerate() {
            match self.write_person(log, item) {
                Ok(person) => outcome.created.push(person.0),
                Err(e) => self.record_failure(log, PERSON_CREATE_ERROR, index, item, &e, &mut outcome),
            }
        }
        outcome
    }

    /// Write a batch of links, resolving endpoints by full name and
    /// external reference.
    pub fn project_links_for_write(&self, log: &ApiLog, items: &[Value]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for (index, item) in items.iter().enumerate() {
            match self.write_link(log, item) {
                Ok(link) => outcome.created.push(link),
                Err(e) => self.record_failure(log, LINK_CREATE_ERROR, index, item, &e, &mut outcome),
            }
        }
        outcome
    }

    fn write_person(&self, log: &ApiLog, item: &Value) -> Result<PersonId, ItemError> {
        let Value::Object(map) = item else {
            return Err(ItemError::NotAnObject);
        };

        let mut shell = NewPerson {
            api_log: Some(log.id),
            application_id: log.application_id.clone(),
            ..NewPerson::default()
        };
        let mut labelled = Map::new();
        for (key, value) in map {
            match key.as_str() {
                DATE_KEY => {
                    if let Some(raw) = encode_incoming(value) {
                        shell.date = Some(parse_event_date(&raw).ok_or(ItemError::BadDate(raw))?);
                    }
                }
                APPLICATION_ID_KEY => {
                    if let Some(raw) = encode_incoming(value) {
                        shell.application_id = Some(raw);
                    }
                }
                UNIQUE_ID_KEY => {
                    shell.unique_id = encode_incoming(value);
                    if self.fields.by_label(UNIQUE_ID_KEY).is_some() {
                        labelled.insert(key.clone(), value.clone());
                    }
                }
                _ => {
                    labelled.insert(key.clone(), value.clone());
                }
            }
        }

        let attributes = self.attributes_from_labels(&labelled)?;
        let person = self.db.create_with_attributes(self.crew_id, &shell, &attributes)?;
        Ok(person.id)
    }

    fn write_link(&self, log: &ApiLog, item: &Value) -> Result<Uuid, ItemError> {
        if !item.is_object() {
            return Err(ItemError::NotAnObject);
        }
        let link: LinkItem = serde_json::from_value(item.clone())?;
        let from = self.resolve_person(&link.from_full_name, &link.from_unique_id)?;
        let to = self.resolve_person(&link.to_full_name, &link.to_unique_id)?;

        let created = self.db.create_link(
            self.crew_id,
            &NewLink {
                from,
                to,
                relation: link.relation,
                detail: link.detail,
                api_log: Some(log.id),
            },
        )?;
        Ok(created.id.0)
    }

    fn resolve_person(&self, full_name: &str, unique_id: &str) -> Result<PersonId, StoreError> {
        self.db
            .find_person_by_reference(self.crew_id, full_name, unique_id)?
            .ok_or_else(|| StoreError::UnresolvedPerson {
                full_name: full_name.to_string(),
                unique_id: unique_id.to_string(),
            })
    }

    fn record_failure(
        &self,
        log: &ApiLog,
        prefix: &str,
        index: usize,
        item: &Value,
        error: &ItemError,
        outcome: &mut BatchOutcome,
    ) {
        tracing::warn!(
            crew_id = %self.crew_id,
            api_log = %log.id,
            item = index,
            error = %error,
            "batch item rejected"
        );
        let note = truncate_logged(format!("{prefix}: {item}"));
        if let Err(e) = self.db.append_api_log_response(log.id, &note) {
            tracing::error!(api_log = %log.id, error = %e, "could not record batch failure");
        }
        outcome.errors.push(note);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use haven_shared::constants::{FULL_NAME_LABEL, MAX_LOGGED_PAYLOAD};
    use haven_shared::field::{DatabaseType, Requirement};
    use haven_store::{NewApiLog, NewField};

    use super::*;

    fn field(db: &Database, crew: CrewId, label: &str, ty: DatabaseType, linked_list: Option<i64>) {
        db.create_field(
            crew,
            NewField {
                label: label.into(),
                title: label.into(),
                placeholder: None,
                database_type: ty,
                required: Requirement::Advised,
                status: FieldStatus::WebsiteAndApp,
                order: None,
                linked_list,
                descriptive_value: false,
                best_descriptive_value: label == FULL_NAME_LABEL,
            },
        )
        .unwrap();
    }

    fn setup() -> (tempfile::TempDir, Database, CrewId) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("haven.db")).unwrap();
        let crew = db.create_crew("North").unwrap().id;
        let gender = db.get_list_control_by_name("Gender").unwrap().id;
        field(&db, crew, FULL_NAME_LABEL, DatabaseType::String, None);
        field(&db, crew, "age", DatabaseType::Integer, None);
        field(&db, crew, "gender", DatabaseType::String, Some(gender));
        (dir, db, crew)
    }

    fn open_log(db: &Database, crew: CrewId) -> ApiLog {
        db.create_api_log(NewApiLog {
            crew_id: Some(crew),
            api_type: "Refugee".into(),
            http_method: "POST".into(),
            ..NewApiLog::default()
        })
        .unwrap()
    }

    #[test]
    fn read_projection_is_keyed_by_label_and_resolves_lists() {
        let (_dir, db, crew) = setup();
        let projector = ApiProjector::new(&db, crew).unwrap();
        let log = open_log(&db, crew);
        let outcome = projector.project_persons_for_write(
            &log,
            &[json!({"full_name": "Amina", "age": 34, "gender": "2", "unique_id": "R-1"})],
        );
        assert!(outcome.is_success());

        let persons = db.list_persons(crew).unwrap();
        let records = projector.project_for_read(&persons).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["full_name"], json!("Amina"));
        assert_eq!(records[0]["age"], json!(34));
        assert_eq!(records[0]["gender"], json!("Female"));
        assert_eq!(records[0]["unique_id"], json!("R-1"));

        let values = db.attributes_of(crew, persons[0].id).unwrap();
        assert_eq!(projector.display_name(&persons[0], &values).unwrap(), "Amina");
    }

    #[test]
    fn failed_item_does_not_undo_its_neighbours() {
        let (_dir, db, crew) = setup();
        let projector = ApiProjector::new(&db, crew).unwrap();
        let log = open_log(&db, crew);

        let items = [
            json!({"full_name": "Amina"}),
            json!({"full_name": "Bilal", "shoe_size": 44}),
            json!({"full_name": "Chadi"}),
        ];
        let outcome = projector.project_persons_for_write(&log, &items);

        assert_eq!(outcome.created.len(), 2);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].starts_with(PERSON_CREATE_ERROR));
        assert!(outcome.errors[0].contains("shoe_size"));
        assert_eq!(db.list_persons(crew).unwrap().len(), 2);

        let response = db.get_api_log(log.id).unwrap().response.unwrap();
        assert_eq!(response, outcome.errors[0]);
    }

    #[test]
    fn ill_typed_values_reject_the_item() {
        let (_dir, db, crew) = setup();
        let projector = ApiProjector::new(&db, crew).unwrap();
        let log = open_log(&db, crew);

        let outcome = projector.project_persons_for_write(
            &log,
            &[json!({"full_name": "Amina", "age": "thirty"}), json!("not an object")],
        );
        assert!(outcome.created.is_empty());
        assert_eq!(outcome.errors.len(), 2);
    }

    #[test]
    fn links_resolve_endpoints_by_name_and_reference() {
        let (_dir, db, crew) = setup();
        let projector = ApiProjector::new(&db, crew).unwrap();
        let log = open_log(&db, crew);
        projector.project_persons_for_write(
            &log,
            &[
                json!({"full_name": "Amina", "unique_id": "R-1"}),
                json!({"full_name": "Samir", "unique_id": "R-2"}),
            ],
        );

        let outcome = projector.project_links_for_write(
            &log,
            &[
                json!({
                    "refugee1_full_name": "Amina", "refugee1_unique_id": "R-1",
                    "refugee2_full_name": "Samir", "refugee2_unique_id": "R-2",
                    "relation": 1
                }),
                json!({
                    "refugee1_full_name": "Amina", "refugee1_unique_id": "R-1",
                    "refugee2_full_name": "Nobody", "refugee2_unique_id": "R-9",
                    "relation": 1
                }),
            ],
        );

        assert_eq!(outcome.created.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].starts_with(LINK_CREATE_ERROR));
        assert_eq!(db.list_links(crew).unwrap().len(), 1);
    }

    #[test]
    fn links_also_accept_directional_endpoint_keys() {
        let (_dir, db, crew) = setup();
        let projector = ApiProjector::new(&db, crew).unwrap();
        let log = open_log(&db, crew);
        projector.project_persons_for_write(
            &log,
            &[
                json!({"full_name": "Amina", "unique_id": "R-1"}),
                json!({"full_name": "Samir", "unique_id": "R-2"}),
            ],
        );

        let outcome = projector.project_links_for_write(
            &log,
            &[json!({
                "from_full_name": "Samir", "from_unique_id": "R-2",
                "to_full_name": "Amina", "to_unique_id": "R-1",
                "relation": 2, "detail": "cousin"
            })],
        );
        assert!(outcome.is_success());
        let links = db.list_links(crew).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].detail.as_deref(), Some("cousin"));
    }

    #[test]
    fn failure_notes_stay_within_the_log_cap() {
        let (_dir, db, crew) = setup();
        let projector = ApiProjector::new(&db, crew).unwrap();
        let log = open_log(&db, crew);

        let bulky = "a".repeat(100_000);
        let items: Vec<Value> = (0..20)
            .map(|_| json!({"full_name": bulky, "shoe_size": 44}))
            .collect();
        let outcome = projector.project_persons_for_write(&log, &items);

        assert_eq!(outcome.errors.len(), 20);
        assert!(outcome.errors.iter().all(|e| e.len() <= MAX_LOGGED_PAYLOAD));
        assert!(outcome.errors[0].starts_with(PERSON_CREATE_ERROR));

        let response = db.get_api_log(log.id).unwrap().response.unwrap();
        assert!(response.len() <= 20 * (MAX_LOGGED_PAYLOAD + 1));
    }

    #[test]
    fn field_payload_carries_relations_and_used_lists() {
        let (_dir, db, crew) = setup();
        let projector = ApiProjector::new(&db, crew).unwrap();

        let content = projector.fields_content().unwrap();
        assert_eq!(content["fields"].as_array().unwrap().len(), 3);
        assert!(content.contains_key("Relations"));
        assert!(content.contains_key("Gender"));
        assert!(!content.contains_key("Country"));
    }
}
