//! Directed relationships between persons of one crew.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use haven_shared::types::{CrewId, LinkId, ListEntryId, PersonId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Link, LinkUpdate, NewLink};
use crate::sql::{parse_col, parse_opt_col, parse_ts};

const LINK_COLUMNS: &str =
    "l.id, l.crew_id, l.from_person, l.to_person, l.relation, l.detail, l.api_log, l.deleted, l.created_at";

/// Links are visible while neither they nor their endpoints are soft-deleted.
const LIVE_LINK_JOIN: &str = "FROM links l
     JOIN persons pf ON pf.id = l.from_person
     JOIN persons pt ON pt.id = l.to_person
     WHERE l.crew_id = ?1 AND l.deleted = 0 AND pf.deleted = 0 AND pt.deleted = 0";

impl Database {
    /// Create a link. Both endpoints must belong to the crew and the
    /// relation must be a live entry of the relation list.
    pub fn create_link(&self, crew_id: CrewId, new: &NewLink) -> Result<Link> {
        self.in_transaction(|db| {
            db.get_person(crew_id, new.from)?;
            db.get_person(crew_id, new.to)?;
            db.check_relation(new.relation)?;

            let link = Link {
                id: LinkId::new(),
                crew_id,
                from: new.from,
                to: new.to,
                relation: new.relation,
                detail: new.detail.clone(),
                api_log: new.api_log,
                deleted: false,
                created_at: Utc::now(),
            };
            db.conn().execute(
                "INSERT INTO links (id, crew_id, from_person, to_person, relation, detail, api_log, deleted, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)",
                params![
                    link.id.to_string(),
                    crew_id.to_string(),
                    link.from.to_string(),
                    link.to.to_string(),
                    link.relation,
                    link.detail,
                    link.api_log.map(|l| l.to_string()),
                    link.created_at.to_rfc3339(),
                ],
            )?;
            tracing::debug!(crew_id = %crew_id, link_id = %link.id, "link created");
            Ok(link)
        })
    }

    pub fn get_link(&self, crew_id: CrewId, id: LinkId) -> Result<Link> {
        self.conn()
            .query_row(
                &format!("SELECT {LINK_COLUMNS} FROM links l WHERE l.id = ?1 AND l.crew_id = ?2"),
                params![id.to_string(), crew_id.to_string()],
                row_to_link,
            )
            .map_err(StoreError::from_query)
    }

    /// Live links of the crew, oldest first.
    pub fn list_links(&self, crew_id: CrewId) -> Result<Vec<Link>> {
        self.query_links(
            &format!("SELECT {LINK_COLUMNS} {LIVE_LINK_JOIN} ORDER BY l.created_at ASC"),
            params![crew_id.to_string()],
        )
    }

    /// Live links starting or ending at `person`.
    pub fn links_for_person(&self, crew_id: CrewId, person: PersonId) -> Result<Vec<Link>> {
        self.query_links(
            &format!(
                "SELECT {LINK_COLUMNS} {LIVE_LINK_JOIN}
                 AND (l.from_person = ?2 OR l.to_person = ?2)
                 ORDER BY l.created_at ASC"
            ),
            params![crew_id.to_string(), person.to_string()],
        )
    }

    pub fn update_link(&self, crew_id: CrewId, id: LinkId, update: &LinkUpdate) -> Result<Link> {
        self.check_relation(update.relation)?;
        let affected = self.conn().execute(
            "UPDATE links SET relation = ?1, detail = ?2 WHERE id = ?3 AND crew_id = ?4",
            params![update.relation, update.detail, id.to_string(), crew_id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_link(crew_id, id)
    }

    pub fn soft_delete_link(&self, crew_id: CrewId, id: LinkId) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE links SET deleted = 1 WHERE id = ?1 AND crew_id = ?2",
            params![id.to_string(), crew_id.to_string()],
        )?;
        Ok(affected > 0)
    }

    fn check_relation(&self, relation: ListEntryId) -> Result<()> {
        let live: Option<i64> = self
            .conn()
            .query_row(
                "SELECT id FROM relations WHERE id = ?1 AND deleted = 0",
                params![relation],
                |row| row.get(0),
            )
            .optional()?;
        live.map(|_| ()).ok_or(StoreError::NotFound)
    }

    fn query_links(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Link>> {
        let mut stmt = self.conn().prepare(sql)?;
        let rows = stmt.query_map(params, row_to_link)?;

        let mut links = Vec::new();
        for row in rows {
            links.push(row?);
        }
        Ok(links)
    }
}

fn row_to_link(row: &rusqlite::Row<'_>) -> rusqlite::Result<Link> {
    let id: String = row.get(0)?;
    let crew_id: String = row.get(1)?;
    let from: String = row.get(2)?;
    let to: String = row.get(3)?;
    let created: String = row.get(8)?;

    Ok(Link {
        id: parse_col(0, &id)?,
        crew_id: parse_col(1, &crew_id)?,
        from: parse_col(2, &from)?,
        to: parse_col(3, &to)?,
        relation: row.get(4)?,
        detail: row.get(5)?,
        api_log: parse_opt_col(6, row.get(6)?)?,
        deleted: row.get(7)?,
        created_at: parse_ts(8, &created)?,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::database::tests::temp_db;
    use crate::models::{LinkUpdate, NewLink, NewPerson, Person};
    use crate::{Database, StoreError};
    use haven_shared::types::CrewId;

    const PARENT: i64 = 1;
    const SIBLING: i64 = 3;

    fn person(db: &Database, crew: CrewId) -> Person {
        db.create_with_attributes(crew, &NewPerson::default(), &BTreeMap::new())
            .unwrap()
    }

    fn link(from: &Person, to: &Person, relation: i64) -> NewLink {
        NewLink {
            from: from.id,
            to: to.id,
            relation,
            detail: None,
            api_log: None,
        }
    }

    #[test]
    fn link_round_trip_and_update() {
        let (_dir, db) = temp_db();
        let crew = db.create_crew("North").unwrap();
        let (a, b) = (person(&db, crew.id), person(&db, crew.id));

        let created = db.create_link(crew.id, &link(&a, &b, PARENT)).unwrap();
        assert_eq!(db.links_for_person(crew.id, b.id).unwrap(), vec![created.clone()]);

        let updated = db
            .update_link(
                crew.id,
                created.id,
                &LinkUpdate {
                    relation: SIBLING,
                    detail: Some("half".into()),
                },
            )
            .unwrap();
        assert_eq!(updated.relation, SIBLING);
        assert_eq!(updated.detail.as_deref(), Some("half"));
    }

    #[test]
    fn endpoints_must_share_the_crew() {
        let (_dir, db) = temp_db();
        let north = db.create_crew("North").unwrap();
        let south = db.create_crew("South").unwrap();
        let (a, b) = (person(&db, north.id), person(&db, south.id));

        let err = db.create_link(north.id, &link(&a, &b, PARENT)).unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
        assert!(db.list_links(north.id).unwrap().is_empty());
    }

    #[test]
    fn unknown_relation_is_rejected() {
        let (_dir, db) = temp_db();
        let crew = db.create_crew("North").unwrap();
        let (a, b) = (person(&db, crew.id), person(&db, crew.id));

        assert!(db.create_link(crew.id, &link(&a, &b, 999)).is_err());
    }

    #[test]
    fn links_to_soft_deleted_persons_are_hidden() {
        let (_dir, db) = temp_db();
        let crew = db.create_crew("North").unwrap();
        let (a, b, c) = (person(&db, crew.id), person(&db, crew.id), person(&db, crew.id));
        db.create_link(crew.id, &link(&a, &b, PARENT)).unwrap();
        let kept = db.create_link(crew.id, &link(&a, &c, SIBLING)).unwrap();

        db.soft_delete_person(crew.id, b.id).unwrap();

        assert_eq!(db.list_links(crew.id).unwrap(), vec![kept.clone()]);
        assert_eq!(db.links_for_person(crew.id, a.id).unwrap(), vec![kept]);
    }

    #[test]
    fn soft_deleted_link_stays_readable_by_id() {
        let (_dir, db) = temp_db();
        let crew = db.create_crew("North").unwrap();
        let (a, b) = (person(&db, crew.id), person(&db, crew.id));
        let created = db.create_link(crew.id, &link(&a, &b, PARENT)).unwrap();

        assert!(db.soft_delete_link(crew.id, created.id).unwrap());
        assert!(db.list_links(crew.id).unwrap().is_empty());
        assert!(db.get_link(crew.id, created.id).unwrap().deleted);
    }
}
