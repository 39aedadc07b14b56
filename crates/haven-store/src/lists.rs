//! Lookup lists and the linked-list resolver.
//!
//! A field whose `linked_list` is set stores the id of a row in a lookup
//! table (genders, countries, ...). The `list_controls` table says which
//! concrete table a list reads and which column is shown. Concrete tables
//! form a closed set, [`LookupTable`]; a list control naming anything else is
//! rejected when it is bound.

use std::cell::RefCell;
use std::collections::HashMap;

use rusqlite::params;

use haven_shared::types::{ListControlId, ListEntryId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Field, ListControl, ListEntry};

// ---------------------------------------------------------------------------
// Registry of concrete tables
// ---------------------------------------------------------------------------

/// The lookup tables a list control may point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupTable {
    Gender,
    Country,
    Role,
    Relation,
}

impl LookupTable {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Gender" => Some(Self::Gender),
            "Country" => Some(Self::Country),
            "Role" => Some(Self::Role),
            "Relation" => Some(Self::Relation),
            _ => None,
        }
    }

    fn table(&self) -> &'static str {
        match self {
            Self::Gender => "genders",
            Self::Country => "countries",
            Self::Role => "roles",
            Self::Relation => "relations",
        }
    }

    /// Columns that may be used as `displayed_value`.
    fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::Gender => &["code", "name"],
            Self::Country => &["iso2", "iso3", "name"],
            Self::Role => &["short", "name"],
            Self::Relation => &["short", "name"],
        }
    }

    /// Listing filter for tables that soft-delete their rows.
    fn live_filter(&self) -> &'static str {
        match self {
            Self::Relation => "WHERE deleted = 0",
            _ => "",
        }
    }
}

/// A list control bound to its concrete table and display column.
#[derive(Debug, Clone)]
pub struct BoundList {
    pub control: ListControl,
    table: LookupTable,
    column: &'static str,
}

impl BoundList {
    pub fn bind(control: ListControl) -> Result<Self> {
        let table = LookupTable::from_name(&control.name)
            .ok_or_else(|| StoreError::UnknownLookupList(control.name.clone()))?;
        let column = table
            .columns()
            .iter()
            .copied()
            .find(|c| *c == control.displayed_value)
            .ok_or_else(|| {
                StoreError::UnknownLookupList(format!("{}.{}", control.name, control.displayed_value))
            })?;
        Ok(Self {
            control,
            table,
            column,
        })
    }

    /// Live rows of the list, in id order.
    pub fn list_contents(&self, db: &Database) -> Result<Vec<ListEntry>> {
        let sql = format!(
            "SELECT id, {} FROM {} {} ORDER BY id ASC",
            self.column,
            self.table.table(),
            self.table.live_filter()
        );
        let mut stmt = db.conn().prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(ListEntry {
                id: row.get(0)?,
                value: row.get(1)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    fn all_displays(&self, db: &Database) -> Result<HashMap<ListEntryId, String>> {
        let sql = format!("SELECT id, {} FROM {}", self.column, self.table.table());
        let mut stmt = db.conn().prepare(&sql)?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<std::result::Result<HashMap<_, _>, _>>()
            .map_err(StoreError::Sqlite)
    }
}

/// Every bound list, keyed by list control id.
#[derive(Debug, Clone, Default)]
pub struct ListRegistry {
    lists: HashMap<ListControlId, BoundList>,
}

impl ListRegistry {
    /// Bind every list control. Controls that fail to bind are skipped with
    /// a warning so one bad row cannot take down the projections.
    pub fn load(db: &Database) -> Result<Self> {
        let mut lists = HashMap::new();
        for control in db.list_controls()? {
            let id = control.id;
            match BoundList::bind(control) {
                Ok(bound) => {
                    lists.insert(id, bound);
                }
                Err(e) => tracing::warn!(list_control = id, error = %e, "skipping lookup list"),
            }
        }
        Ok(Self { lists })
    }

    pub fn get(&self, id: ListControlId) -> Option<&BoundList> {
        self.lists.get(&id)
    }

    pub fn by_name(&self, name: &str) -> Option<&BoundList> {
        self.lists.values().find(|l| l.control.name == name)
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Resolves stored linked-list ids to display strings. Each list's rows are
/// read once per resolver, so one resolver should serve one request.
#[derive(Debug)]
pub struct LinkedListResolver<'a> {
    db: &'a Database,
    registry: ListRegistry,
    cache: RefCell<HashMap<ListControlId, HashMap<ListEntryId, String>>>,
}

impl<'a> LinkedListResolver<'a> {
    pub fn new(db: &'a Database) -> Result<Self> {
        Ok(Self {
            db,
            registry: ListRegistry::load(db)?,
            cache: RefCell::new(HashMap::new()),
        })
    }

    pub fn registry(&self) -> &ListRegistry {
        &self.registry
    }

    /// Display string for `stored` under `field`.
    ///
    /// Fields without a linked list return the stored value unchanged. A
    /// dangling reference (unknown list, non-numeric value or missing row)
    /// resolves to an empty string.
    pub fn resolve_display_value(&self, field: &Field, stored: &str) -> Result<String> {
        let Some(list_id) = field.linked_list else {
            return Ok(stored.to_string());
        };
        let Some(list) = self.registry.get(list_id) else {
            return Ok(String::new());
        };
        let Ok(entry_id) = stored.trim().parse::<ListEntryId>() else {
            return Ok(String::new());
        };

        let mut cache = self.cache.borrow_mut();
        if !cache.contains_key(&list_id) {
            cache.insert(list_id, list.all_displays(self.db)?);
        }
        Ok(cache
            .get(&list_id)
            .and_then(|rows| rows.get(&entry_id))
            .cloned()
            .unwrap_or_default())
    }

    /// Options for an edit form. The currently selected entry, if any, is
    /// moved to the front; the rest keep their order.
    pub fn candidate_options(&self, field: &Field, selected: Option<&str>) -> Result<Vec<ListEntry>> {
        let Some(list) = field.linked_list.and_then(|id| self.registry.get(id)) else {
            return Ok(Vec::new());
        };
        let mut options = list.list_contents(self.db)?;
        let selected = selected.and_then(|s| s.trim().parse::<ListEntryId>().ok());
        if let Some(pos) = selected.and_then(|id| options.iter().position(|o| o.id == id)) {
            let chosen = options.remove(pos);
            options.insert(0, chosen);
        }
        Ok(options)
    }
}

// ---------------------------------------------------------------------------
// List control CRUD
// ---------------------------------------------------------------------------

impl Database {
    pub fn list_controls(&self) -> Result<Vec<ListControl>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, title, displayed_value FROM list_controls ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], row_to_list_control)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn get_list_control(&self, id: ListControlId) -> Result<ListControl> {
        self.conn()
            .query_row(
                "SELECT id, name, title, displayed_value FROM list_controls WHERE id = ?1",
                params![id],
                row_to_list_control,
            )
            .map_err(StoreError::from_query)
    }

    pub fn get_list_control_by_name(&self, name: &str) -> Result<ListControl> {
        self.conn()
            .query_row(
                "SELECT id, name, title, displayed_value FROM list_controls WHERE name = ?1",
                params![name],
                row_to_list_control,
            )
            .map_err(StoreError::from_query)
    }

    /// Change which column a list displays. The column must belong to the
    /// list's table.
    pub fn set_displayed_value(&self, id: ListControlId, column: &str) -> Result<ListControl> {
        let mut control = self.get_list_control(id)?;
        control.displayed_value = column.to_string();
        BoundList::bind(control.clone())?;
        self.conn().execute(
            "UPDATE list_controls SET displayed_value = ?1 WHERE id = ?2",
            params![column, id],
        )?;
        Ok(control)
    }

    /// Contents of one list by control id.
    pub fn list_contents(&self, id: ListControlId) -> Result<Vec<ListEntry>> {
        BoundList::bind(self.get_list_control(id)?)?.list_contents(self)
    }

    /// One-off display resolution. Prefer a shared [`LinkedListResolver`]
    /// when resolving many values.
    pub fn resolve_display_value(&self, field: &Field, stored: &str) -> Result<String> {
        LinkedListResolver::new(self)?.resolve_display_value(field, stored)
    }

    pub fn candidate_options(&self, field: &Field, selected: Option<&str>) -> Result<Vec<ListEntry>> {
        LinkedListResolver::new(self)?.candidate_options(field, selected)
    }
}

fn row_to_list_control(row: &rusqlite::Row<'_>) -> rusqlite::Result<ListControl> {
    Ok(ListControl {
        id: row.get(0)?,
        name: row.get(1)?,
        title: row.get(2)?,
        displayed_value: row.get(3)?,
    })
}
