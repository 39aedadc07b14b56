//! v001 -- Initial schema creation.
//!
//! Tenancy (`crews`, `users`, `user_roles`, `role_requests`, `api_tokens`),
//! the dynamic attribute model (`fields`, `persons`, `field_person`),
//! relationships (`links`), lookup lists and provenance (`api_logs`).

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Tenancy
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS crews (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    name       TEXT NOT NULL,
    created_at TEXT NOT NULL                  -- RFC-3339
);

CREATE TABLE IF NOT EXISTS user_roles (
    id   INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS users (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    crew_id    TEXT NOT NULL,
    name       TEXT NOT NULL,
    email      TEXT NOT NULL UNIQUE,
    role_id    INTEGER NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (crew_id) REFERENCES crews(id),
    FOREIGN KEY (role_id) REFERENCES user_roles(id)
);

CREATE INDEX IF NOT EXISTS idx_users_crew ON users(crew_id);

CREATE TABLE IF NOT EXISTS role_requests (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id    TEXT NOT NULL,
    role_id    INTEGER NOT NULL,
    accepted   INTEGER,                       -- NULL while pending
    granted    TEXT,                          -- decision timestamp
    created_at TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (role_id) REFERENCES user_roles(id)
);

CREATE TABLE IF NOT EXISTS api_tokens (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id    TEXT NOT NULL,
    name       TEXT NOT NULL,
    token_hash TEXT NOT NULL UNIQUE,          -- hex BLAKE3 of the secret
    scopes     TEXT NOT NULL,                 -- comma list: read,update
    revoked    INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Lookup lists
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS list_controls (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL UNIQUE,     -- registry key: Gender, Country, ...
    title           TEXT NOT NULL,
    displayed_value TEXT NOT NULL             -- column projected for display
);

CREATE TABLE IF NOT EXISTS genders (
    id    INTEGER PRIMARY KEY,
    code  TEXT NOT NULL,
    name  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS countries (
    id    INTEGER PRIMARY KEY,
    iso2  TEXT NOT NULL,
    iso3  TEXT NOT NULL,
    name  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS roles (
    id    INTEGER PRIMARY KEY,
    short TEXT NOT NULL,
    name  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS relations (
    id      INTEGER PRIMARY KEY,
    short   TEXT NOT NULL,
    name    TEXT NOT NULL,
    deleted INTEGER NOT NULL DEFAULT 0
);

-- ----------------------------------------------------------------
-- Provenance
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS api_logs (
    id             TEXT PRIMARY KEY NOT NULL, -- UUID v4
    crew_id        TEXT,                      -- NULL when no token resolved
    user_id        TEXT,
    ip             TEXT,
    application_id TEXT,
    api_type       TEXT NOT NULL,
    http_method    TEXT NOT NULL,
    payload        TEXT,
    response       TEXT,
    created_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_api_logs_crew ON api_logs(crew_id, created_at DESC);

-- ----------------------------------------------------------------
-- Dynamic attribute model
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS fields (
    id                     INTEGER PRIMARY KEY AUTOINCREMENT,
    crew_id                TEXT NOT NULL,
    label                  TEXT NOT NULL,
    title                  TEXT NOT NULL,
    placeholder            TEXT,
    database_type          TEXT NOT NULL,
    html_data_type         TEXT NOT NULL,
    android_type           TEXT NOT NULL,
    validation_rule        TEXT NOT NULL,
    required               INTEGER NOT NULL,
    status                 INTEGER NOT NULL,
    "order"                INTEGER NOT NULL,
    linked_list            INTEGER,
    descriptive_value      INTEGER NOT NULL DEFAULT 0,
    best_descriptive_value INTEGER NOT NULL DEFAULT 0,
    created_at             TEXT NOT NULL,

    FOREIGN KEY (crew_id) REFERENCES crews(id) ON DELETE CASCADE,
    FOREIGN KEY (linked_list) REFERENCES list_controls(id) ON DELETE SET NULL,
    UNIQUE (crew_id, label)
);

CREATE INDEX IF NOT EXISTS idx_fields_crew_order ON fields(crew_id, required, "order", id);

CREATE TABLE IF NOT EXISTS persons (
    id             TEXT PRIMARY KEY NOT NULL, -- UUID v4
    crew_id        TEXT NOT NULL,
    date           TEXT NOT NULL,             -- event / entry date, RFC-3339
    api_log        TEXT,                      -- FK -> api_logs(id)
    application_id TEXT,
    unique_id      TEXT,                      -- external reference, not unique-enforced
    details        TEXT,
    deleted        INTEGER NOT NULL DEFAULT 0,
    created_at     TEXT NOT NULL,

    FOREIGN KEY (crew_id) REFERENCES crews(id) ON DELETE CASCADE,
    FOREIGN KEY (api_log) REFERENCES api_logs(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_persons_crew_date ON persons(crew_id, deleted, date DESC);
CREATE INDEX IF NOT EXISTS idx_persons_unique_id ON persons(crew_id, unique_id);

CREATE TABLE IF NOT EXISTS field_person (
    person_id TEXT NOT NULL,
    field_id  INTEGER NOT NULL,
    value     TEXT NOT NULL,

    PRIMARY KEY (person_id, field_id),
    FOREIGN KEY (person_id) REFERENCES persons(id) ON DELETE CASCADE,
    FOREIGN KEY (field_id) REFERENCES fields(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_field_person_field ON field_person(field_id);

-- ----------------------------------------------------------------
-- Links between persons
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS links (
    id          TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    crew_id     TEXT NOT NULL,
    from_person TEXT NOT NULL,
    to_person   TEXT NOT NULL,
    relation    INTEGER NOT NULL,
    detail      TEXT,
    api_log     TEXT,
    deleted     INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL,

    FOREIGN KEY (crew_id) REFERENCES crews(id) ON DELETE CASCADE,
    FOREIGN KEY (from_person) REFERENCES persons(id) ON DELETE CASCADE,
    FOREIGN KEY (to_person) REFERENCES persons(id) ON DELETE CASCADE,
    FOREIGN KEY (relation) REFERENCES relations(id),
    FOREIGN KEY (api_log) REFERENCES api_logs(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_links_from ON links(from_person);
CREATE INDEX IF NOT EXISTS idx_links_to ON links(to_person);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
