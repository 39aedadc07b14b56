//! v002 -- Seed the lookup lists and operator roles.

use rusqlite::Connection;

const UP_SQL: &str = r#"
INSERT OR IGNORE INTO user_roles (id, name) VALUES
    (1, 'Administrator'),
    (2, 'Coordinator'),
    (3, 'Member');

INSERT OR IGNORE INTO list_controls (name, title, displayed_value) VALUES
    ('Gender',   'Gender',      'name'),
    ('Country',  'Nationality', 'name'),
    ('Role',     'Role',        'name'),
    ('Relation', 'Relation',    'name');

INSERT OR IGNORE INTO genders (id, code, name) VALUES
    (1, 'M', 'Male'),
    (2, 'F', 'Female'),
    (3, 'X', 'Other');

INSERT OR IGNORE INTO roles (id, short, name) VALUES
    (1, 'PAS', 'Passenger'),
    (2, 'CRE', 'Crew member'),
    (3, 'CAP', 'Captain');

INSERT OR IGNORE INTO relations (id, short, name) VALUES
    (1, 'PAR', 'Parent'),
    (2, 'CHI', 'Child'),
    (3, 'SIB', 'Sibling'),
    (4, 'SPO', 'Spouse'),
    (5, 'REL', 'Relative'),
    (6, 'TRA', 'Travelled with');

INSERT OR IGNORE INTO countries (id, iso2, iso3, name) VALUES
    (1,  'AF', 'AFG', 'Afghanistan'),
    (2,  'DZ', 'DZA', 'Algeria'),
    (3,  'BD', 'BGD', 'Bangladesh'),
    (4,  'CM', 'CMR', 'Cameroon'),
    (5,  'CI', 'CIV', 'Côte d''Ivoire'),
    (6,  'EG', 'EGY', 'Egypt'),
    (7,  'ER', 'ERI', 'Eritrea'),
    (8,  'ET', 'ETH', 'Ethiopia'),
    (9,  'GM', 'GMB', 'Gambia'),
    (10, 'GH', 'GHA', 'Ghana'),
    (11, 'GN', 'GIN', 'Guinea'),
    (12, 'LY', 'LBY', 'Libya'),
    (13, 'ML', 'MLI', 'Mali'),
    (14, 'MA', 'MAR', 'Morocco'),
    (15, 'NG', 'NGA', 'Nigeria'),
    (16, 'PK', 'PAK', 'Pakistan'),
    (17, 'SN', 'SEN', 'Senegal'),
    (18, 'SO', 'SOM', 'Somalia'),
    (19, 'SD', 'SDN', 'Sudan'),
    (20, 'SY', 'SYR', 'Syria'),
    (21, 'TN', 'TUN', 'Tunisia');
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
