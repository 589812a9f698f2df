/// MIGRATION 0001: Initial database schema.
pub const MIGRATION_0001: &str = r#"
-- Places Table: One row per happy place.
CREATE TABLE IF NOT EXISTS places (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    image_path TEXT NOT NULL,
    note TEXT,
    date TEXT NOT NULL, -- YYYY-MM-DD
    latitude REAL,
    longitude REAL,
    address TEXT,
    CHECK ((latitude IS NULL) = (longitude IS NULL))
);
"#;
