use crate::config::AppPaths;
use crate::error::{Error, Result};
use crate::models::{Coordinates, Place};
use crate::schema;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

const PLACE_COLUMNS: &str = "id, title, image_path, note, date, latitude, longitude, address";

/// Initializes the database connection pool and runs migrations.
pub fn init_database(paths: &AppPaths) -> Result<DbPool> {
    log::info!("Database path: {}", paths.db_path.display());

    // Ensure the parent directory exists
    if let Some(parent) = paths.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let manager = SqliteConnectionManager::file(&paths.db_path);
    let pool = r2d2::Pool::new(manager)?;

    run_migrations(&pool.get()?)?;

    Ok(pool)
}

/// In-memory database behind a single-connection pool, so every checkout
/// sees the same data.
pub fn init_memory_database() -> Result<DbPool> {
    let manager = SqliteConnectionManager::memory();
    let pool = r2d2::Pool::builder().max_size(1).build(manager)?;
    run_migrations(&pool.get()?)?;
    Ok(pool)
}

/// Applies all pending database migrations.
fn run_migrations(connection: &DbConnection) -> Result<()> {
    log::info!("Running database migrations...");

    // Migration 0001: Initial Schema
    connection.execute_batch(schema::MIGRATION_0001)?;

    log::info!("Migrations applied successfully.");
    Ok(())
}

fn place_from_row(row: &Row<'_>) -> rusqlite::Result<Place> {
    let latitude: Option<f64> = row.get(5)?;
    let longitude: Option<f64> = row.get(6)?;
    let location = Coordinates::from_parts(latitude, longitude).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(5, Type::Real, err.to_string().into())
    })?;
    Ok(Place {
        id: row.get(0)?,
        title: row.get(1)?,
        image_path: row.get(2)?,
        note: row.get(3)?,
        date: row.get(4)?,
        location,
        address: row.get(7)?,
    })
}

/// Inserts a place and returns its id. A place that already carries an id
/// replaces the stored row with that id.
pub fn insert_place(conn: &Connection, place: &Place) -> Result<i64> {
    conn.execute(
        &format!("INSERT OR REPLACE INTO places ({PLACE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
        params![
            place.id,
            place.title,
            place.image_path,
            place.note,
            place.date,
            place.latitude(),
            place.longitude(),
            place.address,
        ],
    )?;
    Ok(place.id.unwrap_or_else(|| conn.last_insert_rowid()))
}

pub fn update_place(conn: &Connection, place: &Place) -> Result<()> {
    let id = place
        .id
        .ok_or_else(|| Error::Validation("cannot update a place without an id".into()))?;
    let changed = conn.execute(
        "UPDATE places SET title = ?2, image_path = ?3, note = ?4, date = ?5,
             latitude = ?6, longitude = ?7, address = ?8
         WHERE id = ?1",
        params![
            id,
            place.title,
            place.image_path,
            place.note,
            place.date,
            place.latitude(),
            place.longitude(),
            place.address,
        ],
    )?;
    if changed == 0 {
        return Err(Error::NotFound(id));
    }
    Ok(())
}

pub fn delete_place(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute("DELETE FROM places WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(Error::NotFound(id));
    }
    Ok(())
}

pub fn get_place(conn: &Connection, id: i64) -> Result<Option<Place>> {
    let place = conn
        .query_row(
            &format!("SELECT {PLACE_COLUMNS} FROM places WHERE id = ?1"),
            params![id],
            place_from_row,
        )
        .optional()?;
    Ok(place)
}

/// All places, newest first.
pub fn list_places(conn: &Connection) -> Result<Vec<Place>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PLACE_COLUMNS} FROM places ORDER BY id DESC"
    ))?;
    let places = stmt
        .query_map([], place_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(places)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample(title: &str) -> Place {
        Place {
            id: None,
            title: title.into(),
            image_path: format!("/images/{title}.jpg"),
            note: Some("sunny".into()),
            date: "2024-06-01".into(),
            location: Some(Coordinates::new(48.8566, 2.3522).unwrap()),
            address: Some("Paris, France".into()),
        }
    }

    #[test]
    fn insert_assigns_ids_and_lists_newest_first() {
        let pool = init_memory_database().unwrap();
        let conn = pool.get().unwrap();
        let first = insert_place(&conn, &sample("cafe")).unwrap();
        let second = insert_place(&conn, &sample("park")).unwrap();
        assert!(second > first);

        let titles: Vec<String> = list_places(&conn)
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(titles, vec!["park".to_string(), "cafe".to_string()]);
    }

    #[test]
    fn insert_with_existing_id_replaces_row() {
        let pool = init_memory_database().unwrap();
        let conn = pool.get().unwrap();
        let id = insert_place(&conn, &sample("cafe")).unwrap();

        let mut replacement = sample("bakery");
        replacement.id = Some(id);
        replacement.location = None;
        replacement.address = None;
        assert_eq!(insert_place(&conn, &replacement).unwrap(), id);

        let stored = get_place(&conn, id).unwrap().unwrap();
        assert_eq!(stored, replacement);
        assert_eq!(list_places(&conn).unwrap().len(), 1);
    }

    #[test]
    fn update_and_delete_report_missing_rows() {
        let pool = init_memory_database().unwrap();
        let conn = pool.get().unwrap();
        let mut ghost = sample("ghost");
        ghost.id = Some(42);
        assert!(matches!(update_place(&conn, &ghost), Err(Error::NotFound(42))));
        assert!(matches!(delete_place(&conn, 42), Err(Error::NotFound(42))));

        let id = insert_place(&conn, &sample("cafe")).unwrap();
        let mut edited = get_place(&conn, id).unwrap().unwrap();
        edited.note = None;
        update_place(&conn, &edited).unwrap();
        assert_eq!(get_place(&conn, id).unwrap().unwrap().note, None);

        delete_place(&conn, id).unwrap();
        assert_eq!(get_place(&conn, id).unwrap(), None);
    }

    #[test]
    fn half_set_location_is_rejected_by_schema() {
        let pool = init_memory_database().unwrap();
        let conn = pool.get().unwrap();
        let result = conn.execute(
            "INSERT INTO places (title, image_path, date, latitude) VALUES ('a', 'b', '2024-01-01', 1.0)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn file_database_is_migrated_and_persists() {
        let dir = TempDir::new().unwrap();
        let paths = AppPaths::at(dir.path()).unwrap();

        let id = {
            let pool = init_database(&paths).unwrap();
            let conn = pool.get().unwrap();
            insert_place(&conn, &sample("harbour")).unwrap()
        };
        assert!(paths.db_path.is_file());

        // Migrations are idempotent on an existing file.
        let pool = init_database(&paths).unwrap();
        let conn = pool.get().unwrap();
        assert_eq!(get_place(&conn, id).unwrap().unwrap().title, "harbour");
    }
}
