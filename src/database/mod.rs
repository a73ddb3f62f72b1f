pub mod connection;
pub mod models;
pub mod repositories;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database query error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database path error: {0}")]
    Path(String),
}

pub fn get_database_path() -> Result<PathBuf, DatabaseError> {
    let home_dir = dirs::home_dir()
        .ok_or_else(|| DatabaseError::Path("Could not find home directory".to_string()))?;

    let app_dir = home_dir.join("Documents").join("Albumrs");
    std::fs::create_dir_all(&app_dir)?;

    Ok(app_dir.join("albumrs.db"))
}

#[cfg(test)]
mod tests {
    use super::connection::Database;
    use tempfile::tempdir;

    #[test]
    fn test_database_connection() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("test.db");

        let db = Database::open(&db_path).unwrap();
        let one: i64 = db
            .connection()
            .query_row("SELECT 1", [], |row| row.get(0))
            .unwrap();

        assert_eq!(one, 1);
        assert!(db_path.exists());
    }
}
