use super::DatabaseError;
use super::models::{Cluster, Photo};
use super::repositories::{ClusterRepository, ClusterStore, PhotoRepository, PhotoStore};
use rusqlite::Connection;
use std::path::Path;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS clusters (
    id TEXT PRIMARY KEY NOT NULL,
    label TEXT NOT NULL,
    descriptor TEXT NOT NULL,
    photo_ids TEXT NOT NULL,
    confirmed_photo_ids TEXT NOT NULL,
    thumbnail BLOB,
    similarity_threshold REAL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS photos (
    id TEXT PRIMARY KEY NOT NULL,
    session_id TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    faces TEXT NOT NULL,
    blur_score REAL NOT NULL,
    is_excluded INTEGER NOT NULL,
    no_face_match INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_photos_session ON photos (session_id, timestamp);
";

/// SQLite-backed cluster and photo storage.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn clusters(&self) -> ClusterRepository<'_> {
        ClusterRepository::new(&self.conn)
    }

    pub fn photos(&self) -> PhotoRepository<'_> {
        PhotoRepository::new(&self.conn)
    }
}

impl ClusterStore for Database {
    fn get_clusters(&self) -> Result<Vec<Cluster>, DatabaseError> {
        self.clusters().find_all()
    }

    fn get_cluster(&self, id: &str) -> Result<Option<Cluster>, DatabaseError> {
        self.clusters().find_by_id(id)
    }

    fn save_cluster(&self, cluster: &Cluster) -> Result<(), DatabaseError> {
        self.clusters().upsert(cluster)
    }

    fn delete_cluster(&self, id: &str) -> Result<bool, DatabaseError> {
        self.clusters().delete(id)
    }
}

impl PhotoStore for Database {
    fn get_photos_for_session(&self, session_id: &str) -> Result<Vec<Photo>, DatabaseError> {
        self.photos().find_by_session_id(session_id)
    }

    fn get_photo(&self, id: &str) -> Result<Option<Photo>, DatabaseError> {
        self.photos().find_by_id(id)
    }
}
