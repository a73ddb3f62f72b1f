use crate::core::descriptor::Descriptor;
use crate::database::DatabaseError;
use crate::database::models::{Cluster, ClusterConfig};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::BTreeSet;

const SELECT_COLUMNS: &str = "SELECT id, label, descriptor, photo_ids, confirmed_photo_ids, \
     thumbnail, similarity_threshold, created_at, updated_at FROM clusters";

// Descriptor and id sets are stored as JSON text.
struct ClusterRow {
    id: String,
    label: String,
    descriptor: String,
    photo_ids: String,
    confirmed_photo_ids: String,
    thumbnail: Option<Vec<u8>>,
    similarity_threshold: Option<f64>,
    created_at: String,
    updated_at: String,
}

impl ClusterRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            label: row.get(1)?,
            descriptor: row.get(2)?,
            photo_ids: row.get(3)?,
            confirmed_photo_ids: row.get(4)?,
            thumbnail: row.get(5)?,
            similarity_threshold: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_cluster(self) -> Result<Cluster, DatabaseError> {
        let descriptor: Descriptor = serde_json::from_str(&self.descriptor)?;
        let photo_ids: BTreeSet<String> = serde_json::from_str(&self.photo_ids)?;
        let confirmed_photo_ids: BTreeSet<String> =
            serde_json::from_str(&self.confirmed_photo_ids)?;

        Ok(Cluster {
            id: self.id,
            label: self.label,
            descriptor,
            photo_ids,
            confirmed_photo_ids,
            thumbnail: self.thumbnail,
            config: ClusterConfig {
                similarity_threshold: self.similarity_threshold,
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub struct ClusterRepository<'a> {
    conn: &'a Connection,
}

impl<'a> ClusterRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn upsert(&self, cluster: &Cluster) -> Result<(), DatabaseError> {
        let descriptor = serde_json::to_string(&cluster.descriptor)?;
        let photo_ids = serde_json::to_string(&cluster.photo_ids)?;
        let confirmed_photo_ids = serde_json::to_string(&cluster.confirmed_photo_ids)?;

        self.conn.execute(
            "INSERT INTO clusters (id, label, descriptor, photo_ids, confirmed_photo_ids,
             thumbnail, similarity_threshold, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                label = excluded.label,
                descriptor = excluded.descriptor,
                photo_ids = excluded.photo_ids,
                confirmed_photo_ids = excluded.confirmed_photo_ids,
                thumbnail = excluded.thumbnail,
                similarity_threshold = excluded.similarity_threshold,
                updated_at = excluded.updated_at",
            params![
                cluster.id,
                cluster.label,
                descriptor,
                photo_ids,
                confirmed_photo_ids,
                cluster.thumbnail,
                cluster.config.similarity_threshold,
                cluster.created_at,
                cluster.updated_at,
            ],
        )?;

        Ok(())
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<Cluster>, DatabaseError> {
        let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![id], ClusterRow::from_row)
            .optional()?;

        row.map(ClusterRow::into_cluster).transpose()
    }

    pub fn find_all(&self) -> Result<Vec<Cluster>, DatabaseError> {
        let sql = format!("{} ORDER BY created_at ASC, rowid ASC", SELECT_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], ClusterRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(ClusterRow::into_cluster).collect()
    }

    pub fn delete(&self, id: &str) -> Result<bool, DatabaseError> {
        let deleted_count = self
            .conn
            .execute("DELETE FROM clusters WHERE id = ?1", params![id])?;

        Ok(deleted_count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::descriptor::descriptor_at;
    use crate::database::connection::Database;
    use crate::database::models::auto_label;

    fn sample_cluster() -> Cluster {
        let mut cluster = Cluster::new(auto_label(1), descriptor_at(0.3));
        cluster.photo_ids.insert("p1".to_string());
        cluster.photo_ids.insert("p2".to_string());
        cluster.confirmed_photo_ids.insert("p2".to_string());
        cluster.thumbnail = Some(vec![0xff, 0xd8]);
        cluster.config.similarity_threshold = Some(0.35);
        cluster
    }

    #[test]
    fn test_upsert_and_find_by_id() {
        let db = Database::open_in_memory().unwrap();
        let repo = db.clusters();
        let cluster = sample_cluster();

        repo.upsert(&cluster).unwrap();
        let loaded = repo.find_by_id(&cluster.id).unwrap().unwrap();

        assert_eq!(loaded.label, cluster.label);
        assert_eq!(loaded.photo_ids, cluster.photo_ids);
        assert_eq!(loaded.confirmed_photo_ids, cluster.confirmed_photo_ids);
        assert_eq!(loaded.thumbnail, cluster.thumbnail);
        assert!((loaded.config.similarity_threshold.unwrap() - 0.35).abs() < 1e-6);
        assert!((loaded.descriptor.as_slice()[0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_upsert_replaces_existing() {
        let db = Database::open_in_memory().unwrap();
        let repo = db.clusters();
        let mut cluster = sample_cluster();
        repo.upsert(&cluster).unwrap();

        cluster.label = "Taro".to_string();
        cluster.photo_ids.insert("p3".to_string());
        repo.upsert(&cluster).unwrap();

        assert_eq!(repo.find_all().unwrap().len(), 1);
        let loaded = repo.find_by_id(&cluster.id).unwrap().unwrap();
        assert_eq!(loaded.label, "Taro");
        assert_eq!(loaded.photo_ids.len(), 3);
    }

    #[test]
    fn test_find_missing_returns_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.clusters().find_by_id("clu_missing").unwrap().is_none());
    }

    #[test]
    fn test_delete_cluster() {
        let db = Database::open_in_memory().unwrap();
        let repo = db.clusters();
        let cluster = sample_cluster();
        repo.upsert(&cluster).unwrap();

        assert!(repo.delete(&cluster.id).unwrap());
        assert!(!repo.delete(&cluster.id).unwrap());
        assert!(repo.find_all().unwrap().is_empty());
    }
}
