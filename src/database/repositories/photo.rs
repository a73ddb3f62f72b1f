use crate::database::DatabaseError;
use crate::database::models::{FaceObservation, Photo};
use rusqlite::{Connection, OptionalExtension, Row, params};

const SELECT_COLUMNS: &str =
    "SELECT id, session_id, timestamp, faces, blur_score, is_excluded, no_face_match FROM photos";

struct PhotoRow {
    id: String,
    session_id: String,
    timestamp: i64,
    faces: String, // JSON array of face observations
    blur_score: f64,
    excluded: bool,
    no_face_match: bool,
}

impl PhotoRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            session_id: row.get(1)?,
            timestamp: row.get(2)?,
            faces: row.get(3)?,
            blur_score: row.get(4)?,
            excluded: row.get(5)?,
            no_face_match: row.get(6)?,
        })
    }

    fn into_photo(self) -> Result<Photo, DatabaseError> {
        let faces: Vec<FaceObservation> = serde_json::from_str(&self.faces)?;
        Ok(Photo {
            id: self.id,
            session_id: self.session_id,
            timestamp: self.timestamp,
            faces,
            blur_score: self.blur_score as f32,
            excluded: self.excluded,
            no_face_match: self.no_face_match,
        })
    }
}

pub struct PhotoRepository<'a> {
    conn: &'a Connection,
}

impl<'a> PhotoRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn upsert(&self, photo: &Photo) -> Result<(), DatabaseError> {
        let faces = serde_json::to_string(&photo.faces)?;

        self.conn.execute(
            "INSERT INTO photos (id, session_id, timestamp, faces, blur_score, is_excluded, no_face_match)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                session_id = excluded.session_id,
                timestamp = excluded.timestamp,
                faces = excluded.faces,
                blur_score = excluded.blur_score,
                is_excluded = excluded.is_excluded,
                no_face_match = excluded.no_face_match",
            params![
                photo.id,
                photo.session_id,
                photo.timestamp,
                faces,
                f64::from(photo.blur_score),
                photo.excluded,
                photo.no_face_match,
            ],
        )?;

        Ok(())
    }

    pub fn upsert_batch(&self, photos: &[Photo]) -> Result<usize, DatabaseError> {
        let tx = self.conn.unchecked_transaction()?;
        for photo in photos {
            PhotoRepository::new(&tx).upsert(photo)?;
        }
        tx.commit()?;
        Ok(photos.len())
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<Photo>, DatabaseError> {
        let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![id], PhotoRow::from_row)
            .optional()?;

        row.map(PhotoRow::into_photo).transpose()
    }

    pub fn find_by_session_id(&self, session_id: &str) -> Result<Vec<Photo>, DatabaseError> {
        let sql = format!(
            "{} WHERE session_id = ?1 ORDER BY timestamp ASC, id ASC",
            SELECT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![session_id], PhotoRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(PhotoRow::into_photo).collect()
    }

    pub fn list_sessions(&self) -> Result<Vec<(String, i64)>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id, COUNT(*) FROM photos GROUP BY session_id ORDER BY MIN(timestamp)",
        )?;
        let sessions = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::descriptor::{DESCRIPTOR_LEN, RawDescriptor};
    use crate::database::connection::Database;
    use crate::database::repositories::PhotoStore;
    use crate::database::models::{FaceBox, FaceQuality};

    fn make_photo(id: &str, session_id: &str, timestamp: i64) -> Photo {
        Photo {
            id: id.to_string(),
            session_id: session_id.to_string(),
            timestamp,
            faces: vec![FaceObservation {
                photo_id: id.to_string(),
                descriptor: RawDescriptor::from(vec![0.1f64; DESCRIPTOR_LEN]),
                face_box: FaceBox { x: 0.1, y: 0.2, width: 0.3, height: 0.3 },
                quality: FaceQuality { smile_score: 0.8, pan_score: 0.1, detection_score: 0.9 },
                thumbnail: None,
            }],
            blur_score: 0.7,
            excluded: false,
            no_face_match: false,
        }
    }

    #[test]
    fn test_upsert_and_find_by_id() {
        let db = Database::open_in_memory().unwrap();
        let repo = db.photos();
        let photo = make_photo("p1", "s1", 1000);

        repo.upsert(&photo).unwrap();
        let loaded = repo.find_by_id("p1").unwrap().unwrap();

        assert_eq!(loaded.session_id, "s1");
        assert_eq!(loaded.faces.len(), 1);
        assert_eq!(loaded.faces[0].face_box, photo.faces[0].face_box);
        assert!((loaded.blur_score - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_find_by_session_is_chronological() {
        let db = Database::open_in_memory().unwrap();
        let repo = db.photos();
        repo.upsert_batch(&[
            make_photo("late", "s1", 3000),
            make_photo("early", "s1", 1000),
            make_photo("other", "s2", 2000),
        ])
        .unwrap();

        let photos = repo.find_by_session_id("s1").unwrap();
        let ids: Vec<&str> = photos.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);

        let sessions = repo.list_sessions().unwrap();
        assert_eq!(sessions, vec![("s1".to_string(), 2), ("s2".to_string(), 1)]);
    }

    #[test]
    fn test_unusable_descriptor_does_not_fail_session_load() {
        let db = Database::open_in_memory().unwrap();
        let mut photo = make_photo("p1", "s1", 1000);
        let mut components = vec![serde_json::json!(0.1); DESCRIPTOR_LEN];
        components[3] = serde_json::Value::Null;
        photo.faces[0].descriptor = RawDescriptor::Array(components);
        db.photos().upsert(&photo).unwrap();

        let photos = db.get_photos_for_session("s1").unwrap();
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].faces.len(), 1);
        assert!(crate::core::descriptor::Descriptor::try_from(&photos[0].faces[0].descriptor).is_err());
    }
}
