use super::{ClusterStore, PhotoStore};
use crate::database::DatabaseError;
use crate::database::models::{Cluster, Photo};
use std::cell::RefCell;

/// In-process store for embedding the engine without SQLite.
#[derive(Debug, Default)]
pub struct MemoryStore {
    clusters: RefCell<Vec<Cluster>>,
    photos: RefCell<Vec<Photo>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_photos(photos: Vec<Photo>) -> Self {
        Self {
            clusters: RefCell::new(Vec::new()),
            photos: RefCell::new(photos),
        }
    }
}

impl ClusterStore for MemoryStore {
    fn get_clusters(&self) -> Result<Vec<Cluster>, DatabaseError> {
        Ok(self.clusters.borrow().clone())
    }

    fn get_cluster(&self, id: &str) -> Result<Option<Cluster>, DatabaseError> {
        Ok(self.clusters.borrow().iter().find(|c| c.id == id).cloned())
    }

    fn save_cluster(&self, cluster: &Cluster) -> Result<(), DatabaseError> {
        let mut clusters = self.clusters.borrow_mut();
        match clusters.iter_mut().find(|c| c.id == cluster.id) {
            Some(existing) => *existing = cluster.clone(),
            None => clusters.push(cluster.clone()),
        }
        Ok(())
    }

    fn delete_cluster(&self, id: &str) -> Result<bool, DatabaseError> {
        let mut clusters = self.clusters.borrow_mut();
        let before = clusters.len();
        clusters.retain(|c| c.id != id);
        Ok(clusters.len() < before)
    }
}

impl PhotoStore for MemoryStore {
    fn get_photos_for_session(&self, session_id: &str) -> Result<Vec<Photo>, DatabaseError> {
        let mut photos: Vec<Photo> = self
            .photos
            .borrow()
            .iter()
            .filter(|p| p.session_id == session_id)
            .cloned()
            .collect();
        photos.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(photos)
    }

    fn get_photo(&self, id: &str) -> Result<Option<Photo>, DatabaseError> {
        Ok(self.photos.borrow().iter().find(|p| p.id == id).cloned())
    }
}
