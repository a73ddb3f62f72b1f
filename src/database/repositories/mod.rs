pub mod cluster;
pub mod memory;
pub mod photo;

pub use cluster::ClusterRepository;
pub use memory::MemoryStore;
pub use photo::PhotoRepository;

use super::DatabaseError;
use super::models::{Cluster, Photo};

/// Durable keyed storage of whole cluster records.
pub trait ClusterStore {
    /// All clusters in creation order.
    fn get_clusters(&self) -> Result<Vec<Cluster>, DatabaseError>;

    fn get_cluster(&self, id: &str) -> Result<Option<Cluster>, DatabaseError> {
        Ok(self.get_clusters()?.into_iter().find(|c| c.id == id))
    }

    fn save_cluster(&self, cluster: &Cluster) -> Result<(), DatabaseError>;

    fn delete_cluster(&self, id: &str) -> Result<bool, DatabaseError>;
}

/// Read access to ingested photos.
pub trait PhotoStore {
    /// Photos of one session in chronological order.
    fn get_photos_for_session(&self, session_id: &str) -> Result<Vec<Photo>, DatabaseError>;

    fn get_photo(&self, id: &str) -> Result<Option<Photo>, DatabaseError>;
}
