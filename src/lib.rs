//! Face clustering and album photo selection.

pub mod config;
pub mod core;
pub mod database;

pub use config::{EngineConfig, SelectionWeights};
pub use core::clustering::{ClusterEngine, ClusterError, DescriptorSource, SimilarPair, StoredFaces};
pub use core::descriptor::{Descriptor, DescriptorError, RawDescriptor};
pub use core::selection::SelectionService;
pub use database::connection::Database;
pub use database::models::{Cluster, FaceObservation, Photo};
pub use database::repositories::{ClusterStore, MemoryStore, PhotoStore};
pub use database::DatabaseError;
