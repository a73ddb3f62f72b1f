use crate::config::EngineConfig;
use crate::core::descriptor::Descriptor;
use crate::database::DatabaseError;
use crate::database::models::{
    Cluster, ClusterId, FaceObservation, Photo, auto_label, auto_label_number,
};
use crate::database::repositories::{ClusterStore, PhotoStore};
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("Cluster not found: {id}")]
    NotFound { id: ClusterId },

    #[error("Cannot merge cluster {id} into itself")]
    SameCluster { id: ClusterId },

    #[error("Invalid cluster name {label:?}: must be non-empty and not of the form \"Person N\"")]
    InvalidLabel { label: String },

    #[error("Storage error: {0}")]
    Database(#[from] DatabaseError),
}

/// Supplies the detected faces of a photo.
pub trait DescriptorSource {
    fn faces(&self, photo: &Photo) -> Vec<FaceObservation>;
}

/// Reads faces already attached to the photo record at ingestion.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoredFaces;

impl DescriptorSource for StoredFaces {
    fn faces(&self, photo: &Photo) -> Vec<FaceObservation> {
        photo.faces.clone()
    }
}

/// Two clusters close enough that a person should check whether they are
/// the same subject.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarPair {
    pub first: ClusterId,
    pub second: ClusterId,
    pub distance: f64,
}

/// Incremental face clustering over a cluster store.
pub struct ClusterEngine<'a, S: ?Sized, D = StoredFaces> {
    store: &'a S,
    source: D,
    config: EngineConfig,
}

impl<'a, S> ClusterEngine<'a, S, StoredFaces>
where
    S: ClusterStore + PhotoStore + ?Sized,
{
    pub fn new(store: &'a S, config: EngineConfig) -> Self {
        Self {
            store,
            source: StoredFaces,
            config,
        }
    }
}

impl<'a, S, D> ClusterEngine<'a, S, D>
where
    S: ClusterStore + PhotoStore + ?Sized,
    D: DescriptorSource,
{
    pub fn with_source<D2: DescriptorSource>(self, source: D2) -> ClusterEngine<'a, S, D2> {
        ClusterEngine {
            store: self.store,
            source,
            config: self.config,
        }
    }

    fn load(&self, id: &str) -> Result<Cluster, ClusterError> {
        self.store
            .get_cluster(id)?
            .ok_or_else(|| ClusterError::NotFound { id: id.to_string() })
    }

    /// Assign faces of unclustered session photos to the nearest cluster
    /// within its threshold, creating clusters for faces that match none.
    ///
    /// Photos already bound to any cluster are left alone. Returns clusters
    /// that hold a photo of this session plus every human-named cluster.
    pub fn cluster(&self, session_photos: &[Photo]) -> Result<Vec<Cluster>, ClusterError> {
        let mut clusters = self.store.get_clusters()?;

        let bound: HashSet<String> = clusters
            .iter()
            .flat_map(|c| c.photo_ids.iter().chain(c.confirmed_photo_ids.iter()))
            .cloned()
            .collect();

        let mut next_number = clusters
            .iter()
            .filter_map(|c| auto_label_number(&c.label))
            .max()
            .unwrap_or(0)
            + 1;
        let mut dirty: Vec<bool> = vec![false; clusters.len()];
        let mut faces_seen = 0usize;
        let mut faces_skipped = 0usize;
        let mut created = 0usize;

        for photo in session_photos.iter().filter(|p| !bound.contains(&p.id)) {
            for (face_index, face) in self.source.faces(photo).iter().enumerate() {
                faces_seen += 1;
                let descriptor = match Descriptor::try_from(&face.descriptor) {
                    Ok(d) => d,
                    Err(e) => {
                        faces_skipped += 1;
                        log::warn!(
                            "Skipping face {} of photo {}: {}",
                            face_index,
                            photo.id,
                            e
                        );
                        continue;
                    }
                };

                match self.nearest(&clusters, &descriptor) {
                    Some((index, distance)) => {
                        log::debug!(
                            "Photo {} face {} joins {} at {:.4}",
                            photo.id,
                            face_index,
                            clusters[index].label,
                            distance
                        );
                        let cluster = &mut clusters[index];
                        cluster.photo_ids.insert(photo.id.clone());
                        cluster.set_thumbnail_if_missing(face.thumbnail.as_ref());
                        dirty[index] = true;
                    }
                    None => {
                        let mut cluster = Cluster::new(auto_label(next_number), descriptor);
                        next_number += 1;
                        cluster.photo_ids.insert(photo.id.clone());
                        cluster.set_thumbnail_if_missing(face.thumbnail.as_ref());
                        log::debug!(
                            "Photo {} face {} starts {}",
                            photo.id,
                            face_index,
                            cluster.label
                        );
                        clusters.push(cluster);
                        dirty.push(true);
                        created += 1;
                    }
                }
            }
        }

        let mut saved = 0usize;
        for (cluster, changed) in clusters.iter_mut().zip(dirty.iter()) {
            if *changed {
                cluster.touch();
                self.store.save_cluster(cluster)?;
                saved += 1;
            }
        }

        log::info!(
            "Clustered {} faces ({} skipped): {} clusters created, {} saved",
            faces_seen,
            faces_skipped,
            created,
            saved
        );

        let session_ids: HashSet<&str> = session_photos.iter().map(|p| p.id.as_str()).collect();
        Ok(clusters
            .into_iter()
            .filter(|c| {
                !c.has_auto_label()
                    || c.photo_ids
                        .iter()
                        .chain(c.confirmed_photo_ids.iter())
                        .any(|id| session_ids.contains(id.as_str()))
            })
            .collect())
    }

    /// Nearest cluster whose centroid lies strictly within its threshold.
    fn nearest(&self, clusters: &[Cluster], descriptor: &Descriptor) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (index, cluster) in clusters.iter().enumerate() {
            if cluster.is_placeholder() {
                continue;
            }
            let distance = cluster.descriptor.distance(descriptor);
            let threshold = cluster.effective_threshold(self.config.default_similarity_threshold);
            if distance < threshold && best.is_none_or(|(_, d)| distance < d) {
                best = Some((index, distance));
            }
        }
        best
    }

    /// Rebuild a centroid from the cluster's confirmed photos, or from all
    /// its photos when none are confirmed.
    ///
    /// Single-face photos are unambiguous and form a preliminary centroid.
    /// For each multi-face photo the face nearest that preliminary centroid
    /// (within threshold) is used; when there is no single-face evidence the
    /// current centroid serves as reference. A placeholder has no usable
    /// centroid, so its multi-face photos are skipped.
    pub fn recalculate(&self, cluster_id: &str) -> Result<Cluster, ClusterError> {
        self.recalculate_with_hint(cluster_id, None)
    }

    /// `hint` stands in for the current centroid when the cluster is a
    /// placeholder and none of its photos has exactly one face.
    fn recalculate_with_hint(
        &self,
        cluster_id: &str,
        hint: Option<&Descriptor>,
    ) -> Result<Cluster, ClusterError> {
        let mut cluster = self.load(cluster_id)?;
        let targets: Vec<String> = if cluster.confirmed_photo_ids.is_empty() {
            cluster.photo_ids.iter().cloned().collect()
        } else {
            cluster.confirmed_photo_ids.iter().cloned().collect()
        };

        let mut single: Vec<Descriptor> = Vec::new();
        let mut multi: Vec<Vec<Descriptor>> = Vec::new();
        for photo_id in &targets {
            let Some(photo) = self.store.get_photo(photo_id)? else {
                log::warn!("Photo {} of {} is missing from the store", photo_id, cluster.label);
                continue;
            };
            let descriptors: Vec<Descriptor> = self
                .source
                .faces(&photo)
                .iter()
                .filter_map(|face| match Descriptor::try_from(&face.descriptor) {
                    Ok(d) => Some(d),
                    Err(e) => {
                        log::warn!("Skipping face of photo {}: {}", photo.id, e);
                        None
                    }
                })
                .collect();

            match descriptors.len() {
                0 => {}
                1 => single.extend(descriptors),
                _ => multi.push(descriptors),
            }
        }

        let preliminary = Descriptor::mean(&single);
        let reference = preliminary
            .as_ref()
            .or_else(|| (!cluster.is_placeholder()).then_some(&cluster.descriptor))
            .or(hint);
        let threshold = cluster.effective_threshold(self.config.default_similarity_threshold);

        let mut chosen: Vec<&Descriptor> = single.iter().collect();
        if let Some(reference) = reference {
            for faces in &multi {
                let nearest = faces
                    .iter()
                    .map(|d| (d, reference.distance(d)))
                    .filter(|(_, distance)| *distance < threshold)
                    .min_by(|a, b| a.1.total_cmp(&b.1));
                if let Some((descriptor, _)) = nearest {
                    chosen.push(descriptor);
                }
            }
        }

        let Some(centroid) = Descriptor::mean(chosen.iter().copied()) else {
            log::info!(
                "No usable faces for {}; centroid left unchanged",
                cluster.label
            );
            return Ok(cluster);
        };

        log::debug!(
            "Recalculated {} from {} faces ({} single-face photos)",
            cluster.label,
            chosen.len(),
            single.len()
        );
        cluster.descriptor = centroid;
        cluster.touch();
        self.store.save_cluster(&cluster)?;
        Ok(cluster)
    }

    /// Move a photo between clusters. Moving confirms membership in the
    /// target.
    pub fn move_photo(
        &self,
        photo_id: &str,
        from_id: &str,
        to_id: &str,
    ) -> Result<(), ClusterError> {
        let mut from = self.load(from_id)?;
        let mut to = self.load(to_id)?;

        if from.id == to.id {
            to.photo_ids.insert(photo_id.to_string());
            to.confirmed_photo_ids.insert(photo_id.to_string());
            to.touch();
            self.store.save_cluster(&to)?;
            self.recalculate(&to.id)?;
            return Ok(());
        }

        from.photo_ids.remove(photo_id);
        from.confirmed_photo_ids.remove(photo_id);
        to.photo_ids.insert(photo_id.to_string());
        to.confirmed_photo_ids.insert(photo_id.to_string());
        from.touch();
        to.touch();

        self.store.save_cluster(&from)?;
        self.store.save_cluster(&to)?;
        log::info!("Moved photo {} from {} to {}", photo_id, from.label, to.label);

        // The source centroid locates the moved face when the target has none.
        let hint = (!from.is_placeholder()).then_some(&from.descriptor);
        self.recalculate(&from.id)?;
        self.recalculate_with_hint(&to.id, hint)?;
        Ok(())
    }

    /// Pairs of clusters that are not close enough to match each other but
    /// closer than the suggestion threshold, most similar first.
    pub fn find_similar_pairs(&self, clusters: &[Cluster]) -> Vec<SimilarPair> {
        let candidates: Vec<&Cluster> = clusters
            .iter()
            .filter(|c| !c.is_empty() && !c.is_placeholder())
            .collect();
        let default_threshold = self.config.default_similarity_threshold;

        let mut pairs = Vec::new();
        for (i, a) in candidates.iter().enumerate() {
            for b in &candidates[i + 1..] {
                let distance = a.descriptor.distance(&b.descriptor);
                let lower = a
                    .effective_threshold(default_threshold)
                    .max(b.effective_threshold(default_threshold));
                if distance >= lower && distance < self.config.suggestion_threshold {
                    pairs.push(SimilarPair {
                        first: a.id.clone(),
                        second: b.id.clone(),
                        distance,
                    });
                }
            }
        }

        pairs.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        pairs
    }

    /// Absorb `remove_id` into `keep_id` and delete it.
    pub fn merge(&self, keep_id: &str, remove_id: &str) -> Result<Cluster, ClusterError> {
        if keep_id == remove_id {
            return Err(ClusterError::SameCluster {
                id: keep_id.to_string(),
            });
        }
        let mut keep = self.load(keep_id)?;
        let remove = self.load(remove_id)?;

        keep.photo_ids.extend(remove.photo_ids.iter().cloned());
        keep.confirmed_photo_ids
            .extend(remove.confirmed_photo_ids.iter().cloned());

        if keep.has_auto_label() && !remove.has_auto_label() {
            keep.label = remove.label.clone();
        }

        // A placeholder centroid carries no face evidence.
        keep.descriptor = match (keep.is_placeholder(), remove.is_placeholder()) {
            (true, false) => remove.descriptor.clone(),
            (false, true) | (true, true) => keep.descriptor.clone(),
            (false, false) => Descriptor::mean([&keep.descriptor, &remove.descriptor])
                .unwrap_or_else(|| keep.descriptor.clone()),
        };

        keep.set_thumbnail_if_missing(remove.thumbnail.as_ref());
        if keep.config.similarity_threshold.is_none() {
            keep.config.similarity_threshold = remove.config.similarity_threshold;
        }
        keep.touch();

        self.store.save_cluster(&keep)?;
        self.store.delete_cluster(&remove.id)?;
        log::info!(
            "Merged {} into {} ({} photos)",
            remove.label,
            keep.label,
            keep.photo_ids.len()
        );
        Ok(keep)
    }

    /// Create an empty, human-named cluster that future photos can be moved
    /// into.
    pub fn create_named_cluster(&self, label: &str) -> Result<Cluster, ClusterError> {
        let cluster = Cluster::new(human_label(label)?, Descriptor::zeros());
        self.store.save_cluster(&cluster)?;
        Ok(cluster)
    }

    pub fn rename(&self, cluster_id: &str, label: &str) -> Result<Cluster, ClusterError> {
        let label = human_label(label)?;
        let mut cluster = self.load(cluster_id)?;
        cluster.label = label;
        cluster.touch();
        self.store.save_cluster(&cluster)?;
        Ok(cluster)
    }
}

/// Human names must be non-empty and must not collide with the auto
/// `Person N` sequence.
fn human_label(label: &str) -> Result<String, ClusterError> {
    let trimmed = label.trim();
    if trimmed.is_empty() || auto_label_number(trimmed).is_some() {
        return Err(ClusterError::InvalidLabel {
            label: label.to_string(),
        });
    }
    Ok(trimmed.to_string())
}
