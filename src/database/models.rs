use crate::core::descriptor::{Descriptor, RawDescriptor};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

pub type PhotoId = String;
pub type ClusterId = String;

const AUTO_LABEL_PREFIX: &str = "Person ";

// Face models
/// Bounding box in coordinates normalized to the photo (0..1 on both axes).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FaceBox {
    pub fn area(&self) -> f32 {
        (self.width.max(0.0) * self.height.max(0.0)).min(1.0)
    }

    /// Horizontal distance of the box center from the photo center, in 0..0.5.
    pub fn horizontal_offset(&self) -> f32 {
        ((self.x + self.width / 2.0) - 0.5).abs().min(0.5)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FaceQuality {
    pub smile_score: f32,
    /// Head yaw normalized to -1..1, 0 is frontal.
    pub pan_score: f32,
    pub detection_score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceObservation {
    pub photo_id: PhotoId,
    #[serde(default)]
    pub descriptor: RawDescriptor,
    #[serde(rename = "box")]
    pub face_box: FaceBox,
    #[serde(default)]
    pub quality: FaceQuality,
    #[serde(default)]
    pub thumbnail: Option<Vec<u8>>,
}

// Photo models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub id: PhotoId,
    pub session_id: String,
    /// Capture time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default)]
    pub faces: Vec<FaceObservation>,
    /// Photo-level sharpness in 0..1, higher is crisper.
    #[serde(default)]
    pub blur_score: f32,
    #[serde(default)]
    pub excluded: bool,
    #[serde(default)]
    pub no_face_match: bool,
}

// Cluster models
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub similarity_threshold: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub label: String,
    pub descriptor: Descriptor,
    pub photo_ids: BTreeSet<PhotoId>,
    pub confirmed_photo_ids: BTreeSet<PhotoId>,
    pub thumbnail: Option<Vec<u8>>,
    #[serde(default)]
    pub config: ClusterConfig,
    pub created_at: String,
    pub updated_at: String,
}

impl Cluster {
    pub fn new(label: String, descriptor: Descriptor) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: format!("clu_{}", Uuid::new_v4().simple()),
            label,
            descriptor,
            photo_ids: BTreeSet::new(),
            confirmed_photo_ids: BTreeSet::new(),
            thumbnail: None,
            config: ClusterConfig::default(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn effective_threshold(&self, default_threshold: f64) -> f64 {
        self.config.similarity_threshold.unwrap_or(default_threshold)
    }

    pub fn has_auto_label(&self) -> bool {
        auto_label_number(&self.label).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.photo_ids.is_empty() && self.confirmed_photo_ids.is_empty()
    }

    /// A placeholder was named by a person before any face was assigned to it.
    pub fn is_placeholder(&self) -> bool {
        self.descriptor.is_zero()
    }

    pub fn contains(&self, photo_id: &str) -> bool {
        self.photo_ids.contains(photo_id) || self.confirmed_photo_ids.contains(photo_id)
    }

    pub fn set_thumbnail_if_missing(&mut self, thumbnail: Option<&Vec<u8>>) {
        let missing = self.thumbnail.as_ref().is_none_or(|t| t.is_empty());
        if let Some(candidate) = thumbnail.filter(|t| !t.is_empty()) {
            if missing {
                self.thumbnail = Some(candidate.clone());
            }
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now().to_rfc3339();
    }
}

pub fn auto_label(number: u32) -> String {
    format!("{}{}", AUTO_LABEL_PREFIX, number)
}

/// Returns `N` for labels of the form `Person N`.
pub fn auto_label_number(label: &str) -> Option<u32> {
    label.strip_prefix(AUTO_LABEL_PREFIX)?.trim().parse().ok()
}
