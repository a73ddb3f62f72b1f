use crate::config::SelectionWeights;
use crate::core::descriptor::Descriptor;
use crate::database::models::{Cluster, ClusterId, FaceObservation, Photo};

/// A target subject prepared for matching.
#[derive(Debug, Clone)]
pub struct Subject {
    pub id: ClusterId,
    pub descriptor: Descriptor,
    pub threshold: f64,
}

impl Subject {
    pub fn from_cluster(cluster: &Cluster, default_threshold: f64) -> Self {
        Self {
            id: cluster.id.clone(),
            descriptor: cluster.descriptor.clone(),
            threshold: cluster.effective_threshold(default_threshold),
        }
    }

    pub fn from_clusters(clusters: &[Cluster], default_threshold: f64) -> Vec<Self> {
        clusters
            .iter()
            .map(|c| Subject::from_cluster(c, default_threshold))
            .collect()
    }

    pub fn matches(&self, descriptor: &Descriptor) -> bool {
        self.descriptor.distance(descriptor) < self.threshold
    }
}

/// Which target subjects a photo shows, and through which faces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhotoMatch {
    /// Indexes into the subject list, ascending.
    pub subjects: Vec<usize>,
    /// Indexes into `photo.faces`, ascending and unique.
    pub faces: Vec<usize>,
}

impl PhotoMatch {
    pub fn is_matched(&self) -> bool {
        !self.subjects.is_empty()
    }

    pub fn subject_count(&self) -> usize {
        self.subjects.len()
    }
}

/// Match every face of `photo` against `subjects`. Faces with malformed
/// descriptors are ignored.
pub fn match_photo(photo: &Photo, subjects: &[Subject]) -> PhotoMatch {
    if photo.no_face_match || subjects.is_empty() {
        return PhotoMatch::default();
    }

    let descriptors: Vec<(usize, Descriptor)> = photo
        .faces
        .iter()
        .enumerate()
        .filter_map(|(i, face)| match Descriptor::try_from(&face.descriptor) {
            Ok(d) => Some((i, d)),
            Err(e) => {
                log::debug!("Ignoring face {} of photo {}: {}", i, photo.id, e);
                None
            }
        })
        .collect();

    let mut result = PhotoMatch::default();
    for (subject_index, subject) in subjects.iter().enumerate() {
        let mut hit = false;
        for (face_index, descriptor) in &descriptors {
            if subject.matches(descriptor) {
                hit = true;
                if !result.faces.contains(face_index) {
                    result.faces.push(*face_index);
                }
            }
        }
        if hit {
            result.subjects.push(subject_index);
        }
    }
    result.faces.sort_unstable();
    result
}

/// Quality of a candidate photo from its matched faces and photo-level
/// sharpness, plus the solo/group bias.
pub fn quality_score(
    photo: &Photo,
    matched: &PhotoMatch,
    weights: &SelectionWeights,
    group_bias_bonus: f64,
) -> f64 {
    let mut score = 0.0;

    let faces: Vec<&FaceObservation> = matched
        .faces
        .iter()
        .filter_map(|i| photo.faces.get(*i))
        .collect();
    if !faces.is_empty() {
        let avg_smile = mean_of(&faces, |face| f64::from(face.quality.smile_score));
        let avg_detection = mean_of(&faces, |face| f64::from(face.quality.detection_score));
        let avg_pan = mean_of(&faces, |face| f64::from(face.quality.pan_score.abs()));
        let avg_offset = mean_of(&faces, |face| f64::from(face.face_box.horizontal_offset()));

        score += weights.smile * avg_smile * 2.0;
        score += weights.confidence * avg_detection;
        score += weights.frontality * (1.0 - avg_pan);
        score += weights.centeredness * (1.0 - 2.0 * avg_offset);
    }

    score += weights.blur * f64::from(photo.blur_score) * 2.0;

    // group_balance 0..1 maps to a bias in -1..1
    let bias = weights.group_balance.clamp(0.0, 1.0) * 2.0 - 1.0;
    match matched.subject_count() {
        0 => {}
        1 => score -= bias * group_bias_bonus,
        _ => score += bias * group_bias_bonus,
    }

    score
}

fn mean_of<F>(faces: &[&FaceObservation], f: F) -> f64
where
    F: Fn(&FaceObservation) -> f64,
{
    faces.iter().map(|face| f(face)).sum::<f64>() / faces.len() as f64
}

/// Population standard deviation.
pub fn population_stddev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::core::descriptor::{DESCRIPTOR_LEN, RawDescriptor};
    use crate::database::models::{FaceBox, FaceObservation, FaceQuality, Photo};

    pub fn raw_at(x: f64) -> RawDescriptor {
        let mut values = vec![0.0f64; DESCRIPTOR_LEN];
        values[0] = x;
        RawDescriptor::from(values)
    }

    pub fn face(photo_id: &str, x: f64) -> FaceObservation {
        FaceObservation {
            photo_id: photo_id.to_string(),
            descriptor: raw_at(x),
            face_box: FaceBox { x: 0.4, y: 0.3, width: 0.2, height: 0.2 },
            quality: FaceQuality { smile_score: 0.5, pan_score: 0.0, detection_score: 0.9 },
            thumbnail: None,
        }
    }

    /// A photo with one face per descriptor position in `xs`.
    pub fn photo(id: &str, timestamp: i64, xs: &[f64]) -> Photo {
        Photo {
            id: id.to_string(),
            session_id: "s1".to_string(),
            timestamp,
            faces: xs.iter().map(|x| face(id, *x)).collect(),
            blur_score: 0.5,
            excluded: false,
            no_face_match: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::photo;
    use super::*;
    use crate::core::descriptor::descriptor_at;

    fn subject(id: &str, x: f64) -> Subject {
        Subject {
            id: id.to_string(),
            descriptor: descriptor_at(x),
            threshold: 0.4,
        }
    }

    #[test]
    fn test_match_photo_collects_subjects_and_faces() {
        let subjects = vec![subject("a", 0.1), subject("b", 5.0)];
        let p = photo("p1", 0, &[0.15, 5.1, 9.0]);

        let matched = match_photo(&p, &subjects);
        assert_eq!(matched.subjects, vec![0, 1]);
        assert_eq!(matched.faces, vec![0, 1]);
    }

    #[test]
    fn test_threshold_is_strict() {
        let subjects = vec![subject("a", 0.0)];
        let p = photo("p1", 0, &[0.5]);
        assert!(!match_photo(&p, &subjects).is_matched());
    }

    #[test]
    fn test_no_face_match_flag_forces_unmatched() {
        let subjects = vec![subject("a", 0.1)];
        let mut p = photo("p1", 0, &[0.1]);
        p.no_face_match = true;
        assert!(!match_photo(&p, &subjects).is_matched());
    }

    #[test]
    fn test_malformed_face_is_ignored() {
        let subjects = vec![subject("a", 0.1)];
        let mut p = photo("p1", 0, &[0.1, 0.1]);
        p.faces[0].descriptor = crate::core::descriptor::RawDescriptor::from(vec![0.1f64]);

        let matched = match_photo(&p, &subjects);
        assert_eq!(matched.faces, vec![1]);
    }

    #[test]
    fn test_group_bias_sign() {
        let p = photo("p1", 0, &[0.1, 5.0]);
        let solo = PhotoMatch { subjects: vec![0], faces: vec![0] };
        let group = PhotoMatch { subjects: vec![0, 1], faces: vec![0] };

        let group_pref = SelectionWeights { group_balance: 1.0, ..Default::default() };
        assert!(
            quality_score(&p, &group, &group_pref, 0.5) > quality_score(&p, &solo, &group_pref, 0.5)
        );

        let solo_pref = SelectionWeights { group_balance: 0.0, ..Default::default() };
        assert!(
            quality_score(&p, &solo, &solo_pref, 0.5) > quality_score(&p, &group, &solo_pref, 0.5)
        );
    }

    #[test]
    fn test_quality_rewards_smile_and_sharpness() {
        let weights = SelectionWeights::default();
        let matched = PhotoMatch { subjects: vec![0], faces: vec![0] };
        let plain = photo("p1", 0, &[0.1]);

        let mut smiling = plain.clone();
        smiling.faces[0].quality.smile_score = 1.0;
        assert!(quality_score(&smiling, &matched, &weights, 0.5) > quality_score(&plain, &matched, &weights, 0.5));

        let mut blurry = plain.clone();
        blurry.blur_score = 0.0;
        assert!(quality_score(&blurry, &matched, &weights, 0.5) < quality_score(&plain, &matched, &weights, 0.5));
    }

    #[test]
    fn test_population_stddev() {
        assert_eq!(population_stddev(&[]), 0.0);
        assert_eq!(population_stddev(&[2.0, 2.0]), 0.0);
        assert!((population_stddev(&[1.0, 0.0]) - 0.5).abs() < 1e-12);
    }
}
