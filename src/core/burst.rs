// Burst deduplication
// Collapses runs of rapidly taken shots into a single representative so
// that selection does not spend its budget on near-identical frames.

use crate::core::scoring::{Subject, match_photo};
use crate::database::models::Photo;
use std::cmp::Ordering;

/// Representative ranking within a burst, compared lexicographically.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BurstScore {
    matched_subjects: usize,
    face_count: usize,
    face_area: f32,
}

impl BurstScore {
    fn of(photo: &Photo, subjects: &[Subject]) -> Self {
        let face_area: f32 = photo.faces.iter().map(|f| f.face_box.area()).sum();
        Self {
            matched_subjects: match_photo(photo, subjects).subject_count(),
            face_count: photo.faces.len(),
            face_area: face_area.min(1.0),
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        self.matched_subjects
            .cmp(&other.matched_subjects)
            .then(self.face_count.cmp(&other.face_count))
            .then(self.face_area.total_cmp(&other.face_area))
    }
}

pub struct BurstDeduplicator {
    gap_ms: i64,
}

impl BurstDeduplicator {
    pub fn new(gap_ms: i64) -> Self {
        Self { gap_ms }
    }

    /// Split photos into bursts: contiguous time runs where every consecutive
    /// gap is shorter than the configured gap.
    pub fn group<'a>(&self, photos: &'a [Photo]) -> Vec<Vec<&'a Photo>> {
        let mut sorted: Vec<&Photo> = photos.iter().collect();
        sorted.sort_by_key(|p| p.timestamp);

        let mut groups: Vec<Vec<&Photo>> = Vec::new();
        let mut previous: Option<i64> = None;
        for photo in sorted {
            let starts_new = match previous {
                Some(ts) => photo.timestamp - ts >= self.gap_ms,
                None => true,
            };
            if starts_new {
                groups.push(vec![photo]);
            } else if let Some(group) = groups.last_mut() {
                group.push(photo);
            }
            previous = Some(photo.timestamp);
        }
        groups
    }

    /// Keep one representative per burst, in chronological order.
    pub fn deduplicate(&self, photos: &[Photo], subjects: &[Subject]) -> Vec<Photo> {
        let groups = self.group(photos);
        let before = photos.len();

        let result: Vec<Photo> = groups
            .into_iter()
            .filter_map(|group| {
                if group.len() == 1 {
                    return group.into_iter().next().cloned();
                }
                let mut best = group[0];
                let mut best_score = BurstScore::of(best, subjects);
                for &photo in &group[1..] {
                    let score = BurstScore::of(photo, subjects);
                    if score.compare(&best_score) == Ordering::Greater {
                        best = photo;
                        best_score = score;
                    }
                }
                Some(best.clone())
            })
            .collect();

        if result.len() < before {
            log::debug!(
                "Burst deduplication kept {} of {} photos",
                result.len(),
                before
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::descriptor::descriptor_at;
    use crate::core::scoring::test_support::photo;

    fn subjects() -> Vec<Subject> {
        vec![Subject {
            id: "a".to_string(),
            descriptor: descriptor_at(0.1),
            threshold: 0.4,
        }]
    }

    #[test]
    fn test_group_boundaries() {
        let photos = vec![
            photo("p1", 0, &[]),
            photo("p2", 1999, &[]),
            photo("p3", 3998, &[]),
            photo("p4", 5998, &[]),
        ];
        let dedup = BurstDeduplicator::new(2000);
        let groups = dedup.group(&photos);

        // 1999 < 2000 keeps p1..p3 chained, 2000 starts a new group
        let ids: Vec<Vec<&str>> = groups
            .iter()
            .map(|g| g.iter().map(|p| p.id.as_str()).collect())
            .collect();
        assert_eq!(ids, vec![vec!["p1", "p2", "p3"], vec!["p4"]]);

        for group in &groups {
            for pair in group.windows(2) {
                assert!(pair[1].timestamp - pair[0].timestamp < 2000);
            }
        }
        for pair in groups.windows(2) {
            let last = pair[0].last().unwrap().timestamp;
            let first = pair[1][0].timestamp;
            assert!(first - last >= 2000);
        }
    }

    #[test]
    fn test_representative_prefers_matched_subject() {
        let photos = vec![
            photo("crowd", 0, &[5.0, 6.0, 7.0]),
            photo("target", 500, &[0.1]),
        ];
        let result = BurstDeduplicator::new(2000).deduplicate(&photos, &subjects());
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, "target");
    }

    #[test]
    fn test_representative_falls_back_to_face_count_then_area() {
        let mut small = photo("small", 0, &[5.0, 6.0]);
        small.faces[0].face_box.width = 0.05;
        let large = photo("large", 100, &[5.0, 6.0]);
        let single = photo("single", 200, &[5.0]);

        let result =
            BurstDeduplicator::new(2000).deduplicate(&[small, single, large], &subjects());
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, "large");
    }

    #[test]
    fn test_output_is_chronological_and_singletons_pass() {
        let photos = vec![
            photo("late", 10_000, &[]),
            photo("early", 0, &[]),
            photo("middle", 5_000, &[0.1]),
        ];
        let result = BurstDeduplicator::new(2000).deduplicate(&photos, &subjects());
        let ids: Vec<&str> = result.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "middle", "late"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(BurstDeduplicator::new(2000).deduplicate(&[], &[]).is_empty());
    }
}
