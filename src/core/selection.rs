use crate::config::{EngineConfig, SelectionWeights};
use crate::core::burst::BurstDeduplicator;
use crate::core::scoring::{PhotoMatch, Subject, match_photo, population_stddev, quality_score};
use crate::database::models::{Cluster, Photo};
use std::collections::BTreeMap;

/// A deduplicated pool photo that shows at least one target subject.
#[derive(Debug, Clone)]
struct Candidate {
    photo: Photo,
    matched: PhotoMatch,
}

/// Picks a bounded subset of photos for album review.
pub struct SelectionService {
    config: EngineConfig,
}

impl SelectionService {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Drop excluded photos, collapse bursts and keep only photos that match
    /// a subject. Result stays chronological.
    fn prepare(&self, pool: &[Photo], subjects: &[Subject]) -> Vec<Candidate> {
        let included: Vec<Photo> = pool.iter().filter(|p| !p.excluded).cloned().collect();
        let deduplicated =
            BurstDeduplicator::new(self.config.burst_gap_ms).deduplicate(&included, subjects);

        deduplicated
            .into_iter()
            .filter_map(|photo| {
                let matched = match_photo(&photo, subjects);
                matched.is_matched().then_some(Candidate { photo, matched })
            })
            .collect()
    }

    /// Greedy selection that keeps per-subject counts as even as possible
    /// while preferring coverage and quality.
    pub fn select_group_balanced(
        &self,
        pool: &[Photo],
        target_clusters: &[Cluster],
        count: usize,
        weights: &SelectionWeights,
    ) -> Vec<Photo> {
        if pool.is_empty() || target_clusters.is_empty() || count == 0 {
            return Vec::new();
        }

        let subjects =
            Subject::from_clusters(target_clusters, self.config.default_similarity_threshold);
        let candidates = self.prepare(pool, &subjects);
        if candidates.len() <= count {
            log::info!(
                "Matched pool of {} photos fits the requested {}",
                candidates.len(),
                count
            );
            return candidates.into_iter().map(|c| c.photo).collect();
        }

        let qualities: Vec<f64> = candidates
            .iter()
            .map(|c| {
                quality_score(&c.photo, &c.matched, weights, self.config.group_bias_bonus)
            })
            .collect();

        let mut subject_counts = vec![0.0f64; subjects.len()];
        let mut remaining: Vec<usize> = (0..candidates.len()).collect();
        let mut chosen: Vec<usize> = Vec::with_capacity(count);

        for _ in 0..count {
            let mut best: Option<(usize, f64)> = None;
            for (position, &index) in remaining.iter().enumerate() {
                let candidate = &candidates[index];
                let mut trial = subject_counts.clone();
                for &s in &candidate.matched.subjects {
                    trial[s] += 1.0;
                }
                let score = candidate.matched.subject_count() as f64 + qualities[index]
                    - self.config.balance_penalty * population_stddev(&trial);

                // strict comparison keeps the earliest candidate on ties
                if best.is_none_or(|(_, best_score)| score > best_score) {
                    best = Some((position, score));
                }
            }

            let Some((position, _)) = best else { break };
            let index = remaining.remove(position);
            for &s in &candidates[index].matched.subjects {
                subject_counts[s] += 1.0;
            }
            chosen.push(index);
        }

        log::info!(
            "Selected {} of {} candidates, per-subject counts {:?}",
            chosen.len(),
            candidates.len(),
            subject_counts
        );

        chosen.sort_by_key(|&i| (candidates[i].photo.timestamp, i));
        chosen
            .into_iter()
            .map(|i| candidates[i].photo.clone())
            .collect()
    }

    /// Evenly spaced photos of one subject across its matched time span.
    pub fn select_growth(&self, pool: &[Photo], target: &Cluster, count: usize) -> Vec<Photo> {
        if pool.is_empty() || count == 0 {
            return Vec::new();
        }

        let subjects = vec![Subject::from_cluster(
            target,
            self.config.default_similarity_threshold,
        )];
        let candidates = self.prepare(pool, &subjects);
        let (Some(first), Some(last)) = (candidates.first(), candidates.last()) else {
            return Vec::new();
        };

        let start = first.photo.timestamp;
        let span = (last.photo.timestamp - start) as f64;
        if span <= 0.0 {
            return vec![first.photo.clone()];
        }
        let interval = span / count as f64;

        // Bucket i covers [start + i*interval, start + (i+1)*interval); the
        // last bucket also takes the final timestamp. Only occupied buckets
        // are stored.
        let mut buckets: BTreeMap<usize, (usize, f64)> = BTreeMap::new();
        for (index, candidate) in candidates.iter().enumerate() {
            let offset = (candidate.photo.timestamp - start) as f64;
            let bucket = ((offset / interval).floor() as usize).min(count - 1);
            let midpoint = (bucket as f64 + 0.5) * interval;
            let distance = (offset - midpoint).abs();

            let slot = buckets.entry(bucket).or_insert((index, distance));
            if distance < slot.1 {
                *slot = (index, distance);
            }
        }

        let selected: Vec<Photo> = buckets
            .into_values()
            .map(|(index, _)| candidates[index].photo.clone())
            .collect();

        log::info!(
            "Growth selection picked {} photos over {} ms for {}",
            selected.len(),
            span,
            target.label
        );
        selected
    }
}
