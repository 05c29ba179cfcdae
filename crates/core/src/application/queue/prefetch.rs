// Prefetch Cache - bounded window of jobs pulled ahead of delivery

use crate::domain::{Job, JobId};
use std::collections::VecDeque;

/// Ordered, bounded staging area. Front = next job to deliver.
#[derive(Debug)]
pub(crate) struct PrefetchCache {
    jobs: VecDeque<Job>,
    capacity: usize,
}

impl PrefetchCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            jobs: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn ids(&self) -> Vec<JobId> {
        self.jobs.iter().map(|job| job.id).collect()
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.jobs.iter().any(|job| job.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    /// Add fetched jobs, skipping ids already resident and anything past capacity.
    /// Returns how many were taken.
    pub fn refill(&mut self, fetched: impl IntoIterator<Item = Job>) -> usize {
        let mut taken = 0;
        for job in fetched {
            if self.jobs.len() >= self.capacity {
                break;
            }
            if self.contains(job.id) {
                continue;
            }
            self.jobs.push_back(job);
            taken += 1;
        }
        // Store returns ascending ids; keep the window sorted even if it didn't
        self.jobs.make_contiguous().sort_by_key(|job| job.id);
        taken
    }

    pub fn pop_front(&mut self) -> Option<Job> {
        self.jobs.pop_front()
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn jobs(ids: &[JobId]) -> Vec<Job> {
        ids.iter()
            .map(|id| Job::new(*id, json!({"id": id})))
            .collect()
    }

    #[test]
    fn test_refill_respects_capacity() {
        let mut cache = PrefetchCache::new(3);

        assert_eq!(cache.refill(jobs(&[1, 2, 3, 4, 5])), 3);
        assert_eq!(cache.ids(), vec![1, 2, 3]);
    }

    #[test]
    fn test_refill_skips_resident_ids() {
        let mut cache = PrefetchCache::new(4);
        cache.refill(jobs(&[1, 2]));

        assert_eq!(cache.refill(jobs(&[2, 3])), 1);
        assert_eq!(cache.ids(), vec![1, 2, 3]);
    }

    #[test]
    fn test_refill_may_return_fewer_rows() {
        let mut cache = PrefetchCache::new(10);

        assert_eq!(cache.refill(jobs(&[7])), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_pop_front_is_fifo() {
        let mut cache = PrefetchCache::new(5);
        cache.refill(jobs(&[4, 2, 9]));

        let order: Vec<JobId> = std::iter::from_fn(|| cache.pop_front().map(|j| j.id)).collect();
        assert_eq!(order, vec![2, 4, 9]);
        assert!(cache.is_empty());
    }
}
