// Criteria Search over store rows + jobs held by the engine

use crate::domain::Job;
use serde_json::Value;
use std::collections::BTreeMap;

/// Merge store rows with engine-resident jobs (cache, in-flight), de-duplicate
/// by id, keep the ones matching `criteria`, ascending by id.
pub(crate) fn matching_jobs(
    stored: impl IntoIterator<Item = Job>,
    resident: impl IntoIterator<Item = Job>,
    criteria: &Value,
) -> Vec<Job> {
    let mut merged: BTreeMap<_, Job> = BTreeMap::new();
    for job in stored.into_iter().chain(resident) {
        merged.entry(job.id).or_insert(job);
    }

    merged
        .into_values()
        .filter(|job| job.payload.matches(criteria))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merges_and_deduplicates() {
        let stored = vec![
            Job::new(3, json!({"sequence": 1})),
            Job::new(1, json!({"sequence": 1})),
        ];
        let resident = vec![
            Job::new(1, json!({"sequence": 1})),
            Job::new(2, json!({"sequence": 1})),
        ];

        let ids: Vec<_> = matching_jobs(stored, resident, &json!({"sequence": 1}))
            .into_iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_filters_by_containment() {
        let stored = vec![
            Job::new(1, json!({"sequence": 1, "kind": "a"})),
            Job::new(2, json!({"sequence": 2, "kind": "a"})),
        ];

        let found = matching_jobs(stored, Vec::new(), &json!({"sequence": 2}));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, 2);

        let none = matching_jobs(Vec::new(), Vec::new(), &json!({"sequence": 2}));
        assert!(none.is_empty());
    }
}
