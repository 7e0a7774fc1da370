use std::collections::HashMap;

use crate::models::{Opportunity, Snapshot};

/// Partition of two snapshots by identity key. Matching is exact key
/// equality only; there is no fuzzy matching across renames.
#[derive(Debug)]
pub struct MatchSet<'a> {
    /// (previous, current) pairs, in current-snapshot order.
    pub matched: Vec<(&'a Opportunity, &'a Opportunity)>,
    /// Current records with no previous counterpart, in current-snapshot order.
    pub new: Vec<&'a Opportunity>,
    /// Previous records missing from the current snapshot, in
    /// previous-snapshot order.
    pub closed: Vec<&'a Opportunity>,
}

/// Pairs records between two snapshots by identity key.
///
/// With no previous snapshot (first run, no baseline yet) every current
/// record is classified new and nothing is closed. That is the documented
/// baseline-run policy, not an error.
pub fn match_snapshots<'a>(current: &'a Snapshot, previous: Option<&'a Snapshot>) -> MatchSet<'a> {
    let Some(previous) = previous else {
        return MatchSet {
            matched: Vec::new(),
            new: current.records.iter().collect(),
            closed: Vec::new(),
        };
    };

    let prev_by_id: HashMap<&str, &Opportunity> = previous
        .records
        .iter()
        .map(|r| (r.id.as_str(), r))
        .collect();

    let mut matched = Vec::new();
    let mut new = Vec::new();
    for curr in &current.records {
        match prev_by_id.get(curr.id.as_str()) {
            Some(prev) => matched.push((*prev, curr)),
            None => new.push(curr),
        }
    }

    let closed = previous
        .records
        .iter()
        .filter(|prev| current.get(&prev.id).is_none())
        .collect();

    MatchSet { matched, new, closed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Opportunity;

    fn opp(id: &str) -> Opportunity {
        Opportunity {
            id: id.to_string(),
            owner: "Dana Cruz".to_string(),
            country: "Chile".to_string(),
            client: "Andes Telecom".to_string(),
            stage: "Customer Analysis".to_string(),
            value: Some(500.0),
            close_date: None,
            last_modified: None,
            description: String::new(),
        }
    }

    fn snapshot(label: &str, ids: &[&str]) -> Snapshot {
        Snapshot::new(label, ids.iter().map(|id| opp(id)).collect()).unwrap()
    }

    #[test]
    fn matching_a_snapshot_against_itself_pairs_everything() {
        let current = snapshot("current", &["OP-1", "OP-2", "OP-3"]);
        let previous = current.clone();

        let matches = match_snapshots(&current, Some(&previous));
        assert_eq!(matches.matched.len(), 3);
        assert!(matches.new.is_empty());
        assert!(matches.closed.is_empty());
    }

    #[test]
    fn partitions_new_and_closed_keys() {
        let current = snapshot("current", &["OP-1", "OP-4"]);
        let previous = snapshot("previous", &["OP-1", "OP-2"]);

        let matches = match_snapshots(&current, Some(&previous));
        assert_eq!(matches.matched.len(), 1);
        assert_eq!(matches.matched[0].1.id, "OP-1");
        assert_eq!(matches.new.len(), 1);
        assert_eq!(matches.new[0].id, "OP-4");
        assert_eq!(matches.closed.len(), 1);
        assert_eq!(matches.closed[0].id, "OP-2");
    }

    #[test]
    fn baseline_run_classifies_everything_new() {
        let current = snapshot("current", &["OP-1", "OP-2"]);

        let matches = match_snapshots(&current, None);
        assert!(matches.matched.is_empty());
        assert_eq!(matches.new.len(), 2);
        assert!(matches.closed.is_empty());
    }

    #[test]
    fn empty_previous_closes_nothing_and_news_everything() {
        let current = snapshot("current", &["OP-2"]);
        let previous = snapshot("previous", &[]);

        let matches = match_snapshots(&current, Some(&previous));
        assert_eq!(matches.new.len(), 1);
        assert!(matches.closed.is_empty());
    }

    #[test]
    fn preserves_snapshot_iteration_order() {
        let current = snapshot("current", &["OP-3", "OP-1", "OP-9", "OP-2"]);
        let previous = snapshot("previous", &["OP-2", "OP-1", "OP-7"]);

        let matches = match_snapshots(&current, Some(&previous));
        let matched_ids: Vec<&str> = matches.matched.iter().map(|(_, c)| c.id.as_str()).collect();
        assert_eq!(matched_ids, vec!["OP-1", "OP-2"]);
        assert_eq!(matches.new[0].id, "OP-3");
        assert_eq!(matches.new[1].id, "OP-9");
        assert_eq!(matches.closed[0].id, "OP-7");
    }
}
