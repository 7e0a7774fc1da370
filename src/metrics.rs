use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::error::AnalysisError;
use crate::models::{ChangeEvent, ChangeKind, GroupAttrs, RiskFlag, Snapshot};

/// Bucket for records whose grouping attribute is missing or blank. Records
/// are never dropped from a rollup; they land here instead.
pub const UNSPECIFIED: &str = "(unspecified)";

const TOP_CONTRIBUTOR_LIMIT: usize = 3;

/// The four grouping dimensions a rollup is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Dimension {
    Owner,
    Country,
    Client,
    Stage,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Owner,
        Dimension::Country,
        Dimension::Client,
        Dimension::Stage,
    ];

    fn extract(self, attrs: &GroupAttrs) -> &str {
        match self {
            Dimension::Owner => &attrs.owner,
            Dimension::Country => &attrs.country,
            Dimension::Client => &attrs.client,
            Dimension::Stage => &attrs.stage,
        }
    }

    fn of_record(self, opp: &crate::models::Opportunity) -> &str {
        match self {
            Dimension::Owner => &opp.owner,
            Dimension::Country => &opp.country,
            Dimension::Client => &opp.client,
            Dimension::Stage => &opp.stage,
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Dimension::Owner => "owner",
            Dimension::Country => "country",
            Dimension::Client => "client",
            Dimension::Stage => "stage",
        };
        f.write_str(name)
    }
}

/// Change-derived counts for one group. Only present when a comparison ran;
/// absent is not the same as zero and the two are never conflated.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeCounts {
    pub new: usize,
    pub closed: usize,
    pub advanced: usize,
    pub regressed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contributor {
    pub id: String,
    pub value: f64,
}

/// Rollup for one group within one dimension.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateMetric {
    pub count: usize,
    pub total_value: f64,
    pub stagnant_count: usize,
    pub near_expiry_count: usize,
    pub top_contributors: Vec<Contributor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<ChangeCounts>,
}

/// Per-dimension rollups. BTreeMaps keep iteration deterministic so two runs
/// over identical input produce bit-identical output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    pub dimensions: BTreeMap<Dimension, BTreeMap<String, AggregateMetric>>,
}

impl AggregateReport {
    pub fn groups(&self, dimension: Dimension) -> Option<&BTreeMap<String, AggregateMetric>> {
        self.dimensions.get(&dimension)
    }
}

fn bucket_key(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        UNSPECIFIED.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Computes grouped aggregates over the current snapshot for every dimension.
///
/// `events` is `None` when no previous snapshot was available; in that case
/// the change-derived counts are omitted from every group rather than
/// reported as zero. Every record lands in exactly one bucket per dimension.
pub fn aggregate(
    snapshot: &Snapshot,
    flags: &HashMap<String, RiskFlag>,
    events: Option<&[ChangeEvent]>,
) -> Result<AggregateReport, AnalysisError> {
    if snapshot.is_empty() {
        return Err(AnalysisError::EmptyCurrentSnapshot);
    }

    let mut dimensions = BTreeMap::new();

    for dimension in Dimension::ALL {
        let mut groups: BTreeMap<String, AggregateMetric> = BTreeMap::new();
        let mut contributors: BTreeMap<String, Vec<Contributor>> = BTreeMap::new();

        for opp in &snapshot.records {
            let key = bucket_key(dimension.of_record(opp));
            let metric = groups.entry(key.clone()).or_default();
            metric.count += 1;

            if let Some(value) = opp.value {
                metric.total_value += value;
                contributors
                    .entry(key)
                    .or_default()
                    .push(Contributor { id: opp.id.clone(), value });
            }

            if let Some(flag) = flags.get(&opp.id) {
                if flag.is_stagnant() {
                    metric.stagnant_count += 1;
                }
                if flag.is_near_expiry() {
                    metric.near_expiry_count += 1;
                }
            }
        }

        for (key, mut list) in contributors {
            list.sort_by(|a, b| {
                b.value
                    .partial_cmp(&a.value)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.id.cmp(&b.id))
            });
            list.truncate(TOP_CONTRIBUTOR_LIMIT);
            if let Some(metric) = groups.get_mut(&key) {
                metric.top_contributors = list;
            }
        }

        if let Some(events) = events {
            for metric in groups.values_mut() {
                metric.changes = Some(ChangeCounts::default());
            }
            for event in events {
                let key = bucket_key(dimension.extract(&event.attrs));
                // A group can exist only through Closed events; its entities
                // left the pipeline but the departure still belongs somewhere.
                let metric = groups.entry(key).or_insert_with(|| AggregateMetric {
                    changes: Some(ChangeCounts::default()),
                    ..AggregateMetric::default()
                });
                let counts = metric.changes.get_or_insert_with(ChangeCounts::default);
                match &event.kind {
                    ChangeKind::New => counts.new += 1,
                    ChangeKind::Closed => counts.closed += 1,
                    ChangeKind::StageAdvanced { .. } => counts.advanced += 1,
                    ChangeKind::StageRegressed { .. } => counts.regressed += 1,
                    _ => {}
                }
            }
        }

        dimensions.insert(dimension, groups);
    }

    Ok(AggregateReport { dimensions })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Opportunity;

    fn opp(id: &str, owner: &str, country: &str, value: Option<f64>) -> Opportunity {
        Opportunity {
            id: id.to_string(),
            owner: owner.to_string(),
            country: country.to_string(),
            client: "Andes Telecom".to_string(),
            stage: "Proposal".to_string(),
            value,
            close_date: None,
            last_modified: None,
            description: String::new(),
        }
    }

    fn sample_snapshot() -> Snapshot {
        Snapshot::new(
            "current",
            vec![
                opp("OP-1", "Ana", "Chile", Some(100.0)),
                opp("OP-2", "Ana", "Peru", Some(40.0)),
                opp("OP-3", "Ben", "", Some(250.0)),
                opp("OP-4", "  ", "Chile", None),
            ],
        )
        .unwrap()
    }

    fn no_flags() -> HashMap<String, RiskFlag> {
        HashMap::new()
    }

    #[test]
    fn every_dimension_partitions_the_whole_snapshot() {
        let snapshot = sample_snapshot();
        let report = aggregate(&snapshot, &no_flags(), None).unwrap();

        for dimension in Dimension::ALL {
            let total: usize = report
                .groups(dimension)
                .unwrap()
                .values()
                .map(|m| m.count)
                .sum();
            assert_eq!(total, snapshot.len(), "dimension {dimension}");
        }
    }

    #[test]
    fn blank_attributes_bucket_under_unspecified() {
        let report = aggregate(&sample_snapshot(), &no_flags(), None).unwrap();

        let owners = report.groups(Dimension::Owner).unwrap();
        assert_eq!(owners[UNSPECIFIED].count, 1);
        let countries = report.groups(Dimension::Country).unwrap();
        assert_eq!(countries[UNSPECIFIED].count, 1);
    }

    #[test]
    fn value_sums_skip_malformed_values() {
        let report = aggregate(&sample_snapshot(), &no_flags(), None).unwrap();
        let chile = &report.groups(Dimension::Country).unwrap()["Chile"];
        // OP-4 counts toward the group but its missing value adds nothing.
        assert_eq!(chile.count, 2);
        assert_eq!(chile.total_value, 100.0);
    }

    #[test]
    fn risk_flag_counts_land_in_the_right_group() {
        let mut flags = HashMap::new();
        flags.insert("OP-1".to_string(), RiskFlag::Both);
        flags.insert("OP-2".to_string(), RiskFlag::NearExpiry);

        let report = aggregate(&sample_snapshot(), &flags, None).unwrap();
        let ana = &report.groups(Dimension::Owner).unwrap()["Ana"];
        assert_eq!(ana.stagnant_count, 1);
        assert_eq!(ana.near_expiry_count, 2);
    }

    #[test]
    fn change_counts_are_omitted_without_a_comparison() {
        let report = aggregate(&sample_snapshot(), &no_flags(), None).unwrap();
        for groups in report.dimensions.values() {
            assert!(groups.values().all(|m| m.changes.is_none()));
        }
    }

    #[test]
    fn change_counts_are_present_and_zeroed_with_a_comparison() {
        let events = vec![ChangeEvent {
            id: "OP-1".to_string(),
            attrs: GroupAttrs {
                owner: "Ana".to_string(),
                country: "Chile".to_string(),
                client: "Andes Telecom".to_string(),
                stage: "Proposal".to_string(),
            },
            kind: ChangeKind::New,
        }];

        let report = aggregate(&sample_snapshot(), &no_flags(), Some(&events)).unwrap();
        let owners = report.groups(Dimension::Owner).unwrap();
        assert_eq!(owners["Ana"].changes.as_ref().unwrap().new, 1);
        // Groups the events never touched still say "computed, zero".
        assert_eq!(owners["Ben"].changes, Some(ChangeCounts::default()));
    }

    #[test]
    fn closed_events_can_create_a_departed_group() {
        let events = vec![ChangeEvent {
            id: "OP-9".to_string(),
            attrs: GroupAttrs {
                owner: "Carla".to_string(),
                country: "Bolivia".to_string(),
                client: "Altiplano Net".to_string(),
                stage: "Construction".to_string(),
            },
            kind: ChangeKind::Closed,
        }];

        let report = aggregate(&sample_snapshot(), &no_flags(), Some(&events)).unwrap();
        let carla = &report.groups(Dimension::Owner).unwrap()["Carla"];
        assert_eq!(carla.count, 0);
        assert_eq!(carla.changes.as_ref().unwrap().closed, 1);
    }

    #[test]
    fn top_contributors_are_ranked_by_value() {
        let snapshot = Snapshot::new(
            "current",
            vec![
                opp("OP-1", "Ana", "Chile", Some(100.0)),
                opp("OP-2", "Ana", "Chile", Some(400.0)),
                opp("OP-3", "Ana", "Chile", Some(50.0)),
                opp("OP-4", "Ana", "Chile", Some(200.0)),
            ],
        )
        .unwrap();

        let report = aggregate(&snapshot, &no_flags(), None).unwrap();
        let ana = &report.groups(Dimension::Owner).unwrap()["Ana"];
        let ids: Vec<&str> = ana.top_contributors.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["OP-2", "OP-4", "OP-1"]);
    }

    #[test]
    fn aggregation_is_idempotent() {
        let snapshot = sample_snapshot();
        let mut flags = HashMap::new();
        flags.insert("OP-3".to_string(), RiskFlag::Stagnant);

        let first = aggregate(&snapshot, &flags, None).unwrap();
        let second = aggregate(&snapshot, &flags, None).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn empty_snapshot_is_a_structural_error() {
        let snapshot = Snapshot::new("current", vec![]).unwrap();
        let err = aggregate(&snapshot, &no_flags(), None).unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyCurrentSnapshot));
    }
}
