use chrono::NaiveDate;
use serde::Serialize;

use crate::error::AnalysisError;

/// One pipeline opportunity as captured in a snapshot.
///
/// `owner`, `country`, `client` and `stage` are free-form and may be empty;
/// empty values are bucketed under an explicit "(unspecified)" group during
/// aggregation rather than dropped. `value` is `None` when the source cell
/// was missing or unparseable (recorded as a [`DataWarning`] at load time).
#[derive(Debug, Clone, Serialize)]
pub struct Opportunity {
    pub id: String,
    pub owner: String,
    pub country: String,
    pub client: String,
    pub stage: String,
    pub value: Option<f64>,
    pub close_date: Option<NaiveDate>,
    pub last_modified: Option<NaiveDate>,
    pub description: String,
}

/// An ordered collection of opportunities captured at one point in time.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub label: String,
    pub records: Vec<Opportunity>,
}

impl Snapshot {
    /// Builds a snapshot, rejecting records without an identity key and
    /// duplicate keys. Duplicates abort the run: there is no principled way
    /// to pick which duplicate wins a cross-snapshot match.
    pub fn new(label: impl Into<String>, records: Vec<Opportunity>) -> Result<Self, AnalysisError> {
        let label = label.into();
        let mut seen = std::collections::HashSet::new();

        for (idx, record) in records.iter().enumerate() {
            if record.id.trim().is_empty() {
                return Err(AnalysisError::MissingIdentityKey { row: idx + 1 });
            }
            if !seen.insert(record.id.clone()) {
                return Err(AnalysisError::DuplicateIdentityKey {
                    id: record.id.clone(),
                    label,
                });
            }
        }

        Ok(Snapshot { label, records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Opportunity> {
        self.records.iter().find(|r| r.id == id)
    }
}

/// Grouping attributes carried on every change event so the aggregator can
/// attribute the event to a bucket in each dimension. Taken from the current
/// record, or from the previous record for `Closed` events.
#[derive(Debug, Clone, Serialize)]
pub struct GroupAttrs {
    pub owner: String,
    pub country: String,
    pub client: String,
    pub stage: String,
}

impl GroupAttrs {
    pub fn of(opp: &Opportunity) -> Self {
        GroupAttrs {
            owner: opp.owner.clone(),
            country: opp.country.clone(),
            client: opp.client.clone(),
            stage: opp.stage.clone(),
        }
    }
}

/// One classified difference for one opportunity. An opportunity that changed
/// along several dimensions produces several events, one per dimension.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    pub id: String,
    pub attrs: GroupAttrs,
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum ChangeKind {
    New,
    Closed,
    StageAdvanced {
        from: String,
        to: String,
        rank_delta: i64,
    },
    StageRegressed {
        from: String,
        to: String,
        rank_delta: i64,
    },
    Reassigned {
        from: String,
        to: String,
    },
    ValueChanged {
        from: f64,
        to: f64,
        delta: f64,
    },
    DateRescheduled {
        from: NaiveDate,
        to: NaiveDate,
        day_delta: i64,
    },
    Unchanged,
}

impl ChangeKind {
    pub fn label(&self) -> &'static str {
        match self {
            ChangeKind::New => "new",
            ChangeKind::Closed => "closed",
            ChangeKind::StageAdvanced { .. } => "stage advance",
            ChangeKind::StageRegressed { .. } => "stage regress",
            ChangeKind::Reassigned { .. } => "reassignment",
            ChangeKind::ValueChanged { .. } => "value change",
            ChangeKind::DateRescheduled { .. } => "reschedule",
            ChangeKind::Unchanged => "unchanged",
        }
    }
}

/// Derived alert state for one opportunity. Stagnant and near-expiry are
/// independent conditions and may both hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskFlag {
    None,
    Stagnant,
    NearExpiry,
    Both,
}

impl RiskFlag {
    pub fn from_parts(stagnant: bool, near_expiry: bool) -> Self {
        match (stagnant, near_expiry) {
            (true, true) => RiskFlag::Both,
            (true, false) => RiskFlag::Stagnant,
            (false, true) => RiskFlag::NearExpiry,
            (false, false) => RiskFlag::None,
        }
    }

    pub fn is_stagnant(self) -> bool {
        matches!(self, RiskFlag::Stagnant | RiskFlag::Both)
    }

    pub fn is_near_expiry(self) -> bool {
        matches!(self, RiskFlag::NearExpiry | RiskFlag::Both)
    }

    pub fn is_flagged(self) -> bool {
        self != RiskFlag::None
    }
}

/// Non-fatal data-quality findings collected alongside results. Nothing is
/// silently dropped: every degraded comparison or unparseable cell shows up
/// here.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "warning")]
pub enum DataWarning {
    MalformedValue { id: String, raw: String },
    MalformedDate { id: String, field: String, raw: String },
    UnrankedStage { id: String, stage: String },
}

impl std::fmt::Display for DataWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataWarning::MalformedValue { id, raw } => {
                write!(f, "{id}: unparseable value {raw:?}, excluded from value math")
            }
            DataWarning::MalformedDate { id, field, raw } => {
                write!(f, "{id}: unparseable {field} date {raw:?}")
            }
            DataWarning::UnrankedStage { id, stage } => {
                write!(
                    f,
                    "{id}: stage {stage:?} is not in the stage order, compared by equality only"
                )
            }
        }
    }
}
