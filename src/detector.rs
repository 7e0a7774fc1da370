use crate::config::{AnalysisConfig, StageOrder};
use crate::error::AnalysisError;
use crate::matcher;
use crate::models::{ChangeEvent, ChangeKind, DataWarning, GroupAttrs, Opportunity, Snapshot};

/// Everything the comparison of two snapshots produced: one event per changed
/// dimension per entity, plus the warnings accumulated along the way.
#[derive(Debug)]
pub struct ComparisonResult {
    pub events: Vec<ChangeEvent>,
    pub warnings: Vec<DataWarning>,
    pub summary: ComparisonSummary,
}

/// Headline numbers for the report layer. Value sums skip records whose value
/// failed to parse; those records are already in the warnings list.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ComparisonSummary {
    pub total_current: usize,
    pub total_previous: usize,
    pub new_count: usize,
    pub closed_count: usize,
    pub changed_count: usize,
    pub unchanged_count: usize,
    pub new_value: f64,
    pub closed_value: f64,
    pub current_total_value: f64,
    pub previous_total_value: f64,
}

/// Compares two snapshots and classifies every difference.
///
/// Event order is deterministic: all New events in current-snapshot order,
/// then all Closed events in previous-snapshot order, then per-pair field
/// events in current-snapshot order. An unchanged pair contributes a single
/// Unchanged event so downstream consumers can count no-change entities.
pub fn compare(
    current: &Snapshot,
    previous: &Snapshot,
    config: &AnalysisConfig,
) -> Result<ComparisonResult, AnalysisError> {
    if current.is_empty() {
        return Err(AnalysisError::EmptyCurrentSnapshot);
    }

    let order = config.stage_order_table();
    let matches = matcher::match_snapshots(current, Some(previous));

    let mut events = Vec::new();
    let mut warnings = Vec::new();

    for opp in &matches.new {
        events.push(ChangeEvent {
            id: opp.id.clone(),
            attrs: GroupAttrs::of(opp),
            kind: ChangeKind::New,
        });
    }
    for opp in &matches.closed {
        events.push(ChangeEvent {
            id: opp.id.clone(),
            attrs: GroupAttrs::of(opp),
            kind: ChangeKind::Closed,
        });
    }

    let mut changed_count = 0;
    let mut unchanged_count = 0;

    for (prev, curr) in &matches.matched {
        let (pair_events, differs) =
            diff_pair(&order, prev, curr, config.value_tolerance, &mut warnings);
        if differs {
            changed_count += 1;
            events.extend(pair_events);
        } else {
            unchanged_count += 1;
            events.push(ChangeEvent {
                id: curr.id.clone(),
                attrs: GroupAttrs::of(curr),
                kind: ChangeKind::Unchanged,
            });
        }
    }

    let summary = ComparisonSummary {
        total_current: current.len(),
        total_previous: previous.len(),
        new_count: matches.new.len(),
        closed_count: matches.closed.len(),
        changed_count,
        unchanged_count,
        new_value: value_sum(matches.new.iter().copied()),
        closed_value: value_sum(matches.closed.iter().copied()),
        current_total_value: value_sum(current.records.iter()),
        previous_total_value: value_sum(previous.records.iter()),
    };

    Ok(ComparisonResult { events, warnings, summary })
}

fn value_sum<'a>(records: impl Iterator<Item = &'a Opportunity>) -> f64 {
    records.filter_map(|r| r.value).sum()
}

/// Runs the four field comparators for one matched pair. Each comparator is
/// independent; an opportunity reassigned and repriced in the same period
/// yields two events. Returns the events plus whether the pair differed at
/// all: a stage change involving an unranked stage is a difference even
/// though no directional event can be emitted for it.
fn diff_pair(
    order: &StageOrder,
    prev: &Opportunity,
    curr: &Opportunity,
    value_tolerance: f64,
    warnings: &mut Vec<DataWarning>,
) -> (Vec<ChangeEvent>, bool) {
    let attrs = GroupAttrs::of(curr);
    let mut events = Vec::new();
    let mut push = |kind: ChangeKind| {
        events.push(ChangeEvent {
            id: curr.id.clone(),
            attrs: attrs.clone(),
            kind,
        });
    };

    let (stage_differs, stage_event) = compare_stage(order, &curr.id, &prev.stage, &curr.stage, warnings);
    if let Some(kind) = stage_event {
        push(kind);
    }

    if let Some(kind) = compare_owner(&prev.owner, &curr.owner) {
        push(kind);
    }
    if let Some(kind) = compare_value(prev.value, curr.value, value_tolerance) {
        push(kind);
    }
    if let Some(kind) = compare_close_date(prev.close_date, curr.close_date) {
        push(kind);
    }

    let differs = stage_differs || !events.is_empty();
    (events, differs)
}

/// Stage comparator. Returns (differs, directional event). Unknown stages
/// degrade the comparison to equality-only and record a warning; they never
/// abort the run.
fn compare_stage(
    order: &StageOrder,
    id: &str,
    prev: &str,
    curr: &str,
    warnings: &mut Vec<DataWarning>,
) -> (bool, Option<ChangeKind>) {
    if prev == curr {
        return (false, None);
    }

    let prev_rank = order.rank(prev);
    let curr_rank = order.rank(curr);

    for (stage, rank) in [(prev, prev_rank), (curr, curr_rank)] {
        if rank.is_none() {
            warnings.push(DataWarning::UnrankedStage {
                id: id.to_string(),
                stage: stage.to_string(),
            });
        }
    }

    let (Some(prev_rank), Some(curr_rank)) = (prev_rank, curr_rank) else {
        return (true, None);
    };

    let kind = match curr_rank.cmp(&prev_rank) {
        std::cmp::Ordering::Greater => Some(ChangeKind::StageAdvanced {
            from: prev.to_string(),
            to: curr.to_string(),
            rank_delta: curr_rank - prev_rank,
        }),
        std::cmp::Ordering::Less => Some(ChangeKind::StageRegressed {
            from: prev.to_string(),
            to: curr.to_string(),
            rank_delta: curr_rank - prev_rank,
        }),
        std::cmp::Ordering::Equal => None,
    };
    (true, kind)
}

fn compare_owner(prev: &str, curr: &str) -> Option<ChangeKind> {
    if prev == curr {
        return None;
    }
    Some(ChangeKind::Reassigned {
        from: prev.to_string(),
        to: curr.to_string(),
    })
}

/// Value comparator. A side with a missing value is skipped entirely: the
/// unparseable cell was already reported at load time and a delta against
/// nothing would be meaningless.
fn compare_value(prev: Option<f64>, curr: Option<f64>, tolerance: f64) -> Option<ChangeKind> {
    let (prev, curr) = (prev?, curr?);
    let delta = curr - prev;
    if delta.abs() <= tolerance {
        return None;
    }
    Some(ChangeKind::ValueChanged { from: prev, to: curr, delta })
}

/// Close-date comparator. Negative day delta means the close was pulled in,
/// positive means pushed out.
fn compare_close_date(
    prev: Option<chrono::NaiveDate>,
    curr: Option<chrono::NaiveDate>,
) -> Option<ChangeKind> {
    match (prev, curr) {
        (Some(prev), Some(curr)) if prev != curr => Some(ChangeKind::DateRescheduled {
            from: prev,
            to: curr,
            day_delta: (curr - prev).num_days(),
        }),
        _ => None,
    }
}
