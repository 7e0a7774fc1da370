use std::collections::HashMap;

use chrono::NaiveDate;

use crate::config::AnalysisConfig;
use crate::models::{Opportunity, RiskFlag, Snapshot};

/// Evaluates the risk state of one opportunity as of `as_of`.
///
/// Stagnant: no modification for at least the configured threshold.
/// Near expiry: expected close within the warning window, including close
/// dates already in the past — an overdue opportunity still open is urgent,
/// not exempt. A missing date simply leaves that condition unset.
pub fn evaluate(opp: &Opportunity, as_of: NaiveDate, config: &AnalysisConfig) -> RiskFlag {
    let stagnant = opp
        .last_modified
        .map(|modified| (as_of - modified).num_days() >= config.stagnant_days_threshold)
        .unwrap_or(false);

    let near_expiry = opp
        .close_date
        .map(|close| (close - as_of).num_days() <= config.warning_days_before_close)
        .unwrap_or(false);

    RiskFlag::from_parts(stagnant, near_expiry)
}

/// Risk flags for a whole snapshot, keyed by identity key.
pub fn evaluate_snapshot(
    snapshot: &Snapshot,
    as_of: NaiveDate,
    config: &AnalysisConfig,
) -> HashMap<String, RiskFlag> {
    snapshot
        .records
        .iter()
        .map(|opp| (opp.id.clone(), evaluate(opp, as_of, config)))
        .collect()
}
