use std::collections::HashMap;

/// Pipeline stages in progression order, earliest first. Changing to a stage
/// with a higher rank is an advance, a lower rank a regression. Stages not in
/// this list are still compared for equality, just without direction.
pub const DEFAULT_STAGE_ORDER: &[&str] = &[
    "Identify the opportunity",
    "Customer Analysis",
    "NDD/RFI",
    "NTP/RFI",
    "Application approved",
    "Financial Analysis",
    "Work Needs Analysis",
    "Tenant Lease",
    "Ground Lease Agreement",
    "TLA Signature",
    "Client Approval",
    "Work Execution",
    "Construction",
    "Service Delivery Analysis",
    "Ready to Bill",
    "Reported to Finance",
    "Proceed with Billing Changes",
    "Equipment Removal",
    "Customer Notification",
    "Cancelado",
];

pub const DEFAULT_STAGNANT_DAYS: i64 = 30;
pub const DEFAULT_WARNING_DAYS: i64 = 7;

/// Value differences at or below this are treated as rounding noise, not a
/// ValueChanged event.
pub const DEFAULT_VALUE_TOLERANCE: f64 = 0.01;

/// All thresholds for one analysis run. Passed explicitly into the evaluator,
/// detector and aggregator so a run carries no ambient state and each piece
/// stays testable in isolation.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Days without modification before an opportunity counts as stagnant.
    pub stagnant_days_threshold: i64,
    /// Days before the expected close date at which an opportunity counts as
    /// near expiry. Overdue opportunities always count.
    pub warning_days_before_close: i64,
    pub value_tolerance: f64,
    pub stage_order: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            stagnant_days_threshold: DEFAULT_STAGNANT_DAYS,
            warning_days_before_close: DEFAULT_WARNING_DAYS,
            value_tolerance: DEFAULT_VALUE_TOLERANCE,
            stage_order: DEFAULT_STAGE_ORDER.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl AnalysisConfig {
    pub fn stage_order_table(&self) -> StageOrder {
        StageOrder::new(&self.stage_order)
    }
}

/// Static ranking of pipeline stages, built once per run from the configured
/// order. Read-only during a run.
#[derive(Debug, Clone)]
pub struct StageOrder {
    ranks: HashMap<String, i64>,
}

impl StageOrder {
    pub fn new<S: AsRef<str>>(stages: &[S]) -> Self {
        let ranks = stages
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.as_ref().to_string(), idx as i64))
            .collect();
        StageOrder { ranks }
    }

    /// Rank of a stage, or `None` for stages outside the configured order.
    pub fn rank(&self, stage: &str) -> Option<i64> {
        self.ranks.get(stage).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_follow_configured_order() {
        let order = StageOrder::new(&["Prospecting", "Proposal", "Closed Won"]);
        assert_eq!(order.rank("Prospecting"), Some(0));
        assert_eq!(order.rank("Closed Won"), Some(2));
        assert_eq!(order.rank("Mystery Stage"), None);
    }

    #[test]
    fn default_config_matches_documented_thresholds() {
        let cfg = AnalysisConfig::default();
        assert_eq!(cfg.stagnant_days_threshold, 30);
        assert_eq!(cfg.warning_days_before_close, 7);
        assert!(cfg.stage_order_table().rank("Customer Analysis").is_some());
    }
}
