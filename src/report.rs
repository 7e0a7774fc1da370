use std::collections::HashMap;
use std::fmt::Write;

use chrono::NaiveDate;

use crate::detector::ComparisonResult;
use crate::metrics::{AggregateReport, Dimension};
use crate::models::{ChangeKind, DataWarning, RiskFlag, Snapshot};

/// Builds the markdown report consumed downstream. Formats only; every number
/// comes from the detector, evaluator or aggregator.
pub fn build_report(
    current: &Snapshot,
    as_of: NaiveDate,
    comparison: Option<&ComparisonResult>,
    aggregates: &AggregateReport,
    flags: &HashMap<String, RiskFlag>,
    warnings: &[DataWarning],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Pipeline Snapshot Report");
    let _ = writeln!(
        output,
        "Snapshot `{}`, {} opportunities, as of {}",
        current.label,
        current.len(),
        as_of
    );

    if let Some(comparison) = comparison {
        write_changes(&mut output, comparison);
    } else {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Changes");
        let _ = writeln!(output, "No previous snapshot; baseline run, no comparison.");
    }

    for dimension in [Dimension::Owner, Dimension::Country, Dimension::Stage] {
        write_dimension(&mut output, aggregates, dimension);
    }

    write_attention(&mut output, current, flags);
    write_warnings(&mut output, warnings);

    output
}

fn write_changes(output: &mut String, comparison: &ComparisonResult) {
    let summary = &comparison.summary;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Changes");
    let _ = writeln!(
        output,
        "{} new, {} closed, {} changed, {} unchanged ({} -> {} records)",
        summary.new_count,
        summary.closed_count,
        summary.changed_count,
        summary.unchanged_count,
        summary.total_previous,
        summary.total_current
    );
    let _ = writeln!(
        output,
        "Pipeline value {:.2} -> {:.2} ({:+.2}); new business {:.2}, departed {:.2}",
        summary.previous_total_value,
        summary.current_total_value,
        summary.current_total_value - summary.previous_total_value,
        summary.new_value,
        summary.closed_value
    );

    let notable: Vec<String> = comparison
        .events
        .iter()
        .filter(|e| e.kind != ChangeKind::Unchanged)
        .map(|e| format!("- {}: {}", e.id, describe(&e.kind)))
        .collect();

    if !notable.is_empty() {
        let _ = writeln!(output);
        for line in notable {
            let _ = writeln!(output, "{line}");
        }
    }
}

fn describe(kind: &ChangeKind) -> String {
    match kind {
        ChangeKind::New => "entered the pipeline".to_string(),
        ChangeKind::Closed => "left the pipeline".to_string(),
        ChangeKind::StageAdvanced { from, to, rank_delta } => {
            format!("advanced {from} -> {to} (+{rank_delta})")
        }
        ChangeKind::StageRegressed { from, to, rank_delta } => {
            format!("regressed {from} -> {to} ({rank_delta})")
        }
        ChangeKind::Reassigned { from, to } => format!("reassigned {from} -> {to}"),
        ChangeKind::ValueChanged { from, to, delta } => {
            format!("value {from:.2} -> {to:.2} ({delta:+.2})")
        }
        ChangeKind::DateRescheduled { from, to, day_delta } => {
            format!("close date {from} -> {to} ({day_delta:+} days)")
        }
        ChangeKind::Unchanged => "unchanged".to_string(),
    }
}

fn write_dimension(output: &mut String, aggregates: &AggregateReport, dimension: Dimension) {
    let Some(groups) = aggregates.groups(dimension) else {
        return;
    };

    let _ = writeln!(output);
    let _ = writeln!(output, "## By {dimension}");

    for (key, metric) in groups {
        let mut line = format!(
            "- {key}: {} opportunities, {:.2} total",
            metric.count, metric.total_value
        );
        if metric.stagnant_count > 0 {
            let _ = write!(line, ", {} stagnant", metric.stagnant_count);
        }
        if metric.near_expiry_count > 0 {
            let _ = write!(line, ", {} near expiry", metric.near_expiry_count);
        }
        if let Some(changes) = &metric.changes {
            let _ = write!(
                line,
                " ({} new, {} closed, {} advanced, {} regressed)",
                changes.new, changes.closed, changes.advanced, changes.regressed
            );
        }
        let _ = writeln!(output, "{line}");
    }
}

fn write_attention(output: &mut String, current: &Snapshot, flags: &HashMap<String, RiskFlag>) {
    let mut flagged: Vec<&crate::models::Opportunity> = current
        .records
        .iter()
        .filter(|opp| flags.get(&opp.id).copied().unwrap_or(RiskFlag::None).is_flagged())
        .collect();

    // Most urgent first: earliest close date, then longest idle.
    flagged.sort_by_key(|opp| (opp.close_date, std::cmp::Reverse(opp.last_modified)));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Needs attention");

    if flagged.is_empty() {
        let _ = writeln!(output, "Nothing flagged in this snapshot.");
        return;
    }

    for opp in flagged {
        let flag = flags[&opp.id];
        let mut reasons = Vec::new();
        if flag.is_near_expiry() {
            reasons.push("near expiry");
        }
        if flag.is_stagnant() {
            reasons.push("stagnant");
        }
        let _ = writeln!(
            output,
            "- {} ({}, {}): {}",
            opp.id,
            owner_or_unspecified(&opp.owner),
            opp.stage,
            reasons.join(" + ")
        );
    }
}

fn owner_or_unspecified(owner: &str) -> &str {
    if owner.trim().is_empty() {
        crate::metrics::UNSPECIFIED
    } else {
        owner
    }
}

fn write_warnings(output: &mut String, warnings: &[DataWarning]) {
    if warnings.is_empty() {
        return;
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "## Data quality warnings");
    for warning in warnings {
        let _ = writeln!(output, "- {warning}");
    }
}
