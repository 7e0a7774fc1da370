use std::io::Read;
use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::models::{DataWarning, Opportunity, Snapshot};

/// A parsed snapshot plus the data-quality warnings raised while parsing it.
/// Records with bad cells are kept, with the bad cell blanked; only missing
/// or duplicate identity keys abort the load.
#[derive(Debug)]
pub struct LoadedSnapshot {
    pub snapshot: Snapshot,
    pub warnings: Vec<DataWarning>,
}

#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(rename = "Id", default)]
    id: Option<String>,
    #[serde(rename = "Owner", default)]
    owner: Option<String>,
    #[serde(rename = "Country", default)]
    country: Option<String>,
    #[serde(rename = "Client", default)]
    client: Option<String>,
    #[serde(rename = "Stage", default)]
    stage: Option<String>,
    #[serde(rename = "Value", default)]
    value: Option<String>,
    #[serde(rename = "CloseDate", default)]
    close_date: Option<String>,
    #[serde(rename = "LastModified", default)]
    last_modified: Option<String>,
    #[serde(rename = "Description", default)]
    description: Option<String>,
}

pub fn load_csv(path: &Path, label: &str) -> anyhow::Result<LoadedSnapshot> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open snapshot {}", path.display()))?;
    parse_snapshot(file, label)
        .with_context(|| format!("failed to load snapshot {}", path.display()))
}

pub fn parse_snapshot<R: Read>(reader: R, label: &str) -> anyhow::Result<LoadedSnapshot> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut records = Vec::new();
    let mut warnings = Vec::new();

    for result in csv_reader.deserialize::<RawRow>() {
        let row = result?;
        let id = row.id.unwrap_or_default();

        let value = parse_value(&id, row.value.as_deref(), &mut warnings);
        let close_date = parse_date(&id, "close", row.close_date.as_deref(), &mut warnings);
        let last_modified =
            parse_date(&id, "last-modified", row.last_modified.as_deref(), &mut warnings);

        records.push(Opportunity {
            id,
            owner: row.owner.unwrap_or_default().trim().to_string(),
            country: row.country.unwrap_or_default().trim().to_string(),
            client: row.client.unwrap_or_default().trim().to_string(),
            stage: row.stage.unwrap_or_default().trim().to_string(),
            value,
            close_date,
            last_modified,
            description: row.description.unwrap_or_default(),
        });
    }

    let snapshot = Snapshot::new(label, records)?;
    Ok(LoadedSnapshot { snapshot, warnings })
}

/// Monetary values arrive as export-formatted strings ("1,250.50", "$300").
/// Anything that still fails to parse becomes `None` with a warning; the run
/// continues without that record's value.
fn parse_value(id: &str, raw: Option<&str>, warnings: &mut Vec<DataWarning>) -> Option<f64> {
    let raw = raw.unwrap_or_default().trim();
    if raw.is_empty() {
        return None;
    }
    let cleaned: String = raw.chars().filter(|c| *c != ',' && *c != '$').collect();
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => {
            warnings.push(DataWarning::MalformedValue {
                id: id.to_string(),
                raw: raw.to_string(),
            });
            None
        }
    }
}

fn parse_date(
    id: &str,
    field: &str,
    raw: Option<&str>,
    warnings: &mut Vec<DataWarning>,
) -> Option<NaiveDate> {
    let raw = raw.unwrap_or_default().trim();
    if raw.is_empty() {
        return None;
    }
    for format in ["%Y-%m-%d", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }
    warnings.push(DataWarning::MalformedDate {
        id: id.to_string(),
        field: field.to_string(),
        raw: raw.to_string(),
    });
    None
}
