use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::domain::{Cell, FieldType, Mode, Resolution, TargetField};
use crate::error::ConvertError;
use crate::prompt::Prompter;
use crate::report::{RunReport, RunWarning};
use crate::store::{Answer, ResolutionStore};
use crate::table::{OutputTable, SourceTable};

/// Companion-column suffixes that carry a numeric column's unit.
const UNIT_COLUMN_SUFFIXES: &[&str] = &["_unit", "_units", "_unit_of_measure", "_measurement_unit"];

/// Units for well-known MIMARKS measurement fields; consulted before any
/// prompt.
const KNOWN_UNITS: &[(&str, &str)] = &[
    ("depth", "m"),
    ("elev", "m"),
    ("altitude", "m"),
    ("tot_depth_water_col", "m"),
    ("temp", "C"),
    ("salinity", "psu"),
    ("pressure", "atm"),
];

fn unit_syntax() -> &'static Regex {
    static UNIT_RE: OnceLock<Regex> = OnceLock::new();
    UNIT_RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9/%°µ²³\s()\-]+$").expect("unit pattern is valid")
    })
}

/// At least one parseable number makes a column numeric, matching how the
/// source sheets mix numbers with sentinel text.
pub fn is_numeric_column(cells: &[Cell]) -> bool {
    cells.iter().any(|cell| cell.as_number().is_some())
}

/// Look for a `<column>_unit`-style companion column and return its most
/// frequent non-empty value.
pub fn find_unit_column(source: &SourceTable, column: &str) -> Option<(String, String)> {
    for suffix in UNIT_COLUMN_SUFFIXES {
        let candidate = format!("{column}{suffix}");
        let Some(cells) = source.column(&candidate) else {
            continue;
        };
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for cell in cells {
            if !cell.is_empty() {
                *counts.entry(cell.to_string()).or_default() += 1;
            }
        }
        if let Some(unit) = counts
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
            .map(|(unit, _)| unit)
        {
            return Some((candidate, unit));
        }
    }
    None
}

pub fn known_unit(bare_field: &str) -> Option<&'static str> {
    KNOWN_UNITS
        .iter()
        .find(|(name, _)| *name == bare_field)
        .map(|(_, unit)| *unit)
}

/// Attach units to numeric columns of the assembled output and surface
/// type mismatches. Non-numeric cells in a numeric field warn and pass
/// through as text, except in mandatory numeric fields where they fail
/// the run.
pub fn annotate_units<P: Prompter>(
    output: &mut OutputTable,
    source: &SourceTable,
    mappings: &[(TargetField, Resolution)],
    mode: Mode,
    store: &mut ResolutionStore,
    prompter: &P,
    report: &mut RunReport,
) -> Result<(), ConvertError> {
    for (field, resolution) in mappings {
        let Resolution::Column(column) = resolution else {
            continue;
        };
        let Some(cells) = source.column(column) else {
            continue;
        };
        if !is_numeric_column(cells) {
            continue;
        }

        check_types(field, cells, report)?;

        if !field.unit_required {
            continue;
        }
        let Some(unit) = determine_unit(field, column, source, mode, store, prompter)? else {
            debug!(field = %field.name, "no unit recorded, values left bare");
            continue;
        };

        for row in 0..output.row_count() {
            let Some(value) = output.get(row, &field.name) else {
                continue;
            };
            if value.is_empty() || value == "not collected" {
                continue;
            }
            if value.parse::<f64>().is_ok() {
                let annotated = format!("{value} {unit}");
                output.set(row, &field.name, annotated);
            }
        }
    }
    Ok(())
}

fn check_types(
    field: &TargetField,
    cells: &[Cell],
    report: &mut RunReport,
) -> Result<(), ConvertError> {
    if field.expected_type != FieldType::Numeric {
        return Ok(());
    }
    for (idx, cell) in cells.iter().enumerate() {
        let Cell::Text(value) = cell else {
            continue;
        };
        if field.required {
            return Err(ConvertError::TypeMismatch {
                field: field.name.clone(),
                row: idx + 1,
                value: value.clone(),
            });
        }
        report.push(RunWarning::TypeMismatch {
            field: field.name.clone(),
            row: idx + 1,
            value: value.clone(),
        });
    }
    Ok(())
}

fn determine_unit<P: Prompter>(
    field: &TargetField,
    column: &str,
    source: &SourceTable,
    mode: Mode,
    store: &mut ResolutionStore,
    prompter: &P,
) -> Result<Option<String>, ConvertError> {
    if let Some((unit_column, unit)) = find_unit_column(source, column) {
        debug!(field = %field.name, %unit_column, %unit, "unit from companion column");
        return Ok(Some(unit));
    }
    if let Some(unit) = known_unit(field.bare_name()) {
        return Ok(Some(unit.to_string()));
    }

    let key = format!("unit_for_{column}");
    if let Some(Answer::Value(unit)) = store.get(mode, &key) {
        return Ok((!unit.is_empty()).then(|| unit.clone()));
    }

    let answer = prompter.ask(
        &format!("Enter unit for {column} (or press Enter to skip)"),
        &[],
    )?;
    let unit = answer.trim().to_string();
    if !unit.is_empty() && !unit_syntax().is_match(&unit) {
        return Err(ConvertError::InvalidUnit(unit));
    }
    store.set(mode, &key, Answer::Value(unit.clone()));
    Ok((!unit.is_empty()).then_some(unit))
}
