use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::domain::Mode;
use crate::error::ConvertError;
use crate::prompt::Prompter;
use crate::report::{RunReport, RunWarning};
use crate::store::{Answer, ResolutionStore};
use crate::table::OutputTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    Suffix,
    KeepFirst,
    Merge,
    Abort,
}

impl DuplicatePolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "suffix" => Some(Self::Suffix),
            "first" => Some(Self::KeepFirst),
            "merge" => Some(Self::Merge),
            "abort" => Some(Self::Abort),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Suffix => "suffix",
            Self::KeepFirst => "first",
            Self::Merge => "merge",
            Self::Abort => "abort",
        }
    }
}

/// Group assembled rows by their natural key and resolve collisions.
/// Rows identical outside the excluded columns collapse silently; rows
/// that differ resolve through a policy recorded under a hash of the
/// conflicting field set, so the same shape of conflict never asks twice.
pub fn reconcile<P: Prompter>(
    output: &mut OutputTable,
    keys: &[String],
    key_field: &str,
    exclude: &[&str],
    mode: Mode,
    store: &mut ResolutionStore,
    prompter: &P,
    report: &mut RunReport,
) -> Result<(), ConvertError> {
    debug_assert_eq!(keys.len(), output.row_count());

    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (row, key) in keys.iter().enumerate() {
        groups.entry(key.as_str()).or_default().push(row);
    }

    let compared = output
        .column_names()
        .iter()
        .filter(|name| !exclude.contains(&name.as_str()))
        .cloned()
        .collect::<Vec<_>>();

    let mut drop_rows = Vec::new();
    for (key, rows) in &groups {
        if rows.len() < 2 {
            continue;
        }

        let conflicting = conflicting_fields(output, rows, &compared);
        if conflicting.is_empty() {
            debug!(key, collapsed = rows.len() - 1, "identical duplicates collapsed");
            drop_rows.extend(rows[1..].iter().copied());
            continue;
        }

        let policy = resolve_policy(key, &conflicting, mode, store, prompter)?;
        match policy {
            DuplicatePolicy::Abort => {
                return Err(ConvertError::DuplicateConflict((*key).to_string()));
            }
            DuplicatePolicy::Suffix => {
                for (ordinal, row) in rows[1..].iter().enumerate() {
                    let suffixed = format!("{key}_{}", ordinal + 2);
                    output.set(*row, key_field, suffixed);
                }
            }
            DuplicatePolicy::KeepFirst => {
                drop_rows.extend(rows[1..].iter().copied());
            }
            DuplicatePolicy::Merge => {
                merge_group(output, rows, &compared, &conflicting, key, report);
                drop_rows.extend(rows[1..].iter().copied());
            }
        }
    }

    drop_rows.sort_unstable();
    for row in drop_rows.into_iter().rev() {
        output.remove_row(row);
    }
    Ok(())
}

/// Columns with more than one distinct non-empty value across the group.
fn conflicting_fields(output: &OutputTable, rows: &[usize], compared: &[String]) -> Vec<String> {
    compared
        .iter()
        .filter(|name| {
            let mut distinct: Vec<&str> = Vec::new();
            for row in rows {
                let value = output.get(*row, name).unwrap_or("");
                if !value.is_empty() && !distinct.contains(&value) {
                    distinct.push(value);
                }
            }
            distinct.len() > 1
        })
        .cloned()
        .collect()
}

fn resolve_policy<P: Prompter>(
    key: &str,
    conflicting: &[String],
    mode: Mode,
    store: &mut ResolutionStore,
    prompter: &P,
) -> Result<DuplicatePolicy, ConvertError> {
    let config_key = format!("duplicate_policy_{}", conflict_shape_hash(conflicting));
    if let Some(Answer::Value(saved)) = store.get(mode, &config_key) {
        if let Some(policy) = DuplicatePolicy::parse(saved) {
            debug!(key, policy = policy.as_str(), "duplicate policy from config");
            return Ok(policy);
        }
    }

    let question = format!(
        "Rows sharing key '{key}' differ in: {}. Keep all with a suffix, keep the first, \
         merge, or abort?",
        conflicting.join(", ")
    );
    let answer = prompter.ask(&question, &["suffix", "first", "merge", "abort"])?;
    let policy = DuplicatePolicy::parse(&answer)
        .ok_or_else(|| ConvertError::Prompt(format!("unexpected policy answer: {answer}")))?;
    store.set(mode, &config_key, Answer::Value(policy.as_str().to_string()));
    Ok(policy)
}

/// Field-set hash: the policy key depends on which columns conflict, not
/// on their values, so equivalent conflicts in later runs resolve without
/// a prompt.
fn conflict_shape_hash(conflicting: &[String]) -> String {
    let mut sorted = conflicting.to_vec();
    sorted.sort();
    let mut hasher = Sha256::new();
    for field in &sorted {
        hasher.update(field.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(&hasher.finalize()[..6])
}

fn merge_group(
    output: &mut OutputTable,
    rows: &[usize],
    compared: &[String],
    conflicting: &[String],
    key: &str,
    report: &mut RunReport,
) {
    let first = rows[0];
    for name in compared {
        if conflicting.contains(name) {
            let kept = output.get(first, name).unwrap_or("").to_string();
            let dropped = rows[1..]
                .iter()
                .filter_map(|row| output.get(*row, name))
                .filter(|value| !value.is_empty() && *value != kept)
                .map(String::from)
                .collect::<Vec<_>>();
            if !dropped.is_empty() {
                report.push(RunWarning::MergeConflict {
                    key: key.to_string(),
                    field: name.clone(),
                    dropped,
                });
            }
        } else if output.get(first, name).is_some_and(str::is_empty) {
            // fill the kept row's gaps from the others
            let fill = rows[1..]
                .iter()
                .filter_map(|row| output.get(*row, name))
                .find(|value| !value.is_empty())
                .map(String::from);
            if let Some(value) = fill {
                output.set(first, name, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::prompt::testing::{ScriptedPrompter, SilentPrompter};

    fn output(rows: &[(&str, &str, &str)]) -> (OutputTable, Vec<String>) {
        let mut table = OutputTable::new(vec![
            "*sample_name".to_string(),
            "*depth".to_string(),
            "description".to_string(),
        ]);
        let mut keys = Vec::new();
        for (name, depth, desc) in rows {
            table
                .push_row(vec![
                    (*name).to_string(),
                    (*depth).to_string(),
                    (*desc).to_string(),
                ])
                .unwrap();
            keys.push((*name).to_string());
        }
        (table, keys)
    }

    const EXCLUDE: &[&str] = &["*sample_name", "description"];

    #[test]
    fn identical_rows_collapse_without_prompt() {
        let (mut table, keys) = output(&[
            ("S1", "10 m", "a"),
            ("S1", "10 m", "b"),
            ("S2", "20 m", ""),
        ]);
        let mut store = ResolutionStore::load(None).unwrap();
        let mut report = RunReport::new();

        reconcile(
            &mut table,
            &keys,
            "*sample_name",
            EXCLUDE,
            Mode::BioSamples,
            &mut store,
            &SilentPrompter,
            &mut report,
        )
        .unwrap();

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.get(0, "*sample_name"), Some("S1"));
        assert_eq!(table.get(1, "*sample_name"), Some("S2"));
    }

    #[test]
    fn conflicting_rows_ask_for_policy_and_record_it() {
        let (mut table, keys) = output(&[("S1", "10 m", ""), ("S1", "30 m", "")]);
        let mut store = ResolutionStore::load(None).unwrap();
        let mut report = RunReport::new();

        let prompter = ScriptedPrompter::new(&["suffix"]);
        reconcile(
            &mut table,
            &keys,
            "*sample_name",
            EXCLUDE,
            Mode::BioSamples,
            &mut store,
            &prompter,
            &mut report,
        )
        .unwrap();

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.get(1, "*sample_name"), Some("S1_2"));

        // same conflict shape again: policy comes from config
        let (mut table, keys) = output(&[("S9", "1 m", ""), ("S9", "2 m", "")]);
        reconcile(
            &mut table,
            &keys,
            "*sample_name",
            EXCLUDE,
            Mode::BioSamples,
            &mut store,
            &SilentPrompter,
            &mut report,
        )
        .unwrap();
        assert_eq!(table.get(1, "*sample_name"), Some("S9_2"));
    }

    #[test]
    fn abort_policy_is_fatal() {
        let (mut table, keys) = output(&[("S1", "10 m", ""), ("S1", "30 m", "")]);
        let mut store = ResolutionStore::load(None).unwrap();
        let mut report = RunReport::new();

        let prompter = ScriptedPrompter::new(&["abort"]);
        let err = reconcile(
            &mut table,
            &keys,
            "*sample_name",
            EXCLUDE,
            Mode::BioSamples,
            &mut store,
            &prompter,
            &mut report,
        )
        .unwrap_err();
        assert_matches!(err, ConvertError::DuplicateConflict(key) if key == "S1");
    }

    #[test]
    fn merge_fills_gaps_and_flags_conflicts() {
        let mut table = OutputTable::new(vec![
            "*sample_name".to_string(),
            "*depth".to_string(),
            "ph".to_string(),
        ]);
        table
            .push_row(vec!["S1".to_string(), "10 m".to_string(), String::new()])
            .unwrap();
        table
            .push_row(vec!["S1".to_string(), "30 m".to_string(), "7.9".to_string()])
            .unwrap();
        let keys = vec!["S1".to_string(), "S1".to_string()];
        let mut store = ResolutionStore::load(None).unwrap();
        let mut report = RunReport::new();

        let prompter = ScriptedPrompter::new(&["merge"]);
        reconcile(
            &mut table,
            &keys,
            "*sample_name",
            &["*sample_name"],
            Mode::BioSamples,
            &mut store,
            &prompter,
            &mut report,
        )
        .unwrap();

        assert_eq!(table.row_count(), 1);
        assert_eq!(table.get(0, "*depth"), Some("10 m"));
        assert_eq!(table.get(0, "ph"), Some("7.9"));
        assert_matches!(
            &report.warnings[..],
            [RunWarning::MergeConflict { field, dropped, .. }]
                if field == "*depth" && dropped == &vec!["30 m".to_string()]
        );
    }

    #[test]
    fn distinct_keys_untouched() {
        let (mut table, keys) = output(&[("S1", "10 m", ""), ("S2", "10 m", "")]);
        let mut store = ResolutionStore::load(None).unwrap();
        let mut report = RunReport::new();

        reconcile(
            &mut table,
            &keys,
            "*sample_name",
            EXCLUDE,
            Mode::BioSamples,
            &mut store,
            &SilentPrompter,
            &mut report,
        )
        .unwrap();
        assert_eq!(table.row_count(), 2);
    }
}
