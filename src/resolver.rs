use std::collections::BTreeMap;

use tracing::debug;

use crate::domain::{Mode, Resolution, TargetField};
use crate::error::ConvertError;
use crate::fuzzy::{FuzzyMatcher, MatchCandidate};
use crate::prompt::Prompter;
use crate::report::{RunReport, RunWarning};
use crate::store::{Answer, ResolutionStore};
use crate::table::SourceTable;

/// A fixed mapping rule for one target field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingRule {
    /// Copy from this source column.
    Column(&'static str),
    /// Combine two source columns (the lat/lon case).
    Pair(&'static str, &'static str),
    /// Known field with no source counterpart; filled by a later step or
    /// left empty.
    Skip,
}

/// Resolves target fields through the priority chain: hardcoded rule →
/// recorded config answer → fuzzy match → interactive prompt → default.
/// Every decision that reached the prompt (or was accepted from a fuzzy
/// match) is recorded, so a rerun with the produced config asks nothing.
pub struct FieldResolver<'a, P: Prompter> {
    mode: Mode,
    source: &'a SourceTable,
    rules: &'a [(&'static str, MappingRule)],
    matcher: FuzzyMatcher,
    store: &'a mut ResolutionStore,
    prompter: &'a P,
    report: &'a mut RunReport,
}

impl<'a, P: Prompter> FieldResolver<'a, P> {
    pub fn new(
        mode: Mode,
        source: &'a SourceTable,
        rules: &'a [(&'static str, MappingRule)],
        matcher: FuzzyMatcher,
        store: &'a mut ResolutionStore,
        prompter: &'a P,
        report: &'a mut RunReport,
    ) -> Self {
        Self {
            mode,
            source,
            rules,
            matcher,
            store,
            prompter,
            report,
        }
    }

    /// Resolve one field's mapping. Returns `Unset` when no strategy
    /// produced an answer; mandatory handling happens in `fill_mandatory`
    /// once the assembled column is known to be empty.
    pub fn resolve(&mut self, field: &TargetField) -> Result<Resolution, ConvertError> {
        if let Some(resolution) = self.from_rules(field) {
            debug!(field = %field.name, "resolved from hardcoded rule");
            return Ok(resolution);
        }
        if let Some(resolution) = self.from_config(field) {
            debug!(field = %field.name, "resolved from config");
            return Ok(resolution);
        }
        self.from_fuzzy_or_prompt(field)
    }

    /// Step 1: the fixed rule table. Terminal when the rule applies to
    /// this source table.
    fn from_rules(&self, field: &TargetField) -> Option<Resolution> {
        let rule = self
            .rules
            .iter()
            .find(|(name, _)| *name == field.name)
            .map(|(_, rule)| rule)?;
        match rule {
            MappingRule::Column(column) if self.source.has_column(column) => {
                Some(Resolution::Column((*column).to_string()))
            }
            MappingRule::Pair(a, b)
                if self.source.has_column(a) && self.source.has_column(b) =>
            {
                Some(Resolution::ColumnPair((*a).to_string(), (*b).to_string()))
            }
            MappingRule::Skip => Some(Resolution::Unset),
            // Rule names a column this table does not have; let the rest
            // of the chain look for it.
            _ => None,
        }
    }

    /// Step 2: a prior answer from the config artifact.
    fn from_config(&self, field: &TargetField) -> Option<Resolution> {
        match self.store.get(self.mode, &field.name)? {
            Answer::Value(value) => Some(Resolution::Literal(value.clone())),
            Answer::Column { column } if self.source.has_column(column) => {
                Some(Resolution::Column(column.clone()))
            }
            Answer::Column { .. } => None,
            Answer::Grouped { group_by, values } => Some(Resolution::Grouped {
                key_column: group_by.clone(),
                values: values.clone(),
            }),
        }
    }

    /// Steps 3 and 4: fuzzy match, escalating to the prompt on ambiguity
    /// or (for mandatory fields) on no match at all.
    fn from_fuzzy_or_prompt(&mut self, field: &TargetField) -> Result<Resolution, ConvertError> {
        let ranked = self.matcher.rank(field.bare_name(), self.source.column_names());

        if let Some(winner) = self.matcher.unambiguous(&ranked) {
            debug!(field = %field.name, column = %winner.name, score = winner.score,
                "resolved from fuzzy match");
            let resolution = Resolution::Column(winner.name.clone());
            self.store.set(
                self.mode,
                &field.name,
                Answer::Column {
                    column: winner.name.clone(),
                },
            );
            return Ok(resolution);
        }

        // A sub-threshold single match or several matches both escalate;
        // only a required field with no candidates at all is worth asking
        // about cold.
        if !ranked.is_empty() {
            if ranked.len() > 1 {
                self.report.push(RunWarning::AmbiguousMatch {
                    field: field.name.clone(),
                    candidates: ranked.iter().map(|c| c.name.clone()).collect(),
                });
            }
            return self.prompt_mapping(field, &ranked);
        }
        if field.required {
            return self.prompt_mapping(field, &ranked);
        }

        Ok(Resolution::Unset)
    }

    fn prompt_mapping(
        &mut self,
        field: &TargetField,
        candidates: &[MatchCandidate],
    ) -> Result<Resolution, ConvertError> {
        let mut question = format!("Select source for '{}'.", field.name);
        if !candidates.is_empty() {
            let listed = candidates
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{}. {} ({:.2})", i + 1, c.name, c.score))
                .collect::<Vec<_>>()
                .join("  ");
            question.push_str(&format!(" Candidates: {listed}."));
        }
        question.push_str(" Enter a number, a column name, a literal value, or leave blank to skip");

        let answer = self.prompter.ask(&question, &[])?;
        let answer = answer.trim().to_string();

        if answer.is_empty() {
            return Ok(Resolution::Unset);
        }
        if let Ok(index) = answer.parse::<usize>() {
            if index >= 1 && index <= candidates.len() {
                let column = candidates[index - 1].name.clone();
                self.store.set(
                    self.mode,
                    &field.name,
                    Answer::Column {
                        column: column.clone(),
                    },
                );
                return Ok(Resolution::Column(column));
            }
        }
        if self.source.has_column(&answer) {
            self.store.set(
                self.mode,
                &field.name,
                Answer::Column {
                    column: answer.clone(),
                },
            );
            return Ok(Resolution::Column(answer));
        }

        self.store
            .set(self.mode, &field.name, Answer::Value(answer.clone()));
        Ok(Resolution::Literal(answer))
    }

    /// Step 5 for mandatory fields whose assembled column came out empty:
    /// offer the NCBI fill phrases, record the choice, and fail the run
    /// when the answer is blank.
    pub fn fill_mandatory(&mut self, field: &TargetField) -> Result<String, ConvertError> {
        if let Some(Answer::Value(value)) = self.store.get(self.mode, &field.name) {
            return Ok(value.clone());
        }
        let question = format!(
            "Column '{}' is empty. Fill it with 'not collected', 'not applicable', or \
             'missing'? (Or enter any other value; leave blank to abort)",
            field.name
        );
        let answer = self.prompter.ask(&question, &[])?;
        let answer = answer.trim().to_string();
        if answer.is_empty() {
            return Err(ConvertError::MissingRequiredField(field.name.clone()));
        }
        self.store
            .set(self.mode, &field.name, Answer::Value(answer.clone()));
        Ok(answer)
    }

    /// Row-dependent resolution: one value per distinct key in
    /// `key_column`, each obtained config-first then prompted, recorded
    /// as a single grouped answer.
    pub fn resolve_grouped(
        &mut self,
        field: &TargetField,
        key_column: &str,
    ) -> Result<Resolution, ConvertError> {
        let mut values = match self.store.get(self.mode, &field.name) {
            Some(Answer::Grouped { group_by, values }) if group_by == key_column => {
                values.clone()
            }
            _ => BTreeMap::new(),
        };

        for key in self.source.distinct_values(key_column) {
            if values.contains_key(&key) {
                continue;
            }
            let question = format!(
                "Enter {} for '{}' = '{}'",
                field.bare_name(),
                key_column,
                key
            );
            let answer = self.prompter.ask(&question, &[])?;
            values.insert(key, answer.trim().to_string());
        }

        self.store.set(
            self.mode,
            &field.name,
            Answer::Grouped {
                group_by: key_column.to_string(),
                values: values.clone(),
            },
        );
        Ok(Resolution::Grouped {
            key_column: key_column.to_string(),
            values,
        })
    }
}

/// Columns suitable for grouping samples: 2–20 distinct values covering at
/// least half the rows. Sorted by distinct count, then name, so the listing
/// is reproducible.
pub fn grouping_candidates(source: &SourceTable) -> Vec<String> {
    let rows = source.row_count();
    let mut candidates = source
        .column_names()
        .iter()
        .filter_map(|name| {
            let distinct = source.distinct_values(name).len();
            let coverage = source.non_empty_count(name);
            let suitable = (2..=20).contains(&distinct)
                && rows > 0
                && coverage * 2 >= rows;
            suitable.then(|| (distinct, name.clone()))
        })
        .collect::<Vec<_>>();
    candidates.sort();
    candidates.into_iter().map(|(_, name)| name).collect()
}
