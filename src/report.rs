use serde::Serialize;
use tracing::warn;

/// Recoverable row-level findings, collected during the run and reported
/// in aggregate once processing finishes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunWarning {
    TypeMismatch {
        field: String,
        row: usize,
        value: String,
    },
    AmbiguousMatch {
        field: String,
        candidates: Vec<String>,
    },
    UnknownFiletype {
        row: usize,
        filename: String,
    },
    MergeConflict {
        key: String,
        field: String,
        dropped: Vec<String>,
    },
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct RunReport {
    pub warnings: Vec<RunWarning>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, warning: RunWarning) {
        self.warnings.push(warning);
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn type_mismatches(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, RunWarning::TypeMismatch { .. }))
            .count()
    }

    /// Log every collected warning through tracing, once, at run end.
    pub fn emit(&self) {
        for warning in &self.warnings {
            match warning {
                RunWarning::TypeMismatch { field, row, value } => {
                    warn!(%field, row, %value, "non-numeric value in numeric field");
                }
                RunWarning::AmbiguousMatch { field, candidates } => {
                    warn!(%field, ?candidates, "multiple fuzzy matches, escalated");
                }
                RunWarning::UnknownFiletype { row, filename } => {
                    warn!(row, %filename, "unrecognized file extension");
                }
                RunWarning::MergeConflict {
                    key,
                    field,
                    dropped,
                } => {
                    warn!(%key, %field, ?dropped, "merged duplicate dropped values");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_type_mismatches() {
        let mut report = RunReport::new();
        assert!(report.is_empty());
        report.push(RunWarning::TypeMismatch {
            field: "*depth".to_string(),
            row: 2,
            value: "deep".to_string(),
        });
        report.push(RunWarning::UnknownFiletype {
            row: 0,
            filename: "reads.xyz".to_string(),
        });
        assert_eq!(report.type_mismatches(), 1);
        assert_eq!(report.warnings.len(), 2);
    }
}
