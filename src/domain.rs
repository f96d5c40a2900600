use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConvertError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    BioSamples,
    Sra,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::BioSamples => "BioSamples",
            Mode::Sra => "SRA",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single spreadsheet cell. Source tables are string/number/empty only;
/// anything the sheet renders as `nan` or whitespace loads as `Empty`.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn parse(raw: &str) -> Cell {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
            return Cell::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() => Cell::Number(value),
            _ => Cell::Text(trimmed.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn text(value: &str) -> Cell {
        Cell::Text(value.to_string())
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(value) => write!(f, "{value}"),
            Cell::Number(value) => {
                if value.fract() == 0.0 && value.abs() < 1e15 {
                    write!(f, "{}", *value as i64)
                } else {
                    write!(f, "{value}")
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BioprojectAccession(String);

impl BioprojectAccession {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BioprojectAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BioprojectAccession {
    type Err = ConvertError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let digits = normalized
            .strip_prefix("PRJNA")
            .or_else(|| normalized.strip_prefix("PRJEB"))
            .or_else(|| normalized.strip_prefix("PRJDB"));
        let is_valid = digits
            .map(|rest| !rest.is_empty() && rest.chars().all(|ch| ch.is_ascii_digit()))
            .unwrap_or(false);
        if !is_valid {
            return Err(ConvertError::InvalidBioproject(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Numeric,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetField {
    pub name: String,
    pub required: bool,
    pub expected_type: FieldType,
    pub unit_required: bool,
}

impl TargetField {
    /// Field name without the MIMARKS `*` mandatory marker.
    pub fn bare_name(&self) -> &str {
        self.name.trim_start_matches('*')
    }

    pub fn is_bioproject_accession(&self) -> bool {
        let normalized: String = self
            .bare_name()
            .chars()
            .filter(|ch| *ch != '_')
            .collect::<String>()
            .to_lowercase();
        normalized == "bioprojectaccession"
    }
}

/// Ordered field list for one submission mode, plus the comment lines the
/// template carries above its header (replayed verbatim into the output).
#[derive(Debug, Clone, Default)]
pub struct TargetSchema {
    pub fields: Vec<TargetField>,
    pub preamble: Vec<String>,
}

impl TargetSchema {
    pub fn field(&self, name: &str) -> Option<&TargetField> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.fields.iter().map(|field| field.name.clone()).collect()
    }
}

/// How one target field obtains its value. Fixed per run; `Grouped` is the
/// row-dependent case (one value per distinct grouping-key value).
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Literal(String),
    Column(String),
    ColumnPair(String, String),
    Grouped {
        key_column: String,
        values: BTreeMap<String, String>,
    },
    Unset,
}
