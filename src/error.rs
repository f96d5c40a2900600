use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ConvertError {
    #[error("mandatory field '{0}' has no resolution path")]
    MissingRequiredField(String),

    #[error("non-numeric value '{value}' in mandatory numeric field '{field}' (row {row})")]
    TypeMismatch {
        field: String,
        row: usize,
        value: String,
    },

    #[error("unresolved duplicates under key '{0}': aborted")]
    DuplicateConflict(String),

    #[error("config file {0} already exists")]
    ConfigConflict(Utf8PathBuf),

    #[error("derived config path {0} collides with the input config file")]
    ConfigCollision(Utf8PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse config file: {0}")]
    ConfigParse(String),

    #[error("failed to read template at {0}")]
    TemplateRead(Utf8PathBuf),

    #[error("invalid template: {0}")]
    TemplateParse(String),

    #[error("failed to read metadata table at {0}: {1}")]
    TableRead(Utf8PathBuf, String),

    #[error("malformed metadata table: {0}")]
    TableParse(String),

    #[error("required column '{0}' not found in source table")]
    MissingColumn(String),

    #[error("invalid bioproject accession: {0}")]
    InvalidBioproject(String),

    #[error("invalid unit '{0}': use letters, digits, /, %, °, µ, parentheses and spaces")]
    InvalidUnit(String),

    #[error("no assay names found in source table")]
    NoAssays,

    #[error("prompt failed: {0}")]
    Prompt(String),

    #[error("aborted by user: {0}")]
    Aborted(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
