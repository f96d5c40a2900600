use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::Mode;
use crate::error::ConvertError;
use crate::prompt::{Prompter, confirm};

/// One recorded resolution decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    /// A literal value used for every row.
    Value(String),
    /// A source column to map the field from.
    Column { column: String },
    /// Row-dependent values keyed by a grouping column's values.
    Grouped {
        group_by: String,
        values: BTreeMap<String, String>,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolutionConfig {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub date_time: String,
    #[serde(default)]
    pub answers: BTreeMap<String, BTreeMap<String, Answer>>,
}

/// Owns the config artifact: loads prior answers, collects new ones during
/// the run, and writes a fresh file derived from the output name. The file
/// passed in as input is never written.
#[derive(Debug, Clone)]
pub struct ResolutionStore {
    input_path: Option<Utf8PathBuf>,
    config: ResolutionConfig,
}

impl ResolutionStore {
    pub fn load(path: Option<&Utf8Path>) -> Result<Self, ConvertError> {
        let config = match path {
            Some(path) => {
                let content = fs::read_to_string(path.as_std_path())
                    .map_err(|_| ConvertError::ConfigRead(path.to_path_buf()))?;
                serde_yaml::from_str(&content)
                    .map_err(|err| ConvertError::ConfigParse(err.to_string()))?
            }
            None => ResolutionConfig::default(),
        };
        Ok(Self {
            input_path: path.map(Utf8Path::to_path_buf),
            config,
        })
    }

    /// Record run provenance in the artifact.
    pub fn stamp(&mut self, command: String) {
        self.config.command = command;
        self.config.date_time = chrono::Utc::now().to_rfc3339();
    }

    pub fn get(&self, mode: Mode, field: &str) -> Option<&Answer> {
        self.config.answers.get(mode.as_str())?.get(field)
    }

    pub fn set(&mut self, mode: Mode, field: &str, answer: Answer) {
        self.config
            .answers
            .entry(mode.as_str().to_string())
            .or_default()
            .insert(field.to_string(), answer);
    }

    /// Config path derived from the output path: same directory and stem,
    /// `_config.yaml` suffix.
    pub fn derived_path(output: &Utf8Path) -> Utf8PathBuf {
        let stem = output.file_stem().unwrap_or("output");
        match output.parent() {
            Some(parent) if !parent.as_str().is_empty() => {
                parent.join(format!("{stem}_config.yaml"))
            }
            _ => Utf8PathBuf::from(format!("{stem}_config.yaml")),
        }
    }

    /// Run the `save` checks up front, before any processing: the derived
    /// path must not be the input config, and an existing file needs the
    /// user's go-ahead unless `force` is set. Keeps fatal outcomes ahead
    /// of any output write.
    pub fn preflight<P: Prompter>(
        &self,
        output: &Utf8Path,
        force: bool,
        prompter: &P,
    ) -> Result<(), ConvertError> {
        let target = Self::derived_path(output);
        if let Some(input) = &self.input_path {
            if same_file(input.as_std_path(), target.as_std_path()) {
                return Err(ConvertError::ConfigCollision(target));
            }
        }
        if target.as_std_path().exists() && !force {
            let overwrite = confirm(
                prompter,
                &format!("Configuration file '{target}' already exists. Overwrite?"),
                false,
            )?;
            if !overwrite {
                return Err(ConvertError::ConfigConflict(target));
            }
        }
        Ok(())
    }

    /// Write the artifact next to `output`. Refuses the input config's own
    /// path, and confirms before replacing an existing file unless `force`
    /// is set. Returns the path written.
    pub fn save<P: Prompter>(
        &self,
        output: &Utf8Path,
        force: bool,
        prompter: &P,
    ) -> Result<Utf8PathBuf, ConvertError> {
        let target = Self::derived_path(output);

        if let Some(input) = &self.input_path {
            if same_file(input.as_std_path(), target.as_std_path()) {
                return Err(ConvertError::ConfigCollision(target));
            }
        }

        if target.as_std_path().exists() && !force {
            let overwrite = confirm(
                prompter,
                &format!("Configuration file '{target}' already exists. Overwrite?"),
                false,
            )?;
            if !overwrite {
                return Err(ConvertError::ConfigConflict(target));
            }
        }

        let content = serde_yaml::to_string(&self.config)
            .map_err(|err| ConvertError::ConfigParse(err.to_string()))?;
        write_atomic(&target, content.as_bytes())?;
        Ok(target)
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn write_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), ConvertError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| ConvertError::Filesystem(err.to_string()))?;
    let temp = tempfile::Builder::new()
        .prefix("faire2ncbi-config")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| ConvertError::Filesystem(err.to_string()))?;
    fs::write(temp.path(), content).map_err(|err| ConvertError::Filesystem(err.to_string()))?;
    if path.as_std_path().exists() {
        fs::remove_file(path.as_std_path())
            .map_err(|err| ConvertError::Filesystem(err.to_string()))?;
    }
    temp.persist(path.as_std_path())
        .map_err(|err| ConvertError::Filesystem(err.to_string()))?;
    Ok(())
}
