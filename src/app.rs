use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::info;

use crate::biosample::{self, BioSampleJob};
use crate::domain::{BioprojectAccession, Mode};
use crate::error::ConvertError;
use crate::prompt::{Prompter, confirm};
use crate::report::RunReport;
use crate::sra::{self, SraJob};
use crate::store::ResolutionStore;
use crate::table::{ProjectMetadata, SourceTable};
use crate::template;

#[derive(Debug, Clone)]
pub struct BioSampleArgs {
    pub faire_metadata: Utf8PathBuf,
    pub template: Utf8PathBuf,
    pub output: Utf8PathBuf,
    pub bioproject: Option<BioprojectAccession>,
    pub config_file: Option<Utf8PathBuf>,
    pub force: bool,
    pub command: String,
}

#[derive(Debug, Clone)]
pub struct SraArgs {
    pub faire_metadata: Utf8PathBuf,
    pub sample_metadata: Option<Utf8PathBuf>,
    pub project_metadata: Option<Utf8PathBuf>,
    pub template: Utf8PathBuf,
    pub output: Utf8PathBuf,
    pub config_file: Option<Utf8PathBuf>,
    pub force: bool,
    pub command: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvertResult {
    pub mode: Mode,
    pub rows: usize,
    pub columns: usize,
    pub output_path: String,
    pub config_path: String,
    pub warnings: usize,
}

pub struct App<P: Prompter> {
    prompter: P,
}

impl<P: Prompter> App<P> {
    pub fn new(prompter: P) -> Self {
        Self { prompter }
    }

    pub fn convert_biosamples(&self, args: &BioSampleArgs) -> Result<ConvertResult, ConvertError> {
        let mut store = ResolutionStore::load(args.config_file.as_deref())?;
        store.stamp(args.command.clone());
        self.preflight(&store, &args.output, args.force, args.config_file.is_some())?;

        let source = SourceTable::read_tsv(&args.faire_metadata)?;
        let schema = template::read_biosample_template(&args.template)?;
        info!(
            rows = source.row_count(),
            fields = schema.fields.len(),
            "loaded FAIRe metadata and MIMARKS template"
        );

        let mut report = RunReport::new();
        let job = BioSampleJob {
            source: &source,
            schema: &schema,
            bioproject: args.bioproject.as_ref(),
        };
        let output = biosample::assemble(&job, &mut store, &self.prompter, &mut report)?;

        // resolution is complete; both writes happen only now
        output.write_tsv(&args.output, &schema.preamble)?;
        let config_path = store.save(&args.output, true, &self.prompter)?;
        report.emit();
        info!(path = %args.output, rows = output.row_count(), "wrote BioSample metadata");

        Ok(ConvertResult {
            mode: Mode::BioSamples,
            rows: output.row_count(),
            columns: output.column_names().len(),
            output_path: args.output.to_string(),
            config_path: config_path.to_string(),
            warnings: report.warnings.len(),
        })
    }

    pub fn convert_sra(&self, args: &SraArgs) -> Result<ConvertResult, ConvertError> {
        let mut store = ResolutionStore::load(args.config_file.as_deref())?;
        store.stamp(args.command.clone());
        self.preflight(&store, &args.output, args.force, args.config_file.is_some())?;

        let experiments = SourceTable::read_tsv(&args.faire_metadata)?;
        let samples = args
            .sample_metadata
            .as_deref()
            .map(SourceTable::read_tsv)
            .transpose()?;
        let project = args
            .project_metadata
            .as_deref()
            .map(ProjectMetadata::read_tsv)
            .transpose()?;
        let schema = template::read_sra_template(&args.template)?;
        info!(
            rows = experiments.row_count(),
            fields = schema.fields.len(),
            "loaded experiment metadata and SRA template"
        );

        let mut report = RunReport::new();
        let job = SraJob {
            experiments: &experiments,
            samples: samples.as_ref(),
            project: project.as_ref(),
            schema: &schema,
        };
        let output = sra::assemble(&job, &mut store, &self.prompter, &mut report)?;

        output.write_tsv(&args.output, &schema.preamble)?;
        let config_path = store.save(&args.output, true, &self.prompter)?;
        report.emit();
        info!(path = %args.output, rows = output.row_count(), "wrote SRA metadata");

        Ok(ConvertResult {
            mode: Mode::Sra,
            rows: output.row_count(),
            columns: output.column_names().len(),
            output_path: args.output.to_string(),
            config_path: config_path.to_string(),
            warnings: report.warnings.len(),
        })
    }

    /// All overwrite questions come before any input is read, so a fatal
    /// answer leaves nothing half-done. Supplying a config file implies
    /// the output may be rewritten without asking.
    fn preflight(
        &self,
        store: &ResolutionStore,
        output: &camino::Utf8Path,
        force: bool,
        config_supplied: bool,
    ) -> Result<(), ConvertError> {
        if output.as_std_path().exists() && !force && !config_supplied {
            let overwrite = confirm(
                &self.prompter,
                &format!("File '{output}' already exists. Overwrite?"),
                false,
            )?;
            if !overwrite {
                return Err(ConvertError::Aborted(format!(
                    "output file {output} not overwritten"
                )));
            }
        }
        store.preflight(output, force || config_supplied, &self.prompter)
    }
}
