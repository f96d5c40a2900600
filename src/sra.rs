use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::domain::{Mode, TargetSchema};
use crate::error::ConvertError;
use crate::fuzzy::FuzzyMatcher;
use crate::prompt::{Prompter, confirm};
use crate::report::{RunReport, RunWarning};
use crate::resolver::FieldResolver;
use crate::store::{Answer, ResolutionStore};
use crate::table::{OutputTable, ProjectMetadata, SourceTable};
use crate::dedup;

pub const ALLOWED_LIBRARY_STRATEGY: &[&str] = &[
    "WGA",
    "WGS",
    "WXS",
    "RNA-Seq",
    "miRNA-Seq",
    "WCS",
    "CLONE",
    "POOLCLONE",
    "AMPLICON",
    "CLONEEND",
    "FINISHING",
    "ChIP-Seq",
    "MNase-Seq",
    "DNase-Hypersensitivity",
    "Bisulfite-Seq",
    "Tn-Seq",
    "EST",
    "FL-cDNA",
    "CTS",
    "MRE-Seq",
    "MeDIP-Seq",
    "MBD-Seq",
    "Synthetic-Long-Read",
    "ATAC-seq",
    "ChIA-PET",
    "FAIRE-seq",
    "Hi-C",
    "ncRNA-Seq",
    "RAD-Seq",
    "RIP-Seq",
    "SELEX",
    "ssRNA-seq",
    "Targeted-Capture",
    "Tethered Chromatin Conformation Capture",
    "DIP-Seq",
    "GBS",
    "Inverse rRNA",
    "NOMe-Seq",
    "Ribo-seq",
    "VALIDATION",
    "OTHER",
];

pub const ALLOWED_LIBRARY_SOURCE: &[&str] = &[
    "GENOMIC",
    "TRANSCRIPTOMIC",
    "METAGENOMIC",
    "METATRANSCRIPTOMIC",
    "SYNTHETIC",
    "VIRAL RNA",
    "GENOMIC SINGLE CELL",
    "TRANSCRIPTOMIC SINGLE CELL",
    "OTHER",
];

pub const ALLOWED_LIBRARY_SELECTION: &[&str] = &[
    "RANDOM",
    "PCR",
    "RANDOM PCR",
    "RT-PCR",
    "HMPR",
    "MF",
    "CF-S",
    "CF-M",
    "CF-H",
    "CF-T",
    "MDA",
    "MSLL",
    "cDNA",
    "ChIP",
    "MNase",
    "DNAse",
    "Hybrid Selection",
    "Reduced Representation",
    "Restriction Digest",
    "5-methylcytidine antibody",
    "MBD2 protein methyl-CpG binding domain",
    "CAGE",
    "RACE",
    "size fractionation",
    "Padlock probes capture method",
    "other",
    "unspecified",
    "cDNA_oligo_dT",
    "cDNA_randomPriming",
    "Inverse rRNA",
    "Oligo-dT",
    "PolyA",
    "repeat fractionation",
];

pub const ALLOWED_PLATFORMS: &[&str] = &[
    "_LS454",
    "ABI_SOLID",
    "BGISEQ",
    "CAPILLARY",
    "COMPLETE_GENOMICS",
    "DNBSEQ",
    "ELEMENT",
    "GENAPSYS",
    "GENEMIND",
    "HELICOS",
    "ILLUMINA",
    "ION_TORRENT",
    "OXFORD_NANOPORE",
    "PACBIO_SMRT",
    "TAPESTRI",
    "ULTIMA",
    "VELA_DIAGNOSTICS",
];

/// Marker-gene amplicon assays sequence on Illumina in this pipeline; the
/// rule short-circuits every other platform source.
const MARKER_GENE_ASSAYS: &[&str] = &["16S", "18S", "12S", "COI", "ITS"];

const LIBRARY_FIELD_DEFAULTS: &[(&str, &str, &[&str])] = &[
    ("library_strategy", "AMPLICON", ALLOWED_LIBRARY_STRATEGY),
    ("library_source", "METAGENOMIC", ALLOWED_LIBRARY_SOURCE),
    ("library_selection", "PCR", ALLOWED_LIBRARY_SELECTION),
];

const DUPLICATE_EXCLUDE: &[&str] = &["library_ID", "title"];

pub struct SraJob<'a> {
    pub experiments: &'a SourceTable,
    pub samples: Option<&'a SourceTable>,
    pub project: Option<&'a ProjectMetadata>,
    pub schema: &'a TargetSchema,
}

/// One output row per experiment-run record (assay × sample), restricted
/// to the selected assays.
pub fn assemble<P: Prompter>(
    job: &SraJob<'_>,
    store: &mut ResolutionStore,
    prompter: &P,
    report: &mut RunReport,
) -> Result<OutputTable, ConvertError> {
    let mode = Mode::Sra;
    let experiments = job.experiments;
    experiments.require_column("lib_id")?;
    experiments.require_column("filename")?;
    experiments.require_column("assay_name")?;

    let assays = select_assays(experiments, mode, store, prompter)?;
    info!(assays = ?assays, "selected assays");

    let library_fields = resolve_library_fields(mode, store, prompter)?;

    let mut platforms = BTreeMap::new();
    let mut instrument_models = BTreeMap::new();
    for assay in &assays {
        platforms.insert(
            assay.clone(),
            resolve_platform(assay, job.project, mode, store, prompter)?,
        );
        instrument_models.insert(
            assay.clone(),
            resolve_instrument_model(assay, job.project, mode, store, prompter)?,
        );
    }

    let mut output = OutputTable::new(job.schema.column_names());
    let mut keys = Vec::new();
    for row in 0..experiments.row_count() {
        let assay = cell_text(experiments, row, "assay_name");
        if !assays.contains(&assay) {
            continue;
        }
        let cells = expand_row(
            job,
            row,
            &assay,
            &library_fields,
            &platforms,
            &instrument_models,
            mode,
            store,
            prompter,
            report,
        )?;
        let lib_id = cell_text(experiments, row, "lib_id");
        keys.push(format!("{lib_id}/{assay}"));
        output.push_row(cells)?;
    }
    info!(rows = output.row_count(), "expanded experiment runs");

    dedup::reconcile(
        &mut output,
        &keys,
        "library_ID",
        DUPLICATE_EXCLUDE,
        mode,
        store,
        prompter,
        report,
    )?;

    enforce_mandatory(&mut output, job, mode, store, prompter, report)?;

    Ok(output)
}

#[allow(clippy::too_many_arguments)]
fn expand_row<P: Prompter>(
    job: &SraJob<'_>,
    row: usize,
    assay: &str,
    library_fields: &BTreeMap<String, String>,
    platforms: &BTreeMap<String, String>,
    instrument_models: &BTreeMap<String, String>,
    mode: Mode,
    store: &mut ResolutionStore,
    prompter: &P,
    report: &mut RunReport,
) -> Result<Vec<String>, ConvertError> {
    let experiments = job.experiments;
    let lib_id = cell_text(experiments, row, "lib_id");
    let samp_name = cell_text(experiments, row, "samp_name");
    let filename = cell_text(experiments, row, "filename");
    let filename2 = cell_text(experiments, row, "filename2");

    let layout = match (!filename.is_empty(), !filename2.is_empty()) {
        (true, true) => "paired",
        (true, false) => "single",
        _ => "",
    };

    let filetype = resolve_filetype(&filename, &filename2, row, mode, store, prompter, report)?;
    let description = assay_description(assay, job.project);

    let mut cells = Vec::with_capacity(job.schema.fields.len());
    for field in &job.schema.fields {
        let value = match field.name.as_str() {
            "sample_name" => {
                if samp_name.is_empty() {
                    lib_id.clone()
                } else {
                    samp_name.clone()
                }
            }
            "library_ID" => lib_id.clone(),
            "title" => library_title(&lib_id, assay, &samp_name, job.samples),
            "library_layout" => layout.to_string(),
            "platform" => platforms.get(assay).cloned().unwrap_or_default(),
            "instrument_model" => instrument_models.get(assay).cloned().unwrap_or_default(),
            "filetype" => filetype.clone(),
            "filename" => filename.clone(),
            "filename2" => filename2.clone(),
            "description" | "design_description" => description.clone(),
            name => library_fields
                .get(name)
                .cloned()
                .or_else(|| {
                    experiments
                        .cell(row, name)
                        .map(|cell| cell.to_string())
                })
                .unwrap_or_default(),
        };
        cells.push(value);
    }
    Ok(cells)
}

fn cell_text(table: &SourceTable, row: usize, column: &str) -> String {
    table
        .cell(row, column)
        .map(|cell| cell.to_string().trim().to_string())
        .unwrap_or_default()
}

fn select_assays<P: Prompter>(
    experiments: &SourceTable,
    mode: Mode,
    store: &mut ResolutionStore,
    prompter: &P,
) -> Result<Vec<String>, ConvertError> {
    let available = experiments.distinct_values("assay_name");
    if available.is_empty() {
        return Err(ConvertError::NoAssays);
    }
    if available.len() == 1 {
        return Ok(available);
    }

    let selection = match store.get(mode, "selected_assays") {
        Some(Answer::Value(saved)) => saved.clone(),
        _ => {
            let choice = prompter.ask(
                &format!(
                    "Multiple assays found: {}. Use all assays or only specific ones?",
                    available.join(", ")
                ),
                &["all", "specific"],
            )?;
            let selection = if choice == "all" {
                "all".to_string()
            } else {
                prompter.ask("Enter assay names separated by commas", &[])?
            };
            store.set(mode, "selected_assays", Answer::Value(selection.clone()));
            selection
        }
    };

    if selection.trim().eq_ignore_ascii_case("all") {
        return Ok(available);
    }
    let selected = selection
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter(|name| available.iter().any(|assay| assay == name))
        .map(String::from)
        .collect::<Vec<_>>();
    if selected.is_empty() {
        return Err(ConvertError::NoAssays);
    }
    Ok(selected)
}

fn resolve_library_fields<P: Prompter>(
    mode: Mode,
    store: &mut ResolutionStore,
    prompter: &P,
) -> Result<BTreeMap<String, String>, ConvertError> {
    let mut resolved = BTreeMap::new();
    for (field, default, allowed) in LIBRARY_FIELD_DEFAULTS {
        let key = format!("library_field_{field}");
        let value = match store.get(mode, &key) {
            Some(Answer::Value(saved)) => saved.clone(),
            _ => {
                let choice = prompter.ask(
                    &format!("Use the default value '{default}' for {field}?"),
                    &["default", "other"],
                )?;
                let value = if choice == "default" {
                    (*default).to_string()
                } else {
                    let answer = prompter.ask(
                        &format!("Enter {field} value (number or term): {}", listed(allowed)),
                        &[],
                    )?;
                    pick_allowed(&answer, allowed).ok_or_else(|| {
                        ConvertError::Prompt(format!("'{answer}' is not a valid {field} value"))
                    })?
                };
                store.set(mode, &key, Answer::Value(value.clone()));
                value
            }
        };
        resolved.insert((*field).to_string(), value);
    }
    Ok(resolved)
}

fn listed(allowed: &[&str]) -> String {
    allowed
        .iter()
        .enumerate()
        .map(|(i, value)| format!("{}. {value}", i + 1))
        .collect::<Vec<_>>()
        .join("  ")
}

fn pick_allowed(answer: &str, allowed: &[&str]) -> Option<String> {
    let answer = answer.trim();
    if let Ok(index) = answer.parse::<usize>() {
        if index >= 1 && index <= allowed.len() {
            return Some(allowed[index - 1].to_string());
        }
        return None;
    }
    allowed
        .iter()
        .find(|value| value.eq_ignore_ascii_case(answer))
        .map(|value| (*value).to_string())
}

/// Fixed platform rule for marker-gene amplicon assays.
pub fn assay_platform_rule(assay: &str) -> Option<&'static str> {
    let normalized = assay.trim().to_uppercase();
    MARKER_GENE_ASSAYS
        .iter()
        .any(|marker| normalized == *marker || normalized.starts_with(&format!("{marker}_")))
        .then_some("ILLUMINA")
}

fn resolve_platform<P: Prompter>(
    assay: &str,
    project: Option<&ProjectMetadata>,
    mode: Mode,
    store: &mut ResolutionStore,
    prompter: &P,
) -> Result<String, ConvertError> {
    if let Some(platform) = assay_platform_rule(assay) {
        debug!(assay, platform, "platform from assay rule");
        return Ok(platform.to_string());
    }

    let key = format!("platform_{assay}");
    if let Some(Answer::Value(saved)) = store.get(mode, &key) {
        return Ok(saved.clone());
    }

    let assay_value = project.and_then(|p| p.assay_value("platform", assay));
    let project_value = project.and_then(|p| p.project_value("platform"));
    let platform = match (assay_value, project_value) {
        (Some(assay_value), Some(project_value)) if assay_value != project_value => {
            let choice = prompter.ask(
                &format!(
                    "Assay '{assay}' has platform '{assay_value}' but the project level says \
                     '{project_value}'. Which one do you want to use?"
                ),
                &["assay", "project"],
            )?;
            let chosen = if choice == "assay" {
                assay_value
            } else {
                project_value
            };
            store.set(mode, &key, Answer::Value(chosen.clone()));
            chosen
        }
        (Some(value), _) | (None, Some(value)) => value,
        (None, None) => {
            let answer = prompter.ask(
                &format!(
                    "No platform found for assay '{assay}'. Enter platform (number or name): {}",
                    listed(ALLOWED_PLATFORMS)
                ),
                &[],
            )?;
            let platform = pick_allowed(&answer, ALLOWED_PLATFORMS).ok_or_else(|| {
                ConvertError::Prompt(format!("'{answer}' is not a valid platform"))
            })?;
            store.set(mode, &key, Answer::Value(platform.clone()));
            platform
        }
    };
    Ok(platform)
}

fn resolve_instrument_model<P: Prompter>(
    assay: &str,
    project: Option<&ProjectMetadata>,
    mode: Mode,
    store: &mut ResolutionStore,
    prompter: &P,
) -> Result<String, ConvertError> {
    let key = format!("instrument_model_{assay}");
    if let Some(Answer::Value(saved)) = store.get(mode, &key) {
        return Ok(saved.clone());
    }

    let assay_value = project.and_then(|p| p.assay_value("seq_kit", assay));
    let project_value = project.and_then(|p| p.project_value("seq_kit"));
    let model = match (assay_value, project_value) {
        (Some(assay_value), Some(project_value)) if assay_value != project_value => {
            let choice = prompter.ask(
                &format!(
                    "Assay '{assay}' has instrument model '{assay_value}' but the project level \
                     says '{project_value}'. Which one do you want to use?"
                ),
                &["assay", "project"],
            )?;
            let chosen = if choice == "assay" {
                assay_value
            } else {
                project_value
            };
            store.set(mode, &key, Answer::Value(chosen.clone()));
            chosen
        }
        (Some(value), _) | (None, Some(value)) => value,
        (None, None) => {
            let manual = confirm(
                prompter,
                &format!(
                    "No instrument model found for assay '{assay}'. Do you want to add a value \
                     manually?"
                ),
                false,
            )?;
            let model = if manual {
                prompter.ask("Enter instrument model", &[])?.trim().to_string()
            } else {
                String::new()
            };
            store.set(mode, &key, Answer::Value(model.clone()));
            model
        }
    };
    Ok(model)
}

/// Exact extension → SRA filetype table; compression suffixes are stripped
/// before the lookup.
pub fn filetype_for_extension(filename: &str) -> Option<&'static str> {
    let mut name = filename.trim().to_lowercase();
    for compression in [".gz", ".bz2", ".zip"] {
        if let Some(stripped) = name.strip_suffix(compression) {
            name = stripped.to_string();
            break;
        }
    }
    let extension = name.rsplit_once('.').map(|(_, ext)| ext)?;
    match extension {
        "fastq" | "fq" => Some("fastq"),
        "bam" => Some("bam"),
        "srf" => Some("srf"),
        "sff" => Some("sff"),
        "h5" | "hdf5" => Some("PacBio_HDF5"),
        "fast5" => Some("OxfordNanopore_native"),
        "csfasta" | "qual" => Some("SOLiD_native"),
        "cif" | "cg" => Some("CompleteGenomics_native"),
        "hel" => Some("Helicos_native"),
        _ => None,
    }
}

fn resolve_filetype<P: Prompter>(
    filename: &str,
    filename2: &str,
    row: usize,
    mode: Mode,
    store: &mut ResolutionStore,
    prompter: &P,
    report: &mut RunReport,
) -> Result<String, ConvertError> {
    let checked = if filename.is_empty() { filename2 } else { filename };
    if checked.is_empty() {
        report.push(RunWarning::UnknownFiletype {
            row: row + 1,
            filename: String::new(),
        });
        return Ok(String::new());
    }
    if let Some(filetype) = filetype_for_extension(checked) {
        return Ok(filetype.to_string());
    }

    let extension = checked
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_else(|| "unknown".to_string());
    let key = format!("filetype_for_{extension}");
    if let Some(Answer::Value(saved)) = store.get(mode, &key) {
        return Ok(saved.clone());
    }

    report.push(RunWarning::UnknownFiletype {
        row: row + 1,
        filename: checked.to_string(),
    });
    let answer = prompter.ask(
        &format!("Unrecognized extension '.{extension}' ('{checked}'). Enter the SRA filetype"),
        &[],
    )?;
    let filetype = answer.trim().to_string();
    store.set(mode, &key, Answer::Value(filetype.clone()));
    Ok(filetype)
}

fn library_title(
    lib_id: &str,
    assay: &str,
    samp_name: &str,
    samples: Option<&SourceTable>,
) -> String {
    let fallback = format!("{lib_id}: {assay} metabarcoding");
    let Some(samples) = samples else {
        return fallback;
    };
    if samp_name.is_empty() {
        return fallback;
    }
    let Some(names) = samples.column("samp_name") else {
        return fallback;
    };
    let Some(row) = names.iter().position(|cell| cell.to_string() == samp_name) else {
        return fallback;
    };

    let lookup = |column: &str| {
        samples
            .cell(row, column)
            .map(|cell| cell.to_string())
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "NA".to_string())
    };
    format!(
        "{samp_name}: {assay} metabarcoding of {} in {}",
        lookup("organism"),
        lookup("geo_loc_name")
    )
}

fn assay_description(assay: &str, project: Option<&ProjectMetadata>) -> String {
    let lookup = |term: &str| {
        project
            .and_then(|p| p.assay_value(term, assay).or_else(|| p.project_value(term)))
            .unwrap_or_else(|| "NA".to_string())
    };
    format!(
        "Metabarcoding of {} gene {} region using PCR primers {} ({}) and {} ({}) using \
         protocol at {}",
        lookup("target_gene"),
        lookup("target_subfragment"),
        lookup("pcr_primer_name_forward"),
        lookup("pcr_primer_forward"),
        lookup("pcr_primer_name_reverse"),
        lookup("pcr_primer_reverse"),
        lookup("nucl_acid_amp"),
    )
}

/// Every mandatory SRA field must hold a value in every row: a fully empty
/// column gets one fill answer, a partially empty one fails the run.
fn enforce_mandatory<P: Prompter>(
    output: &mut OutputTable,
    job: &SraJob<'_>,
    mode: Mode,
    store: &mut ResolutionStore,
    prompter: &P,
    report: &mut RunReport,
) -> Result<(), ConvertError> {
    let mut resolver = FieldResolver::new(
        mode,
        job.experiments,
        &[],
        FuzzyMatcher::default(),
        store,
        prompter,
        report,
    );
    for field in &job.schema.fields {
        if !field.required || output.row_count() == 0 {
            continue;
        }
        let empty_rows = (0..output.row_count())
            .filter(|row| output.get(*row, &field.name).is_none_or(str::is_empty))
            .count();
        if empty_rows == output.row_count() {
            let fill = resolver.fill_mandatory(field)?;
            output.fill_column(&field.name, &fill);
        } else if empty_rows > 0 {
            return Err(ConvertError::MissingRequiredField(field.name.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::domain::Cell;
    use crate::prompt::testing::{ScriptedPrompter, SilentPrompter};
    use crate::template;

    fn schema() -> TargetSchema {
        template::sra_schema(vec![
            "sample_name".to_string(),
            "library_ID".to_string(),
            "title".to_string(),
            "library_strategy".to_string(),
            "library_source".to_string(),
            "library_selection".to_string(),
            "library_layout".to_string(),
            "platform".to_string(),
            "instrument_model".to_string(),
            "design_description".to_string(),
            "filetype".to_string(),
            "filename".to_string(),
            "filename2".to_string(),
        ])
    }

    fn experiments() -> SourceTable {
        SourceTable::from_columns(vec![
            (
                "lib_id".to_string(),
                vec![Cell::text("L1"), Cell::text("L2")],
            ),
            (
                "samp_name".to_string(),
                vec![Cell::text("S1"), Cell::text("S2")],
            ),
            (
                "assay_name".to_string(),
                vec![Cell::text("16S"), Cell::text("16S")],
            ),
            (
                "filename".to_string(),
                vec![Cell::text("L1_R1.fastq.gz"), Cell::text("L2_R1.fastq.gz")],
            ),
            (
                "filename2".to_string(),
                vec![Cell::text("L1_R2.fastq.gz"), Cell::Empty],
            ),
        ])
        .unwrap()
    }

    fn store_with_defaults() -> ResolutionStore {
        let mut store = ResolutionStore::load(None).unwrap();
        for (field, default, _) in LIBRARY_FIELD_DEFAULTS {
            store.set(
                Mode::Sra,
                &format!("library_field_{field}"),
                Answer::Value((*default).to_string()),
            );
        }
        store.set(
            Mode::Sra,
            "instrument_model_16S",
            Answer::Value("Illumina MiSeq".to_string()),
        );
        store
    }

    #[test]
    fn paired_and_single_layout_from_filenames() {
        let schema = schema();
        let experiments = experiments();
        let mut store = store_with_defaults();
        let mut report = RunReport::new();

        let job = SraJob {
            experiments: &experiments,
            samples: None,
            project: None,
            schema: &schema,
        };
        let output = assemble(&job, &mut store, &SilentPrompter, &mut report).unwrap();

        assert_eq!(output.row_count(), 2);
        assert_eq!(output.get(0, "library_layout"), Some("paired"));
        assert_eq!(output.get(1, "library_layout"), Some("single"));
        assert_eq!(output.get(0, "filetype"), Some("fastq"));
        assert_eq!(output.get(0, "library_strategy"), Some("AMPLICON"));
    }

    #[test]
    fn marker_gene_assay_never_prompts_for_platform() {
        let schema = schema();
        let experiments = experiments();
        // a recorded answer must not override the hardcoded rule
        let mut store = store_with_defaults();
        store.set(
            Mode::Sra,
            "platform_16S",
            Answer::Value("PACBIO_SMRT".to_string()),
        );
        let mut report = RunReport::new();

        let job = SraJob {
            experiments: &experiments,
            samples: None,
            project: None,
            schema: &schema,
        };
        let output = assemble(&job, &mut store, &SilentPrompter, &mut report).unwrap();
        assert_eq!(output.get(0, "platform"), Some("ILLUMINA"));
    }

    #[test]
    fn platform_conflict_prompts_assay_or_project() {
        let project = ProjectMetadata::new(
            SourceTable::from_columns(vec![
                (
                    "term_name".to_string(),
                    vec![Cell::text("platform"), Cell::text("seq_kit")],
                ),
                (
                    "project_level".to_string(),
                    vec![Cell::text("ILLUMINA"), Cell::text("Illumina MiSeq")],
                ),
                (
                    "LSU".to_string(),
                    vec![Cell::text("OXFORD_NANOPORE"), Cell::text("MinION")],
                ),
            ])
            .unwrap(),
        );
        let mut store = ResolutionStore::load(None).unwrap();

        let prompter = ScriptedPrompter::new(&["assay"]);
        let platform =
            resolve_platform("LSU", Some(&project), Mode::Sra, &mut store, &prompter).unwrap();
        assert_eq!(platform, "OXFORD_NANOPORE");

        // recorded: second resolution asks nothing
        let platform =
            resolve_platform("LSU", Some(&project), Mode::Sra, &mut store, &SilentPrompter)
                .unwrap();
        assert_eq!(platform, "OXFORD_NANOPORE");
    }

    #[test]
    fn filetype_table_and_prompt_fallback() {
        assert_eq!(filetype_for_extension("reads.fastq.gz"), Some("fastq"));
        assert_eq!(filetype_for_extension("reads.fq"), Some("fastq"));
        assert_eq!(filetype_for_extension("aln.bam"), Some("bam"));
        assert_eq!(filetype_for_extension("run.fast5"), Some("OxfordNanopore_native"));
        assert_eq!(filetype_for_extension("reads.xyz"), None);
        assert_eq!(filetype_for_extension("noextension"), None);

        let mut store = ResolutionStore::load(None).unwrap();
        let mut report = RunReport::new();
        let prompter = ScriptedPrompter::new(&["fastq"]);
        let filetype = resolve_filetype(
            "reads.xyz",
            "",
            0,
            Mode::Sra,
            &mut store,
            &prompter,
            &mut report,
        )
        .unwrap();
        assert_eq!(filetype, "fastq");
        assert_eq!(report.warnings.len(), 1);

        // same extension later in the run reuses the answer
        let filetype = resolve_filetype(
            "other.xyz",
            "",
            3,
            Mode::Sra,
            &mut store,
            &SilentPrompter,
            &mut report,
        )
        .unwrap();
        assert_eq!(filetype, "fastq");
    }

    #[test]
    fn library_title_uses_sample_metadata() {
        let samples = SourceTable::from_columns(vec![
            ("samp_name".to_string(), vec![Cell::text("S1")]),
            (
                "organism".to_string(),
                vec![Cell::text("seawater metagenome")],
            ),
            (
                "geo_loc_name".to_string(),
                vec![Cell::text("USA: Hawaii")],
            ),
        ])
        .unwrap();

        assert_eq!(
            library_title("L1", "16S", "S1", Some(&samples)),
            "S1: 16S metabarcoding of seawater metagenome in USA: Hawaii"
        );
        assert_eq!(
            library_title("L1", "16S", "S9", Some(&samples)),
            "L1: 16S metabarcoding"
        );
        assert_eq!(library_title("L1", "16S", "S1", None), "L1: 16S metabarcoding");
    }

    #[test]
    fn assay_selection_filters_rows() {
        let schema = schema();
        let experiments = SourceTable::from_columns(vec![
            (
                "lib_id".to_string(),
                vec![Cell::text("L1"), Cell::text("L2")],
            ),
            (
                "samp_name".to_string(),
                vec![Cell::text("S1"), Cell::text("S1")],
            ),
            (
                "assay_name".to_string(),
                vec![Cell::text("16S"), Cell::text("18S")],
            ),
            (
                "filename".to_string(),
                vec![Cell::text("L1.fastq"), Cell::text("L2.fastq")],
            ),
        ])
        .unwrap();
        let mut store = store_with_defaults();
        store.set(
            Mode::Sra,
            "selected_assays",
            Answer::Value("16S".to_string()),
        );
        store.set(
            Mode::Sra,
            "instrument_model_18S",
            Answer::Value(String::new()),
        );
        let mut report = RunReport::new();

        let job = SraJob {
            experiments: &experiments,
            samples: None,
            project: None,
            schema: &schema,
        };
        let output = assemble(&job, &mut store, &SilentPrompter, &mut report).unwrap();
        assert_eq!(output.row_count(), 1);
        assert_eq!(output.get(0, "library_ID"), Some("L1"));
    }

    #[test]
    fn duplicate_library_assay_pairs_collapse() {
        let schema = schema();
        let experiments = SourceTable::from_columns(vec![
            (
                "lib_id".to_string(),
                vec![Cell::text("L1"), Cell::text("L1")],
            ),
            (
                "samp_name".to_string(),
                vec![Cell::text("S1"), Cell::text("S1")],
            ),
            (
                "assay_name".to_string(),
                vec![Cell::text("16S"), Cell::text("16S")],
            ),
            (
                "filename".to_string(),
                vec![Cell::text("L1.fastq"), Cell::text("L1.fastq")],
            ),
        ])
        .unwrap();
        let mut store = store_with_defaults();
        let mut report = RunReport::new();

        let job = SraJob {
            experiments: &experiments,
            samples: None,
            project: None,
            schema: &schema,
        };
        let output = assemble(&job, &mut store, &SilentPrompter, &mut report).unwrap();
        assert_eq!(output.row_count(), 1);
    }

    #[test]
    fn missing_mandatory_cell_fails() {
        let schema = schema();
        // second row has no filename at all
        let experiments = SourceTable::from_columns(vec![
            (
                "lib_id".to_string(),
                vec![Cell::text("L1"), Cell::text("L2")],
            ),
            (
                "samp_name".to_string(),
                vec![Cell::text("S1"), Cell::text("S2")],
            ),
            (
                "assay_name".to_string(),
                vec![Cell::text("16S"), Cell::text("16S")],
            ),
            (
                "filename".to_string(),
                vec![Cell::text("L1.fastq"), Cell::Empty],
            ),
        ])
        .unwrap();
        let mut store = store_with_defaults();
        let mut report = RunReport::new();

        let job = SraJob {
            experiments: &experiments,
            samples: None,
            project: None,
            schema: &schema,
        };
        let err = assemble(&job, &mut store, &SilentPrompter, &mut report).unwrap_err();
        assert_matches!(err, ConvertError::MissingRequiredField(_));
    }
}
