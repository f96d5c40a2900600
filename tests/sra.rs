use std::cell::RefCell;
use std::collections::VecDeque;

use camino::Utf8PathBuf;

use faire2ncbi::app::{App, SraArgs};
use faire2ncbi::error::ConvertError;
use faire2ncbi::prompt::Prompter;

struct ScriptedPrompter {
    answers: RefCell<VecDeque<String>>,
}

impl ScriptedPrompter {
    fn new(answers: &[&str]) -> Self {
        Self {
            answers: RefCell::new(answers.iter().map(|a| (*a).to_string()).collect()),
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&self, question: &str, _choices: &[&str]) -> Result<String, ConvertError> {
        self.answers
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| ConvertError::Prompt(format!("unexpected question: {question}")))
    }
}

struct SilentPrompter;

impl Prompter for SilentPrompter {
    fn ask(&self, question: &str, _choices: &[&str]) -> Result<String, ConvertError> {
        Err(ConvertError::Prompt(format!(
            "unexpected question: {question}"
        )))
    }
}

fn write_inputs(root: &Utf8PathBuf) -> (Utf8PathBuf, Utf8PathBuf, Utf8PathBuf, Utf8PathBuf) {
    let experiments = root.join("experiment_run.tsv");
    std::fs::write(
        experiments.as_std_path(),
        "lib_id\tsamp_name\tassay_name\tfilename\tfilename2\n\
         L1\tS1\t16S\tL1_R1.fastq.gz\tL1_R2.fastq.gz\n\
         L2\tS2\t16S\tL2_R1.fastq.gz\t\n",
    )
    .unwrap();

    let samples = root.join("sample_metadata.tsv");
    std::fs::write(
        samples.as_std_path(),
        "samp_name\torganism\tgeo_loc_name\n\
         S1\tseawater metagenome\tUSA: Hawaii\n\
         S2\tseawater metagenome\tUSA: Hawaii\n",
    )
    .unwrap();

    let project = root.join("project_metadata.tsv");
    std::fs::write(
        project.as_std_path(),
        "term_name\tproject_level\t16S\n\
         platform\tILLUMINA\tILLUMINA\n\
         seq_kit\tIllumina MiSeq\tIllumina MiSeq\n\
         target_gene\t16S rRNA\t16S rRNA\n\
         target_subfragment\tV4\tV4\n\
         pcr_primer_name_forward\t515F\t515F\n\
         pcr_primer_forward\tGTGYCAGCMGCCGCGGTAA\tGTGYCAGCMGCCGCGGTAA\n\
         pcr_primer_name_reverse\t806R\t806R\n\
         pcr_primer_reverse\tGGACTACNVGGGTWTCTAAT\tGGACTACNVGGGTWTCTAAT\n\
         nucl_acid_amp\thttps://protocols.io/example\thttps://protocols.io/example\n",
    )
    .unwrap();

    let template = root.join("sra_template.tsv");
    std::fs::write(
        template.as_std_path(),
        "sample_name\tlibrary_ID\ttitle\tlibrary_strategy\tlibrary_source\tlibrary_selection\t\
         library_layout\tplatform\tinstrument_model\tdesign_description\tfiletype\tfilename\t\
         filename2\n",
    )
    .unwrap();

    (experiments, samples, project, template)
}

fn sra_args(
    root: &Utf8PathBuf,
    output: &Utf8PathBuf,
    config_file: Option<Utf8PathBuf>,
) -> SraArgs {
    SraArgs {
        faire_metadata: root.join("experiment_run.tsv"),
        sample_metadata: Some(root.join("sample_metadata.tsv")),
        project_metadata: Some(root.join("project_metadata.tsv")),
        template: root.join("sra_template.tsv"),
        output: output.clone(),
        config_file,
        force: true,
        command: "faire2ncbi SRA (test)".to_string(),
    }
}

#[test]
fn sra_run_expands_layout_platform_and_filetype() {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    write_inputs(&root);
    let output = root.join("sra.tsv");

    // the three library-field defaults are the only questions
    let app = App::new(ScriptedPrompter::new(&["default", "default", "default"]));
    let result = app.convert_sra(&sra_args(&root, &output, None)).unwrap();
    assert_eq!(result.rows, 2);

    let written = std::fs::read_to_string(output.as_std_path()).unwrap();
    let lines = written.lines().collect::<Vec<_>>();
    let header = lines[0].split('\t').collect::<Vec<_>>();
    let row1 = lines[1].split('\t').collect::<Vec<_>>();
    let row2 = lines[2].split('\t').collect::<Vec<_>>();

    let col = |name: &str| header.iter().position(|h| *h == name).unwrap();

    // both forward and reverse files → paired; forward only → single
    assert_eq!(row1[col("library_layout")], "paired");
    assert_eq!(row2[col("library_layout")], "single");
    // 16S is a marker-gene assay: platform fixed without prompting
    assert_eq!(row1[col("platform")], "ILLUMINA");
    assert_eq!(row1[col("instrument_model")], "Illumina MiSeq");
    assert_eq!(row1[col("filetype")], "fastq");
    assert_eq!(row1[col("library_strategy")], "AMPLICON");
    assert_eq!(row1[col("library_source")], "METAGENOMIC");
    assert_eq!(row1[col("library_selection")], "PCR");
    assert_eq!(
        row1[col("title")],
        "S1: 16S metabarcoding of seawater metagenome in USA: Hawaii"
    );
    assert!(row1[col("design_description")].contains("16S rRNA"));
    assert!(row1[col("design_description")].contains("515F"));
}

#[test]
fn sra_rerun_with_config_is_silent_and_identical() {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    write_inputs(&root);
    let first_output = root.join("sra.tsv");

    let app = App::new(ScriptedPrompter::new(&["default", "default", "default"]));
    app.convert_sra(&sra_args(&root, &first_output, None)).unwrap();
    let config_path = root.join("sra_config.yaml");
    assert!(config_path.as_std_path().exists());

    let second_output = root.join("sra_rerun.tsv");
    let app = App::new(SilentPrompter);
    app.convert_sra(&sra_args(&root, &second_output, Some(config_path)))
        .unwrap();

    assert_eq!(
        std::fs::read_to_string(first_output.as_std_path()).unwrap(),
        std::fs::read_to_string(second_output.as_std_path()).unwrap()
    );
}
