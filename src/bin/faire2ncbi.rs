use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use faire2ncbi::app::{App, BioSampleArgs, SraArgs};
use faire2ncbi::domain::BioprojectAccession;
use faire2ncbi::error::ConvertError;
use faire2ncbi::output::JsonOutput;
use faire2ncbi::prompt::TerminalPrompter;

#[derive(Parser)]
#[command(name = "faire2ncbi")]
#[command(about = "Convert FAIRe sample metadata to NCBI submission formats")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(name = "BioSamples", about = "Convert FAIRe metadata to NCBI BioSample format")]
    BioSamples(BioSamplesCliArgs),
    #[command(name = "SRA", about = "Convert FAIRe metadata to NCBI SRA format")]
    Sra(SraCliArgs),
}

#[derive(Args)]
struct BioSamplesCliArgs {
    /// FAIRe sample metadata table (TSV)
    #[arg(long)]
    faire_metadata: Utf8PathBuf,

    /// MIMARKS BioSample template (TSV)
    #[arg(long)]
    template: Utf8PathBuf,

    /// Output BioSample metadata file
    #[arg(long)]
    output: Utf8PathBuf,

    /// Bioproject accession to use for all samples
    #[arg(long)]
    bioproject_accession: Option<String>,

    /// Configuration file with recorded answers from an earlier run
    #[arg(long)]
    config_file: Option<Utf8PathBuf>,

    /// Overwrite output files without asking
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct SraCliArgs {
    /// FAIRe experiment-run metadata table (TSV)
    #[arg(long)]
    faire_metadata: Utf8PathBuf,

    /// FAIRe sample metadata table, used for library titles (TSV)
    #[arg(long)]
    sample_metadata: Option<Utf8PathBuf>,

    /// FAIRe project metadata table, used for platform and primers (TSV)
    #[arg(long)]
    project_metadata: Option<Utf8PathBuf>,

    /// SRA submission template (TSV)
    #[arg(long)]
    template: Utf8PathBuf,

    /// Output SRA metadata file
    #[arg(long)]
    output: Utf8PathBuf,

    /// Configuration file with recorded answers from an earlier run
    #[arg(long)]
    config_file: Option<Utf8PathBuf>,

    /// Overwrite output files without asking
    #[arg(long)]
    force: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<ConvertError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ConvertError) -> u8 {
    match error {
        ConvertError::Aborted(_) => 2,
        ConvertError::MissingRequiredField(_)
        | ConvertError::TypeMismatch { .. }
        | ConvertError::DuplicateConflict(_)
        | ConvertError::ConfigConflict(_)
        | ConvertError::ConfigCollision(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let command = std::env::args().collect::<Vec<_>>().join(" ");
    let app = App::new(TerminalPrompter);

    match cli.command {
        Commands::BioSamples(args) => {
            let bioproject = args
                .bioproject_accession
                .as_deref()
                .map(str::parse::<BioprojectAccession>)
                .transpose()?;
            let result = app.convert_biosamples(&BioSampleArgs {
                faire_metadata: args.faire_metadata,
                template: args.template,
                output: args.output,
                bioproject,
                config_file: args.config_file,
                force: args.force,
                command,
            })?;
            JsonOutput::print_convert(&result).into_diagnostic()
        }
        Commands::Sra(args) => {
            let result = app.convert_sra(&SraArgs {
                faire_metadata: args.faire_metadata,
                sample_metadata: args.sample_metadata,
                project_metadata: args.project_metadata,
                template: args.template,
                output: args.output,
                config_file: args.config_file,
                force: args.force,
                command,
            })?;
            JsonOutput::print_convert(&result).into_diagnostic()
        }
    }
}
