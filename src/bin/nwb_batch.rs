use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use nwb_batch::app::{BatchConverter, BatchOptions, ProgressEvent};
use nwb_batch::config::{ConfigLoader, ConfigOverrides, InputPaths};
use nwb_batch::converter::{AbfConverter, NopConverter, SystemConverter};
use nwb_batch::error::NwbBatchError;
use nwb_batch::layout::OutputLayout;
use nwb_batch::output::{ConsoleOutput, OutputMode};
use nwb_batch::report::RunLog;
use nwb_batch::sheet::MetadataTable;

#[derive(Parser)]
#[command(name = "nwb-batch")]
#[command(about = "Convert ABF electrophysiology files to NWB format from an Excel metadata sheet")]
#[command(
    after_help = "Examples:\n  nwb-batch\n  nwb-batch --excel_path /path/to/params.xlsx --data_path /path/to/abf_files\n  nwb-batch --lab \"Smith Lab\" --institution \"MIT\" --experimenter \"John Doe\""
)]
#[command(version, author)]
struct Cli {
    /// Path to Excel metadata file
    #[arg(long = "excel_path")]
    excel_path: Option<PathBuf>,

    /// Path to directory containing ABF files
    #[arg(long = "data_path")]
    data_path: Option<PathBuf>,

    /// Lab name
    #[arg(long)]
    lab: Option<String>,

    /// Institution name
    #[arg(long)]
    institution: Option<String>,

    /// Experimenter name(s)
    #[arg(long, num_args = 1..)]
    experimenter: Option<Vec<String>>,

    /// JSON config file (defaults to ./nwb-batch.json when present)
    #[arg(long)]
    config: Option<String>,

    /// Converter executable
    #[arg(long)]
    converter: Option<String>,

    /// Check metadata and files without converting
    #[arg(long)]
    dry_run: bool,

    /// Never prompt; print the run report as JSON
    #[arg(long)]
    non_interactive: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<NwbBatchError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &NwbBatchError) -> u8 {
    match error {
        NwbBatchError::MissingSpreadsheetPath
        | NwbBatchError::ConfigRead(_)
        | NwbBatchError::ConfigParse(_)
        | NwbBatchError::SpreadsheetOpen { .. }
        | NwbBatchError::EmptyWorkbook(_)
        | NwbBatchError::MissingHeader(_)
        | NwbBatchError::MissingColumn(_) => 2,
        NwbBatchError::MissingTool(_) => 3,
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
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config = ConfigLoader::resolve(
        cli.config.as_deref(),
        ConfigOverrides {
            lab: cli.lab,
            institution: cli.institution,
            experimenter: cli.experimenter,
            converter: cli.converter,
        },
    )?;

    let inputs = InputPaths::resolve(cli.excel_path, cli.data_path, || match output_mode {
        OutputMode::Interactive => prompt_spreadsheet_path(),
        OutputMode::NonInteractive => Err(NwbBatchError::MissingSpreadsheetPath),
    })?;
    if inputs.data_dir_defaulted && matches!(output_mode, OutputMode::Interactive) {
        println!("Using data path: {}", inputs.data_dir.display());
    }

    let options = BatchOptions {
        dry_run: cli.dry_run,
    };
    if options.dry_run {
        run_batch(NopConverter, config, inputs, options, output_mode)
    } else {
        let converter = SystemConverter::locate(&config.converter)?;
        tracing::debug!(program = %converter.program().display(), "using converter");
        run_batch(converter, config, inputs, options, output_mode)
    }
}

fn run_batch<C: AbfConverter>(
    converter: C,
    config: nwb_batch::config::RunConfig,
    inputs: InputPaths,
    options: BatchOptions,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let layout = OutputLayout::new(&inputs.data_dir, &chrono::Local::now())?;
    layout.ensure_output_dir()?;

    let log = match output_mode {
        OutputMode::Interactive => RunLog::new(layout.log_path()),
        OutputMode::NonInteractive => RunLog::quiet(layout.log_path()),
    };
    let batch = BatchConverter::new(converter, config, layout, inputs.data_dir.clone());

    batch.announce(&inputs.excel_path, &log);
    let table = MetadataTable::load(&inputs.excel_path)?;
    let report = batch.run(table, options, &log)?;

    let saved = format!("Log file saved to: {}", log.path());
    log.record(&ProgressEvent::info(saved).separated())?;
    match output_mode {
        OutputMode::Interactive => {
            ConsoleOutput::print_completion(&report, log.path()).into_diagnostic()?;
        }
        OutputMode::NonInteractive => {
            ConsoleOutput::print_json(&report).into_diagnostic()?;
        }
    }
    Ok(())
}

fn prompt_spreadsheet_path() -> Result<String, NwbBatchError> {
    let mut stdout = io::stdout();
    write!(stdout, "Enter path to Excel metadata file: ")
        .and_then(|_| stdout.flush())
        .map_err(|err| NwbBatchError::Filesystem(err.to_string()))?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|err| NwbBatchError::Filesystem(err.to_string()))?;
    Ok(line)
}
