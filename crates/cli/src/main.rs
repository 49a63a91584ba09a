mod commands;

use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand, ValueEnum};
use pmsi_classify::DispenseMode;
use pmsi_tables::{Date, Sector};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::classify::ClassifyOptions;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Format of the log lines written to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// MCO hospital stay classifier and pricer.
#[derive(Parser)]
#[command(name = "pmsi", version, about = "MCO hospital stay classifier and pricer")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Log format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Where to find the classifier tables.
#[derive(Args, Debug, Clone, Default)]
pub(crate) struct TableArgs {
    /// Directory scanned for .tab and price .json files (also its mco and mco_tables subdirectories)
    #[arg(short = 'T', long = "table-dir", value_name = "DIR")]
    pub(crate) table_dirs: Vec<PathBuf>,

    /// Explicit table file (.tab) or price file (.json)
    #[arg(short = 't', long = "table-file", value_name = "FILE")]
    pub(crate) table_files: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the table indexes built from the given tables
    Tables {
        #[command(flatten)]
        tables: TableArgs,
    },

    /// Classify and price stays
    Classify {
        #[command(flatten)]
        tables: TableArgs,
        /// Authorization JSON file (facility and unit authorizations)
        #[arg(short = 'A', long, value_name = "FILE")]
        authorizations: Option<PathBuf>,
        /// Funding sector (public or private)
        #[arg(long, default_value = "public")]
        sector: Sector,
        /// Also classify each stay of multi-stay admissions alone
        #[arg(long)]
        mono: bool,
        /// Keep the real entry and exit modes of mono stays
        #[arg(long)]
        mono_original_stay: bool,
        /// Dispense prices to units (E, Ex, Ex2, J, ExJ, ExJ2); implies --mono
        #[arg(long, value_name = "MODE")]
        dispense: Option<DispenseMode>,
        /// Apply the sector GHS coefficient to prices
        #[arg(long)]
        coefficient: bool,
        /// Do not require confirmation of short stays
        #[arg(long)]
        ignore_confirmation: bool,
        /// Skip the anaesthesia documentation checks
        #[arg(long)]
        ignore_procedure_doc: bool,
        /// Skip the procedure extension checks
        #[arg(long)]
        ignore_procedure_extension: bool,
        /// Skip the procedure addition checks
        #[arg(long)]
        ignore_procedure_addition: bool,
        /// Print every result, not only the summary
        #[arg(long)]
        verbose: bool,
        /// Stay JSON files
        #[arg(required = true)]
        stays: Vec<PathBuf>,
    },

    /// Derive the stay durations each GHM can be reached with
    Constraints {
        #[command(flatten)]
        tables: TableArgs,
        /// Analyze the index valid at this date (default: the newest one)
        #[arg(long)]
        date: Option<Date>,
        /// Funding sector used to pick the GHS of each rule
        #[arg(long, default_value = "public")]
        sector: Sector,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_format, cli.quiet);

    match cli.command {
        Commands::Tables { tables } => {
            commands::tables::cmd_tables(&tables, cli.output, cli.quiet);
        }
        Commands::Classify {
            tables,
            authorizations,
            sector,
            mono,
            mono_original_stay,
            dispense,
            coefficient,
            ignore_confirmation,
            ignore_procedure_doc,
            ignore_procedure_extension,
            ignore_procedure_addition,
            verbose,
            stays,
        } => {
            let options = ClassifyOptions {
                sector,
                flags: pmsi_classify::ClassifyFlags {
                    mono: mono || dispense.is_some(),
                    ignore_confirmation,
                    ignore_procedure_doc,
                    ignore_procedure_extension,
                    ignore_procedure_addition,
                    mono_original_stay,
                },
                dispense,
                coefficient,
                verbose,
            };
            commands::classify::cmd_classify(
                &tables,
                authorizations.as_deref(),
                &stays,
                &options,
                cli.output,
                cli.quiet,
            );
        }
        Commands::Constraints {
            tables,
            date,
            sector,
        } => {
            commands::constraints::cmd_constraints(&tables, date, sector, cli.output, cli.quiet);
        }
    }
}

/// Logs go to stderr, filtered by `PMSI_LOG` (or `RUST_LOG`).
fn init_tracing(format: LogFormat, quiet: bool) {
    let default = if quiet { "pmsi=error" } else { "pmsi=info" };
    let filter = EnvFilter::try_from_env("PMSI_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default));

    let (text, json) = match format {
        LogFormat::Text => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            ),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .json(),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .init();
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}

/// Prints `value` as pretty JSON on stdout.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) {
    let json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e));
    println!("{}", json);
}

/// Loads the table set or exits.
pub(crate) fn load_tables(
    tables: &TableArgs,
    output: OutputFormat,
    quiet: bool,
) -> pmsi_tables::TableSet {
    match pmsi_tables::load_table_set(&tables.table_dirs, &tables.table_files) {
        Ok(set) => set,
        Err(e) => {
            report_error(&format!("error loading tables: {}", e), output, quiet);
            process::exit(1);
        }
    }
}
