use std::process;

use pmsi_analyze::{analyze, FindingSeverity};
use pmsi_tables::{Date, Sector};

use crate::{load_tables, print_json, report_error, OutputFormat, TableArgs};

pub(crate) fn cmd_constraints(
    tables: &TableArgs,
    date: Option<Date>,
    sector: Sector,
    output: OutputFormat,
    quiet: bool,
) {
    let set = load_tables(tables, output, quiet);

    let index = set.find_index(date.unwrap_or_default(), true);
    let Some(index) = index else {
        let msg = match date {
            Some(date) => format!("no valid table index for {}", date),
            None => "no valid table index".to_string(),
        };
        report_error(&msg, output, quiet);
        process::exit(1);
    };

    let report = match analyze(index, sector) {
        Ok(report) => report,
        Err(e) => {
            report_error(&format!("constraint error: {}", e), output, quiet);
            process::exit(1);
        }
    };

    if quiet {
        return;
    }
    match output {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => {
            println!("GHM Duration Constraints");
            println!("========================");
            println!();
            println!(
                "  {} to {}, {} sector{}",
                report.start,
                report.end,
                report.sector,
                if report.incomplete { " (incomplete)" } else { "" }
            );
            println!();

            for row in &report.rows {
                println!("  {}  {}", row.ghm, row.ranges);
                for ghs in &row.ghs {
                    println!(
                        "    GHS {} (>= {} nights): {}{}",
                        ghs.ghs,
                        ghs.minimum_duration,
                        pmsi_analyze::format_durations(ghs.durations),
                        if ghs.prefer_cmd28 { ", prefer CMD 28" } else { "" }
                    );
                }
            }

            if !report.findings.is_empty() {
                println!();
                println!("  Findings:");
                for finding in &report.findings {
                    let tag = match finding.severity {
                        FindingSeverity::Info => "info",
                        FindingSeverity::Warning => "warning",
                    };
                    println!("    [{}] {}", tag, finding.message);
                }
            }
        }
    }
}
