use pmsi_tables::IndexSummary;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::{load_tables, print_json, OutputFormat, TableArgs};

#[derive(Serialize)]
struct TablesOutput {
    tables: usize,
    /// SHA-256 of the compact JSON form of `indexes`.
    fingerprint: String,
    indexes: Vec<IndexSummary>,
}

/// Fingerprint of a table set, stable across runs over the same files.
pub(crate) fn compute_fingerprint(indexes: &[IndexSummary]) -> String {
    let canonical = serde_json::to_string(indexes).unwrap_or_default();
    let hash = Sha256::digest(canonical.as_bytes());
    format!("{:x}", hash)
}

pub(crate) fn cmd_tables(tables: &TableArgs, output: OutputFormat, quiet: bool) {
    let set = load_tables(tables, output, quiet);

    let indexes: Vec<IndexSummary> = set.indexes.iter().map(|index| index.summary()).collect();
    let out = TablesOutput {
        tables: set.tables.len(),
        fingerprint: compute_fingerprint(&indexes),
        indexes,
    };

    if quiet {
        return;
    }
    match output {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Text => {
            println!("Table Indexes");
            println!("=============");
            println!();
            println!("  Tables: {}", out.tables);
            println!("  Fingerprint: {}", out.fingerprint);

            for index in &out.indexes {
                println!();
                println!(
                    "  {} to {}{}",
                    index.start,
                    index.end,
                    if index.valid { "" } else { " (incomplete)" }
                );
                let counts = &index.counts;
                println!(
                    "    GHM nodes: {}, diagnoses: {}, procedures: {}, GHM roots: {}, GHS rules: {}",
                    counts.ghm_nodes,
                    counts.diagnoses,
                    counts.procedures,
                    counts.ghm_roots,
                    counts.ghs_rules
                );
                println!(
                    "    Prices: {} public, {} private",
                    counts.prices[0], counts.prices[1]
                );
                for table in &index.tables {
                    println!(
                        "    {}{} {} v{} built {} ({})",
                        if table.changed { "*" } else { " " },
                        table.table_type,
                        table.raw_type,
                        table.version,
                        table.build_date,
                        table.filename
                    );
                }
            }
        }
    }
}
