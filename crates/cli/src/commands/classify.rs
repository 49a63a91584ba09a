use std::path::{Path, PathBuf};
use std::process;

use pmsi_classify::{
    classify_admission, dispense, price_all, summarize, ClassifyFlags, ClassifyResult,
    DispenseMode, Due, Pricing, Scratch,
};
use pmsi_stays::{load_stays, split_clusters, Stay};
use pmsi_tables::{AuthorizationSet, Sector};
use rayon::prelude::*;
use serde::Serialize;

use super::format_cents;
use crate::{load_tables, print_json, report_error, OutputFormat, TableArgs};

pub(crate) struct ClassifyOptions {
    pub(crate) sector: Sector,
    pub(crate) flags: ClassifyFlags,
    pub(crate) dispense: Option<DispenseMode>,
    pub(crate) coefficient: bool,
    pub(crate) verbose: bool,
}

#[derive(Serialize)]
struct ClassifyOutput<'r, 'a> {
    summary: Pricing,
    #[serde(skip_serializing_if = "Option::is_none")]
    results: Option<&'r [ClassifyResult<'a>]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mono_results: Option<&'r [ClassifyResult<'a>]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dispense_mode: Option<DispenseMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dues: Option<Vec<Due>>,
}

pub(crate) fn cmd_classify(
    tables: &TableArgs,
    authorizations: Option<&Path>,
    stay_files: &[PathBuf],
    options: &ClassifyOptions,
    output: OutputFormat,
    quiet: bool,
) {
    let set = load_tables(tables, output, quiet);

    let authorizations = match authorizations.map(AuthorizationSet::load).transpose() {
        Ok(authorizations) => authorizations.unwrap_or_default(),
        Err(e) => {
            report_error(&format!("error loading authorizations: {}", e), output, quiet);
            process::exit(1);
        }
    };

    let mut stays: Vec<Stay> = Vec::new();
    for path in stay_files {
        match load_stays(path) {
            Ok(loaded) => stays.extend(loaded),
            Err(e) => {
                report_error(&format!("error loading stays: {}", e), output, quiet);
                process::exit(1);
            }
        }
    }

    // Admissions are independent; each worker keeps its own scratch state
    let clusters = split_clusters(&stays);
    let flags = options.flags;
    let classified: Vec<(ClassifyResult, Vec<ClassifyResult>)> = clusters
        .par_iter()
        .map_init(Scratch::new, |scratch, cluster| {
            let mut mono_results = Vec::new();
            let result = classify_admission(
                &set,
                &authorizations,
                options.sector,
                *cluster,
                flags,
                scratch,
                flags.mono.then_some(&mut mono_results),
            );
            (result, mono_results)
        })
        .collect();

    let (results, mono_results): (Vec<_>, Vec<_>) = classified.into_iter().unzip();
    let mono_results: Vec<ClassifyResult> = mono_results.into_iter().flatten().collect();
    tracing::info!(
        admissions = results.len(),
        stays = stays.len(),
        "classified stays"
    );

    let pricings = price_all(&results, options.coefficient);
    let summary = summarize(&pricings);
    let dues = options
        .dispense
        .map(|mode| dispense(&results, &mono_results, mode));

    if quiet {
        return;
    }
    match output {
        OutputFormat::Json => {
            let out = ClassifyOutput {
                summary,
                results: options.verbose.then_some(results.as_slice()),
                mono_results: (options.verbose && flags.mono).then_some(mono_results.as_slice()),
                dispense_mode: options.dispense,
                dues,
            };
            print_json(&out);
        }
        OutputFormat::Text => {
            if options.verbose {
                println!("Results");
                println!("=======");
                println!();
                for (result, pricing) in results.iter().zip(&pricings) {
                    print_result(result, pricing);
                }
                println!();
            }

            println!("Summary");
            println!("=======");
            println!();
            println!(
                "  Admissions: {} ({} stays), {} failures",
                summary.results_count, summary.stays_count, summary.failures_count
            );
            println!("  GHS: {}", format_cents(summary.price_cents));
            for (supplement, days) in summary.supplement_days.iter() {
                if days != 0 {
                    println!(
                        "  {}: {} days, {}",
                        supplement.name(),
                        days,
                        format_cents(summary.supplement_cents[supplement])
                    );
                }
            }
            println!("  Total: {}", format_cents(summary.total_cents));

            if let (Some(mode), Some(dues)) = (options.dispense, &dues) {
                println!();
                println!("Dispensation ({})", mode);
                println!("===============");
                println!();
                for due in dues {
                    println!(
                        "  Unit {}: GHS {}, total {}",
                        due.unit,
                        format_cents(due.pricing.price_cents),
                        format_cents(due.pricing.total_cents)
                    );
                }
            }
        }
    }
}

fn print_result(result: &ClassifyResult, pricing: &Pricing) {
    let errors: Vec<String> = result.errors.iter().map(|error| error.to_string()).collect();
    println!(
        "  {}: {} GHS {} ({} nights, {} stays) {}{}",
        result.bill_id,
        result.ghm,
        result.ghs,
        result.duration,
        result.stays_count,
        format_cents(pricing.total_cents),
        if errors.is_empty() {
            String::new()
        } else {
            format!(" errors {}", errors.join(", "))
        }
    );
}
