//! End-to-end classification, pricing and dispensation over a small
//! in-memory rule set.

use pmsi_classify::{
    classify, dispense, price, summarize, ClassifyFlags, DispenseMode, Pricing,
};
use pmsi_stays::{Stay, StayEntry, StayExit};
use pmsi_tables::{
    AuthorizationSet, Date, DiagnosisCode, DiagnosisInfo, DiagnosisTable, GhmCode,
    GhmDecisionNode, GhmRootInfo, GhmRootTable, GhmToGhsInfo, GhsCode, GhsPriceInfo, GhsTable,
    ListMask, PriceTable, Sector, SupplementCounters, TableIndex, TableSet, UnitCode,
};
use rust_decimal::Decimal;
use serde_json::json;

const GHM: GhmCode = GhmCode::new(4, b'M', 2, b'1');

fn diag(code: &str) -> DiagnosisCode {
    code.parse().unwrap()
}

fn diagnosis_info(code: &str, cmd: u8) -> DiagnosisInfo {
    let mut raw = [0u8; 37];
    raw[0] = cmd;
    DiagnosisInfo {
        diag: diag(code),
        sexes: 0b11,
        warnings: 0,
        raw,
        cmd,
        jump: 0,
        severity: 0,
        cma_minimum_age: 0,
        cma_maximum_age: 0,
        exclusion_set_idx: 0,
        cma_exclusion_mask: ListMask::default(),
    }
}

fn table_set() -> TableSet {
    let prices = PriceTable::new(
        Decimal::ONE,
        vec![GhsPriceInfo {
            ghs: GhsCode(1002),
            ghs_cents: 100_000,
            exb_threshold: 2,
            exb_cents: 10_000,
            ..Default::default()
        }],
        SupplementCounters::default(),
    );

    let index = TableIndex::new(Date::new(2019, 1, 1), Date::new(2020, 1, 1))
        .with_ghm_nodes(vec![GhmDecisionNode::Leaf {
            ghm: GHM.with_mode(0),
            error: 0,
        }])
        .with_diagnoses(DiagnosisTable::new(
            vec![diagnosis_info("E119", 10), diagnosis_info("J189", 4)],
            Vec::new(),
        ))
        .with_ghm_roots(GhmRootTable::new(vec![GhmRootInfo {
            ghm_root: GHM.root(),
            old_age_threshold: 120,
            ..Default::default()
        }]))
        .with_ghs(GhsTable::new(vec![GhmToGhsInfo {
            ghm: GHM,
            ghs: [GhsCode(1002), GhsCode(6002)],
            ..Default::default()
        }]))
        .with_prices(Sector::Public, prices.clone())
        .with_prices(Sector::Private, prices);

    TableSet {
        tables: Vec::new(),
        indexes: vec![index],
    }
}

fn stay(bill_id: i32, unit: i16, entry: Date, exit: Date) -> Stay {
    Stay {
        admin_id: bill_id,
        bill_id,
        sex: 1,
        birthdate: Date::new(1980, 5, 4),
        entry: StayEntry {
            date: entry,
            mode: b'8',
            origin: 0,
        },
        exit: StayExit {
            date: exit,
            mode: b'8',
            destination: 0,
        },
        unit: UnitCode(unit),
        main_diagnosis: diag("J189"),
        ..Default::default()
    }
}

/// A transfer between units 1 and 2, then an admission with an unknown
/// main diagnosis.
fn stays() -> Vec<Stay> {
    let mut first = stay(1, 1, Date::new(2019, 3, 10), Date::new(2019, 3, 13));
    first.exit.mode = b'6';
    first.exit.destination = b'1';
    first.other_diagnoses = vec![diag("E119")];
    let mut second = stay(1, 2, Date::new(2019, 3, 13), Date::new(2019, 3, 15));
    second.entry.mode = b'6';
    second.entry.origin = b'1';

    let mut broken = stay(2, 1, Date::new(2019, 4, 1), Date::new(2019, 4, 4));
    broken.main_diagnosis = diag("A000");

    vec![first, second, broken]
}

#[test]
fn admissions_are_grouped_as_a_whole() {
    let tables = table_set();
    let stays = stays();
    let classification = classify(
        &tables,
        &AuthorizationSet::default(),
        Sector::Public,
        &stays,
        ClassifyFlags::default(),
    );

    assert_eq!(classification.results.len(), 2);
    assert!(classification.mono_results.is_empty());

    let result = &classification.results[0];
    assert_eq!(result.ghm, GHM, "errors {:?}", result.errors.iter().collect::<Vec<_>>());
    assert_eq!(result.ghs, GhsCode(1002));
    assert_eq!(result.duration, 5);
    assert_eq!(result.stays_count, 2);
    assert_eq!(result.main_error, 0);

    let broken = &classification.results[1];
    assert!(broken.ghm.is_error());
    assert_ne!(broken.main_error, 0);
    assert_eq!(broken.ghs, GhsCode::NONE);
}

#[test]
fn classification_is_deterministic() {
    let tables = table_set();
    let stays = stays();
    let flags = ClassifyFlags {
        mono: true,
        ..Default::default()
    };

    let run = || {
        let classification =
            classify(&tables, &AuthorizationSet::default(), Sector::Public, &stays, flags);
        serde_json::to_value(&classification.results).unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn results_serialize_codes_as_strings() {
    let tables = table_set();
    let stays = stays();
    let classification = classify(
        &tables,
        &AuthorizationSet::default(),
        Sector::Public,
        &stays[..2],
        ClassifyFlags::default(),
    );

    let value = serde_json::to_value(&classification.results[0]).unwrap();
    assert_eq!(value["ghm"], json!("04M021"));
    assert_eq!(value["ghs"], json!(1002));
    assert_eq!(value["bill_id"], json!(1));
    assert_eq!(value["errors"], json!([]));
}

#[test]
fn mono_mode_groups_each_stay_alone() {
    let tables = table_set();
    let stays = stays();
    let flags = ClassifyFlags {
        mono: true,
        ..Default::default()
    };
    let classification = classify(
        &tables,
        &AuthorizationSet::default(),
        Sector::Public,
        &stays,
        flags,
    );

    assert_eq!(classification.mono_results.len(), 3);
    let durations: Vec<i32> = classification
        .mono_results
        .iter()
        .map(|result| result.duration)
        .collect();
    assert_eq!(durations, vec![3, 2, 3]);
    assert_eq!(classification.mono_results[0].ghm, GHM);
    assert_eq!(classification.mono_results[1].ghs, GhsCode(1002));
    assert!(classification.mono_results[2].ghm.is_error());
}

#[test]
fn prices_sum_and_dispense_by_unit() {
    let tables = table_set();
    let stays = stays();
    let flags = ClassifyFlags {
        mono: true,
        ..Default::default()
    };
    let classification = classify(
        &tables,
        &AuthorizationSet::default(),
        Sector::Public,
        &stays,
        flags,
    );

    let pricings: Vec<Pricing> = classification
        .results
        .iter()
        .map(|result| price(result, true))
        .collect();
    assert_eq!(pricings[0].price_cents, 100_000);
    assert_eq!(pricings[1].total_cents, 0);

    let summary = summarize(&pricings);
    assert_eq!(summary.results_count, 2);
    assert_eq!(summary.stays_count, 3);
    assert_eq!(summary.failures_count, 1);
    assert_eq!(summary.total_cents, 100_000);

    let dues = dispense(
        &classification.results,
        &classification.mono_results,
        DispenseMode::J,
    );
    let shares: Vec<(UnitCode, i64)> = dues
        .iter()
        .map(|due| (due.unit, due.pricing.price_cents))
        .collect();
    assert_eq!(shares, vec![(UnitCode(1), 60_000), (UnitCode(2), 40_000)]);
    assert_eq!(
        dues.iter().map(|due| due.pricing.total_cents).sum::<i64>(),
        summary.total_cents
    );
}
