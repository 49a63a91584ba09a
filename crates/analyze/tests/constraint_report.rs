//! Constraint report over a small in-memory rule set.

use pmsi_analyze::{analyze, FindingSeverity, FULL_MASK};
use pmsi_tables::{
    Date, GhmCode, GhmDecisionNode, GhmRootCode, GhmRootInfo, GhmRootTable, GhmTest,
    GhmToGhsInfo, GhsCode, GhsTable, Sector, TableIndex,
};

fn rule(ghm: GhmCode, ghs: i16, minimum_duration: i32) -> GhmToGhsInfo {
    GhmToGhsInfo {
        ghm,
        ghs: [GhsCode(ghs), GhsCode(ghs + 5000)],
        minimum_duration,
        ..Default::default()
    }
}

/// Sessions lead to 28Z17Z, other stays to 04M02 by severity.
fn index() -> TableIndex {
    let sessions = GhmCode::new(28, b'Z', 17, b'Z');
    let medical = GhmCode::new(4, b'M', 2, 0);

    TableIndex::new(Date::new(2019, 3, 1), Date::new(2020, 3, 1))
        .with_ghm_nodes(vec![
            GhmDecisionNode::Test {
                test: GhmTest::SessionCountEquals,
                params: [0, 0],
                children_idx: 1,
                children_count: 2,
            },
            GhmDecisionNode::Leaf {
                ghm: sessions,
                error: 0,
            },
            GhmDecisionNode::Leaf {
                ghm: medical,
                error: 0,
            },
        ])
        .with_ghm_roots(GhmRootTable::new(vec![
            GhmRootInfo {
                ghm_root: GhmRootCode::new(28, b'Z', 17),
                ..Default::default()
            },
            GhmRootInfo {
                ghm_root: GhmRootCode::new(4, b'M', 2),
                allow_ambulatory: true,
                ..Default::default()
            },
        ]))
        .with_ghs(GhsTable::new(vec![
            rule(sessions, 9605, 0),
            rule(medical.with_mode(b'J'), 1000, 0),
            rule(medical.with_mode(b'1'), 1001, 0),
            rule(medical.with_mode(b'4'), 1004, 2),
        ]))
}

#[test]
fn report_lists_every_reachable_ghm() {
    let report = analyze(&index(), Sector::Public).unwrap();

    let ghms: Vec<String> = report.rows.iter().map(|row| row.ghm.to_string()).collect();
    assert_eq!(ghms, vec!["04M021", "04M022", "04M023", "04M024", "04M02J", "28Z17Z"]);
    assert!(!report.incomplete);

    let ambulatory = report.rows.iter().find(|row| row.ghm.to_string() == "04M02J").unwrap();
    assert_eq!(ambulatory.ranges, "0");

    let sessions = report.rows.iter().find(|row| row.ghm.to_string() == "28Z17Z").unwrap();
    assert_eq!(sessions.durations, 1);

    let light = report.rows.iter().find(|row| row.ghm.to_string() == "04M021").unwrap();
    assert_eq!(light.durations, FULL_MASK & !1);
    assert_eq!(light.ranges, "1-30+");
}

#[test]
fn ghs_rules_see_their_minimum_duration() {
    let report = analyze(&index(), Sector::Private).unwrap();

    let heavy = report.rows.iter().find(|row| row.ghm.to_string() == "04M024").unwrap();
    assert_eq!(heavy.ghs.len(), 1);
    assert_eq!(heavy.ghs[0].ghs, GhsCode(6004));
    assert_eq!(heavy.ghs[0].durations, FULL_MASK & !0b1_1111);
}

#[test]
fn zero_night_stays_without_sessions_are_flagged() {
    let report = analyze(&index(), Sector::Public).unwrap();

    let flagged: Vec<String> = report
        .findings
        .iter()
        .filter(|finding| finding.severity == FindingSeverity::Warning)
        .filter_map(|finding| finding.ghm.map(|ghm| ghm.to_string()))
        .collect();
    assert_eq!(flagged, vec!["04M02J"]);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["rows"][4]["ghm"], "04M02J");
    assert_eq!(json["findings"][0]["severity"], "Warning");
}
