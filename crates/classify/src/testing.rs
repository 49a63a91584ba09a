//! Builders for in-memory rule tables and stays used by unit tests.

use pmsi_stays::{ProcedureRealisation, Stay, StayEntry, StayExit};
use pmsi_tables::{
    AdditionList, Date, DiagnosisCode, DiagnosisInfo, DiagnosisTable, ListMask, ProcedureCode,
    ProcedureInfo, ProcedureTable, TableIndex, TableSet, UnitCode,
};

pub(crate) fn diag(code: &str) -> DiagnosisCode {
    code.parse().unwrap()
}

pub(crate) fn proc_code(code: &str) -> ProcedureCode {
    code.parse().unwrap()
}

/// Diagnosis valid for both sexes, classified in `cmd`/`jump`.
pub(crate) fn diagnosis_info(code: &str, cmd: u8, jump: u8) -> DiagnosisInfo {
    let mut raw = [0u8; 37];
    raw[0] = cmd;
    raw[1] = jump;
    DiagnosisInfo {
        diag: diag(code),
        sexes: 0b11,
        warnings: 0,
        raw,
        cmd,
        jump,
        severity: 0,
        cma_minimum_age: 0,
        cma_maximum_age: 0,
        exclusion_set_idx: 0,
        cma_exclusion_mask: ListMask::default(),
    }
}

/// Procedure allowing the activities in `activities` (bit per activity).
pub(crate) fn procedure_info(code: &str, activities: u8) -> ProcedureInfo {
    ProcedureInfo {
        proc: proc_code(code),
        phase: 0,
        activities,
        limit_dates: [Date::new(2010, 1, 1), Date::new(2030, 1, 1)],
        additions: [0; 8],
        addition_list: AdditionList::default(),
        extensions: 1,
        disabled_extensions: 0,
        bytes: [0; 52],
    }
}

pub(crate) fn base_diagnoses() -> Vec<DiagnosisInfo> {
    vec![
        diagnosis_info("E119", 10, 1),
        diagnosis_info("J189", 4, 2),
        diagnosis_info("Z515", 17, 3),
    ]
}

pub(crate) fn base_procedures() -> Vec<ProcedureInfo> {
    vec![
        procedure_info("AAFA001", 0b1_0010),
        procedure_info("ZZQK002", 0b10),
    ]
}

pub(crate) fn base_index() -> TableIndex {
    TableIndex::new(Date::new(2019, 1, 1), Date::new(2020, 1, 1))
        .with_diagnoses(DiagnosisTable::new(base_diagnoses(), Vec::new()))
        .with_procedures(ProcedureTable::new(base_procedures()))
}

pub(crate) fn table_set(index: TableIndex) -> TableSet {
    TableSet {
        tables: Vec::new(),
        indexes: vec![index],
    }
}

/// A three-night home-to-home stay of a 38 year old man.
pub(crate) fn stay(bill_id: i32) -> Stay {
    Stay {
        admin_id: bill_id,
        bill_id,
        sex: 1,
        birthdate: Date::new(1980, 5, 4),
        entry: StayEntry {
            date: Date::new(2019, 3, 10),
            mode: b'8',
            origin: 0,
        },
        exit: StayExit {
            date: Date::new(2019, 3, 13),
            mode: b'8',
            destination: 0,
        },
        unit: UnitCode(1),
        main_diagnosis: diag("J189"),
        ..Default::default()
    }
}

pub(crate) fn realisation(code: &str, activity: i8) -> ProcedureRealisation {
    ProcedureRealisation {
        proc: proc_code(code),
        activity,
        count: 1,
        ..Default::default()
    }
}
