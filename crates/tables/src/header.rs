//! Binary table file headers.
//!
//! A `.tab` file starts with a main header whose single section lists table
//! pointers. Each pointer carries a validity range and the offset of a
//! sub-header describing up to 16 fixed-stride sections. All integers are
//! big-endian.

use crate::date::Date;
use crate::error::TableError;
use crate::types::{TableInfo, TableSection, TableType};

pub(crate) const HEADER_LEN: usize = 32;
pub(crate) const SECTION_LEN: usize = 33;
const POINTER_LEN: usize = 10;
const MAX_SECTIONS: usize = 16;

/// Fails the whole file with the stringified condition when it does not hold.
macro_rules! ensure {
    ($file:expr, $cond:expr) => {
        if !($cond) {
            return Err($crate::error::TableError::malformed(
                $file,
                stringify!($cond),
            ));
        }
    };
}
pub(crate) use ensure;

pub(crate) fn be16(bytes: &[u8], offset: usize) -> u16 {
    match bytes.get(offset..offset + 2) {
        Some(b) => u16::from_be_bytes([b[0], b[1]]),
        None => 0,
    }
}

pub(crate) fn be32(bytes: &[u8], offset: usize) -> u32 {
    match bytes.get(offset..offset + 4) {
        Some(b) => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        None => 0,
    }
}

fn two_digits(bytes: &[u8]) -> u16 {
    if bytes.len() == 2 && bytes.iter().all(u8::is_ascii_digit) {
        u16::from(bytes[0] - b'0') * 10 + u16::from(bytes[1] - b'0')
    } else {
        0
    }
}

struct RawHeader<'a> {
    signature: &'a [u8],
    version: [u16; 2],
    date: &'a [u8],
    name: &'a [u8],
    sections_count: usize,
}

struct RawSection {
    values_count: usize,
    value_len: usize,
    raw_len: usize,
    raw_offset: usize,
}

fn read_header(bytes: &[u8]) -> RawHeader<'_> {
    let signature = &bytes[0..8];
    let legacy = signature == b"GESTCOMP";

    RawHeader {
        signature,
        version: [two_digits(&bytes[8..10]), two_digits(&bytes[10..12])],
        date: &bytes[12..18],
        // Addition tables put their name in the signature and shift the
        // remaining fields back by the name length.
        name: if legacy { signature } else { &bytes[18..26] },
        sections_count: usize::from(if legacy { bytes[19] } else { bytes[27] }),
    }
}

fn read_section(bytes: &[u8], legacy: bool) -> RawSection {
    let base = if legacy { 10 } else { 18 };
    RawSection {
        values_count: usize::from(be16(bytes, base)),
        value_len: usize::from(be16(bytes, base + 2)),
        raw_len: be32(bytes, base + 4) as usize,
        raw_offset: be32(bytes, base + 8) as usize,
    }
}

fn parse_build_date(raw: &[u8]) -> Date {
    Date::new(
        two_digits(&raw[4..6]) as i16 + 2000,
        two_digits(&raw[2..4]) as i8,
        two_digits(&raw[0..2]) as i8,
    )
}

fn trim_name(raw: &[u8]) -> String {
    let end = raw
        .iter()
        .position(|&c| c == b' ' || c == 0)
        .unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Parses the main header and every sub-header of a `.tab` file.
///
/// Tables with an unknown name are validated like the others, then skipped
/// with a warning.
pub fn parse_table_headers(data: &[u8], filename: &str) -> Result<Vec<TableInfo>, TableError> {
    ensure!(filename, data.len() >= HEADER_LEN + SECTION_LEN);

    let main_header = read_header(&data[..HEADER_LEN]);
    ensure!(filename, main_header.sections_count == 1);
    let main_section = read_section(&data[HEADER_LEN..HEADER_LEN + SECTION_LEN], false);

    let [version, revision] = main_header.version;
    ensure!(filename, version > 11 || (version == 11 && revision >= 10));
    ensure!(filename, main_section.value_len == POINTER_LEN);
    ensure!(
        filename,
        data.len() >= HEADER_LEN + SECTION_LEN + main_section.values_count * POINTER_LEN
    );

    let build_date = parse_build_date(main_header.date);
    ensure!(filename, build_date.is_valid());

    let mut tables = Vec::with_capacity(main_section.values_count);
    for i in 0..main_section.values_count {
        let ptr = HEADER_LEN + SECTION_LEN + i * POINTER_LEN;
        let date_range = [be16(data, ptr), be16(data, ptr + 2)];
        let table_offset = be32(data, ptr + 6) as usize;
        ensure!(filename, data.len() >= table_offset + HEADER_LEN);

        let header = read_header(&data[table_offset..table_offset + HEADER_LEN]);
        let legacy = header.signature == b"GESTCOMP";
        ensure!(filename, header.sections_count <= MAX_SECTIONS);

        let mut sections = Vec::with_capacity(header.sections_count);
        for j in 0..header.sections_count {
            let offset = table_offset + HEADER_LEN + j * SECTION_LEN;
            ensure!(filename, data.len() >= offset + SECTION_LEN);

            let raw = read_section(&data[offset..offset + SECTION_LEN], legacy);
            ensure!(
                filename,
                data.len() >= table_offset + raw.raw_offset + raw.raw_len
            );
            ensure!(filename, raw.raw_len == raw.values_count * raw.value_len);

            sections.push(TableSection {
                raw_offset: table_offset + raw.raw_offset,
                raw_len: raw.raw_len,
                values_count: raw.values_count,
                value_len: raw.value_len,
            });
        }

        let raw_type = trim_name(header.name);
        let table_type = TableType::from_raw_name(&raw_type);

        let start = Date::from_table_days(date_range[0]);
        let end = if table_type == Some(TableType::GhmDecisionTree) && date_range[1] == u16::MAX {
            // Open-ended decision trees would stay in use forever.
            Date::new(start.year + 1, 3, 1)
        } else {
            Date::from_table_days(date_range[1])
        };
        ensure!(filename, end > start);

        let Some(table_type) = table_type else {
            tracing::warn!(file = filename, table = %raw_type, "ignoring unknown table type");
            continue;
        };

        tables.push(TableInfo {
            filename: filename.to_string(),
            build_date,
            version: header.version,
            limit_dates: [start, end],
            raw_type,
            table_type,
            sections,
        });
    }

    Ok(tables)
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn tree_table(date_range: [u16; 2]) -> SubTable {
        SubTable {
            name: "ARBREDEC",
            version: "1120",
            date_range,
            sections: vec![(6, vec![12, 0, 1, 0, 0x03, 0xF2])],
        }
    }

    #[test]
    fn parses_sub_headers() {
        let file = build_file(&[tree_table([14610, 14975])]);
        let tables = parse_table_headers(&file, "tree.tab").unwrap();
        assert_eq!(tables.len(), 1);

        let info = &tables[0];
        assert_eq!(info.table_type, TableType::GhmDecisionTree);
        assert_eq!(info.raw_type, "ARBREDEC");
        assert_eq!(info.version, [11, 20]);
        assert_eq!(info.build_date, Date::new(2020, 3, 15));
        assert_eq!(info.limit_dates[0], Date::from_table_days(14610));
        assert_eq!(info.sections[0].values_count, 1);
        assert_eq!(info.sections[0].value_len, 6);
    }

    #[test]
    fn open_ended_tree_stops_next_march() {
        let file = build_file(&[tree_table([14610, u16::MAX])]);
        let tables = parse_table_headers(&file, "tree.tab").unwrap();
        let start = tables[0].limit_dates[0];
        assert_eq!(tables[0].limit_dates[1], Date::new(start.year + 1, 3, 1));
    }

    #[test]
    fn unknown_tables_are_skipped() {
        let mut unknown = tree_table([14610, 14975]);
        unknown.name = "FOOBAR";
        let file = build_file(&[unknown, tree_table([14610, 14975])]);
        let tables = parse_table_headers(&file, "mixed.tab").unwrap();
        assert_eq!(tables.len(), 1);
    }

    #[test]
    fn rejects_old_versions_and_truncation() {
        let mut file = build_file(&[tree_table([14610, 14975])]);
        file[8..12].copy_from_slice(b"1109");
        let err = parse_table_headers(&file, "old.tab").unwrap_err();
        assert!(err.to_string().contains("Malformed binary table file 'old.tab'"));

        let file = build_file(&[tree_table([14610, 14975])]);
        assert!(parse_table_headers(&file[..file.len() - 1], "cut.tab").is_err());
        assert!(parse_table_headers(&file[..40], "cut.tab").is_err());
    }

    #[test]
    fn rejects_empty_date_ranges() {
        let file = build_file(&[tree_table([14975, 14610])]);
        assert!(parse_table_headers(&file, "dates.tab").is_err());
    }
}
