//! Price table documents.
//!
//! A price file is a JSON document holding one or more sector price tables:
//!
//! ```json
//! { "tables": [ { "date": "2019-03-01", "sector": "public",
//!                 "ghs_coefficient": "0.993",
//!                 "supplements": { "REA": 81254 },
//!                 "ghs": { "1500": { "price_cents": 102460 } } } ] }
//! ```
//!
//! Each table becomes a [`TableInfo`] of type `PriceTablePublic` or
//! `PriceTablePrivate`, sorted into indexes like the binary tables.

use crate::codes::{GhsCode, Sector, SupplementCounters, SupplementType};
use crate::date::Date;
use crate::error::PriceError;
use crate::types::{GhsPriceInfo, PriceTable, TableInfo, TableType};
use rust_decimal::Decimal;
use serde_json::Value;

/// Parses every price table of a JSON price document.
pub fn parse_price_file(text: &str, filename: &str) -> Result<Vec<(TableInfo, PriceTable)>, PriceError> {
    let doc: Value = serde_json::from_str(text).map_err(|source| PriceError::Json {
        file: filename.to_string(),
        source,
    })?;

    let tables = doc
        .get("tables")
        .and_then(|t| t.as_array())
        .ok_or_else(|| invalid(filename, "missing 'tables' array"))?;

    tables
        .iter()
        .map(|table| parse_price_table(table, filename))
        .collect()
}

fn invalid(filename: &str, reason: impl Into<String>) -> PriceError {
    PriceError::Invalid {
        file: filename.to_string(),
        reason: reason.into(),
    }
}

fn parse_date(obj: &Value, field: &str, filename: &str) -> Result<Option<Date>, PriceError> {
    let Some(raw) = obj.get(field).and_then(|v| v.as_str()) else {
        return Ok(None);
    };
    let date: Date = raw
        .parse()
        .map_err(|_| invalid(filename, format!("malformed date '{raw}' in '{field}'")))?;
    if !date.is_valid() {
        return Err(invalid(filename, format!("invalid date '{raw}' in '{field}'")));
    }
    Ok(Some(date))
}

fn parse_cents(value: &Value, what: &str, filename: &str) -> Result<i64, PriceError> {
    value
        .as_i64()
        .ok_or_else(|| invalid(filename, format!("'{what}' must be an integer amount of cents")))
}

fn parse_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    }
}

fn parse_price_table(obj: &Value, filename: &str) -> Result<(TableInfo, PriceTable), PriceError> {
    let start = parse_date(obj, "date", filename)?
        .ok_or_else(|| invalid(filename, "missing mandatory 'date'"))?;
    let end = parse_date(obj, "end", filename)?.unwrap_or(Date::new(start.year + 1, 3, 1));
    if end <= start {
        return Err(invalid(filename, format!("end date {end} is not after {start}")));
    }
    let build_date = parse_date(obj, "build_date", filename)?.unwrap_or_default();

    let sector: Sector = obj
        .get("sector")
        .and_then(|v| v.as_str())
        .ok_or_else(|| invalid(filename, "missing mandatory 'sector'"))?
        .parse()
        .map_err(|e| invalid(filename, format!("{e}")))?;

    let ghs_coefficient = match obj.get("ghs_coefficient") {
        None => Decimal::ZERO,
        Some(v) => parse_decimal(v)
            .filter(|c| *c >= Decimal::ZERO && *c <= Decimal::ONE)
            .ok_or_else(|| invalid(filename, format!("invalid GHS coefficient {v}")))?,
    };
    if ghs_coefficient.is_zero() {
        tracing::warn!(file = filename, %sector, "GHS coefficient is not set or equal to 0");
    }

    let mut supplement_prices = SupplementCounters::<i64>::default();
    if let Some(supplements) = obj.get("supplements").and_then(|v| v.as_object()) {
        for (key, value) in supplements {
            match key.as_str() {
                "TDE" | "TSE" => {}
                "STF" => {
                    let cents = parse_cents(value, key, filename)?;
                    supplement_prices[SupplementType::Reasi] = cents;
                    supplement_prices[SupplementType::Si] = cents;
                }
                name => {
                    let ty = SupplementType::from_name(name)
                        .ok_or_else(|| invalid(filename, format!("unknown supplement '{name}'")))?;
                    supplement_prices[ty] = parse_cents(value, key, filename)?;
                }
            }
        }
    }

    let mut prices = Vec::new();
    if let Some(ghs) = obj.get("ghs").and_then(|v| v.as_object()) {
        for (code, attrs) in ghs {
            let price = parse_ghs_price(code, attrs, filename)?;

            // Some supplements are priced as pseudo-GHS.
            let special = match price.ghs.0 {
                9614 => Some(SupplementType::Ohb),
                9615 => Some(SupplementType::Aph),
                9605 => Some(SupplementType::Dia),
                20020 => Some(SupplementType::Ent1),
                20021 => Some(SupplementType::Ent2),
                20024 => Some(SupplementType::Ent3),
                _ => None,
            };
            if let Some(ty) = special {
                supplement_prices[ty] = price.ghs_cents;
            }

            prices.push(price);
        }
    }
    prices.sort_by_key(|p| p.ghs);

    let (table_type, raw_type) = match sector {
        Sector::Public => (TableType::PriceTablePublic, "PRICEPUB"),
        Sector::Private => (TableType::PriceTablePrivate, "PRICEPRI"),
    };
    let info = TableInfo {
        filename: filename.to_string(),
        build_date,
        version: [0, 0],
        limit_dates: [start, end],
        raw_type: raw_type.to_string(),
        table_type,
        sections: Vec::new(),
    };

    Ok((info, PriceTable::new(ghs_coefficient, prices, supplement_prices)))
}

fn parse_ghs_price(code: &str, attrs: &Value, filename: &str) -> Result<GhsPriceInfo, PriceError> {
    let ghs: GhsCode = code
        .parse()
        .map_err(|_| invalid(filename, format!("invalid GHS code '{code}'")))?;
    let obj = attrs
        .as_object()
        .ok_or_else(|| invalid(filename, format!("GHS {code} must be an object")))?;

    let mut price = GhsPriceInfo {
        ghs,
        ..Default::default()
    };
    for (key, value) in obj {
        match key.as_str() {
            "price_cents" => price.ghs_cents = parse_cents(value, key, filename)?,
            "exb_cents" => price.exb_cents = parse_cents(value, key, filename)?,
            "exh_cents" => price.exh_cents = parse_cents(value, key, filename)?,
            "exb_threshold" | "exh_threshold" => {
                let threshold = value
                    .as_i64()
                    .and_then(|v| i32::try_from(v).ok())
                    .ok_or_else(|| invalid(filename, format!("GHS {code}: invalid '{key}'")))?;
                if key == "exb_threshold" {
                    price.exb_threshold = threshold;
                } else {
                    price.exh_threshold = threshold;
                }
            }
            "exb_once" => {
                price.exb_once = value
                    .as_bool()
                    .ok_or_else(|| invalid(filename, format!("GHS {code}: 'exb_once' must be a boolean")))?;
            }
            other => {
                return Err(invalid(filename, format!("GHS {code}: unknown price attribute '{other}'")));
            }
        }
    }

    if price.ghs_cents == 0
        || (price.exb_threshold == 0) != (price.exb_cents == 0)
        || (price.exh_threshold == 0) != (price.exh_cents == 0)
    {
        return Err(invalid(filename, format!("GHS {code}: missing price attributes")));
    }

    Ok(price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(doc: serde_json::Value) -> Result<Vec<(TableInfo, PriceTable)>, PriceError> {
        parse_price_file(&doc.to_string(), "prices.json")
    }

    #[test]
    fn parses_sector_tables() {
        let tables = parse(json!({
            "tables": [{
                "date": "2019-03-01",
                "sector": "public",
                "ghs_coefficient": "0.993",
                "supplements": { "REA": 81254, "STF": 40000, "TDE": 1 },
                "ghs": {
                    "1500": { "price_cents": 100000, "exb_threshold": 3, "exb_cents": 20000 },
                    "9614": { "price_cents": 45000 }
                }
            }]
        }))
        .unwrap();

        let (info, table) = &tables[0];
        assert_eq!(info.table_type, TableType::PriceTablePublic);
        assert_eq!(info.limit_dates, [Date::new(2019, 3, 1), Date::new(2020, 3, 1)]);
        assert_eq!(table.ghs_coefficient, "0.993".parse::<Decimal>().unwrap());
        assert_eq!(table.supplement_prices[SupplementType::Rea], 81254);
        assert_eq!(table.supplement_prices[SupplementType::Si], 40000);
        assert_eq!(table.supplement_prices[SupplementType::Ohb], 45000);

        let price = table.find(GhsCode(1500)).unwrap();
        assert_eq!((price.exb_threshold, price.exb_cents), (3, 20000));
        assert!(!price.exb_once);
    }

    #[test]
    fn rejects_unpaired_thresholds_and_unknown_supplements() {
        let unpaired = parse(json!({
            "tables": [{ "date": "2019-03-01", "sector": "private",
                         "ghs": { "1500": { "price_cents": 100, "exh_threshold": 10 } } }]
        }));
        assert!(unpaired.unwrap_err().to_string().contains("missing price attributes"));

        let unknown = parse(json!({
            "tables": [{ "date": "2019-03-01", "sector": "private",
                         "supplements": { "XYZ": 1 } }]
        }));
        assert!(unknown.unwrap_err().to_string().contains("unknown supplement 'XYZ'"));

        let coefficient = parse(json!({
            "tables": [{ "date": "2019-03-01", "sector": "public", "ghs_coefficient": 1.5 }]
        }));
        assert!(coefficient.is_err());
    }

    #[test]
    fn missing_date_is_an_error() {
        assert!(parse(json!({ "tables": [{ "sector": "public" }] })).is_err());
        assert!(parse_price_file("not json", "broken.json").is_err());
    }
}
