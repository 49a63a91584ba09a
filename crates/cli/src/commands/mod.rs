//! One module per subcommand.

pub(crate) mod classify;
pub(crate) mod constraints;
pub(crate) mod tables;

/// Formats cents as a decimal amount, `-12.05` for `-1205`.
pub(crate) fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}
