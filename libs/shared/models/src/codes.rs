//! Human-facing record codes: a fixed prefix followed by a zero-padded ordinal.

pub const PATIENT_CODE_PREFIX: &str = "BN";
pub const APPOINTMENT_CODE_PREFIX: &str = "APT";
pub const INVOICE_CODE_PREFIX: &str = "INV";

const ORDINAL_WIDTH: usize = 6;

pub fn generate_code(prefix: &str, ordinal: i64) -> String {
    format!("{}{:0width$}", prefix, ordinal, width = ORDINAL_WIDTH)
}

pub fn parse_ordinal(prefix: &str, code: &str) -> Option<i64> {
    code.strip_prefix(prefix)?.parse().ok()
}

/// Next ordinal given the current row count and the highest ordinal already issued.
/// Equals `count + 1` while no rows were deleted; never reuses an issued code otherwise.
pub fn next_ordinal(row_count: i64, highest_issued: i64) -> i64 {
    row_count.max(highest_issued) + 1
}
