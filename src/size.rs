//! Human-readable size strings (`"5MB"`, `"512kb"`) to byte counts.
//!
//! Units are binary: `1KB == 1024B`.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SizeError {
    #[error("invalid size format `{0}`; use <integer><B|KB|MB|GB|TB>")]
    InvalidFormat(String),
    #[error("unsupported size unit `{0}`")]
    UnsupportedUnit(String),
}

/// Parse `<integer><unit>` where unit is one of B, KB, MB, GB, TB (any case).
pub fn parse_size(input: &str) -> Result<u64, SizeError> {
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| SizeError::InvalidFormat(input.to_string()))?;
    let (digits, unit) = input.split_at(split);

    if digits.is_empty() || unit.is_empty() || !unit.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(SizeError::InvalidFormat(input.to_string()));
    }

    let value: u64 = digits
        .parse()
        .map_err(|_| SizeError::InvalidFormat(input.to_string()))?;

    let exponent = match unit.to_ascii_uppercase().as_str() {
        "B" => 0,
        "KB" => 1,
        "MB" => 2,
        "GB" => 3,
        "TB" => 4,
        _ => return Err(SizeError::UnsupportedUnit(unit.to_string())),
    };

    value
        .checked_mul(1024u64.pow(exponent))
        .ok_or_else(|| SizeError::InvalidFormat(input.to_string()))
}
