//! Quantity parsing for metrics-server usage strings
//!
//! The metrics API usually reports CPU as nanocores (`"250000000n"`) and
//! memory as kibibytes (`"1048576Ki"`), but any quantity form is accepted:
//! binary and decimal suffixes and decimal exponents. Readings are
//! normalized to cores and to "GiB" computed as `bytes / 1e9`, which for
//! `Ki` values is exactly `value * 1024 / 1e9`. Existing stored history uses
//! that factor, so it is kept as is.

use thiserror::Error;

const BYTES_PER_GIB: f64 = 1e9;

/// Errors raised while parsing a quantity string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    #[error("empty quantity")]
    Empty,

    #[error("invalid number in quantity {0:?}")]
    InvalidNumber(String),

    #[error("unsupported unit suffix in quantity {0:?}")]
    UnknownSuffix(String),
}

/// Converts raw usage strings into cores and gibibytes
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitConverter;

impl UnitConverter {
    /// Parse a CPU quantity into cores
    pub fn cpu_cores(raw: &str) -> Result<f64, UnitError> {
        parse_quantity(raw)
    }

    /// Parse a memory quantity into gibibytes (`bytes / 1e9`)
    pub fn memory_gib(raw: &str) -> Result<f64, UnitError> {
        Ok(parse_quantity(raw)? / BYTES_PER_GIB)
    }
}

/// Scale of a quantity suffix. Sub-unit suffixes divide so that
/// `"500000000n"` lands exactly on `0.5`.
enum Scale {
    Mul(f64),
    Div(f64),
}

impl Scale {
    fn of(suffix: &str) -> Option<Self> {
        let scale = match suffix {
            "" => Scale::Mul(1.0),
            "Ki" => Scale::Mul(1024f64),
            "Mi" => Scale::Mul(1024f64.powi(2)),
            "Gi" => Scale::Mul(1024f64.powi(3)),
            "Ti" => Scale::Mul(1024f64.powi(4)),
            "Pi" => Scale::Mul(1024f64.powi(5)),
            "Ei" => Scale::Mul(1024f64.powi(6)),
            "n" => Scale::Div(1e9),
            "u" => Scale::Div(1e6),
            "m" => Scale::Div(1e3),
            "k" => Scale::Mul(1e3),
            "M" => Scale::Mul(1e6),
            "G" => Scale::Mul(1e9),
            "T" => Scale::Mul(1e12),
            "P" => Scale::Mul(1e15),
            "E" => Scale::Mul(1e18),
            _ => return None,
        };
        Some(scale)
    }

    fn apply(&self, value: f64) -> f64 {
        match self {
            Scale::Mul(factor) => value * factor,
            Scale::Div(divisor) => value / divisor,
        }
    }
}

/// Whether `rest` is a whole decimal exponent (`e3`, `E-2`).
///
/// A bare `E` is the exa suffix, not an exponent.
fn is_exponent(rest: &str) -> bool {
    let Some(tail) = rest.strip_prefix(['e', 'E']) else {
        return false;
    };
    let digits = tail.strip_prefix(['+', '-']).unwrap_or(tail);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Parse a Kubernetes quantity (`"1048576Ki"`, `"250m"`, `"1.5G"`, `"1e3"`) into base units
fn parse_quantity(raw: &str) -> Result<f64, UnitError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(UnitError::Empty);
    }

    let number_len = trimmed
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '+' | '-')))
        .unwrap_or(trimmed.len());
    let (digits, rest) = trimmed.split_at(number_len);

    let number = digits
        .parse::<f64>()
        .map_err(|_| UnitError::InvalidNumber(raw.to_string()))?;

    let scaled = if is_exponent(rest) {
        trimmed
            .parse::<f64>()
            .map_err(|_| UnitError::InvalidNumber(raw.to_string()))?
    } else {
        Scale::of(rest)
            .ok_or_else(|| UnitError::UnknownSuffix(raw.to_string()))?
            .apply(number)
    };

    if scaled.is_finite() {
        Ok(scaled)
    } else {
        Err(UnitError::InvalidNumber(raw.to_string()))
    }
}
