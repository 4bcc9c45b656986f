// Modem reading parsers: raw cell text -> value in canonical units.
// Frequency -> Hz, power -> dBmV, SNR -> dB, symbol rate -> integer as printed.

use std::str::FromStr;
use thiserror::Error;

/// Cell text the modem prints for a measurement that does not apply to a channel.
pub const NOT_APPLICABLE: &str = "NA";

const HZ_PER_MHZ: f64 = 1_000_000.0;

/// Outcome of parsing one reading. `Absent` is a normal result, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedValue<T> {
    Present(T),
    Absent,
    Malformed(ValueError),
}

impl<T> ParsedValue<T> {
    /// `Ok(Some)` for present, `Ok(None)` for absent, `Err` for malformed.
    pub fn into_result(self) -> Result<Option<T>, ValueError> {
        match self {
            ParsedValue::Present(v) => Ok(Some(v)),
            ParsedValue::Absent => Ok(None),
            ParsedValue::Malformed(e) => Err(e),
        }
    }
}

impl<T> From<Result<T, ValueError>> for ParsedValue<T> {
    fn from(r: Result<T, ValueError>) -> Self {
        match r {
            Ok(v) => ParsedValue::Present(v),
            Err(e) => ParsedValue::Malformed(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("unknown unit: {0}")]
    UnknownUnit(String),
    #[error("got {count} {reading} parts, expected 1 or 2: {parts:?}")]
    PartCount {
        reading: &'static str,
        count: usize,
        parts: Vec<String>,
    },
    #[error("invalid number: {0:?}")]
    InvalidNumber(String),
}

fn number<T: FromStr>(s: &str) -> Result<T, ValueError> {
    s.parse().map_err(|_| ValueError::InvalidNumber(s.to_string()))
}

/// Bare number, or number followed by exactly `unit`.
fn with_unit<T: FromStr>(parts: &[&str], unit: &str, reading: &'static str) -> Result<T, ValueError> {
    match parts {
        [value] => number(value),
        [value, u] if *u == unit => number(value),
        [_, u] => Err(ValueError::UnknownUnit(u.to_string())),
        _ => Err(ValueError::PartCount {
            reading,
            count: parts.len(),
            parts: parts.iter().map(|p| p.to_string()).collect(),
        }),
    }
}

/// Bare value is already Hz; `"<n> MHz"` is scaled to Hz. No NA form.
pub fn parse_frequency(raw: &str) -> ParsedValue<f64> {
    let parts: Vec<&str> = raw.split_whitespace().collect();
    match parts.as_slice() {
        [value, "MHz"] => number::<f64>(value).map(|mhz| mhz * HZ_PER_MHZ).into(),
        _ => with_unit(&parts, "MHz", "frequency").into(),
    }
}

/// SNR in dB. Tokens are separated by a single space; runs of spaces are malformed.
pub fn parse_snr(raw: &str) -> ParsedValue<f64> {
    if raw == NOT_APPLICABLE {
        return ParsedValue::Absent;
    }
    let parts: Vec<&str> = raw.split(' ').collect();
    with_unit(&parts, "dB", "SNR").into()
}

pub fn parse_power_level(raw: &str) -> ParsedValue<f64> {
    if raw == NOT_APPLICABLE {
        return ParsedValue::Absent;
    }
    let parts: Vec<&str> = raw.split_whitespace().collect();
    with_unit(&parts, "dBmV", "power level").into()
}

/// Symbol rate as printed. A `kSym/s` suffix is accepted but the number is
/// not scaled to symbols/s, so existing series keep their units.
pub fn parse_symbol_rate(raw: &str) -> ParsedValue<i64> {
    let parts: Vec<&str> = raw.split_whitespace().collect();
    with_unit(&parts, "kSym/s", "symbol rate").into()
}

/// Plain base-10 counter (channel number, codeword counters).
pub fn parse_count(raw: &str) -> Result<i64, ValueError> {
    number(raw)
}
