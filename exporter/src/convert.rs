//! Conversions from raw Fireboard telemetry strings to numeric metrics.
//!
//! Device logs report usage as loosely formatted strings (`"62/100"`,
//! `"2.7M/4.2M"`, `"66%"`). Every parser here is total: malformed input
//! degrades to `0.0` so a single bad field never voids a collection pass.
//! The `try_` variants return `None` instead, letting callers log the field.

/// Temperature unit reported in the `degreetype` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegreeUnit {
    Celsius,
    Fahrenheit,
}

impl DegreeUnit {
    /// 1 = Celsius, 2 = Fahrenheit. Anything else is unknown.
    pub fn from_degree_type(degree_type: i64) -> Option<Self> {
        match degree_type {
            1 => Some(DegreeUnit::Celsius),
            2 => Some(DegreeUnit::Fahrenheit),
            _ => None,
        }
    }
}

/// A value transformation applied to every sample of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    Identity,
    FahrenheitToCelsius,
}

impl Conversion {
    /// Picks the conversion for a channel. Only temperature channels reported
    /// in Fahrenheit are converted.
    pub fn for_channel(is_temperature: bool, unit: Option<DegreeUnit>) -> Self {
        match (is_temperature, unit) {
            (true, Some(DegreeUnit::Fahrenheit)) => Conversion::FahrenheitToCelsius,
            _ => Conversion::Identity,
        }
    }

    pub fn apply(&self, value: f64) -> f64 {
        match self {
            Conversion::Identity => identity(value),
            Conversion::FahrenheitToCelsius => f_to_c(value),
        }
    }
}

pub fn f_to_c(value: f64) -> f64 {
    (value - 32.0) * 5.0 / 9.0
}

pub fn identity(value: f64) -> f64 {
    value
}

/// `"a/b"` as a percentage, `0.0` when malformed.
pub fn ratio_percent(raw: &str) -> f64 {
    try_ratio_percent(raw).unwrap_or(0.0)
}

/// `"NN%"` as a number, `0.0` when malformed.
pub fn percent(raw: &str) -> f64 {
    try_percent(raw).unwrap_or(0.0)
}

/// Parses `"a/b"` into `100 * a / b`. Operands may carry a `K`, `M` or `G`
/// size suffix (`"0.8M/4.0M"`). A zero denominator is malformed.
pub fn try_ratio_percent(raw: &str) -> Option<f64> {
    let (numerator, denominator) = raw.trim().split_once('/')?;
    let numerator = parse_scaled(numerator)?;
    let denominator = parse_scaled(denominator)?;
    if denominator == 0.0 {
        return None;
    }
    let value = 100.0 * numerator / denominator;
    value.is_finite().then_some(value)
}

pub fn try_percent(raw: &str) -> Option<f64> {
    let value = raw.trim().strip_suffix('%')?.trim().parse::<f64>().ok()?;
    value.is_finite().then_some(value)
}

fn parse_scaled(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let (number, scale) = match raw.chars().last()? {
        'K' | 'k' => (&raw[..raw.len() - 1], 1024.0),
        'M' | 'm' => (&raw[..raw.len() - 1], 1024.0 * 1024.0),
        'G' | 'g' => (&raw[..raw.len() - 1], 1024.0 * 1024.0 * 1024.0),
        _ => (raw, 1.0),
    };
    let value = number.trim().parse::<f64>().ok()?;
    value.is_finite().then_some(value * scale)
}
