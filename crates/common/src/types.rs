//! Domain types shared across the screener client.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ── Filter catalog types ──────────────────────────────────────────────

/// Declared numeric type of a filter parameter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Int,
    Float,
}

/// One parameter of a filter as returned by GET /api/filters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<f64>,
}

impl FilterParameter {
    /// The declared default coerced to this parameter's type, or `Unset`.
    pub fn default_value(&self) -> ParamValue {
        match self.default {
            Some(v) => ParamValue::from_number(self.param_type, v),
            None => ParamValue::Unset,
        }
    }
}

/// A filter as returned by GET /api/filters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<FilterParameter>,
}

impl FilterDefinition {
    /// Look up a declared parameter by name.
    pub fn parameter(&self, name: &str) -> Option<&FilterParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

// ── Selection types ───────────────────────────────────────────────────

/// Current value of one parameter in a selection.
///
/// `Unset` goes on the wire as `""` and `NotANumber` as `null`; the backend
/// owns validation of both.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Unset,
    Int(i64),
    Float(f64),
    NotANumber,
}

/// Largest integer an f64 holds exactly (2^53).
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

/// Bounds of the values an `i64` can hold, as f64 (-2^63 inclusive, 2^63
/// exclusive).
const I64_MIN_F64: f64 = -9_223_372_036_854_775_808.0;
const I64_END_F64: f64 = 9_223_372_036_854_775_808.0;

fn fits_i64(v: f64) -> bool {
    (I64_MIN_F64..I64_END_F64).contains(&v)
}

impl ParamValue {
    /// Convert a catalog-supplied number to a value of the given type.
    ///
    /// An int default is only narrowed when it is integral and fits an
    /// `i64`. Anything else is kept as the float the catalog sent, so the
    /// backend sees the number it declared.
    pub fn from_number(param_type: ParamType, v: f64) -> Self {
        if v.is_nan() {
            return ParamValue::NotANumber;
        }
        match param_type {
            ParamType::Int if v.fract() == 0.0 && fits_i64(v) => ParamValue::Int(v as i64),
            ParamType::Int | ParamType::Float => ParamValue::Float(v),
        }
    }

    /// Coerce raw user input by declared type. Never fails: anything that
    /// does not parse becomes `NotANumber`.
    ///
    /// Decimal input for an int parameter is truncated. Input outside the
    /// `i64` range stays a float rather than clamping to the bounds.
    pub fn parse(param_type: ParamType, raw: &str) -> Self {
        let raw = raw.trim();
        if param_type == ParamType::Int {
            if let Ok(v) = raw.parse::<i64>() {
                return ParamValue::Int(v);
            }
        }
        let v = match raw.parse::<f64>() {
            Ok(v) if !v.is_nan() => v,
            _ => return ParamValue::NotANumber,
        };
        match param_type {
            ParamType::Int if fits_i64(v.trunc()) => ParamValue::Int(v.trunc() as i64),
            ParamType::Int | ParamType::Float => ParamValue::Float(v),
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, ParamValue::Unset)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            ParamValue::Int(v) => Some(v as f64),
            ParamValue::Float(v) => Some(v),
            ParamValue::Unset | ParamValue::NotANumber => None,
        }
    }
}

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            ParamValue::Unset => serializer.serialize_str(""),
            ParamValue::Int(v) => serializer.serialize_i64(v),
            // Integral floats go out as integers, matching what a JSON
            // number literal like `15` looks like on the wire.
            ParamValue::Float(v) if v.fract() == 0.0 && v.abs() <= MAX_EXACT_INT => {
                serializer.serialize_i64(v as i64)
            }
            ParamValue::Float(v) if v.is_finite() => serializer.serialize_f64(v),
            ParamValue::Float(_) | ParamValue::NotANumber => serializer.serialize_none(),
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Unset => write!(f, "-"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::NotANumber => write!(f, "NaN"),
        }
    }
}

/// An enabled filter with its current parameter values.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SelectedFilter {
    pub id: String,
    pub params: BTreeMap<String, ParamValue>,
}

impl SelectedFilter {
    /// Entry with no parameter values, used for ids the catalog does not know.
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            params: BTreeMap::new(),
        }
    }
}

/// Body of POST /api/screener/run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScreenerRunRequest {
    pub filters: Vec<SelectedFilter>,
}

// ── Result types ──────────────────────────────────────────────────────

/// One matching security returned by POST /api/screener/run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScreenerResult {
    pub symbol: String,
    pub company_name: String,
    pub last_price: f64,
    pub volume: f64,
    pub trade_value: f64,
    pub percent_change: f64,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub score: Option<f64>,
}

/// A row of GET /api/symbols.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymbolInfo {
    pub id: i64,
    pub symbol: String,
    pub company_name: String,
    pub last_price: f64,
    pub volume: f64,
    pub trade_value: f64,
    pub percent_change: f64,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub last_updated: DateTime<Utc>,
}

/// Accepts RFC 3339 timestamps and offset-less ones, which are taken as UTC.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| serde::de::Error::custom(format!("invalid timestamp {raw:?}: {e}")))
}

/// Query for GET /api/symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolQuery {
    pub search: String,
    pub page: u32,
    pub page_size: u32,
}

impl Default for SymbolQuery {
    fn default() -> Self {
        Self {
            search: String::new(),
            page: 1,
            page_size: 20,
        }
    }
}
