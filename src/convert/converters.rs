//! Typed converters: the second pipeline step (string -> Value)

use std::num::IntErrorKind;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use url::Url;

use super::value::Value;
use crate::error::ConversionError;

/// Ordinal day suffixes: "28th" -> "28".
static ORDINAL_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)\b").unwrap());

/// Date layouts tried in order by [`DateConverter::new`].
pub const DEFAULT_DATE_FORMATS: &[&str] = &[
    "%d %B %Y",
    "%d %b %Y",
    "%B %d %Y",
    "%B %d, %Y",
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%d-%m-%Y",
    "%Y/%m/%d",
];

/// Date-time layouts tried after RFC 3339.
pub const DEFAULT_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M",
    "%d.%m.%Y %H:%M",
];

/// Turns transformed text into a typed [`Value`].
pub trait Converter: Send + Sync {
    fn convert(&self, input: &str) -> Result<Value, ConversionError>;
}

impl<F> Converter for F
where
    F: Fn(&str) -> Result<Value, ConversionError> + Send + Sync,
{
    fn convert(&self, input: &str) -> Result<Value, ConversionError> {
        self(input)
    }
}

fn unparseable(input: &str, target: &'static str, reason: impl ToString) -> ConversionError {
    ConversionError::Unparseable {
        input: input.to_string(),
        target,
        reason: reason.to_string(),
    }
}

/// Drops thousands separators and inner whitespace.
fn numeric_text(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, ',' | '_') && !c.is_whitespace())
        .collect()
}

/// Passes text through as `Value::Str`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringConverter;

impl Converter for StringConverter {
    fn convert(&self, input: &str) -> Result<Value, ConversionError> {
        Ok(Value::Str(input.to_string()))
    }
}

/// Parses a signed 64-bit integer.
///
/// Blank input becomes `0`, or `Null` when nullable.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerConverter {
    nullable: bool,
}

impl IntegerConverter {
    pub fn new(nullable: bool) -> Self {
        Self { nullable }
    }
}

impl Converter for IntegerConverter {
    fn convert(&self, input: &str) -> Result<Value, ConversionError> {
        let text = numeric_text(input);
        if text.is_empty() {
            return Ok(if self.nullable {
                Value::Null
            } else {
                Value::Int(0)
            });
        }
        match text.parse::<i64>() {
            Ok(i) => Ok(Value::Int(i)),
            Err(e) if matches!(e.kind(), IntErrorKind::PosOverflow | IntErrorKind::NegOverflow) => {
                Err(ConversionError::OutOfRange {
                    value: text,
                    target: "i64",
                })
            }
            Err(e) => Err(unparseable(input, "integer", e)),
        }
    }
}

/// Parses a finite 64-bit float.
///
/// Blank input becomes `0.0`, or `Null` when nullable.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatConverter {
    nullable: bool,
}

impl FloatConverter {
    pub fn new(nullable: bool) -> Self {
        Self { nullable }
    }
}

impl Converter for FloatConverter {
    fn convert(&self, input: &str) -> Result<Value, ConversionError> {
        let text = numeric_text(input);
        if text.is_empty() {
            return Ok(if self.nullable {
                Value::Null
            } else {
                Value::Float(0.0)
            });
        }
        let x: f64 = text.parse().map_err(|e| unparseable(input, "float", e))?;
        if !x.is_finite() {
            return Err(unparseable(input, "float", "not a finite number"));
        }
        Ok(Value::Float(x))
    }
}

/// Accepts true/false, yes/no, on/off and 1/0 in any case. Blank is `false`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanConverter;

impl Converter for BooleanConverter {
    fn convert(&self, input: &str) -> Result<Value, ConversionError> {
        match input.trim().to_ascii_lowercase().as_str() {
            "" | "false" | "no" | "off" | "0" => Ok(Value::Bool(false)),
            "true" | "yes" | "on" | "1" => Ok(Value::Bool(true)),
            _ => Err(unparseable(input, "boolean", "expected true/false, yes/no, on/off or 1/0")),
        }
    }
}

/// Strips ordinal suffixes and folds whitespace before date parsing.
fn normalize_date_text(input: &str) -> String {
    let stripped = ORDINAL_SUFFIX.replace_all(input.trim(), "$1");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parses calendar dates against an ordered list of `chrono` formats.
#[derive(Debug, Clone)]
pub struct DateConverter {
    formats: Vec<String>,
    nullable: bool,
}

impl DateConverter {
    pub fn new(nullable: bool) -> Self {
        Self::with_formats(DEFAULT_DATE_FORMATS.iter().copied(), nullable)
    }

    pub fn with_formats<I, S>(formats: I, nullable: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            formats: formats.into_iter().map(Into::into).collect(),
            nullable,
        }
    }

    fn parse(&self, text: &str) -> Option<NaiveDate> {
        self.formats
            .iter()
            .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
    }
}

impl Converter for DateConverter {
    fn convert(&self, input: &str) -> Result<Value, ConversionError> {
        let text = normalize_date_text(input);
        if text.is_empty() {
            return Ok(if self.nullable {
                Value::Null
            } else {
                Value::Date(NaiveDate::default())
            });
        }
        self.parse(&text)
            .map(Value::Date)
            .ok_or_else(|| unparseable(input, "date", "no known date format matches"))
    }
}

/// Parses RFC 3339 timestamps, then the configured layouts, then plain dates
/// at midnight. Offsets are dropped and the wall-clock time is kept.
#[derive(Debug, Clone)]
pub struct DateTimeConverter {
    formats: Vec<String>,
    dates: DateConverter,
    nullable: bool,
}

impl DateTimeConverter {
    pub fn new(nullable: bool) -> Self {
        Self {
            formats: DEFAULT_DATETIME_FORMATS.iter().map(|f| f.to_string()).collect(),
            dates: DateConverter::new(nullable),
            nullable,
        }
    }
}

impl Converter for DateTimeConverter {
    fn convert(&self, input: &str) -> Result<Value, ConversionError> {
        let text = normalize_date_text(input);
        if text.is_empty() {
            return Ok(if self.nullable {
                Value::Null
            } else {
                Value::DateTime(NaiveDateTime::default())
            });
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(&text) {
            return Ok(Value::DateTime(dt.naive_local()));
        }
        let parsed = self
            .formats
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(&text, format).ok())
            .or_else(|| self.dates.parse(&text).map(|d| d.and_time(NaiveTime::MIN)));
        parsed
            .map(Value::DateTime)
            .ok_or_else(|| unparseable(input, "datetime", "no known date-time format matches"))
    }
}

/// Parses absolute URLs, or resolves relative ones against a base.
///
/// Blank input is `Null`.
#[derive(Debug, Clone, Default)]
pub struct UrlConverter {
    base: Option<Url>,
}

impl UrlConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(base: Url) -> Self {
        Self { base: Some(base) }
    }
}

impl Converter for UrlConverter {
    fn convert(&self, input: &str) -> Result<Value, ConversionError> {
        let text = input.trim();
        if text.is_empty() {
            return Ok(Value::Null);
        }
        let parsed = match &self.base {
            Some(base) => base.join(text),
            None => Url::parse(text),
        };
        parsed
            .map(Value::Url)
            .map_err(|e| unparseable(input, "url", e))
    }
}
