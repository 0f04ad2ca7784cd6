//! Typed values produced by converters and consumed by field setters

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use url::Url;

use crate::error::ConversionError;

/// Output of a converter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Url(Url),
    List(Vec<Value>),
}

impl Value {
    /// Short type name used in mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Str(_) => "string",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Bool(_) => "boolean",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Url(_) => "url",
            Value::List(_) => "list",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn mismatch(&self, expected: &'static str) -> ConversionError {
        ConversionError::TypeMismatch {
            expected,
            found: self.kind(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Str(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
            Value::Url(u) => f.write_str(u.as_str()),
            Value::List(items) => {
                let rendered: Vec<String> = items.iter().map(ToString::to_string).collect();
                f.write_str(&rendered.join(", "))
            }
        }
    }
}

/// Types a field setter can receive.
///
/// `Value::Null` becomes the type's empty value where it has one; wrap the
/// target in `Option` to observe absence instead.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, ConversionError>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        Ok(value)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Str(s) => Ok(s),
            Value::List(_) => Err(value.mismatch("string")),
            other => Ok(other.to_string()),
        }
    }
}

macro_rules! int_from_value {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self, ConversionError> {
                    match value {
                        Value::Int(i) => <$ty>::try_from(i).map_err(|_| ConversionError::OutOfRange {
                            value: i.to_string(),
                            target: stringify!($ty),
                        }),
                        Value::Null => Ok(0),
                        other => Err(other.mismatch("integer")),
                    }
                }
            }
        )*
    };
}

int_from_value!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Float(x) => Ok(x),
            Value::Int(i) => Ok(i as f64),
            Value::Null => Ok(0.0),
            other => Err(other.mismatch("float")),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        f64::from_value(value).map(|x| x as f32)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(other.mismatch("boolean")),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Date(d) => Ok(d),
            Value::DateTime(dt) => Ok(dt.date()),
            Value::Null => Ok(NaiveDate::default()),
            other => Err(other.mismatch("date")),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::DateTime(dt) => Ok(dt),
            Value::Date(d) => Ok(d.and_time(NaiveTime::MIN)),
            Value::Null => Ok(NaiveDateTime::default()),
            other => Err(other.mismatch("datetime")),
        }
    }
}

impl FromValue for Url {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Url(u) => Ok(u),
            Value::Null => Err(ConversionError::Absent { target: "url" }),
            other => Err(other.mismatch("url")),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            Value::Null => Ok(Vec::new()),
            other => Err(other.mismatch("list")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_maps_to_empty_values() {
        assert_eq!(String::from_value(Value::Null).unwrap(), "");
        assert_eq!(i32::from_value(Value::Null).unwrap(), 0);
        assert_eq!(Option::<i64>::from_value(Value::Null).unwrap(), None);
        assert_eq!(Vec::<String>::from_value(Value::Null).unwrap(), Vec::<String>::new());
        assert_eq!(
            Url::from_value(Value::Null),
            Err(ConversionError::Absent { target: "url" })
        );
    }

    #[test]
    fn test_integer_width_is_checked() {
        assert_eq!(u8::from_value(Value::Int(200)).unwrap(), 200);
        assert!(matches!(
            u8::from_value(Value::Int(300)),
            Err(ConversionError::OutOfRange { .. })
        ));
        assert!(matches!(
            u32::from_value(Value::Int(-1)),
            Err(ConversionError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_mismatch_names_both_sides() {
        let err = i64::from_value(Value::Str("12".into())).unwrap_err();
        assert_eq!(
            err,
            ConversionError::TypeMismatch {
                expected: "integer",
                found: "string"
            }
        );
    }

    #[test]
    fn test_lists_and_widening() {
        let list = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(Vec::<f64>::from_value(list).unwrap(), vec![1.0, 2.0]);
        assert_eq!(String::from_value(Value::Int(7)).unwrap(), "7");
        assert!(String::from_value(Value::List(vec![])).is_err());
    }

    #[test]
    fn test_serializes_untagged() {
        let value = Value::List(vec![
            Value::Str("a".into()),
            Value::Int(3),
            Value::Null,
            Value::Date(NaiveDate::from_ymd_opt(2023, 2, 28).unwrap()),
        ]);
        assert_eq!(
            serde_json::to_string(&value).unwrap(),
            r#"["a",3,null,"2023-02-28"]"#
        );
    }
}
