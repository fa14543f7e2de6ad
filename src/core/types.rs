use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

use super::value::DATETIME_FORMAT;
use super::{DbError, Result, Value};

pub type Row = Vec<Value>;

/// Declared storage type of a persistent field.
///
/// Drives DDL generation during schema sync and the conversion of raw
/// driver values back into domain values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Enumerations persist as their 32-bit discriminant.
    Enum,
    Boolean,
    Byte,
    Int16,
    Int32,
    Int64,
    Date,
    Time,
    DateTime,
    Decimal,
    Double,
    Float,
    Guid,
    Binary,
    String,
    /// Anything else, stored as an opaque blob.
    Object,
}

impl DataType {
    pub fn is_compatible(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (Self::Enum | Self::Byte | Self::Int16 | Self::Int32 | Self::Int64, Value::Integer(_)) => true,
            (Self::Boolean, Value::Boolean(_)) => true,
            (Self::Decimal | Self::Double | Self::Float, Value::Float(_) | Value::Integer(_)) => true,
            (Self::Date | Self::Time | Self::DateTime, Value::DateTime(_)) => true,
            (Self::Guid, Value::Guid(_)) => true,
            (Self::String, Value::Text(_)) => true,
            (Self::Binary | Self::Object, Value::Blob(_)) => true,
            _ => false,
        }
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            Self::Enum | Self::Byte | Self::Int16 | Self::Int32 | Self::Int64
        )
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::Time | Self::DateTime)
    }

    /// Coerces a loosely typed value (as produced by drivers that only know a
    /// handful of storage classes) into the representation this type expects.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        if value.is_null() || self.is_compatible(&value) {
            return Ok(value);
        }

        let coerced = match (self, &value) {
            (t, _) if t.is_integral() => value.as_i64().map(Value::Integer),
            (Self::Boolean, _) => value.as_i64().map(|i| Value::Boolean(i != 0)).or_else(|| {
                match value.as_str().map(str::to_ascii_lowercase).as_deref() {
                    Some("true") => Some(Value::Boolean(true)),
                    Some("false") => Some(Value::Boolean(false)),
                    _ => None,
                }
            }),
            (Self::Decimal | Self::Double | Self::Float, _) => value.as_f64().map(Value::Float),
            (Self::Guid, Value::Text(s)) => Uuid::parse_str(s.trim()).ok().map(Value::Guid),
            (Self::Guid, Value::Blob(b)) => Uuid::from_slice(b).ok().map(Value::Guid),
            (t, Value::Text(s)) if t.is_temporal() => parse_datetime(s).map(Value::DateTime),
            (Self::String, other) => Some(Value::Text(other.to_string())),
            (Self::Binary | Self::Object, Value::Text(s)) => Some(Value::Blob(s.clone().into_bytes())),
            _ => None,
        };

        coerced.ok_or_else(|| {
            DbError::TypeMismatch(format!("Cannot read {} as {}", value.type_name(), self))
        })
    }
}

/// Parses the datetime layouts drivers commonly hand back as text.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Enum => "ENUM",
            Self::Boolean => "BOOLEAN",
            Self::Byte => "BYTE",
            Self::Int16 => "INT16",
            Self::Int32 => "INT32",
            Self::Int64 => "INT64",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::DateTime => "DATETIME",
            Self::Decimal => "DECIMAL",
            Self::Double => "DOUBLE",
            Self::Float => "FLOAT",
            Self::Guid => "GUID",
            Self::Binary => "BINARY",
            Self::String => "STRING",
            Self::Object => "OBJECT",
        };
        write!(f, "{}", name)
    }
}

/// Conversion out of a [`Value`] into a concrete field type.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch<T>(value: &Value, target: &str) -> Result<T> {
    Err(DbError::TypeMismatch(format!(
        "Cannot convert {} to {}",
        value.type_name(),
        target
    )))
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s),
            Value::Null => Ok(String::new()),
            other => Ok(other.to_string()),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(0),
            ref v => v.as_i64().map_or_else(|| mismatch(v, "i64"), Ok),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide)
            .map_err(|_| DbError::TypeMismatch(format!("{} does not fit into i32", wide)))
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(0.0),
            ref v => v.as_f64().map_or_else(|| mismatch(v, "f64"), Ok),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match DataType::Boolean.coerce(value)? {
            Value::Boolean(b) => Ok(b),
            _ => Ok(false),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: Value) -> Result<Self> {
        match DataType::Guid.coerce(value)? {
            Value::Guid(g) => Ok(g),
            _ => Ok(Uuid::nil()),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Result<Self> {
        match DataType::DateTime.coerce(value)? {
            Value::DateTime(d) => Ok(d),
            other => mismatch(&other, "datetime"),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self> {
        match DataType::Binary.coerce(value)? {
            Value::Blob(b) => Ok(b),
            _ => Ok(Vec::new()),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}
