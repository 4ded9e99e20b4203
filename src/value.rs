use rust_decimal::Decimal;
use std::fmt::Write;
use time::{Date, PrimitiveDateTime, Time};
use uuid::Uuid;

/// A typed cell value travelling between rows, query parameters and result
/// sets. Variants carry `Option` so a typed NULL keeps its declared type.
#[derive(Default, Debug, Clone)]
pub enum Value {
    #[default]
    Null,
    Boolean(Option<bool>),
    Int16(Option<i16>),
    Int32(Option<i32>),
    Int64(Option<i64>),
    Float64(Option<f64>),
    Decimal(Option<Decimal>, /* prec: */ u8, /* scale: */ u8),
    Varchar(Option<String>),
    Blob(Option<Box<[u8]>>),
    Date(Option<Date>),
    Timestamp(Option<PrimitiveDateTime>),
    Uuid(Option<Uuid>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Boolean(l), Self::Boolean(r)) => l == r,
            (Self::Int16(l), Self::Int16(r)) => l == r,
            (Self::Int32(l), Self::Int32(r)) => l == r,
            (Self::Int64(l), Self::Int64(r)) => l == r,
            (Self::Float64(l), Self::Float64(r)) => l == r,
            (Self::Decimal(l, l_prec, l_scale), Self::Decimal(r, r_prec, r_scale)) => {
                l == r && l_prec == r_prec && l_scale == r_scale
            }
            (Self::Varchar(l), Self::Varchar(r)) => l == r,
            (Self::Blob(l), Self::Blob(r)) => l == r,
            (Self::Date(l), Self::Date(r)) => l == r,
            (Self::Timestamp(l), Self::Timestamp(r)) => l == r,
            (Self::Uuid(l), Self::Uuid(r)) => l == r,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl Value {
    pub fn same_type(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Decimal(.., l_prec, l_scale), Self::Decimal(.., r_prec, r_scale)) => {
                l_prec == r_prec && l_scale == r_scale
            }
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(
            self,
            Value::Null
                | Value::Boolean(None)
                | Value::Int16(None)
                | Value::Int32(None)
                | Value::Int64(None)
                | Value::Float64(None)
                | Value::Decimal(None, ..)
                | Value::Varchar(None)
                | Value::Blob(None)
                | Value::Date(None)
                | Value::Timestamp(None)
                | Value::Uuid(None)
        )
    }

    /// Render the value as a SQL-style literal. Used for log lines and for
    /// the canonical identity key encoding, never for statement text: the
    /// compiler always binds values as parameters.
    pub fn write_literal(&self, out: &mut String) {
        if self.is_null() {
            out.push_str("NULL");
            return;
        }
        match self {
            Value::Boolean(Some(v)) => out.push_str(["false", "true"][*v as usize]),
            Value::Int16(Some(v)) => write_integer(out, *v),
            Value::Int32(Some(v)) => write_integer(out, *v),
            Value::Int64(Some(v)) => write_integer(out, *v),
            Value::Float64(Some(v)) => {
                let mut buffer = ryu::Buffer::new();
                out.push_str(buffer.format(*v));
            }
            Value::Decimal(Some(v), ..) => {
                let _ = write!(out, "{}", v);
            }
            Value::Varchar(Some(v)) => write_quoted_string(out, v),
            Value::Blob(Some(v)) => {
                out.push('\'');
                for b in v.iter() {
                    let _ = write!(out, "\\x{:02X}", b);
                }
                out.push('\'');
            }
            Value::Date(Some(v)) => {
                out.push('\'');
                write_date(out, v);
                out.push('\'');
            }
            Value::Timestamp(Some(v)) => {
                out.push('\'');
                write_date(out, &v.date());
                out.push('T');
                write_time(out, &v.time());
                out.push('\'');
            }
            Value::Uuid(Some(v)) => {
                let _ = write!(out, "'{}'", v);
            }
            _ => unreachable!("null variants are handled above"),
        }
    }
}

fn write_integer<I: itoa::Integer>(out: &mut String, value: I) {
    let mut buffer = itoa::Buffer::new();
    out.push_str(buffer.format(value));
}

fn write_quoted_string(out: &mut String, value: &str) {
    out.push('\'');
    let mut position = 0;
    for (i, c) in value.char_indices() {
        if c == '\'' {
            out.push_str(&value[position..i]);
            out.push_str("''");
            position = i + 1;
        }
    }
    out.push_str(&value[position..]);
    out.push('\'');
}

fn write_date(out: &mut String, value: &Date) {
    let _ = write!(
        out,
        "{:04}-{:02}-{:02}",
        value.year(),
        value.month() as u8,
        value.day()
    );
}

fn write_time(out: &mut String, value: &Time) {
    let mut subsecond = value.nanosecond();
    let mut width = 9;
    while width > 1 && subsecond % 10 == 0 {
        subsecond /= 10;
        width -= 1;
    }
    let _ = write!(
        out,
        "{:02}:{:02}:{:02}.{:0width$}",
        value.hour(),
        value.minute(),
        value.second(),
        subsecond
    );
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(Some(value))
    }
}
impl From<i16> for Value {
    fn from(value: i16) -> Self {
        Value::Int16(Some(value))
    }
}
impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int32(Some(value))
    }
}
impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(Some(value))
    }
}
impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float64(Some(value))
    }
}
impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Decimal(Some(value), 0, 0)
    }
}
impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Varchar(Some(value.to_owned()))
    }
}
impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Varchar(Some(value))
    }
}
impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Blob(Some(value.into()))
    }
}
impl From<Date> for Value {
    fn from(value: Date) -> Self {
        Value::Date(Some(value))
    }
}
impl From<PrimitiveDateTime> for Value {
    fn from(value: PrimitiveDateTime) -> Self {
        Value::Timestamp(Some(value))
    }
}
impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Value::Uuid(Some(value))
    }
}
impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}
