//! Binary result decoding for any column type
//!
//! tokio-postgres requests every result column in binary format and only
//! decodes the types it has a Rust counterpart for. [`Column`] accepts every
//! type: common scalars map to their natural [`Value`], `numeric` becomes a
//! float, `interval`, `uuid` and `bytea` render as PostgreSQL prints them,
//! arrays become lists, and anything unrecognized renders its payload as
//! `\x` hex.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::error::Error as StdError;
use std::fmt::Write;
use tokio_postgres::types::{FromSql, Kind, Type};
use uuid::Uuid;

use crate::testing::value::Value;

type DecodeResult<T> = std::result::Result<T, Box<dyn StdError + Sync + Send>>;

/// One decoded column value
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Column(pub Value);

impl<'a> FromSql<'a> for Column {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> DecodeResult<Self> {
        decode(ty, raw).map(Column)
    }

    fn from_sql_null(_ty: &Type) -> DecodeResult<Self> {
        Ok(Column(Value::Null))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

fn decode(ty: &Type, raw: &[u8]) -> DecodeResult<Value> {
    if let Kind::Array(_) = ty.kind() {
        let items = Vec::<Column>::from_sql(ty, raw)?;
        return Ok(Value::List(items.into_iter().map(|c| c.0).collect()));
    }

    let value = match *ty {
        Type::BOOL => Value::Bool(bool::from_sql(ty, raw)?),
        Type::CHAR => Value::Text(char::from(i8::from_sql(ty, raw)? as u8).to_string()),
        Type::INT2 => Value::Int(i16::from_sql(ty, raw)?.into()),
        Type::INT4 => Value::Int(i32::from_sql(ty, raw)?.into()),
        Type::INT8 => Value::Int(i64::from_sql(ty, raw)?),
        Type::OID => Value::Int(u32::from_sql(ty, raw)?.into()),
        Type::FLOAT4 => Value::Float(f32::from_sql(ty, raw)?.into()),
        Type::FLOAT8 => Value::Float(f64::from_sql(ty, raw)?),
        Type::NUMERIC => {
            let text = numeric_text(raw)?;
            match text.parse::<f64>() {
                Ok(x) => Value::Float(x),
                Err(_) => Value::Text(text),
            }
        }
        Type::TIMESTAMP => Value::Timestamp(NaiveDateTime::from_sql(ty, raw)?),
        Type::TIMESTAMPTZ => Value::Timestamp(DateTime::<Utc>::from_sql(ty, raw)?.naive_utc()),
        Type::DATE => Value::Text(NaiveDate::from_sql(ty, raw)?.format("%Y-%m-%d").to_string()),
        Type::INTERVAL => Value::Text(interval_text(raw)?),
        Type::UUID => Value::Text(Uuid::from_sql(ty, raw)?.hyphenated().to_string()),
        Type::BYTEA => Value::Text(hex_text(raw)),
        Type::JSON => Value::Text(String::from_utf8(raw.to_vec())?),
        // jsonb carries a one-byte format version before the text
        Type::JSONB => Value::Text(String::from_utf8(raw.get(1..).unwrap_or_default().to_vec())?),
        _ if <String as FromSql>::accepts(ty) => Value::Text(String::from_sql(ty, raw)?),
        _ => Value::Text(hex_text(raw)),
    };
    Ok(value)
}

fn hex_text(raw: &[u8]) -> String {
    let mut out = String::with_capacity(2 + raw.len() * 2);
    out.push_str("\\x");
    for byte in raw {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

fn be_u16(raw: &[u8], at: usize) -> DecodeResult<u16> {
    raw.get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| "truncated value".into())
}

/// Decimal text of a binary `numeric`: a header of digit count, weight,
/// sign and display scale followed by base-10000 digits
fn numeric_text(raw: &[u8]) -> DecodeResult<String> {
    let ndigits = usize::from(be_u16(raw, 0)?);
    let weight = i32::from(be_u16(raw, 2)? as i16);
    let sign = be_u16(raw, 4)?;
    let dscale = usize::from(be_u16(raw, 6)?);

    match sign {
        0xC000 => return Ok("NaN".to_string()),
        0xD000 => return Ok("Infinity".to_string()),
        0xF000 => return Ok("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits)
        .map(|i| be_u16(raw, 8 + 2 * i))
        .collect::<DecodeResult<Vec<u16>>>()?;
    let digit = |i: i32| -> u16 {
        usize::try_from(i)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == 0x4000 {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        for i in 0..=weight {
            if i == 0 {
                let _ = write!(out, "{}", digit(i));
            } else {
                let _ = write!(out, "{:04}", digit(i));
            }
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut i = weight + 1;
        while fraction.len() < dscale {
            let _ = write!(fraction, "{:04}", digit(i));
            i += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }
    Ok(out)
}

/// PostgreSQL's default `interval` output, e.g. `1 year 2 mons 3 days 04:05:06`
fn interval_text(raw: &[u8]) -> DecodeResult<String> {
    if raw.len() != 16 {
        return Err(format!("invalid interval length {}", raw.len()).into());
    }
    let micros = i64::from_be_bytes(raw[0..8].try_into()?);
    let days = i32::from_be_bytes(raw[8..12].try_into()?);
    let months = i32::from_be_bytes(raw[12..16].try_into()?);

    let mut parts = Vec::new();
    let unit = |n: i64, one: &str, many: &str| {
        format!("{} {}", n, if n.abs() == 1 { one } else { many })
    };
    if months / 12 != 0 {
        parts.push(unit(i64::from(months / 12), "year", "years"));
    }
    if months % 12 != 0 {
        parts.push(unit(i64::from(months % 12), "mon", "mons"));
    }
    if days != 0 {
        parts.push(unit(i64::from(days), "day", "days"));
    }
    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 { "-" } else { "" };
        let total = micros.unsigned_abs();
        let secs = total / 1_000_000;
        let mut time = format!(
            "{}{:02}:{:02}:{:02}",
            sign,
            secs / 3600,
            secs / 60 % 60,
            secs % 60
        );
        let fraction = total % 1_000_000;
        if fraction != 0 {
            let digits = format!("{:06}", fraction);
            time.push('.');
            time.push_str(digits.trim_end_matches('0'));
        }
        parts.push(time);
    }
    Ok(parts.join(" "))
}
