//! Typed query parameters and their coercion to native values

use chrono::NaiveDateTime;
use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::sync::OnceLock;

use crate::common::{Error, Result};

use super::scope::Scope;
use super::value::{Value, TIMESTAMP_PARSE_FORMAT};

/// Declared wire type of a parameter
///
/// Tags are matched case-insensitively. Unrecognized tags are kept as
/// [`ParamType::Other`] and their value is passed through unconverted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum ParamType {
    Int4,
    Int8,
    Float4,
    Float8,
    Boolean,
    Varchar,
    Timestamp,
    Other(String),
}

impl From<String> for ParamType {
    fn from(tag: String) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "int4" => ParamType::Int4,
            "int8" => ParamType::Int8,
            "float4" => ParamType::Float4,
            "float8" => ParamType::Float8,
            "boolean" => ParamType::Boolean,
            "varchar" => ParamType::Varchar,
            "timestamp" => ParamType::Timestamp,
            _ => ParamType::Other(tag),
        }
    }
}

impl From<&str> for ParamType {
    fn from(tag: &str) -> Self {
        ParamType::from(tag.to_string())
    }
}

impl ParamType {
    pub fn as_str(&self) -> &str {
        match self {
            ParamType::Int4 => "int4",
            ParamType::Int8 => "int8",
            ParamType::Float4 => "float4",
            ParamType::Float8 => "float8",
            ParamType::Boolean => "boolean",
            ParamType::Varchar => "varchar",
            ParamType::Timestamp => "timestamp",
            ParamType::Other(tag) => tag,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parameter as written in a step: a type tag and a raw literal
#[derive(Debug, Clone, Deserialize)]
pub struct TypedParameter {
    #[serde(rename = "type")]
    pub ty: ParamType,
    #[serde(default)]
    pub value: Value,
}

impl TypedParameter {
    pub fn new(ty: impl Into<ParamType>, value: impl Into<Value>) -> Self {
        Self {
            ty: ty.into(),
            value: value.into(),
        }
    }
}

/// A coerced parameter, ready to hand to a driver
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParam {
    pub ty: ParamType,
    pub value: Value,
}

/// Coerce every parameter of a step, in order
pub fn bind_parameters(params: &[TypedParameter], scope: &Scope) -> Result<Vec<BoundParam>> {
    params
        .iter()
        .map(|param| {
            Ok(BoundParam {
                ty: param.ty.clone(),
                value: coerce(param, scope)?,
            })
        })
        .collect()
}

/// Convert one parameter to the native value of its declared type
///
/// String literals are template-substituted first; other literals are
/// converted as they are.
pub fn coerce(param: &TypedParameter, scope: &Scope) -> Result<Value> {
    match &param.value {
        Value::Text(text) => {
            let resolved = Value::Text(scope.substitute(text).into_owned());
            convert(&resolved, &param.ty)
        }
        other => convert(other, &param.ty),
    }
}

fn convert(value: &Value, ty: &ParamType) -> Result<Value> {
    // SQL NULL binds as NULL for every typed tag; boolean keeps truthiness
    if matches!(value, Value::Null) && *ty != ParamType::Boolean {
        return Ok(Value::Null);
    }

    match ty {
        ParamType::Int4 => {
            let i = to_int(value, ty)?;
            if i32::try_from(i).is_err() {
                return Err(Error::conversion(value, ty.as_str(), "out of range"));
            }
            Ok(Value::Int(i))
        }
        ParamType::Int8 => to_int(value, ty).map(Value::Int),
        ParamType::Float4 | ParamType::Float8 => to_float(value, ty).map(Value::Float),
        ParamType::Boolean => Ok(Value::Bool(value.is_truthy())),
        ParamType::Varchar => Ok(Value::Text(value.to_string())),
        ParamType::Timestamp => to_timestamp(value).map(Value::Timestamp),
        ParamType::Other(_) => Ok(value.clone()),
    }
}

fn to_int(value: &Value, ty: &ParamType) -> Result<i64> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::Float(x) if x.is_finite() => {
            let truncated = x.trunc();
            // i64::MAX as f64 rounds up to 2^63, which is already out of range
            if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
                return Err(Error::conversion(value, ty.as_str(), "out of range"));
            }
            Ok(truncated as i64)
        }
        Value::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| Error::conversion(format!("'{}'", s), ty.as_str(), e)),
        other => Err(Error::conversion(
            other,
            ty.as_str(),
            format!("{} is not an integer", other.type_name()),
        )),
    }
}

fn to_float(value: &Value, ty: &ParamType) -> Result<f64> {
    match value {
        Value::Float(x) => Ok(*x),
        Value::Int(i) => Ok(*i as f64),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| Error::conversion(format!("'{}'", s), ty.as_str(), e)),
        other => Err(Error::conversion(
            other,
            ty.as_str(),
            format!("{} is not a number", other.type_name()),
        )),
    }
}

/// `YYYY-MM-DDTHH:MM:SS.ffffffZ` with one to six fraction digits
fn timestamp_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{1,6}Z$")
            .expect("timestamp pattern is valid")
    })
}

fn to_timestamp(value: &Value) -> Result<NaiveDateTime> {
    const EXPECTED: &str = "expected YYYY-MM-DDTHH:MM:SS.ffffffZ";
    match value {
        Value::Timestamp(ts) => Ok(*ts),
        Value::Text(s) if !timestamp_pattern().is_match(s) => {
            Err(Error::conversion(format!("'{}'", s), "timestamp", EXPECTED))
        }
        Value::Text(s) => NaiveDateTime::parse_from_str(s, TIMESTAMP_PARSE_FORMAT).map_err(|e| {
            Error::conversion(format!("'{}'", s), "timestamp", format!("{} ({})", e, EXPECTED))
        }),
        other => Err(Error::conversion(
            other,
            "timestamp",
            format!("{} is not a timestamp string", other.type_name()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorKind;
    use crate::testing::scope::Variables;
    use chrono::NaiveDate;

    fn empty() -> Scope {
        Scope::default()
    }

    #[test]
    fn test_tags_are_case_insensitive() {
        assert_eq!(ParamType::from("INT4"), ParamType::Int4);
        assert_eq!(ParamType::from("Timestamp"), ParamType::Timestamp);
        assert_eq!(
            ParamType::from("uuid"),
            ParamType::Other("uuid".to_string())
        );
    }

    #[test]
    fn test_int_from_text() {
        let value = coerce(&TypedParameter::new("int4", "42"), &empty()).unwrap();
        assert_eq!(value, Value::Int(42));
        let value = coerce(&TypedParameter::new("int8", " -9000000000 "), &empty()).unwrap();
        assert_eq!(value, Value::Int(-9_000_000_000));
    }

    #[test]
    fn test_int_from_native_literals() {
        assert_eq!(
            coerce(&TypedParameter::new("int8", 7i64), &empty()).unwrap(),
            Value::Int(7)
        );
        assert_eq!(
            coerce(&TypedParameter::new("int8", 7.9f64), &empty()).unwrap(),
            Value::Int(7)
        );
        assert_eq!(
            coerce(&TypedParameter::new("int4", true), &empty()).unwrap(),
            Value::Int(1)
        );
    }

    #[test]
    fn test_unparsable_numeric_is_conversion_error() {
        for (tag, raw) in [("int4", "forty-two"), ("int8", "4.2"), ("float8", "x1.5")] {
            let err = coerce(&TypedParameter::new(tag, raw), &empty()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Conversion, "{tag} {raw}");
        }
    }

    #[test]
    fn test_int4_range_is_checked() {
        let err = coerce(&TypedParameter::new("int4", "3000000000"), &empty()).unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert!(coerce(&TypedParameter::new("int8", "3000000000"), &empty()).is_ok());
    }

    #[test]
    fn test_huge_float_is_out_of_range() {
        for raw in [1e30, -1e30, 9.3e18] {
            let err = coerce(&TypedParameter::new("int8", raw), &empty()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Conversion, "{raw}");
            assert!(err.to_string().contains("out of range"));
        }
        assert_eq!(
            coerce(&TypedParameter::new("int8", -9.2e18), &empty()).unwrap(),
            Value::Int(-9_200_000_000_000_000_000)
        );
    }

    #[test]
    fn test_float() {
        assert_eq!(
            coerce(&TypedParameter::new("float8", "1.25"), &empty()).unwrap(),
            Value::Float(1.25)
        );
        assert_eq!(
            coerce(&TypedParameter::new("float4", 3i64), &empty()).unwrap(),
            Value::Float(3.0)
        );
    }

    #[test]
    fn test_boolean_truthiness() {
        let cases = [
            (Value::from("false"), true),
            (Value::from(""), false),
            (Value::Bool(false), false),
            (Value::Int(0), false),
            (Value::Int(2), true),
            (Value::Null, false),
        ];
        for (raw, expected) in cases {
            let param = TypedParameter::new("boolean", raw.clone());
            assert_eq!(coerce(&param, &empty()).unwrap(), Value::Bool(expected), "{raw:?}");
        }
    }

    #[test]
    fn test_varchar_renders_value() {
        assert_eq!(
            coerce(&TypedParameter::new("varchar", 12i64), &empty()).unwrap(),
            Value::Text("12".into())
        );
    }

    #[test]
    fn test_timestamp() {
        let param = TypedParameter::new("timestamp", "2021-09-01T12:34:56.123456Z");
        let expected = NaiveDate::from_ymd_opt(2021, 9, 1)
            .unwrap()
            .and_hms_micro_opt(12, 34, 56, 123_456)
            .unwrap();
        assert_eq!(coerce(&param, &empty()).unwrap(), Value::Timestamp(expected));
    }

    #[test]
    fn test_short_fraction_timestamp() {
        let param = TypedParameter::new("timestamp", "2021-09-01T12:34:56.5Z");
        let expected = NaiveDate::from_ymd_opt(2021, 9, 1)
            .unwrap()
            .and_hms_milli_opt(12, 34, 56, 500)
            .unwrap();
        assert_eq!(coerce(&param, &empty()).unwrap(), Value::Timestamp(expected));
    }

    #[test]
    fn test_bad_timestamp() {
        for raw in [
            "2021-09-01 12:34:56.123456",
            "yesterday",
            "2021-09-01T12:34:56Z",
            "2021-09-01T12:34:56.123456789Z",
            "2021-9-1T12:34:56.1Z",
            "2021-13-01T12:34:56.1Z",
        ] {
            let err = coerce(&TypedParameter::new("timestamp", raw), &empty()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Conversion);
        }
        let err = coerce(&TypedParameter::new("timestamp", 5i64), &empty()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conversion);
    }

    #[test]
    fn test_null_binds_as_null() {
        for tag in ["int4", "float8", "varchar", "timestamp"] {
            assert_eq!(
                coerce(&TypedParameter::new(tag, Value::Null), &empty()).unwrap(),
                Value::Null
            );
        }
    }

    #[test]
    fn test_unknown_tag_passes_through() {
        let param = TypedParameter::new("uuid", Value::Int(5));
        assert_eq!(coerce(&param, &empty()).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_only_text_literals_are_substituted() {
        let mut vars = Variables::new();
        vars.insert("id".into(), Value::Int(17));
        vars.insert("day".into(), "2021-09-01".into());
        let scope = Scope::new(&vars, &Variables::new());

        let id = coerce(&TypedParameter::new("int8", "${id}"), &scope).unwrap();
        assert_eq!(id, Value::Int(17));

        let ts = coerce(
            &TypedParameter::new("timestamp", "${day}T00:00:00.000000Z"),
            &scope,
        )
        .unwrap();
        assert!(matches!(ts, Value::Timestamp(_)));

        let untouched = coerce(&TypedParameter::new("other", Value::List(vec![])), &scope).unwrap();
        assert_eq!(untouched, Value::List(vec![]));
    }

    #[test]
    fn test_bind_parameters_keeps_order() {
        let params = vec![
            TypedParameter::new("int4", "1"),
            TypedParameter::new("varchar", "two"),
            TypedParameter::new("float8", "3.0"),
        ];
        let bound = bind_parameters(&params, &empty()).unwrap();
        let values: Vec<_> = bound.iter().map(|p| p.value.clone()).collect();
        assert_eq!(
            values,
            vec![Value::Int(1), Value::from("two"), Value::Float(3.0)]
        );
        assert_eq!(bound[0].ty, ParamType::Int4);
    }

    #[test]
    fn test_deserialize_parameter() {
        let param: TypedParameter = serde_yaml::from_str("{type: INT8, value: '10'}").unwrap();
        assert_eq!(param.ty, ParamType::Int8);
        assert_eq!(param.value, Value::from("10"));
    }
}
