//! Comparison of actual results against step expectations

use crate::common::{Error, Result};
use crate::driver::ExecutionResult;

use super::suite::ExpectSpec;
use super::value::Value;

/// What a step asks of its result
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Expectation<'a> {
    /// The result must equal this value
    Exact(&'a Value),
    /// Each of these rows must appear somewhere in the result
    Contains(&'a Value),
}

impl ExpectSpec {
    /// `result` wins when both keys are given; `None` when neither is
    pub fn expectation(&self) -> Option<Expectation<'_>> {
        match (&self.result, &self.result_contains) {
            (Some(result), _) => Some(Expectation::Exact(result)),
            (None, Some(rows)) => Some(Expectation::Contains(rows)),
            (None, None) => None,
        }
    }
}

/// Check `actual` against `expected`
pub fn assert_result(expected: &Expectation<'_>, actual: &ExecutionResult) -> Result<()> {
    if let ExecutionResult::Raw(status) = actual {
        return Err(Error::ResultShape {
            expected: describe(expected),
            actual: status.clone(),
        });
    }

    match *expected {
        Expectation::Exact(Value::List(expected_rows)) => {
            let rows = actual_rows(expected, actual)?;
            if rows.as_slice() == expected_rows.as_slice() {
                Ok(())
            } else {
                Err(Error::result_mismatch(
                    Value::List(expected_rows.clone()),
                    Value::List(rows),
                ))
            }
        }
        Expectation::Exact(scalar) => {
            let rendered = actual.to_string();
            if rendered == scalar.to_string() {
                Ok(())
            } else {
                Err(Error::result_mismatch(scalar, rendered))
            }
        }
        Expectation::Contains(Value::List(wanted)) => {
            let rows = actual_rows(expected, actual)?;
            match wanted.iter().find(|row| !rows.contains(row)) {
                Some(missing) => Err(Error::MissingRow {
                    row: missing.to_string(),
                    actual: Value::List(rows).to_string(),
                }),
                None => Ok(()),
            }
        }
        Expectation::Contains(other) => Err(Error::Assertion(format!(
            "result_contains must be a list of rows, got {}",
            other.type_name()
        ))),
    }
}

/// Rows of a RowSet as lists of values with timestamps rendered as text
fn actual_rows(expected: &Expectation<'_>, actual: &ExecutionResult) -> Result<Vec<Value>> {
    match actual {
        ExecutionResult::RowSet(records) => Ok(records
            .iter()
            .map(|record| Value::List(record.values().cloned().collect()).with_rendered_timestamps())
            .collect()),
        other => Err(Error::ResultShape {
            expected: describe(expected),
            actual: other.to_string(),
        }),
    }
}

fn describe(expected: &Expectation<'_>) -> String {
    match expected {
        Expectation::Exact(value) => format!("result {}", value),
        Expectation::Contains(value) => format!("rows {}", value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorKind;
    use crate::driver::Record;
    use chrono::NaiveDate;

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    fn rowset(rows: &[&[Value]]) -> ExecutionResult {
        ExecutionResult::RowSet(
            rows.iter()
                .map(|r| Record::from_values(r.iter().cloned()))
                .collect(),
        )
    }

    fn ab() -> ExecutionResult {
        rowset(&[&[1.into(), "a".into()], &[2.into(), "b".into()]])
    }

    #[test]
    fn test_exact_rows() {
        let expected = yaml("[[1, a], [2, b]]");
        assert!(assert_result(&Expectation::Exact(&expected), &ab()).is_ok());
    }

    #[test]
    fn test_exact_rows_order_matters() {
        let expected = yaml("[[2, b], [1, a]]");
        let err = assert_result(&Expectation::Exact(&expected), &ab()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Assertion);
        assert_eq!(
            err.to_string(),
            "Expected result [[2, 'b'], [1, 'a']], got [[1, 'a'], [2, 'b']]"
        );
    }

    #[test]
    fn test_exact_rows_length_matters() {
        let expected = yaml("[[1, a]]");
        assert!(assert_result(&Expectation::Exact(&expected), &ab()).is_err());
        let empty = yaml("[]");
        assert!(assert_result(&Expectation::Exact(&empty), &rowset(&[])).is_ok());
    }

    #[test]
    fn test_numeric_cells_compare_across_int_and_float() {
        let expected = yaml("[[1.0, 2]]");
        let actual = rowset(&[&[Value::Int(1), Value::Float(2.0)]]);
        assert!(assert_result(&Expectation::Exact(&expected), &actual).is_ok());
    }

    #[test]
    fn test_timestamps_compare_as_text() {
        let ts = NaiveDate::from_ymd_opt(2021, 9, 1)
            .unwrap()
            .and_hms_micro_opt(12, 34, 56, 123_456)
            .unwrap();
        let actual = rowset(&[&[Value::Timestamp(ts)]]);
        let expected = yaml("[['2021-09-01T12:34:56.123456Z']]");
        assert!(assert_result(&Expectation::Exact(&expected), &actual).is_ok());
    }

    #[test]
    fn test_list_expectation_against_status() {
        let expected = yaml("[[1]]");
        let err =
            assert_result(&Expectation::Exact(&expected), &ExecutionResult::Status(1)).unwrap_err();
        assert!(matches!(err, Error::ResultShape { .. }));
    }

    #[test]
    fn test_scalar_expectations_compare_renderings() {
        assert!(assert_result(&Expectation::Exact(&Value::Int(3)), &ExecutionResult::Status(3)).is_ok());
        assert!(assert_result(&Expectation::Exact(&Value::Int(2)), &ExecutionResult::Status(3)).is_err());
        assert!(assert_result(&Expectation::Exact(&Value::Null), &ExecutionResult::Empty).is_ok());
    }

    #[test]
    fn test_contains() {
        let actual = rowset(&[
            &[1.into(), "a".into()],
            &[2.into(), "b".into()],
            &[3.into(), "c".into()],
        ]);
        let present = yaml("[[2, b]]");
        assert!(assert_result(&Expectation::Contains(&present), &actual).is_ok());

        let absent = yaml("[[9, z]]");
        let err = assert_result(&Expectation::Contains(&absent), &actual).unwrap_err();
        assert!(matches!(err, Error::MissingRow { .. }));
        assert!(err.to_string().contains("[9, 'z']"));
    }

    #[test]
    fn test_contains_requires_rowset_and_list() {
        let rows = yaml("[[1]]");
        assert!(assert_result(&Expectation::Contains(&rows), &ExecutionResult::Empty).is_err());
        let scalar = Value::Int(1);
        assert!(assert_result(&Expectation::Contains(&scalar), &ab()).is_err());
    }

    #[test]
    fn test_raw_never_matches() {
        let raw = ExecutionResult::Raw("CREATE 1".into());
        let text = Value::from("CREATE 1");
        assert!(assert_result(&Expectation::Exact(&text), &raw).is_err());
        let rows = yaml("[]");
        assert!(assert_result(&Expectation::Contains(&rows), &raw).is_err());
    }

    #[test]
    fn test_result_wins_over_contains() {
        let spec: ExpectSpec = serde_yaml::from_str("{result: [[1]], result_contains: [[2]]}").unwrap();
        assert!(matches!(spec.expectation(), Some(Expectation::Exact(_))));
        let spec: ExpectSpec = serde_yaml::from_str("{}").unwrap();
        assert!(spec.expectation().is_none());
    }
}
