use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use tracing::error;
use uuid::Uuid;

use super::schema::FieldType;
use crate::errors::{AppError, Result};

/// A typed operand, produced by converting a raw query string against
/// the declared type of the field it targets.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Uuid(Uuid),
    Bool(bool),
    Integer(i64),
    Float(f64),
    Decimal(Decimal),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl FilterValue {
    /// Converts `raw` to the representation of `field_type`. A field with
    /// no declared type is matched as text.
    pub fn convert(field: &str, field_type: Option<FieldType>, raw: &str) -> Result<FilterValue> {
        let raw = raw.trim();
        let Some(field_type) = field_type else {
            return Ok(FilterValue::Text(raw.to_string()));
        };

        let converted = match field_type {
            FieldType::Uuid => Uuid::parse_str(raw).ok().map(FilterValue::Uuid),
            FieldType::Boolean => Some(FilterValue::Bool(
                raw.eq_ignore_ascii_case("1") || raw.eq_ignore_ascii_case("true"),
            )),
            FieldType::Integer => raw.parse::<i32>().ok().map(|v| FilterValue::Integer(i64::from(v))),
            FieldType::Long => raw.parse::<i64>().ok().map(FilterValue::Integer),
            FieldType::Double => raw.parse::<f64>().ok().map(FilterValue::Float),
            FieldType::Float => raw.parse::<f32>().ok().map(|v| FilterValue::Float(f64::from(v))),
            FieldType::Decimal => Decimal::from_str(raw).ok().map(FilterValue::Decimal),
            FieldType::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().map(FilterValue::Date),
            FieldType::Timestamp => parse_timestamp(raw).map(FilterValue::Timestamp),
            FieldType::String => Some(FilterValue::Text(raw.to_string())),
        };

        converted.ok_or_else(|| {
            error!("Error converting value '{}' to type '{}' for field '{}'", raw, field_type, field);
            AppError::InvalidFilterValue {
                field: field.to_string(),
                field_type: field_type.to_string(),
                value: raw.to_string(),
            }
        })
    }

    /// Booleans and identifiers have no meaningful range ordering.
    pub fn is_orderable(&self) -> bool {
        !matches!(self, FilterValue::Bool(_) | FilterValue::Uuid(_))
    }

    /// Orders two values of the same kind. Mixed kinds are incomparable.
    pub fn compare(&self, other: &FilterValue) -> Option<Ordering> {
        match (self, other) {
            (FilterValue::Uuid(a), FilterValue::Uuid(b)) => Some(a.cmp(b)),
            (FilterValue::Bool(a), FilterValue::Bool(b)) => Some(a.cmp(b)),
            (FilterValue::Integer(a), FilterValue::Integer(b)) => Some(a.cmp(b)),
            (FilterValue::Float(a), FilterValue::Float(b)) => a.partial_cmp(b),
            (FilterValue::Decimal(a), FilterValue::Decimal(b)) => Some(a.cmp(b)),
            (FilterValue::Date(a), FilterValue::Date(b)) => Some(a.cmp(b)),
            (FilterValue::Timestamp(a), FilterValue::Timestamp(b)) => Some(a.cmp(b)),
            (FilterValue::Text(a), FilterValue::Text(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Uuid(v) => write!(f, "{}", v),
            FilterValue::Bool(v) => write!(f, "{}", v),
            FilterValue::Integer(v) => write!(f, "{}", v),
            FilterValue::Float(v) => write!(f, "{}", v),
            FilterValue::Decimal(v) => write!(f, "{}", v),
            FilterValue::Date(v) => write!(f, "{}", v),
            FilterValue::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            FilterValue::Text(v) => f.write_str(v),
        }
    }
}

/// Accepts RFC 3339, `yyyy-MM-dd HH:mm:ss`, `yyyy-MM-ddTHH:mm:ss` (UTC) or a bare date.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn booleans_accept_one_and_true() {
        for raw in ["1", "true", "TRUE", "True"] {
            assert_eq!(
                FilterValue::convert("active", Some(FieldType::Boolean), raw).unwrap(),
                FilterValue::Bool(true)
            );
        }
        for raw in ["0", "false", "yes", ""] {
            assert_eq!(
                FilterValue::convert("active", Some(FieldType::Boolean), raw).unwrap(),
                FilterValue::Bool(false)
            );
        }
    }

    #[test]
    fn numbers_and_dates_convert_by_type() {
        assert_eq!(
            FilterValue::convert("amount", Some(FieldType::Decimal), " 100.50 ").unwrap(),
            FilterValue::Decimal(dec!(100.50))
        );
        assert_eq!(
            FilterValue::convert("retry", Some(FieldType::Integer), "3").unwrap(),
            FilterValue::Integer(3)
        );
        assert!(matches!(
            FilterValue::convert("created_at", Some(FieldType::Timestamp), "2024-01-15 10:00:00").unwrap(),
            FilterValue::Timestamp(_)
        ));
        assert!(matches!(
            FilterValue::convert("created_at", Some(FieldType::Timestamp), "2024-01-15T10:00:00+03:00").unwrap(),
            FilterValue::Timestamp(_)
        ));
    }

    #[test]
    fn conversion_failure_names_field_and_type() {
        let err = FilterValue::convert("amount", Some(FieldType::Decimal), "ten").unwrap_err();
        match err {
            AppError::InvalidFilterValue { field, field_type, value } => {
                assert_eq!(field, "amount");
                assert_eq!(field_type, "decimal");
                assert_eq!(value, "ten");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(FilterValue::convert("retry", Some(FieldType::Integer), "99999999999").is_err());
        assert!(FilterValue::convert("uuid", Some(FieldType::Uuid), "not-a-uuid").is_err());
    }

    #[test]
    fn untyped_fields_stay_text() {
        assert_eq!(
            FilterValue::convert("nickname", None, "abc").unwrap(),
            FilterValue::Text("abc".into())
        );
    }

    #[test]
    fn mixed_kinds_do_not_compare() {
        assert_eq!(FilterValue::Integer(1).compare(&FilterValue::Text("1".into())), None);
        assert_eq!(
            FilterValue::Decimal(dec!(5)).compare(&FilterValue::Decimal(dec!(10))),
            Some(Ordering::Less)
        );
    }
}
