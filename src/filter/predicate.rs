use std::cmp::Ordering;
use std::fmt;

use super::value::FilterValue;
use crate::errors::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    NotEq,
    Gt,
    Lt,
    Gte,
    Lte,
    Like,
    StartsWith,
    EndsWith,
    In,
    NotIn,
    Between,
}

impl Operator {
    pub fn parse(raw: &str) -> Option<Operator> {
        let op = match raw.to_ascii_lowercase().as_str() {
            "eq" => Operator::Eq,
            "noteq" => Operator::NotEq,
            "gt" => Operator::Gt,
            "lt" => Operator::Lt,
            "gte" => Operator::Gte,
            "lte" => Operator::Lte,
            "like" => Operator::Like,
            "startswith" => Operator::StartsWith,
            "endswith" => Operator::EndsWith,
            "in" => Operator::In,
            "notin" => Operator::NotIn,
            "between" => Operator::Between,
            _ => return None,
        };
        Some(op)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::NotEq => "noteq",
            Operator::Gt => "gt",
            Operator::Lt => "lt",
            Operator::Gte => "gte",
            Operator::Lte => "lte",
            Operator::Like => "like",
            Operator::StartsWith => "startswith",
            Operator::EndsWith => "endswith",
            Operator::In => "in",
            Operator::NotIn => "notin",
            Operator::Between => "between",
        }
    }

    pub fn is_ordering(&self) -> bool {
        matches!(self, Operator::Gt | Operator::Lt | Operator::Gte | Operator::Lte | Operator::Between)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Single(FilterValue),
    List(Vec<FilterValue>),
    Range(FilterValue, FilterValue),
    /// Raw pattern for like/startswith/endswith.
    Pattern(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub operand: Operand,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, operand: Operand) -> Self {
        Condition {
            field: field.into(),
            operator,
            operand,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Condition(Condition),
    And(Vec<Predicate>),
}

/// Implemented by entities that in-memory stores filter directly.
pub trait Filterable {
    /// `None` when the column is unknown, `Some(None)` when the value is null.
    fn field_value(&self, column: &str) -> Option<Option<FilterValue>>;
}

impl Predicate {
    pub fn and(predicates: Vec<Predicate>) -> Predicate {
        Predicate::And(predicates)
    }

    pub fn condition(field: impl Into<String>, operator: Operator, operand: Operand) -> Predicate {
        Predicate::Condition(Condition::new(field, operator, operand))
    }

    pub fn evaluate<T: Filterable>(&self, entity: &T) -> Result<bool> {
        match self {
            Predicate::And(parts) => {
                for part in parts {
                    if !part.evaluate(entity)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Predicate::Condition(condition) => {
                let value = entity
                    .field_value(&condition.field)
                    .ok_or_else(|| AppError::UnknownFilterField(condition.field.clone()))?;
                // Null never satisfies a condition, negated ones included.
                Ok(value.map_or(false, |v| condition.matches(&v)))
            }
        }
    }
}

impl Condition {
    fn matches(&self, actual: &FilterValue) -> bool {
        let ordering = |expected: &FilterValue| actual.compare(expected);
        match (&self.operator, &self.operand) {
            (Operator::Eq, Operand::Single(v)) => ordering(v) == Some(Ordering::Equal),
            (Operator::NotEq, Operand::Single(v)) => matches!(ordering(v), Some(o) if o != Ordering::Equal),
            (Operator::Gt, Operand::Single(v)) => ordering(v) == Some(Ordering::Greater),
            (Operator::Lt, Operand::Single(v)) => ordering(v) == Some(Ordering::Less),
            (Operator::Gte, Operand::Single(v)) => {
                matches!(ordering(v), Some(Ordering::Greater | Ordering::Equal))
            }
            (Operator::Lte, Operand::Single(v)) => {
                matches!(ordering(v), Some(Ordering::Less | Ordering::Equal))
            }
            (Operator::Between, Operand::Range(low, high)) => {
                matches!(ordering(low), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(ordering(high), Some(Ordering::Less | Ordering::Equal))
            }
            (Operator::In, Operand::List(values)) => values.iter().any(|v| ordering(v) == Some(Ordering::Equal)),
            (Operator::NotIn, Operand::List(values)) => {
                values.iter().all(|v| matches!(ordering(v), Some(o) if o != Ordering::Equal))
            }
            (Operator::Like, Operand::Pattern(p)) => actual.to_string().to_lowercase().contains(&p.to_lowercase()),
            (Operator::StartsWith, Operand::Pattern(p)) => {
                actual.to_string().to_lowercase().starts_with(&p.to_lowercase())
            }
            (Operator::EndsWith, Operand::Pattern(p)) => {
                actual.to_string().to_lowercase().ends_with(&p.to_lowercase())
            }
            _ => false,
        }
    }
}
