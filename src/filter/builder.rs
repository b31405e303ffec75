use std::collections::HashMap;

use tracing::debug;

use super::predicate::{Operand, Operator, Predicate};
use super::schema::EntitySchema;
use super::value::FilterValue;
use crate::errors::{AppError, Result};

/// Query keys that drive paging and are never treated as filters.
pub const RESERVED_KEYS: [&str; 3] = ["page", "size", "sort"];

/// Splits `field_op` on the last `_`. The suffix only counts as an operator
/// when it names one; otherwise the whole key is the field and `eq` applies.
pub fn parse_key(key: &str) -> (&str, Operator) {
    if let Some((field, suffix)) = key.rsplit_once('_') {
        if !field.is_empty() {
            if let Some(operator) = Operator::parse(suffix) {
                return (field, operator);
            }
        }
    }
    (key, Operator::Eq)
}

fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.iter().any(|r| r.eq_ignore_ascii_case(key))
}

/// Translates flat `field_op=value` pairs into a conjunction of typed conditions.
/// Returns `None` when nothing remains to filter on.
pub fn build_predicate(schema: &EntitySchema, filters: &HashMap<String, String>) -> Result<Option<Predicate>> {
    let mut keys: Vec<&String> = filters
        .iter()
        .filter(|(key, value)| !is_reserved(key) && !value.trim().is_empty())
        .map(|(key, _)| key)
        .collect();
    keys.sort();

    let mut conditions = Vec::with_capacity(keys.len());
    for key in keys {
        conditions.push(build_condition(schema, key, &filters[key])?);
    }

    if conditions.is_empty() {
        return Ok(None);
    }
    Ok(Some(Predicate::and(conditions)))
}

/// Like [`parse_key`], but an unknown suffix on a declared field is read as
/// `eq` on that field, as long as the whole key is not itself declared.
fn resolve_key<'a>(schema: &EntitySchema, key: &'a str) -> (&'a str, Operator) {
    let (name, operator) = parse_key(key);
    if name == key && schema.resolve(key).is_none() {
        if let Some((prefix, _)) = key.rsplit_once('_') {
            if schema.resolve(prefix).is_some() {
                debug!("Unknown operator in filter key '{}', using eq", key);
                return (prefix, Operator::Eq);
            }
        }
    }
    (name, operator)
}

fn build_condition(schema: &EntitySchema, key: &str, raw: &str) -> Result<Predicate> {
    let (name, operator) = resolve_key(schema, key);
    let (column, field_type) = match schema.resolve(name) {
        Some(descriptor) => (descriptor.column.to_string(), Some(descriptor.field_type)),
        None => {
            debug!("Filter field '{}' is not declared on {}, passing through", name, schema.name());
            (name.to_string(), None)
        }
    };
    let convert = |raw: &str| FilterValue::convert(&column, field_type, raw);

    let operand = match operator {
        Operator::Like | Operator::StartsWith | Operator::EndsWith => Operand::Pattern(raw.trim().to_string()),
        Operator::In | Operator::NotIn => Operand::List(
            raw.split(',')
                .filter(|part| !part.trim().is_empty())
                .map(convert)
                .collect::<Result<Vec<_>>>()?,
        ),
        Operator::Between => {
            let parts: Vec<&str> = raw.split(',').collect();
            if parts.len() != 2 {
                return Err(AppError::InvalidFilterRange(format!(
                    "'between' on '{}' expects 'start,end', got {} value(s)",
                    column,
                    parts.len()
                )));
            }
            let low = convert(parts[0])?;
            let high = convert(parts[1])?;
            if !low.is_orderable() || !high.is_orderable() {
                return Err(AppError::InvalidFilterType(format!(
                    "'between' is only supported for comparable types, '{}' is not",
                    column
                )));
            }
            Operand::Range(low, high)
        }
        _ => {
            let value = convert(raw)?;
            if operator.is_ordering() && !value.is_orderable() {
                return Err(AppError::InvalidFilterType(format!(
                    "'{}' is not supported for field '{}'",
                    operator, column
                )));
            }
            Operand::Single(value)
        }
    };

    Ok(Predicate::condition(column, operator, operand))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::predicate::Condition;
    use crate::filter::schema::{FieldDescriptor, FieldType};
    use rust_decimal_macros::dec;

    fn schema() -> EntitySchema {
        EntitySchema::new(
            "payment",
            vec![
                FieldDescriptor::new("uuid", "uuid", FieldType::Uuid),
                FieldDescriptor::new("phoneNumber", "phone_number", FieldType::String),
                FieldDescriptor::new("amount", "amount", FieldType::Decimal),
                FieldDescriptor::new("active", "active", FieldType::Boolean),
                FieldDescriptor::new("createdAt", "created_at", FieldType::Timestamp),
            ],
        )
    }

    fn filters(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn conditions(predicate: Predicate) -> Vec<Condition> {
        match predicate {
            Predicate::And(parts) => parts
                .into_iter()
                .map(|p| match p {
                    Predicate::Condition(c) => c,
                    other => panic!("nested predicate: {other:?}"),
                })
                .collect(),
            Predicate::Condition(c) => vec![c],
        }
    }

    #[test]
    fn key_parsing() {
        assert_eq!(parse_key("amount_gte"), ("amount", Operator::Gte));
        assert_eq!(parse_key("phone_number"), ("phone_number", Operator::Eq));
        assert_eq!(parse_key("phone_number_like"), ("phone_number", Operator::Like));
        assert_eq!(parse_key("amount"), ("amount", Operator::Eq));
        assert_eq!(parse_key("_gt"), ("_gt", Operator::Eq));
    }

    #[test]
    fn empty_filters_produce_no_predicate() {
        assert_eq!(build_predicate(&schema(), &HashMap::new()).unwrap(), None);
        let only_paging = filters(&[("page", "1"), ("SIZE", "10"), ("sort", "amount"), ("amount", "")]);
        assert_eq!(build_predicate(&schema(), &only_paging).unwrap(), None);
    }

    #[test]
    fn logical_names_resolve_to_columns() {
        let predicate = build_predicate(&schema(), &filters(&[("phoneNumber_startswith", "2547")]))
            .unwrap()
            .unwrap();
        let conditions = conditions(predicate);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].field, "phone_number");
        assert_eq!(conditions[0].operand, Operand::Pattern("2547".into()));
    }

    #[test]
    fn between_needs_exactly_two_values() {
        let err = build_predicate(&schema(), &filters(&[("amount_between", "10,5,3")])).unwrap_err();
        assert!(matches!(err, AppError::InvalidFilterRange(_)));

        let predicate = build_predicate(&schema(), &filters(&[("amount_between", "5,10")]))
            .unwrap()
            .unwrap();
        assert_eq!(
            conditions(predicate)[0].operand,
            Operand::Range(FilterValue::Decimal(dec!(5)), FilterValue::Decimal(dec!(10)))
        );
    }

    #[test]
    fn ordering_on_unorderable_types_is_rejected() {
        let err = build_predicate(&schema(), &filters(&[("active_between", "true,false")])).unwrap_err();
        assert!(matches!(err, AppError::InvalidFilterType(_)));

        let err = build_predicate(&schema(), &filters(&[("active_gt", "true")])).unwrap_err();
        assert!(matches!(err, AppError::InvalidFilterType(_)));
    }

    #[test]
    fn bad_values_are_reported() {
        let err = build_predicate(&schema(), &filters(&[("amount_gt", "lots")])).unwrap_err();
        assert!(matches!(err, AppError::InvalidFilterValue { ref field, .. } if field == "amount"));
    }

    #[test]
    fn in_lists_convert_each_value() {
        let predicate = build_predicate(&schema(), &filters(&[("amount_in", "10, 20")]))
            .unwrap()
            .unwrap();
        assert_eq!(
            conditions(predicate)[0].operand,
            Operand::List(vec![FilterValue::Decimal(dec!(10)), FilterValue::Decimal(dec!(20))])
        );
    }

    #[test]
    fn unknown_operator_on_declared_field_falls_back_to_eq() {
        let predicate = build_predicate(&schema(), &filters(&[("amount_approx", "10")]))
            .unwrap()
            .unwrap();
        let condition = &conditions(predicate)[0];
        assert_eq!(condition.field, "amount");
        assert_eq!(condition.operator, Operator::Eq);
        assert_eq!(condition.operand, Operand::Single(FilterValue::Decimal(dec!(10))));

        // A declared snake_case column keeps its full name.
        let predicate = build_predicate(&schema(), &filters(&[("phone_number", "254712345678")]))
            .unwrap()
            .unwrap();
        assert_eq!(conditions(predicate)[0].field, "phone_number");
    }

    #[test]
    fn unknown_fields_pass_through_as_text() {
        let predicate = build_predicate(&schema(), &filters(&[("nickname", "bob")]))
            .unwrap()
            .unwrap();
        let condition = &conditions(predicate)[0];
        assert_eq!(condition.field, "nickname");
        assert_eq!(condition.operand, Operand::Single(FilterValue::Text("bob".into())));
    }

    #[test]
    fn multiple_filters_are_combined_in_key_order() {
        let predicate = build_predicate(
            &schema(),
            &filters(&[("createdAt_gte", "2024-01-01"), ("amount_lt", "500")]),
        )
        .unwrap()
        .unwrap();
        let fields: Vec<String> = conditions(predicate).into_iter().map(|c| c.field).collect();
        assert_eq!(fields, vec!["amount", "created_at"]);
    }
}
