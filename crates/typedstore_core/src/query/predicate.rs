//! Boolean filter expressions over entity fields.

use crate::model::object::FieldMap;
use regex::Regex;
use serde_json::{Number, Value};
use std::cmp::Ordering;

/// Filter expression evaluated against an object's fields.
///
/// A missing field behaves like JSON `null`.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Matches every object.
    True,
    Eq(String, Value),
    Ne(String, Value),
    Lt(String, Value),
    Le(String, Value),
    Gt(String, Value),
    Ge(String, Value),
    /// Field equals any of the listed values.
    In(String, Vec<Value>),
    /// Substring for string fields, element membership for array fields.
    Contains(String, Value),
    BeginsWith(String, String),
    EndsWith(String, String),
    /// String field matches a regular expression.
    Matches(String, Regex),
    /// Field is missing or JSON `null`.
    IsNull(String),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Ne(field.into(), value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lt(field.into(), value.into())
    }

    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Le(field.into(), value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gt(field.into(), value.into())
    }

    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Ge(field.into(), value.into())
    }

    pub fn is_in<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Contains(field.into(), value.into())
    }

    pub fn begins_with(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::BeginsWith(field.into(), prefix.into())
    }

    pub fn ends_with(field: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self::EndsWith(field.into(), suffix.into())
    }

    /// Builds a regular-expression match.
    ///
    /// # Errors
    /// - Returns the regex compile error for invalid patterns.
    pub fn matches(field: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::Matches(field.into(), Regex::new(pattern)?))
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Self::IsNull(field.into())
    }

    /// Conjunction of `self` and `other`, flattening nested `And`s.
    pub fn and(self, other: Predicate) -> Self {
        match self {
            Self::And(mut terms) => {
                terms.push(other);
                Self::And(terms)
            }
            first => Self::And(vec![first, other]),
        }
    }

    /// Disjunction of `self` and `other`, flattening nested `Or`s.
    pub fn or(self, other: Predicate) -> Self {
        match self {
            Self::Or(mut terms) => {
                terms.push(other);
                Self::Or(terms)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Evaluates this predicate against one field map.
    pub fn evaluate(&self, fields: &FieldMap) -> bool {
        match self {
            Self::True => true,
            Self::Eq(field, expected) => values_equal(lookup(fields, field), expected),
            Self::Ne(field, expected) => !values_equal(lookup(fields, field), expected),
            Self::Lt(field, bound) => {
                compare_values(lookup(fields, field), bound) == Some(Ordering::Less)
            }
            Self::Le(field, bound) => matches!(
                compare_values(lookup(fields, field), bound),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Self::Gt(field, bound) => {
                compare_values(lookup(fields, field), bound) == Some(Ordering::Greater)
            }
            Self::Ge(field, bound) => matches!(
                compare_values(lookup(fields, field), bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Self::In(field, candidates) => {
                let actual = lookup(fields, field);
                candidates
                    .iter()
                    .any(|candidate| values_equal(actual, candidate))
            }
            Self::Contains(field, needle) => match (lookup(fields, field), needle) {
                (Value::String(haystack), Value::String(needle)) => {
                    haystack.contains(needle.as_str())
                }
                (Value::Array(items), needle) => {
                    items.iter().any(|item| values_equal(item, needle))
                }
                _ => false,
            },
            Self::BeginsWith(field, prefix) => lookup(fields, field)
                .as_str()
                .is_some_and(|value| value.starts_with(prefix.as_str())),
            Self::EndsWith(field, suffix) => lookup(fields, field)
                .as_str()
                .is_some_and(|value| value.ends_with(suffix.as_str())),
            Self::Matches(field, pattern) => lookup(fields, field)
                .as_str()
                .is_some_and(|value| pattern.is_match(value)),
            Self::IsNull(field) => lookup(fields, field).is_null(),
            Self::And(terms) => terms.iter().all(|term| term.evaluate(fields)),
            Self::Or(terms) => terms.iter().any(|term| term.evaluate(fields)),
            Self::Not(inner) => !inner.evaluate(fields),
        }
    }
}

fn lookup<'a>(fields: &'a FieldMap, field: &str) -> &'a Value {
    fields.get(field).unwrap_or(&Value::Null)
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    match compare_values(actual, expected) {
        Some(ordering) => ordering == Ordering::Equal,
        None => actual == expected,
    }
}

/// Orders two scalar values of the same JSON type.
///
/// Returns `None` for mismatched types and for arrays/objects.
pub(crate) fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(left), Value::Bool(right)) => Some(left.cmp(right)),
        (Value::Number(left), Value::Number(right)) => compare_numbers(left, right),
        (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
        _ => None,
    }
}

fn compare_numbers(left: &Number, right: &Number) -> Option<Ordering> {
    if let (Some(left), Some(right)) = (left.as_i64(), right.as_i64()) {
        return Some(left.cmp(&right));
    }
    if let (Some(left), Some(right)) = (left.as_u64(), right.as_u64()) {
        return Some(left.cmp(&right));
    }
    left.as_f64()?.partial_cmp(&right.as_f64()?)
}

#[cfg(test)]
mod tests {
    use super::Predicate;
    use crate::model::object::FieldMap;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> FieldMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn comparisons_follow_json_types() {
        let row = fields(json!({"age": 30, "name": "Alice", "score": 2.5}));

        assert!(Predicate::eq("age", 30).evaluate(&row));
        assert!(Predicate::eq("age", 30.0).evaluate(&row));
        assert!(Predicate::gt("score", 2).evaluate(&row));
        assert!(Predicate::le("age", 30).evaluate(&row));
        assert!(!Predicate::lt("age", "40").evaluate(&row));
        assert!(!Predicate::eq("name", 30).evaluate(&row));
        assert!(Predicate::ne("name", "Bob").evaluate(&row));
    }

    #[test]
    fn missing_fields_behave_like_null() {
        let row = fields(json!({"name": "Alice", "nickname": null}));

        assert!(Predicate::is_null("email").evaluate(&row));
        assert!(Predicate::is_null("nickname").evaluate(&row));
        assert!(!Predicate::is_null("name").evaluate(&row));
        assert!(Predicate::eq("email", serde_json::Value::Null).evaluate(&row));
        assert!(!Predicate::gt("email", 0).evaluate(&row));
    }

    #[test]
    fn string_and_array_operators() {
        let row = fields(json!({"name": "Alice Liddell", "tags": ["admin", "beta"]}));

        assert!(Predicate::contains("name", "Lid").evaluate(&row));
        assert!(Predicate::contains("tags", "beta").evaluate(&row));
        assert!(!Predicate::contains("tags", "gamma").evaluate(&row));
        assert!(Predicate::begins_with("name", "Ali").evaluate(&row));
        assert!(Predicate::ends_with("name", "dell").evaluate(&row));
        assert!(Predicate::matches("name", r"^A\w+ L")
            .unwrap()
            .evaluate(&row));
        assert!(Predicate::is_in("name", ["Bob", "Alice Liddell"]).evaluate(&row));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(Predicate::matches("name", "(unclosed").is_err());
    }

    #[test]
    fn combinators_compose_and_flatten() {
        let row = fields(json!({"age": 17, "country": "NZ"}));
        let adult_kiwi = Predicate::ge("age", 18).and(Predicate::eq("country", "NZ"));
        let minor_or_kiwi = Predicate::lt("age", 18).or(Predicate::eq("country", "NZ"));

        assert!(!adult_kiwi.evaluate(&row));
        assert!(minor_or_kiwi.evaluate(&row));
        assert!(adult_kiwi.clone().negate().evaluate(&row));

        let chained = adult_kiwi.and(Predicate::True);
        assert!(matches!(chained, Predicate::And(ref terms) if terms.len() == 3));
    }
}
