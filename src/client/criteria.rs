//! Search criteria trees.
//!
//! Criteria compose leaf predicates under AND/OR junctions and serialize to
//! the nested dict shape the remote "advanced search" resource expects:
//!
//! ```json
//! {"operator": "and", "criteria": [
//!     {"fieldName": "cntn_id", "operator": "equals", "value": "sample-1"}
//! ]}
//! ```

use serde::Serialize;
use serde_json::Value;

/// Junction operator joining child criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Junction {
    And,
    Or,
}

/// Leaf comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    StartsWith,
    EndsWith,
    IsNull,
    IsNotNull,
}

/// A composable predicate tree over remote fields.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Criteria {
    #[serde(rename_all = "camelCase")]
    Junction {
        operator: Junction,
        criteria: Vec<Criteria>,
    },
    #[serde(rename_all = "camelCase")]
    Expression {
        field_name: String,
        operator: Operator,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
}

impl Criteria {
    /// Append a child to a junction. No-op semantics do not apply to
    /// leaves; adding to an expression first wraps it in an AND junction.
    pub fn add(self, child: Criteria) -> Criteria {
        match self {
            Criteria::Junction {
                operator,
                mut criteria,
            } => {
                criteria.push(child);
                Criteria::Junction { operator, criteria }
            }
            leaf => Criteria::Junction {
                operator: Junction::And,
                criteria: vec![leaf, child],
            },
        }
    }
}

fn expression(field: &str, operator: Operator, value: Option<Value>) -> Criteria {
    Criteria::Expression {
        field_name: field.to_string(),
        operator,
        value,
    }
}

/// An empty AND junction.
pub fn conjunction() -> Criteria {
    Criteria::Junction {
        operator: Junction::And,
        criteria: Vec::new(),
    }
}

/// An empty OR junction.
pub fn disjunction() -> Criteria {
    Criteria::Junction {
        operator: Junction::Or,
        criteria: Vec::new(),
    }
}

pub fn equals(field: &str, value: impl Into<Value>) -> Criteria {
    expression(field, Operator::Equals, Some(value.into()))
}

pub fn not_equals(field: &str, value: impl Into<Value>) -> Criteria {
    expression(field, Operator::NotEquals, Some(value.into()))
}

pub fn greater_than(field: &str, value: impl Into<Value>) -> Criteria {
    expression(field, Operator::GreaterThan, Some(value.into()))
}

pub fn less_than(field: &str, value: impl Into<Value>) -> Criteria {
    expression(field, Operator::LessThan, Some(value.into()))
}

pub fn contains(field: &str, value: impl Into<Value>) -> Criteria {
    expression(field, Operator::Contains, Some(value.into()))
}

pub fn starts_with(field: &str, value: impl Into<Value>) -> Criteria {
    expression(field, Operator::StartsWith, Some(value.into()))
}

pub fn ends_with(field: &str, value: impl Into<Value>) -> Criteria {
    expression(field, Operator::EndsWith, Some(value.into()))
}

pub fn is_null(field: &str) -> Criteria {
    expression(field, Operator::IsNull, None)
}

pub fn is_not_null(field: &str) -> Criteria {
    expression(field, Operator::IsNotNull, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn leaf_serializes_to_field_operator_value() {
        let criteria = equals("cntn_id", "sample-1");
        assert_eq!(
            serde_json::to_value(&criteria).unwrap(),
            json!({"fieldName": "cntn_id", "operator": "equals", "value": "sample-1"})
        );
    }

    #[test]
    fn null_check_omits_value() {
        assert_eq!(
            serde_json::to_value(is_null("cntn_fk_location")).unwrap(),
            json!({"fieldName": "cntn_fk_location", "operator": "isNull"})
        );
    }

    #[test]
    fn junction_nests_children_in_order() {
        let criteria = conjunction()
            .add(equals("cntn_status", 10))
            .add(disjunction().add(contains("cntn_id", "blood")).add(contains("cntn_id", "plasma")));
        assert_eq!(
            serde_json::to_value(&criteria).unwrap(),
            json!({
                "operator": "and",
                "criteria": [
                    {"fieldName": "cntn_status", "operator": "equals", "value": 10},
                    {"operator": "or", "criteria": [
                        {"fieldName": "cntn_id", "operator": "contains", "value": "blood"},
                        {"fieldName": "cntn_id", "operator": "contains", "value": "plasma"}
                    ]}
                ]
            })
        );
    }

    #[test]
    fn adding_to_a_leaf_wraps_it_in_a_conjunction() {
        let criteria = equals("a", 1).add(equals("b", 2));
        assert_eq!(
            serde_json::to_value(&criteria).unwrap(),
            json!({
                "operator": "and",
                "criteria": [
                    {"fieldName": "a", "operator": "equals", "value": 1},
                    {"fieldName": "b", "operator": "equals", "value": 2}
                ]
            })
        );
    }
}
