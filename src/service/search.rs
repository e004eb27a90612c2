//! Search parameters carried by the `q` query argument.
//! Plain data only; sessions decide how to execute them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    /// Expect exactly one result.
    #[serde(default)]
    pub single: bool,
    /// Only used by function evaluation.
    #[serde(default)]
    pub functions: Vec<FunctionCall>,
}

impl SearchQuery {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub name: String,
    pub op: String,
    #[serde(default)]
    pub val: Value,
}

impl Filter {
    pub fn new(name: impl Into<String>, op: impl Into<String>, val: Value) -> Self {
        Filter {
            name: name.into(),
            op: op.into(),
            val,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Like,
    Ilike,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl FromStr for FilterOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "==" | "eq" | "equals" | "equal_to" => FilterOp::Eq,
            "!=" | "ne" | "neq" | "does_not_equal" | "not_equal_to" => FilterOp::Ne,
            "<" | "lt" => FilterOp::Lt,
            ">" | "gt" => FilterOp::Gt,
            "<=" | "le" | "lte" | "leq" => FilterOp::Le,
            ">=" | "ge" | "gte" | "geq" => FilterOp::Ge,
            "like" => FilterOp::Like,
            "ilike" => FilterOp::Ilike,
            "in" => FilterOp::In,
            "not_in" => FilterOp::NotIn,
            "is_null" => FilterOp::IsNull,
            "is_not_null" => FilterOp::IsNotNull,
            other => return Err(format!("unknown operator '{}'", other)),
        })
    }
}

impl FilterOp {
    /// SQL comparison operator for the binary comparisons.
    pub fn sql_operator(&self) -> Option<&'static str> {
        match self {
            FilterOp::Eq => Some("="),
            FilterOp::Ne => Some("<>"),
            FilterOp::Lt => Some("<"),
            FilterOp::Gt => Some(">"),
            FilterOp::Le => Some("<="),
            FilterOp::Ge => Some(">="),
            FilterOp::Like => Some("LIKE"),
            FilterOp::Ilike => Some("ILIKE"),
            FilterOp::In | FilterOp::NotIn | FilterOp::IsNull | FilterOp::IsNotNull => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// `{"name": "sum", "field": "age"}` evaluates to key `sum__age`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub field: String,
}

impl FunctionCall {
    pub fn result_key(&self) -> String {
        format!("{}__{}", self.name, self.field)
    }
}

/// Page window applied after the query's own limit/offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub offset: u64,
    pub limit: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_search_document() {
        let q = SearchQuery::from_json(
            r#"{"filters":[{"name":"age","op":">=","val":18}],
                "order_by":[{"field":"name","direction":"desc"}],
                "limit":5}"#,
        )
        .unwrap();
        assert_eq!(q.filters, vec![Filter::new("age", ">=", json!(18))]);
        assert_eq!(q.order_by[0].direction, SortDirection::Desc);
        assert_eq!(q.limit, Some(5));
        assert!(!q.single);
    }

    #[test]
    fn operator_aliases() {
        assert_eq!("==".parse::<FilterOp>(), Ok(FilterOp::Eq));
        assert_eq!("neq".parse::<FilterOp>(), Ok(FilterOp::Ne));
        assert_eq!("leq".parse::<FilterOp>(), Ok(FilterOp::Le));
        assert!("between".parse::<FilterOp>().is_err());
        assert_eq!(FilterOp::In.sql_operator(), None);
    }

    #[test]
    fn function_result_key() {
        let call = FunctionCall {
            name: "avg".into(),
            field: "height".into(),
        };
        assert_eq!(call.result_key(), "avg__height");
    }
}
