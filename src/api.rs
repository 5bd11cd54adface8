use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ColumnName = String;

/// A scalar cell value, as stored on entities and produced by executors.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool { matches!(self, Value::Null) }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self { Value::Bool(v) }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self { Value::Integer(v) }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self { Value::Integer(v as i64) }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self { Value::Float(v) }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self { Value::Text(v.to_string()) }
}
impl From<String> for Value {
    fn from(v: String) -> Self { Value::Text(v) }
}
impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self { Value::Timestamp(v) }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ConditionTree {
    pub operator: LogicOperator,
    pub conditions: Vec<Condition>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicOperator {
    And,
    Or,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Group(ConditionTree),
    Single { field: ColumnName, filter: Filter },
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    IsNull,
    NotNull,
}

/// Groups always carry their own tree, so translation to SQL can
/// parenthesize every sub-term and never depends on operator precedence.
pub fn and(conditions: Vec<Condition>) -> Condition {
    Condition::Group(ConditionTree { operator: LogicOperator::And, conditions })
}

pub fn or(conditions: Vec<Condition>) -> Condition {
    Condition::Group(ConditionTree { operator: LogicOperator::Or, conditions })
}

pub fn eq(field: &str, value: impl Into<Value>) -> Condition {
    Condition::Single { field: field.to_string(), filter: Filter::Eq(value.into()) }
}

pub fn ne(field: &str, value: impl Into<Value>) -> Condition {
    Condition::Single { field: field.to_string(), filter: Filter::Ne(value.into()) }
}

pub fn gt(field: &str, value: impl Into<Value>) -> Condition {
    Condition::Single { field: field.to_string(), filter: Filter::Gt(value.into()) }
}

pub fn lt(field: &str, value: impl Into<Value>) -> Condition {
    Condition::Single { field: field.to_string(), filter: Filter::Lt(value.into()) }
}

pub fn in_list(field: &str, values: Vec<Value>) -> Condition {
    Condition::Single { field: field.to_string(), filter: Filter::In(values) }
}

pub fn is_null(field: &str) -> Condition {
    Condition::Single { field: field.to_string(), filter: Filter::IsNull }
}

/// How an include names its target: by entity type name or by a declared
/// association alias. Resolved once during normalization.
#[derive(Debug, PartialEq, Clone)]
pub enum IncludeTarget {
    ByType(String),
    ByAlias(String),
}

#[derive(Debug, PartialEq, Clone)]
pub struct IncludeSpec {
    pub target: IncludeTarget,
    pub attributes: Option<Vec<ColumnName>>,
    pub where_: Option<Condition>,
    pub include: Vec<IncludeSpec>,
}

impl IncludeSpec {
    pub fn model(name: &str) -> Self {
        IncludeSpec {
            target: IncludeTarget::ByType(name.to_string()),
            attributes: None,
            where_: None,
            include: vec![],
        }
    }

    pub fn alias(name: &str) -> Self {
        IncludeSpec {
            target: IncludeTarget::ByAlias(name.to_string()),
            attributes: None,
            where_: None,
            include: vec![],
        }
    }

    pub fn as_alias(mut self, alias: &str) -> Self {
        self.target = IncludeTarget::ByAlias(alias.to_string());
        self
    }

    pub fn attributes(mut self, attrs: &[&str]) -> Self {
        self.attributes = Some(attrs.iter().map(|a| a.to_string()).collect());
        self
    }

    pub fn where_(mut self, condition: Condition) -> Self {
        self.where_ = Some(condition);
        self
    }

    pub fn include(mut self, spec: IncludeSpec) -> Self {
        self.include.push(spec);
        self
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderDirection {
    Asc,
    Desc,
}

/// An order term, optionally scoped to an included association by its
/// slot-name path from the root (empty path = root attribute).
#[derive(Debug, PartialEq, Clone)]
pub struct OrderTerm {
    pub path: Vec<String>,
    pub field: ColumnName,
    pub direction: OrderDirection,
}

impl OrderTerm {
    pub fn asc(field: &str) -> Self {
        OrderTerm { path: vec![], field: field.to_string(), direction: OrderDirection::Asc }
    }

    pub fn desc(field: &str) -> Self {
        OrderTerm { path: vec![], field: field.to_string(), direction: OrderDirection::Desc }
    }

    pub fn on_path(mut self, path: &[&str]) -> Self {
        self.path = path.iter().map(|p| p.to_string()).collect();
        self
    }
}

#[derive(Debug, PartialEq, Clone, Default)]
pub struct FindRequest {
    pub where_: Option<Condition>,
    pub include: Vec<IncludeSpec>,
    pub attributes: Option<Vec<ColumnName>>,
    pub order: Vec<OrderTerm>,
}

impl FindRequest {
    pub fn new() -> Self { FindRequest::default() }

    pub fn where_(mut self, condition: Condition) -> Self {
        self.where_ = Some(condition);
        self
    }

    pub fn include(mut self, spec: IncludeSpec) -> Self {
        self.include.push(spec);
        self
    }

    pub fn attributes(mut self, attrs: &[&str]) -> Self {
        self.attributes = Some(attrs.iter().map(|a| a.to_string()).collect());
        self
    }

    pub fn order(mut self, term: OrderTerm) -> Self {
        self.order.push(term);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn serialize() {
        assert_eq!(r#""and""#, serde_json::to_string(&LogicOperator::And).unwrap());
        assert_eq!(serde_json::from_str::<LogicOperator>(r#""or""#).unwrap(), LogicOperator::Or);
        assert_eq!(
            r#"{"single":{"field":"id","filter":{"eq":10}}}"#,
            serde_json::to_string(&eq("id", 10)).unwrap()
        );
        assert_eq!(r#""abc""#, serde_json::to_string(&Value::Text("abc".into())).unwrap());
        assert_eq!(r#"null"#, serde_json::to_string(&Value::Null).unwrap());
    }

    #[test]
    fn combinators_nest_structurally() {
        let c = or(vec![and(vec![eq("a", 1), eq("b", 2)]), eq("c", 3)]);
        match c {
            Condition::Group(ConditionTree { operator: LogicOperator::Or, conditions }) => {
                assert_eq!(conditions.len(), 2);
                assert!(matches!(
                    &conditions[0],
                    Condition::Group(ConditionTree { operator: LogicOperator::And, .. })
                ));
            }
            other => panic!("unexpected shape: {:?}", other),
        }
    }

    #[test]
    fn timestamp_value_round_trips_through_json() {
        use chrono::TimeZone;
        let t = Utc.with_ymd_and_hms(2014, 2, 20, 0, 0, 0).unwrap();
        let v = Value::Timestamp(t);
        let s = serde_json::to_string(&v).unwrap();
        let back: Value = serde_json::from_str(&s).unwrap();
        assert_eq!(back, v);
    }
}
