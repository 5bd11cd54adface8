use crate::api::Value;
use crate::error::Result;
use crate::plan::QueryPlan;
use async_trait::async_trait;
use std::collections::BTreeMap;

static NULL: Value = Value::Null;

/// One flat record of plan output. Cells are keyed by the qualified
/// column key from `plan::column_key`, so columns of different aliases
/// of the same target type never collide.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Row(BTreeMap<String, Value>);

impl Row {
    pub fn new() -> Self {
        Row::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Missing cells read as NULL, matching an outer-joined miss.
    pub fn get(&self, key: &str) -> &Value {
        self.0.get(key).unwrap_or(&NULL)
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Row(iter.into_iter().collect())
    }
}

pub type RowSet = Vec<Row>;

/// Backend boundary. Implementations run a query plan against a
/// relational store and return rows ordered per the plan's order
/// contract; failures surface as `Error::QueryExecution` and are never
/// retried at this layer.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, plan: &QueryPlan) -> Result<RowSet>;

    /// Number of distinct root entities the plan matches, unaffected by
    /// join fan-out.
    async fn count(&self, plan: &QueryPlan) -> Result<u64>;
}
