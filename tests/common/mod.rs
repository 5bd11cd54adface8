#![allow(dead_code)]

use async_trait::async_trait;
use eagerload::api::{Condition, Filter, LogicOperator, OrderDirection, Value};
use eagerload::error::{QueryExecutionSnafu, Result};
use eagerload::executor::{QueryExecutor, Row, RowSet};
use eagerload::plan::{JoinKind, JoinOn, QueryPlan};
use itertools::Itertools;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

pub type Record = BTreeMap<String, Value>;

/// Tiny relational store satisfying the `QueryExecutor` contract: it
/// evaluates query plans literally (joins, scoped filters, ordering) and
/// returns flat fanned-out rows, the shape a SQL backend would produce.
#[derive(Default)]
pub struct MemDb {
    tables: Mutex<HashMap<String, Vec<Record>>>,
    next_id: Mutex<i64>,
}

impl MemDb {
    pub fn new() -> Self {
        MemDb::default()
    }

    pub fn insert(&self, table: &str, values: Vec<(&str, Value)>) -> i64 {
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        let id = *next_id;

        let mut record = Record::new();
        record.insert("id".to_string(), Value::Integer(id));
        for (column, value) in values {
            record.insert(column.to_string(), value);
        }
        self.tables.lock().unwrap().entry(table.to_string()).or_default().push(record);
        id
    }

    /// Inserts a through-table row (no synthetic id needed).
    pub fn link(&self, table: &str, values: Vec<(&str, Value)>) {
        let record: Record = values.into_iter().map(|(c, v)| (c.to_string(), v)).collect();
        self.tables.lock().unwrap().entry(table.to_string()).or_default().push(record);
    }

    pub fn set(&self, table: &str, id: i64, column: &str, value: Value) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(rows) = tables.get_mut(table) {
            for row in rows.iter_mut() {
                if row.get("id") == Some(&Value::Integer(id)) {
                    row.insert(column.to_string(), value.clone());
                }
            }
        }
    }

    fn snapshot(&self) -> HashMap<String, Vec<Record>> {
        self.tables.lock().unwrap().clone()
    }

    /// Runs the plan and returns one record-per-path map per joined row.
    fn run(&self, plan: &QueryPlan) -> Vec<HashMap<String, Option<Record>>> {
        let tables = self.snapshot();
        let root_rows = tables.get(&plan.root_table).cloned().unwrap_or_default();

        let mut current: Vec<HashMap<String, Option<Record>>> = root_rows
            .into_iter()
            .filter(|r| plan.where_.as_ref().map_or(true, |c| eval(c, r)))
            .map(|r| HashMap::from([(String::new(), Some(r))]))
            .collect();

        for join in &plan.joins {
            let child_rows = tables.get(&join.table).cloned().unwrap_or_default();
            let mut next = Vec::new();
            for row in current {
                let parent = row.get(&join.parent_path).and_then(|o| o.clone());
                let mut matches: Vec<Record> = match (&parent, &join.on) {
                    (None, _) => vec![],
                    (Some(p), JoinOn::Parent { foreign_key }) => {
                        let fk = p.get(foreign_key).cloned().unwrap_or(Value::Null);
                        child_rows
                            .iter()
                            .filter(|c| !fk.is_null() && c.get(&join.primary_key) == Some(&fk))
                            .cloned()
                            .collect()
                    }
                    (Some(p), JoinOn::Child { foreign_key }) => {
                        let pk = p.get(&join.parent_primary_key).cloned().unwrap_or(Value::Null);
                        child_rows
                            .iter()
                            .filter(|c| !pk.is_null() && c.get(foreign_key) == Some(&pk))
                            .cloned()
                            .collect()
                    }
                    (Some(p), JoinOn::Many { table, source_key, target_key }) => {
                        let pk = p.get(&join.parent_primary_key).cloned().unwrap_or(Value::Null);
                        let through = tables.get(table).cloned().unwrap_or_default();
                        through
                            .iter()
                            .filter(|t| !pk.is_null() && t.get(source_key) == Some(&pk))
                            .filter_map(|t| {
                                let target = t.get(target_key)?;
                                child_rows.iter().find(|c| c.get(&join.primary_key) == Some(target))
                            })
                            .cloned()
                            .collect()
                    }
                };
                if let Some(filter) = &join.filter {
                    matches.retain(|c| eval(filter, c));
                }

                if matches.is_empty() {
                    if join.kind == JoinKind::Left {
                        let mut kept = row.clone();
                        kept.insert(join.path.clone(), None);
                        next.push(kept);
                    }
                } else {
                    for m in matches {
                        let mut fanned = row.clone();
                        fanned.insert(join.path.clone(), Some(m));
                        next.push(fanned);
                    }
                }
            }
            current = next;
        }

        current.sort_by(|a, b| {
            for term in &plan.order {
                let left = cell(a, &term.path, &term.column);
                let right = cell(b, &term.path, &term.column);
                let ord = match term.direction {
                    OrderDirection::Asc => cmp_values(&left, &right),
                    OrderDirection::Desc => cmp_values(&right, &left),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
        current
    }
}

fn cell(row: &HashMap<String, Option<Record>>, path: &str, column: &str) -> Value {
    row.get(path)
        .and_then(|o| o.as_ref())
        .and_then(|r| r.get(column))
        .cloned()
        .unwrap_or(Value::Null)
}

#[async_trait]
impl QueryExecutor for MemDb {
    async fn execute(&self, plan: &QueryPlan) -> Result<RowSet> {
        let joined = self.run(plan);
        Ok(joined
            .iter()
            .map(|j| {
                let mut row = Row::new();
                for column in &plan.columns {
                    row.set(column.key(), cell(j, &column.path, &column.column));
                }
                row
            })
            .collect())
    }

    async fn count(&self, plan: &QueryPlan) -> Result<u64> {
        let joined = self.run(plan);
        let distinct = joined
            .iter()
            .map(|j| format!("{:?}", cell(j, "", &plan.root_primary_key)))
            .unique()
            .count();
        Ok(distinct as u64)
    }
}

/// Executor whose backend is permanently down; every query fails.
pub struct FailingExecutor;

#[async_trait]
impl QueryExecutor for FailingExecutor {
    async fn execute(&self, _plan: &QueryPlan) -> Result<RowSet> {
        QueryExecutionSnafu { message: "connection reset by peer" }.fail()
    }

    async fn count(&self, _plan: &QueryPlan) -> Result<u64> {
        QueryExecutionSnafu { message: "connection reset by peer" }.fail()
    }
}

fn eval(condition: &Condition, record: &Record) -> bool {
    match condition {
        Condition::Group(tree) => match tree.operator {
            LogicOperator::And => tree.conditions.iter().all(|c| eval(c, record)),
            LogicOperator::Or => tree.conditions.iter().any(|c| eval(c, record)),
        },
        Condition::Single { field, filter } => {
            let value = record.get(field).cloned().unwrap_or(Value::Null);
            match filter {
                Filter::Eq(x) => &value == x,
                Filter::Ne(x) => &value != x,
                Filter::Gt(x) => !value.is_null() && cmp_values(&value, x) == Ordering::Greater,
                Filter::Gte(x) => !value.is_null() && cmp_values(&value, x) != Ordering::Less,
                Filter::Lt(x) => !value.is_null() && cmp_values(&value, x) == Ordering::Less,
                Filter::Lte(x) => !value.is_null() && cmp_values(&value, x) != Ordering::Greater,
                Filter::In(xs) => xs.contains(&value),
                Filter::IsNull => value.is_null(),
                Filter::NotNull => !value.is_null(),
            }
        }
    }
}

// nulls sort last in either direction
fn cmp_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Integer(x), Value::Integer(y)) => x.cmp(y),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Timestamp(x), Value::Timestamp(y)) => x.cmp(y),
        (Value::Text(x), Value::Text(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}
