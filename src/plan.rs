use crate::api::{ColumnName, Condition, OrderDirection, OrderTerm};
use crate::error::*;
use crate::include::{IncludeNode, IncludeTree};
use crate::schema::{AssociationKind, Schema};
use itertools::Itertools;
use log::debug;
use snafu::OptionExt;

pub type JoinAlias = String;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum JoinKind {
    /// Outer join: a missing match keeps the parent row with NULL columns.
    Left,
    /// Inner join: a missing match drops the parent row. Used when the
    /// include carries a scoped filter.
    Inner,
}

/// How a join step connects to its parent path.
#[derive(Debug, PartialEq, Clone)]
pub enum JoinOn {
    /// parent.foreign_key = child.primary_key (belongs_to)
    Parent { foreign_key: ColumnName },
    /// child.foreign_key = parent.primary_key (has_one / has_many)
    Child { foreign_key: ColumnName },
    /// through.source_key = parent.primary_key and
    /// child.primary_key = through.target_key
    Many {
        table: String,
        source_key: ColumnName,
        target_key: ColumnName,
    },
}

#[derive(Debug, PartialEq, Clone)]
pub struct JoinStep {
    pub path: JoinAlias,
    pub parent_path: JoinAlias,
    pub parent_primary_key: ColumnName,
    pub entity: String,
    pub table: String,
    pub primary_key: ColumnName,
    pub to_many: bool,
    pub kind: JoinKind,
    pub on: JoinOn,
    /// Scoped predicate, attached as a join condition rather than a
    /// top-level WHERE so outer-joined misses keep the parent row.
    pub filter: Option<Condition>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct PlannedColumn {
    pub path: JoinAlias,
    pub column: ColumnName,
}

impl PlannedColumn {
    pub fn key(&self) -> String {
        column_key(&self.path, &self.column)
    }
}

/// Qualified row key for a column at a join path. Root columns are
/// unqualified so aliases of the same target type never collide.
pub fn column_key(path: &str, column: &str) -> String {
    if path.is_empty() {
        column.to_string()
    } else {
        format!("{}.{}", path, column)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct PlannedOrder {
    pub path: JoinAlias,
    pub column: ColumnName,
    pub direction: OrderDirection,
}

#[derive(Debug, PartialEq, Clone)]
pub struct QueryPlan {
    pub root_entity: String,
    pub root_table: String,
    pub root_primary_key: ColumnName,
    pub columns: Vec<PlannedColumn>,
    /// Depth-first over the include tree; each step's parent appears
    /// before it.
    pub joins: Vec<JoinStep>,
    pub where_: Option<Condition>,
    /// Root order terms first, then the root primary key, then descendant
    /// order terms each followed by their path's primary key, then the
    /// primary key of every remaining to-many path. Keeps row groups for
    /// one parent contiguous for the assembler.
    pub order: Vec<PlannedOrder>,
}

pub fn build_plan(
    schema: &Schema,
    tree: &IncludeTree,
    where_: Option<Condition>,
    order: &[OrderTerm],
) -> Result<QueryPlan> {
    let root = schema.entity(&tree.root)?;
    let mut columns: Vec<PlannedColumn> = tree
        .attributes
        .iter()
        .map(|c| PlannedColumn { path: String::new(), column: c.clone() })
        .collect();
    let mut joins = Vec::new();
    for node in &tree.nodes {
        plan_node(schema, node, "", &root.primary_key, &mut joins, &mut columns)?;
    }
    let order = plan_order(schema, tree, &joins, order)?;
    debug!(
        "plan for {}: {} columns, {} joins",
        tree.root,
        columns.len(),
        joins.len()
    );
    Ok(QueryPlan {
        root_entity: root.name.clone(),
        root_table: root.table.clone(),
        root_primary_key: root.primary_key.clone(),
        columns,
        joins,
        where_,
        order,
    })
}

fn plan_node(
    schema: &Schema,
    node: &IncludeNode,
    parent_path: &str,
    parent_primary_key: &str,
    joins: &mut Vec<JoinStep>,
    columns: &mut Vec<PlannedColumn>,
) -> Result<()> {
    let target = schema.entity(&node.association.target)?;
    let on = match node.association.kind {
        AssociationKind::BelongsTo => JoinOn::Parent {
            foreign_key: node.association.foreign_key.clone(),
        },
        AssociationKind::HasOne | AssociationKind::HasMany => JoinOn::Child {
            foreign_key: node.association.foreign_key.clone(),
        },
        AssociationKind::ManyToMany => match &node.association.through {
            Some(t) => JoinOn::Many {
                table: t.table.clone(),
                source_key: t.source_key.clone(),
                target_key: t.target_key.clone(),
            },
            None => {
                return InvalidAssociationSnafu {
                    source_type: &node.association.source,
                    target_type: &node.association.target,
                    message: "many-to-many edge without a through table",
                }
                .fail()
            }
        },
    };
    let kind = if node.where_.is_some() { JoinKind::Inner } else { JoinKind::Left };
    joins.push(JoinStep {
        path: node.path.clone(),
        parent_path: parent_path.to_string(),
        parent_primary_key: parent_primary_key.to_string(),
        entity: target.name.clone(),
        table: target.table.clone(),
        primary_key: target.primary_key.clone(),
        to_many: node.association.is_to_many(),
        kind,
        on,
        filter: node.where_.clone(),
    });
    columns.extend(
        node.attributes
            .iter()
            .map(|c| PlannedColumn { path: node.path.clone(), column: c.clone() }),
    );
    for child in &node.children {
        plan_node(schema, child, &node.path, &target.primary_key, joins, columns)?;
    }
    Ok(())
}

fn plan_order(
    schema: &Schema,
    tree: &IncludeTree,
    joins: &[JoinStep],
    requested: &[OrderTerm],
) -> Result<Vec<PlannedOrder>> {
    let root = schema.entity(&tree.root)?;
    let mut order: Vec<PlannedOrder> = Vec::new();

    for term in requested.iter().filter(|t| t.path.is_empty()) {
        if !root.has_attribute(&term.field) {
            return UnknownAttributeSnafu { entity: &root.name, attribute: &term.field }.fail();
        }
        order.push(PlannedOrder {
            path: String::new(),
            column: term.field.clone(),
            direction: term.direction.clone(),
        });
    }
    order.push(PlannedOrder {
        path: String::new(),
        column: root.primary_key.clone(),
        direction: OrderDirection::Asc,
    });

    for term in requested.iter().filter(|t| !t.path.is_empty()) {
        let node = resolve_order_path(tree, &term.path)
            .context(UnknownOrderPathSnafu { path: term.path.join(".") })?;
        let target = schema.entity(&node.association.target)?;
        if !target.has_attribute(&term.field) {
            return UnknownAttributeSnafu { entity: &target.name, attribute: &term.field }.fail();
        }
        order.push(PlannedOrder {
            path: node.path.clone(),
            column: term.field.clone(),
            direction: term.direction.clone(),
        });
        order.push(PlannedOrder {
            path: node.path.clone(),
            column: node.primary_key.clone(),
            direction: OrderDirection::Asc,
        });
    }

    for join in joins.iter().filter(|j| j.to_many) {
        order.push(PlannedOrder {
            path: join.path.clone(),
            column: join.primary_key.clone(),
            direction: OrderDirection::Asc,
        });
    }

    // first occurrence wins, so an explicit direction is never overridden
    Ok(order
        .into_iter()
        .unique_by(|o| (o.path.clone(), o.column.clone()))
        .collect())
}

fn resolve_order_path<'t>(tree: &'t IncludeTree, path: &[String]) -> Option<&'t IncludeNode> {
    let mut nodes = &tree.nodes;
    let mut found = None;
    for segment in path {
        found = nodes.iter().find(|n| &n.association.slot() == segment);
        match found {
            Some(node) => nodes = &node.children,
            None => return None,
        }
    }
    found
}
