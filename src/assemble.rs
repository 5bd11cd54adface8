use crate::api::{ColumnName, Value};
use crate::error::Result;
use crate::executor::Row;
use crate::include::{IncludeNode, IncludeTree};
use crate::plan::column_key;
use serde_json::{Map, Number, Value as JsonValue};
use std::collections::{BTreeMap, HashMap};

static NULL: Value = Value::Null;

#[derive(Debug, PartialEq, Clone)]
pub enum AssociationValue {
    One(Option<Entity>),
    Many(Vec<Entity>),
}

/// A materialized instance of the entity graph. Attributes hold only the
/// projected columns; the primary key stays retrievable through `id()`
/// even when a projection omitted it.
#[derive(Debug, PartialEq, Clone)]
pub struct Entity {
    id: Value,
    attributes: BTreeMap<ColumnName, Value>,
    associations: BTreeMap<String, AssociationValue>,
}

impl Entity {
    pub fn id(&self) -> &Value {
        &self.id
    }

    pub fn get(&self, attribute: &str) -> &Value {
        self.attributes.get(attribute).unwrap_or(&NULL)
    }

    pub fn association(&self, slot: &str) -> Option<&AssociationValue> {
        self.associations.get(slot)
    }

    /// The nested entity in a to-one slot, if present.
    pub fn one(&self, slot: &str) -> Option<&Entity> {
        match self.associations.get(slot) {
            Some(AssociationValue::One(Some(entity))) => Some(entity),
            _ => None,
        }
    }

    /// The collection in a to-many slot; empty when absent.
    pub fn many(&self, slot: &str) -> &[Entity] {
        match self.associations.get(slot) {
            Some(AssociationValue::Many(entities)) => entities,
            _ => &[],
        }
    }

    /// Serialized projection: projected attributes plus association
    /// slots. An auto-injected primary key is excluded here.
    pub fn to_json(&self) -> JsonValue {
        let mut map = Map::new();
        for (name, value) in &self.attributes {
            map.insert(name.clone(), value_to_json(value));
        }
        for (slot, value) in &self.associations {
            let json = match value {
                AssociationValue::One(None) => JsonValue::Null,
                AssociationValue::One(Some(entity)) => entity.to_json(),
                AssociationValue::Many(entities) => {
                    JsonValue::Array(entities.iter().map(Entity::to_json).collect())
                }
            };
            map.insert(slot.clone(), json);
        }
        JsonValue::Object(map)
    }
}

fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Integer(i) => JsonValue::Number((*i).into()),
        Value::Float(f) => match Number::from_f64(*f) {
            Some(n) => JsonValue::Number(n),
            None => JsonValue::Null,
        },
        Value::Timestamp(t) => JsonValue::String(t.to_rfc3339()),
        Value::Text(s) => JsonValue::String(s.clone()),
    }
}

/// Reconstructs the nested entity graph from the flat joined row set.
/// Rows are grouped by (join path, primary key) so the parent fan-out a
/// to-many join introduces collapses back into one instance; collection
/// order is first-seen row order.
pub fn assemble(tree: &IncludeTree, rows: &[Row]) -> Result<Vec<Entity>> {
    let indices: Vec<usize> = (0..rows.len()).collect();
    Ok(assemble_level(
        rows,
        &indices,
        "",
        &tree.primary_key,
        &tree.attributes,
        tree.pk_in_output,
        &tree.nodes,
    ))
}

fn assemble_level(
    rows: &[Row],
    indices: &[usize],
    path: &str,
    primary_key: &str,
    attributes: &[ColumnName],
    pk_in_output: bool,
    nodes: &[IncludeNode],
) -> Vec<Entity> {
    let id_column = column_key(path, primary_key);

    // group row indices by entity id, preserving first-seen order
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for &i in indices {
        let id = rows[i].get(&id_column);
        if id.is_null() {
            // outer-joined miss: no instance at this path
            continue;
        }
        let key = id_key(id);
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(i);
    }

    order
        .iter()
        .map(|key| {
            build_entity(rows, &groups[key], path, primary_key, attributes, pk_in_output, nodes)
        })
        .collect()
}

fn build_entity(
    rows: &[Row],
    indices: &[usize],
    path: &str,
    primary_key: &str,
    attributes: &[ColumnName],
    pk_in_output: bool,
    nodes: &[IncludeNode],
) -> Entity {
    let first = &rows[indices[0]];
    let id = first.get(&column_key(path, primary_key)).clone();

    let mut attrs = BTreeMap::new();
    for attribute in attributes {
        if attribute == primary_key && !pk_in_output {
            continue;
        }
        attrs.insert(attribute.clone(), first.get(&column_key(path, attribute)).clone());
    }

    let mut associations = BTreeMap::new();
    for node in nodes {
        let children = assemble_level(
            rows,
            indices,
            &node.path,
            &node.primary_key,
            &node.attributes,
            node.pk_in_output,
            &node.children,
        );
        let value = if node.association.is_to_many() {
            AssociationValue::Many(children)
        } else {
            AssociationValue::One(children.into_iter().next())
        };
        associations.insert(node.association.slot(), value);
    }

    Entity { id, attributes: attrs, associations }
}

fn id_key(value: &Value) -> String {
    format!("{:?}", value)
}
