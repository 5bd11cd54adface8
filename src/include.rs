use crate::api::{ColumnName, Condition, FindRequest, IncludeSpec};
use crate::error::*;
use crate::schema::{Association, EntityType, Schema};

/// One resolved entry of the include tree. `attributes` is the concrete
/// selected column list; when the caller projected a subset that omitted
/// the primary key, it is injected here (nested instances must stay
/// addressable) and `pk_in_output` records that it must not appear in
/// serialized output.
#[derive(Debug, PartialEq, Clone)]
pub struct IncludeNode {
    pub association: Association,
    /// Join-alias path from the root, e.g. "products.tags". Stable
    /// reassembly key, disambiguates same-type self-joins.
    pub path: String,
    pub primary_key: ColumnName,
    pub attributes: Vec<ColumnName>,
    pub pk_in_output: bool,
    pub where_: Option<Condition>,
    pub children: Vec<IncludeNode>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct IncludeTree {
    pub root: String,
    pub primary_key: ColumnName,
    pub attributes: Vec<ColumnName>,
    pub pk_in_output: bool,
    pub nodes: Vec<IncludeNode>,
}

pub fn normalize(schema: &Schema, root: &str, request: &FindRequest) -> Result<IncludeTree> {
    let root_entity = schema.entity(root)?;
    let (attributes, pk_in_output) = project(root_entity, request.attributes.as_deref())?;
    let nodes = request
        .include
        .iter()
        .map(|spec| normalize_node(schema, root, "", spec))
        .collect::<Result<Vec<_>>>()?;
    Ok(IncludeTree {
        root: root.to_string(),
        primary_key: root_entity.primary_key.clone(),
        attributes,
        pk_in_output,
        nodes,
    })
}

fn normalize_node(schema: &Schema, parent_type: &str, parent_path: &str, spec: &IncludeSpec) -> Result<IncludeNode> {
    let association = schema
        .resolve(parent_type, &spec.target)
        .map_err(|e| match e {
            Error::UnknownAssociation { target, .. } => Error::AssociationNotFound {
                parent: parent_type.to_string(),
                target,
            },
            other => other,
        })?
        .clone();
    let target_entity = schema.entity(&association.target)?;
    let (attributes, pk_in_output) = project(target_entity, spec.attributes.as_deref())?;
    let path = if parent_path.is_empty() {
        association.slot()
    } else {
        format!("{}.{}", parent_path, association.slot())
    };
    let children = spec
        .include
        .iter()
        .map(|s| normalize_node(schema, &association.target, &path, s))
        .collect::<Result<Vec<_>>>()?;
    Ok(IncludeNode {
        path,
        primary_key: target_entity.primary_key.clone(),
        attributes,
        pk_in_output,
        where_: spec.where_.clone(),
        children,
        association,
    })
}

fn project(entity: &EntityType, requested: Option<&[ColumnName]>) -> Result<(Vec<ColumnName>, bool)> {
    match requested {
        None => Ok((entity.attributes.keys().cloned().collect(), true)),
        Some(list) => {
            for attribute in list {
                if !entity.has_attribute(attribute) {
                    return UnknownAttributeSnafu { entity: &entity.name, attribute }.fail();
                }
            }
            let mut attributes: Vec<ColumnName> = list.to_vec();
            let pk_in_output = attributes.contains(&entity.primary_key);
            if !pk_in_output {
                attributes.push(entity.primary_key.clone());
            }
            Ok((attributes, pk_in_output))
        }
    }
}
