use crate::api::{ColumnName, IncludeTarget};
use crate::error::*;
use log::debug;
use snafu::{ensure, OptionExt};
use std::collections::BTreeMap;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AttributeType {
    Integer,
    Float,
    Text,
    Boolean,
    Timestamp,
}

/// A named schema with a primary key and typed attributes. Declared once
/// at startup, immutable during queries.
#[derive(Debug, PartialEq, Clone)]
pub struct EntityType {
    pub name: String,
    pub table: String,
    pub primary_key: ColumnName,
    pub attributes: BTreeMap<ColumnName, AttributeType>,
}

impl EntityType {
    pub fn new(name: &str) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert("id".to_string(), AttributeType::Integer);
        EntityType {
            name: name.to_string(),
            table: pluralize(&snake_case(name)),
            primary_key: "id".to_string(),
            attributes,
        }
    }

    pub fn attribute(mut self, name: &str, type_: AttributeType) -> Self {
        self.attributes.insert(name.to_string(), type_);
        self
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AssociationKind {
    BelongsTo,
    HasOne,
    HasMany,
    ManyToMany,
}

impl AssociationKind {
    pub fn is_to_many(self) -> bool {
        matches!(self, AssociationKind::HasMany | AssociationKind::ManyToMany)
    }
}

/// Join table descriptor for many-to-many edges.
#[derive(Debug, PartialEq, Clone)]
pub struct ThroughTable {
    pub table: String,
    pub source_key: ColumnName,
    pub target_key: ColumnName,
}

/// A directed relation between two entity types.
///
/// `foreign_key` lives on the source type for `BelongsTo` and on the
/// target type for `HasOne`/`HasMany`; `ManyToMany` keeps both keys on
/// the through table instead.
#[derive(Debug, PartialEq, Clone)]
pub struct Association {
    pub source: String,
    pub target: String,
    pub kind: AssociationKind,
    pub alias: String,
    pub foreign_key: ColumnName,
    pub through: Option<ThroughTable>,
}

impl Association {
    pub fn is_to_many(&self) -> bool {
        self.kind.is_to_many()
    }

    /// Property name the assembled entity exposes this edge under.
    pub fn slot(&self) -> String {
        decapitalize(&self.alias)
    }
}

#[derive(Debug, PartialEq, Clone, Default)]
pub struct AssociationOptions {
    pub alias: Option<String>,
    pub foreign_key: Option<ColumnName>,
    pub through: Option<String>,
}

impl AssociationOptions {
    pub fn new() -> Self {
        AssociationOptions::default()
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    pub fn foreign_key(mut self, foreign_key: &str) -> Self {
        self.foreign_key = Some(foreign_key.to_string());
        self
    }

    pub fn through(mut self, table: &str) -> Self {
        self.through = Some(table.to_string());
        self
    }
}

/// The association registry: entity types plus every declared edge.
/// Built during schema definition, read-only afterwards.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Schema {
    entities: BTreeMap<String, EntityType>,
    associations: Vec<Association>,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    pub fn define(&mut self, entity: EntityType) -> &mut Self {
        self.entities.insert(entity.name.clone(), entity);
        self
    }

    pub fn entity(&self, name: &str) -> Result<&EntityType> {
        self.entities.get(name).context(UnknownEntitySnafu { name })
    }

    pub fn belongs_to(&mut self, source: &str, target: &str, options: AssociationOptions) -> Result<()> {
        let alias = options.alias.unwrap_or_else(|| decapitalize(target));
        let foreign_key = options
            .foreign_key
            .unwrap_or_else(|| format!("{}_id", snake_case(&alias)));
        self.declare(Association {
            source: source.to_string(),
            target: target.to_string(),
            kind: AssociationKind::BelongsTo,
            alias,
            foreign_key,
            through: None,
        })
    }

    pub fn has_one(&mut self, source: &str, target: &str, options: AssociationOptions) -> Result<()> {
        let alias = options.alias.unwrap_or_else(|| decapitalize(target));
        let foreign_key = options
            .foreign_key
            .unwrap_or_else(|| format!("{}_id", snake_case(source)));
        self.declare(Association {
            source: source.to_string(),
            target: target.to_string(),
            kind: AssociationKind::HasOne,
            alias,
            foreign_key,
            through: None,
        })
    }

    /// `has_many` with a `through` table declares a many-to-many edge.
    /// Self-referential `has_many` is only valid in the through form.
    pub fn has_many(&mut self, source: &str, target: &str, options: AssociationOptions) -> Result<()> {
        let alias = options
            .alias
            .clone()
            .unwrap_or_else(|| default_to_many_alias(target));
        match options.through {
            Some(table) => {
                let source_key = format!("{}_id", snake_case(source));
                let target_key = if source == target {
                    format!("{}_id", snake_case(&singularize(&alias)))
                } else {
                    format!("{}_id", snake_case(target))
                };
                self.declare(Association {
                    source: source.to_string(),
                    target: target.to_string(),
                    kind: AssociationKind::ManyToMany,
                    alias,
                    foreign_key: source_key.clone(),
                    through: Some(ThroughTable { table, source_key, target_key }),
                })
            }
            None => {
                ensure!(
                    source != target,
                    InvalidAssociationSnafu {
                        source_type: source,
                        target_type: target,
                        message: "self-referential has_many requires a through table",
                    }
                );
                let foreign_key = options
                    .foreign_key
                    .unwrap_or_else(|| format!("{}_id", snake_case(source)));
                self.declare(Association {
                    source: source.to_string(),
                    target: target.to_string(),
                    kind: AssociationKind::HasMany,
                    alias,
                    foreign_key,
                    through: None,
                })
            }
        }
    }

    fn declare(&mut self, association: Association) -> Result<()> {
        self.entity(&association.source)?;
        self.entity(&association.target)?;
        ensure!(
            !self
                .associations
                .iter()
                .any(|a| a.source == association.source && a.alias == association.alias),
            DuplicateAliasSnafu {
                source_type: &association.source,
                alias: &association.alias,
            }
        );

        // the owning side gets the foreign key column if the caller did
        // not declare it as a regular attribute
        let fk_owner = match association.kind {
            AssociationKind::BelongsTo => Some(&association.source),
            AssociationKind::HasOne | AssociationKind::HasMany => Some(&association.target),
            AssociationKind::ManyToMany => None,
        };
        if let Some(owner) = fk_owner {
            let entity = self
                .entities
                .get_mut(owner.as_str())
                .context(UnknownEntitySnafu { name: owner })?;
            entity
                .attributes
                .entry(association.foreign_key.clone())
                .or_insert(AttributeType::Integer);
        }

        debug!(
            "declared {:?} {} -> {} as '{}'",
            association.kind, association.source, association.target, association.alias
        );
        self.associations.push(association);
        Ok(())
    }

    /// Resolves an include target against the edges declared on
    /// `source_type`. `ByType` with several candidate edges picks the one
    /// carrying its kind's default alias; anything else is ambiguous and
    /// must be named by alias.
    pub fn resolve(&self, source_type: &str, target: &IncludeTarget) -> Result<&Association> {
        match target {
            IncludeTarget::ByAlias(alias) => self
                .associations
                .iter()
                .find(|a| a.source == source_type && &a.alias == alias)
                .context(UnknownAssociationSnafu { source_type, target: alias }),
            IncludeTarget::ByType(type_name) => {
                let candidates: Vec<&Association> = self
                    .associations
                    .iter()
                    .filter(|a| a.source == source_type && &a.target == type_name)
                    .collect();
                match candidates.len() {
                    1 => Ok(candidates[0]),
                    0 => UnknownAssociationSnafu { source_type, target: type_name }.fail(),
                    _ => candidates
                        .into_iter()
                        .find(|a| a.alias == default_alias(a.kind, type_name))
                        .context(UnknownAssociationSnafu { source_type, target: type_name }),
                }
            }
        }
    }
}

fn default_alias(kind: AssociationKind, target: &str) -> String {
    if kind.is_to_many() {
        default_to_many_alias(target)
    } else {
        decapitalize(target)
    }
}

fn default_to_many_alias(target: &str) -> String {
    pluralize(&decapitalize(target))
}

pub(crate) fn snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, c) in s.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn pluralize(s: &str) -> String {
    match s.strip_suffix('y') {
        Some(stem) => format!("{}ies", stem),
        None => format!("{}s", s),
    }
}

fn singularize(s: &str) -> String {
    if let Some(stem) = s.strip_suffix("ies") {
        format!("{}y", stem)
    } else if let Some(stem) = s.strip_suffix('s') {
        stem.to_string()
    } else {
        s.to_string()
    }
}

fn decapitalize(s: &str) -> String {
    if !s.is_empty() && s.chars().all(|c| c.is_ascii_uppercase()) {
        return s.to_ascii_lowercase();
    }
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}
