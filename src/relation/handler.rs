//! Relation query construction.
//!
//! The handler turns a named relation of a model into a [`RelationQuery`]:
//! the related model, a [`Query`] over its table, and the key columns needed
//! to match fetched rows back to their parents.
//!
//! - **Real mode** filters the query to one parent entity.
//! - **Eager mode** leaves the parent filter off; the loader adds a single
//!   `WHERE relating IN (...)` for the whole batch.
//! - **Existence queries** correlate the relating column with the outer
//!   table for `has` / `where_has`.

use super::spec::{morph_id_column, morph_type_column, RelationKind, RelationSpec};
use crate::error::{LucidError, Result};
use crate::model::{Entity, ModelDef, Registry};
use crate::query::{Clause, Condition, Connector, Op, Query};
use crate::value::{self, FromValue};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Filtered to a single parent
    Real,
    /// Unfiltered, keys are added by the loader
    Eager,
}

/// A relation resolved against its parent model
#[derive(Debug, Clone)]
pub struct RelationQuery {
    pub kind: RelationKind,
    pub related: Arc<ModelDef>,
    pub query: Query,
    /// Qualified column compared with the parent keys
    pub relating_column: String,
    /// Parent attribute supplying the keys
    pub parent_key: String,
    /// Attribute (or extra) of a fetched child holding the matching key
    pub child_key: String,
    /// Aliased pivot/through columns the query selects, kept out of the
    /// child's attributes
    pub extra_columns: Vec<String>,
}

/// Builds relation queries for one parent model
pub struct RelationHandler<'a> {
    registry: &'a Registry,
    parent: &'a ModelDef,
}

impl<'a> RelationHandler<'a> {
    pub fn new(registry: &'a Registry, parent: &'a ModelDef) -> Self {
        Self { registry, parent }
    }

    /// Declared relation, `UnknownRelation` when missing
    pub fn spec(&self, name: &str) -> Result<&'a RelationSpec> {
        self.parent
            .relation_spec(name)
            .ok_or_else(|| LucidError::UnknownRelation {
                model: self.parent.name().to_string(),
                relation: name.to_string(),
            })
    }

    /// Query for relation `name`
    ///
    /// In [`Mode::Real`] `parent` must be given; the query is filtered to it.
    /// `morphTo` relations are only available in real mode, since the target
    /// table depends on each parent's type column.
    pub fn query(&self, parent: Option<&Entity>, name: &str, mode: Mode) -> Result<RelationQuery> {
        let spec = self.spec(name)?;
        let mut relation = match (spec, mode) {
            (RelationSpec::MorphTo { morph_name }, Mode::Real) => {
                let parent = require_parent(parent, name)?;
                let label = parent
                    .raw(&morph_type_column(morph_name))
                    .and_then(String::from_value)
                    .ok_or_else(|| {
                        LucidError::InvalidArgument(format!(
                            "{} has no {} value",
                            self.parent.name(),
                            morph_type_column(morph_name)
                        ))
                    })?;
                self.morph_to_query(morph_name, &label)?
            }
            (RelationSpec::MorphTo { .. }, Mode::Eager) => {
                return Err(LucidError::Unsupported(format!(
                    "morphTo relation {name} is resolved per type by the loader"
                )))
            }
            (spec, _) => self.build(spec)?,
        };

        if mode == Mode::Real {
            let parent = require_parent(parent, name)?;
            let key = parent
                .raw(&relation.parent_key)
                .cloned()
                .unwrap_or_else(value::null);
            relation.query = relation.query.where_(&relation.relating_column, Op::Eq, key);
        }
        Ok(relation)
    }

    /// `morphTo` target query for one type label
    pub fn morph_to_query(&self, morph_name: &str, label: &str) -> Result<RelationQuery> {
        let related = self.registry.model_for_morph(label)?;
        Ok(RelationQuery {
            kind: RelationKind::MorphTo,
            query: Query::table(related.table()),
            relating_column: related.qualified_key(),
            parent_key: morph_id_column(morph_name),
            child_key: related.primary_key().to_string(),
            extra_columns: Vec::new(),
            related,
        })
    }

    /// Relation query correlated with the parent table, for `EXISTS` and
    /// `COUNT` subqueries
    ///
    /// The constraint runs before correlation.
    pub fn existence_query(
        &self,
        name: &str,
        constraint: Option<&dyn Fn(Query) -> Query>,
    ) -> Result<Query> {
        self.correlated(name, constraint, self.parent.table())
            .map(|(query, _)| query)
    }

    /// Existence query correlated with the parent rows referenced as `outer`
    ///
    /// A relation back onto the outer table gets its own alias, returned with
    /// the query so nested checks can correlate with it.
    pub fn correlated(
        &self,
        name: &str,
        constraint: Option<&dyn Fn(Query) -> Query>,
        outer: &str,
    ) -> Result<(Query, String)> {
        let spec = self.spec(name)?;
        if spec.kind() == RelationKind::MorphTo {
            return Err(LucidError::Unsupported(format!(
                "existence checks on morphTo relation {name}"
            )));
        }
        let related = spec
            .related()
            .map(|related| self.model(related))
            .transpose()?;
        let alias = related
            .filter(|related| related.table() == outer)
            .map(|related| format!("{}_inner", related.table()));
        let relation = self.build_as(spec, alias.as_deref())?;
        let reference = alias.unwrap_or_else(|| relation.related.table().to_string());
        let query = match constraint {
            Some(constraint) => apply_constraint(relation.query, constraint),
            None => relation.query,
        };
        let outer = format!("{outer}.{}", relation.parent_key);
        Ok((
            query.where_column(&relation.relating_column, Op::Eq, &outer),
            reference,
        ))
    }

    fn model(&self, name: &str) -> Result<Arc<ModelDef>> {
        self.registry.model(name)
    }

    fn parent_key(&self, key: &Option<String>) -> String {
        key.clone()
            .unwrap_or_else(|| self.parent.primary_key().to_string())
    }

    fn build(&self, spec: &RelationSpec) -> Result<RelationQuery> {
        self.build_as(spec, None)
    }

    /// Relation query with the related table optionally referenced as `alias`
    fn build_as(&self, spec: &RelationSpec, alias: Option<&str>) -> Result<RelationQuery> {
        let kind = spec.kind();
        match spec {
            RelationSpec::HasOne {
                related,
                foreign_key,
                local_key,
            }
            | RelationSpec::HasMany {
                related,
                foreign_key,
                local_key,
            } => {
                let related = self.model(related)?;
                let table = alias.unwrap_or(related.table()).to_string();
                Ok(RelationQuery {
                    kind,
                    query: from_related(&related, alias),
                    relating_column: format!("{table}.{foreign_key}"),
                    parent_key: self.parent_key(local_key),
                    child_key: foreign_key.clone(),
                    extra_columns: Vec::new(),
                    related,
                })
            }
            RelationSpec::BelongsTo {
                related,
                foreign_key,
                owner_key,
            } => {
                let related = self.model(related)?;
                let table = alias.unwrap_or(related.table()).to_string();
                let owner = owner_key
                    .clone()
                    .unwrap_or_else(|| related.primary_key().to_string());
                Ok(RelationQuery {
                    kind,
                    query: from_related(&related, alias),
                    relating_column: format!("{table}.{owner}"),
                    parent_key: foreign_key.clone(),
                    child_key: owner,
                    extra_columns: Vec::new(),
                    related,
                })
            }
            RelationSpec::ManyToMany {
                related,
                pivot_table,
                foreign_pivot_key,
                related_pivot_key,
                parent_key,
                related_key,
                pivot_columns,
            } => {
                let related = self.model(related)?;
                let query = pivot_query(
                    &related,
                    alias,
                    pivot_table,
                    foreign_pivot_key,
                    related_pivot_key,
                    related_key,
                    pivot_columns,
                );
                Ok(pivot_relation(
                    kind,
                    related,
                    query,
                    pivot_table,
                    foreign_pivot_key,
                    pivot_columns,
                    self.parent_key(parent_key),
                ))
            }
            RelationSpec::MorphToMany {
                related,
                pivot_table,
                morph_name,
                related_pivot_key,
                parent_key,
                related_key,
            } => {
                let related = self.model(related)?;
                let foreign_pivot_key = morph_id_column(morph_name);
                let query = pivot_query(
                    &related,
                    alias,
                    pivot_table,
                    &foreign_pivot_key,
                    related_pivot_key,
                    related_key,
                    &[],
                )
                .where_(
                    &format!("{pivot_table}.{}", morph_type_column(morph_name)),
                    Op::Eq,
                    self.parent.morph_label(),
                );
                Ok(pivot_relation(
                    kind,
                    related,
                    query,
                    pivot_table,
                    &foreign_pivot_key,
                    &[],
                    self.parent_key(parent_key),
                ))
            }
            RelationSpec::MorphedByMany {
                related,
                pivot_table,
                morph_name,
                foreign_pivot_key,
                parent_key,
                related_key,
            } => {
                let related = self.model(related)?;
                let query = pivot_query(
                    &related,
                    alias,
                    pivot_table,
                    foreign_pivot_key,
                    &morph_id_column(morph_name),
                    related_key,
                    &[],
                )
                .where_(
                    &format!("{pivot_table}.{}", morph_type_column(morph_name)),
                    Op::Eq,
                    related.morph_label(),
                );
                Ok(pivot_relation(
                    kind,
                    related,
                    query,
                    pivot_table,
                    foreign_pivot_key,
                    &[],
                    self.parent_key(parent_key),
                ))
            }
            RelationSpec::HasOneThrough {
                related,
                through,
                first_key,
                second_key,
                local_key,
                second_local_key,
            }
            | RelationSpec::HasManyThrough {
                related,
                through,
                first_key,
                second_key,
                local_key,
                second_local_key,
            } => {
                let related = self.model(related)?;
                let through = self.model(through)?;
                let table = alias.unwrap_or(related.table()).to_string();
                let through_key = second_local_key
                    .clone()
                    .unwrap_or_else(|| through.primary_key().to_string());
                let through_alias = format!("through_{first_key}");
                let query = from_related(&related, alias)
                    .select([
                        format!("{table}.*"),
                        format!("{}.{first_key} as {through_alias}", through.table()),
                    ])
                    .join(
                        through.table(),
                        &format!("{}.{through_key}", through.table()),
                        Op::Eq,
                        &format!("{table}.{second_key}"),
                    );
                Ok(RelationQuery {
                    kind,
                    query,
                    relating_column: format!("{}.{first_key}", through.table()),
                    parent_key: self.parent_key(local_key),
                    child_key: through_alias.clone(),
                    extra_columns: vec![through_alias],
                    related,
                })
            }
            RelationSpec::MorphOne {
                related,
                morph_name,
                local_key,
            }
            | RelationSpec::MorphMany {
                related,
                morph_name,
                local_key,
            } => {
                let related = self.model(related)?;
                let table = alias.unwrap_or(related.table()).to_string();
                let query = from_related(&related, alias).where_(
                    &format!("{table}.{}", morph_type_column(morph_name)),
                    Op::Eq,
                    self.parent.morph_label(),
                );
                Ok(RelationQuery {
                    kind,
                    query,
                    relating_column: format!("{table}.{}", morph_id_column(morph_name)),
                    parent_key: self.parent_key(local_key),
                    child_key: morph_id_column(morph_name),
                    extra_columns: Vec::new(),
                    related,
                })
            }
            RelationSpec::MorphTo { .. } => Err(LucidError::Unsupported(
                "morphTo has no static target".into(),
            )),
        }
    }
}

fn require_parent<'e>(parent: Option<&'e Entity>, name: &str) -> Result<&'e Entity> {
    parent.ok_or_else(|| {
        LucidError::InvalidArgument(format!("relation {name} in real mode needs a parent entity"))
    })
}

fn from_related(related: &ModelDef, alias: Option<&str>) -> Query {
    let query = Query::table(related.table());
    match alias {
        Some(alias) => query.alias(alias),
        None => query,
    }
}

/// `related.*` plus the pivot key (and extra pivot columns) aliased `pivot_<col>`
fn pivot_query(
    related: &ModelDef,
    alias: Option<&str>,
    pivot_table: &str,
    foreign_pivot_key: &str,
    related_pivot_key: &str,
    related_key: &Option<String>,
    pivot_columns: &[String],
) -> Query {
    let table = alias.unwrap_or(related.table());
    let related_key = related_key.as_deref().unwrap_or(related.primary_key());
    let mut columns = vec![
        format!("{table}.*"),
        format!("{pivot_table}.{foreign_pivot_key} as pivot_{foreign_pivot_key}"),
    ];
    columns.extend(
        pivot_columns
            .iter()
            .map(|c| format!("{pivot_table}.{c} as pivot_{c}")),
    );
    from_related(related, alias).select(columns).join(
        pivot_table,
        &format!("{pivot_table}.{related_pivot_key}"),
        Op::Eq,
        &format!("{table}.{related_key}"),
    )
}

fn pivot_relation(
    kind: RelationKind,
    related: Arc<ModelDef>,
    query: Query,
    pivot_table: &str,
    foreign_pivot_key: &str,
    pivot_columns: &[String],
    parent_key: String,
) -> RelationQuery {
    let child_key = format!("pivot_{foreign_pivot_key}");
    let mut extra_columns = vec![child_key.clone()];
    extra_columns.extend(pivot_columns.iter().map(|c| format!("pivot_{c}")));
    RelationQuery {
        kind,
        related,
        query,
        relating_column: format!("{pivot_table}.{foreign_pivot_key}"),
        parent_key,
        child_key,
        extra_columns,
    }
}

/// Run a user constraint on a relation query
///
/// Clauses the constraint adds are wrapped in one group when any of them is
/// OR-connected, so they cannot widen the relation's own filters.
pub(crate) fn apply_constraint(query: Query, constraint: &dyn Fn(Query) -> Query) -> Query {
    let before = query.wheres().len();
    let mut query = constraint(query);
    if query.wheres.len() <= before {
        return query;
    }
    let added = query.wheres.split_off(before);
    if added.iter().any(|c| c.connector == Connector::Or) {
        query.push_where(Clause::and(Condition::Group {
            clauses: added,
            negated: false,
        }))
    } else {
        query.wheres.extend(added);
        query
    }
}
