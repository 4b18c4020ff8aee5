//! Pivot table writes for many-to-many relations.
//!
//! Every statement issued here is scoped by the parent key and, for
//! polymorphic pivots, by the morph type label, so one parent's rows are never
//! touched through another parent.

use super::spec::{morph_id_column, morph_type_column, RelationSpec};
use crate::connection::Connection;
use crate::error::{LucidError, Result};
use crate::model::{Entity, Registry};
use crate::query::Query;
use crate::value::{key_of, Key, Record};
use indexmap::IndexMap;
use sea_query::Value;

/// Outcome of [`PivotOps::sync`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncResult {
    pub attached: Vec<Value>,
    pub detached: Vec<Value>,
}

/// Pivot operations bound to one parent entity and relation
#[derive(Debug, Clone)]
pub struct PivotOps {
    table: String,
    parent_column: String,
    related_column: String,
    parent_value: Value,
    /// `{name}_type` column and label for polymorphic pivots
    morph: Option<(String, String)>,
}

impl Entity {
    /// Pivot operations for a manyToMany, morphToMany or morphedByMany relation
    ///
    /// # Errors
    ///
    /// - `UnknownRelation` when the model has no relation `name`
    /// - `Unsupported` when the relation has no pivot table
    /// - `InvalidArgument` when the entity has no parent key value yet
    pub fn pivot(&self, registry: &Registry, name: &str) -> Result<PivotOps> {
        let spec = self
            .def()
            .relation_spec(name)
            .ok_or_else(|| LucidError::UnknownRelation {
                model: self.model_name().to_string(),
                relation: name.to_string(),
            })?;
        let (table, parent_column, related_column, parent_key, morph) = match spec {
            RelationSpec::ManyToMany {
                pivot_table,
                foreign_pivot_key,
                related_pivot_key,
                parent_key,
                ..
            } => (
                pivot_table.clone(),
                foreign_pivot_key.clone(),
                related_pivot_key.clone(),
                parent_key.clone(),
                None,
            ),
            RelationSpec::MorphToMany {
                pivot_table,
                morph_name,
                related_pivot_key,
                parent_key,
                ..
            } => (
                pivot_table.clone(),
                morph_id_column(morph_name),
                related_pivot_key.clone(),
                parent_key.clone(),
                Some((
                    morph_type_column(morph_name),
                    self.def().morph_label().to_string(),
                )),
            ),
            RelationSpec::MorphedByMany {
                related,
                pivot_table,
                morph_name,
                foreign_pivot_key,
                parent_key,
                ..
            } => {
                let related = registry.model(related)?;
                (
                    pivot_table.clone(),
                    foreign_pivot_key.clone(),
                    morph_id_column(morph_name),
                    parent_key.clone(),
                    Some((
                        morph_type_column(morph_name),
                        related.morph_label().to_string(),
                    )),
                )
            }
            other => {
                return Err(LucidError::Unsupported(format!(
                    "{:?} relation {name} has no pivot table",
                    other.kind()
                )))
            }
        };
        let parent_key = parent_key.unwrap_or_else(|| self.def().primary_key().to_string());
        let parent_value = self
            .raw(&parent_key)
            .filter(|v| key_of(v).is_some())
            .cloned()
            .ok_or_else(|| {
                LucidError::InvalidArgument(format!(
                    "{} has no {parent_key} value for pivot {name}",
                    self.model_name()
                ))
            })?;
        Ok(PivotOps {
            table,
            parent_column,
            related_column,
            parent_value,
            morph,
        })
    }
}

impl PivotOps {
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Pivot rows of this parent
    fn scoped(&self) -> Query {
        let query = Query::table(self.table.as_str())
            .where_eq(&self.parent_column, self.parent_value.clone());
        match &self.morph {
            Some((column, label)) => query.where_eq(column, label.as_str()),
            None => query,
        }
    }

    fn pivot_row(&self, id: Value) -> Record {
        let mut record = Record::new();
        record.insert(self.parent_column.clone(), self.parent_value.clone());
        record.insert(self.related_column.clone(), id);
        if let Some((column, label)) = &self.morph {
            record.insert(column.clone(), Value::from(label.as_str()));
        }
        record
    }

    /// Ids currently attached
    pub fn related_ids(&self, conn: &dyn Connection) -> Result<Vec<Value>> {
        self.scoped().pluck(conn, &self.related_column)
    }

    /// Insert one pivot row per id; returns rows inserted
    pub fn attach<I, V>(&self, conn: &dyn Connection, ids: I) -> Result<u64>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let rows: Vec<Record> = ids.into_iter().map(|id| self.pivot_row(id.into())).collect();
        if rows.is_empty() {
            return Ok(0);
        }
        let result = Query::table(self.table.as_str()).bulk_insert(conn, rows)?;
        Ok(result.rows_affected)
    }

    /// Insert one pivot row carrying extra pivot columns
    pub fn attach_with(
        &self,
        conn: &dyn Connection,
        id: impl Into<Value>,
        extra: Record,
    ) -> Result<u64> {
        let mut row = self.pivot_row(id.into());
        row.extend(extra);
        let result = Query::table(self.table.as_str()).insert(conn, row)?;
        Ok(result.rows_affected)
    }

    /// Delete the given ids, or every pivot row of the parent with `None`
    pub fn detach(&self, conn: &dyn Connection, ids: Option<Vec<Value>>) -> Result<u64> {
        let query = match ids {
            Some(ids) => self.scoped().where_in(&self.related_column, ids),
            None => self.scoped(),
        };
        query.delete(conn)
    }

    /// Make the attached ids exactly `ids`
    pub fn sync<I, V>(&self, conn: &dyn Connection, ids: I) -> Result<SyncResult>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut wanted: IndexMap<Key, Value> = IndexMap::new();
        for id in ids {
            let id = id.into();
            if let Some(key) = key_of(&id) {
                wanted.entry(key).or_insert(id);
            }
        }

        let mut current: IndexMap<Key, Value> = IndexMap::new();
        for id in self.related_ids(conn)? {
            if let Some(key) = key_of(&id) {
                current.entry(key).or_insert(id);
            }
        }

        let detached: Vec<Value> = current
            .iter()
            .filter(|(key, _)| !wanted.contains_key(*key))
            .map(|(_, id)| id.clone())
            .collect();
        let attached: Vec<Value> = wanted
            .iter()
            .filter(|(key, _)| !current.contains_key(*key))
            .map(|(_, id)| id.clone())
            .collect();

        if !detached.is_empty() {
            self.detach(conn, Some(detached.clone()))?;
        }
        self.attach(conn, attached.clone())?;
        log::debug!(
            "synced {}: {} attached, {} detached",
            self.table,
            attached.len(),
            detached.len()
        );
        Ok(SyncResult { attached, detached })
    }
}
