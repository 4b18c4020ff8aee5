//! Runtime model instances.
//!
//! An [`Entity`] is a named attribute bag bound to its [`ModelDef`]. Attributes
//! are kept in DB-native form; casts apply on [`Entity::get`] and
//! [`Entity::set`]. Pivot and through key columns selected by relation queries,
//! and `<relation>_count` values, live in a separate `extras` map.

use super::def::ModelDef;
use super::registry::Registry;
use crate::builder::Builder;
use crate::collection::Collection;
use crate::connection::{Connection, Row};
use crate::error::{LucidError, Result};
use crate::query::Query;
use crate::relation::handler::{Mode, RelationHandler};
use crate::value::{self, FromValue, Record, DATETIME_FORMAT};
use chrono::Local;
use indexmap::IndexMap;
use sea_query::Value;
use serde::{Serialize, Serializer};
use std::sync::Arc;

const CREATED_AT: &str = "created_at";
const UPDATED_AT: &str = "updated_at";

/// Loaded value of one relation
#[derive(Debug, Clone)]
pub enum Related {
    One(Option<Box<Entity>>),
    Many(Collection),
}

impl Related {
    /// Whether the relation holds something (an empty collection does)
    pub fn is_present(&self) -> bool {
        match self {
            Related::One(one) => one.is_some(),
            Related::Many(_) => true,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Related::One(Some(entity)) => entity.to_json(),
            Related::One(None) => serde_json::Value::Null,
            Related::Many(collection) => collection.to_json(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Entity {
    def: Arc<ModelDef>,
    attributes: Record,
    original: Record,
    extras: Record,
    relations: IndexMap<String, Related>,
    exists: bool,
}

impl Entity {
    /// Blank, unsaved entity of the given model
    pub fn new(def: Arc<ModelDef>) -> Self {
        Self {
            def,
            attributes: Record::new(),
            original: Record::new(),
            extras: Record::new(),
            relations: IndexMap::new(),
            exists: false,
        }
    }

    /// Build a persisted entity from a result row. No cast runs here.
    pub(crate) fn hydrate(def: Arc<ModelDef>, row: Row) -> Self {
        Self::hydrate_with_extras(def, row, &[])
    }

    /// Like [`Entity::hydrate`], with `extra_columns` stored as extras
    /// instead of attributes
    pub(crate) fn hydrate_with_extras(
        def: Arc<ModelDef>,
        row: Row,
        extra_columns: &[String],
    ) -> Self {
        let mut entity = Self::new(def);
        entity.absorb(row, extra_columns);
        entity
    }

    fn absorb(&mut self, row: Row, extra_columns: &[String]) {
        self.attributes.clear();
        for (column, value) in row.into_record() {
            if extra_columns.contains(&column) {
                self.extras.insert(column, value);
            } else {
                self.attributes.insert(column, value);
            }
        }
        self.original = self.attributes.clone();
        self.exists = true;
    }

    pub fn model_name(&self) -> &str {
        self.def.name()
    }

    pub fn table(&self) -> &str {
        self.def.table()
    }

    pub fn def(&self) -> &Arc<ModelDef> {
        &self.def
    }

    /// Whether the entity has been saved or was loaded from the database
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Primary key value, if set
    pub fn key(&self) -> Option<&Value> {
        self.attributes
            .get(self.def.primary_key())
            .filter(|v| !value::is_null(v))
    }

    /// Stored value of an attribute, falling back to extras
    pub fn raw(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name).or_else(|| self.extras.get(name))
    }

    pub fn attributes(&self) -> &Record {
        &self.attributes
    }

    /// Attribute value with its cast applied
    pub fn get(&self, name: &str) -> Result<Option<Value>> {
        let Some(stored) = self.raw(name) else {
            return Ok(None);
        };
        match self.def.cast_for(name) {
            Some(cast) => cast.cast(name, stored).map(Some),
            None => Ok(Some(stored.clone())),
        }
    }

    /// Typed attribute value, `None` when missing, NULL or not convertible
    pub fn get_as<T: FromValue>(&self, name: &str) -> Result<Option<T>> {
        Ok(self.get(name)?.and_then(|v| T::from_value(&v)))
    }

    /// Set an attribute, storing it in DB-native form
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let stored = match self.def.cast_for(name) {
            Some(cast) => cast.uncast(name, &value)?,
            None => value,
        };
        self.attributes.insert(name.to_string(), stored);
        Ok(())
    }

    pub fn fill(&mut self, record: Record) -> Result<()> {
        for (name, value) in record {
            self.set(&name, value)?;
        }
        Ok(())
    }

    pub fn extra(&self, name: &str) -> Option<&Value> {
        self.extras.get(name)
    }

    pub fn set_extra(&mut self, name: impl Into<String>, value: Value) {
        self.extras.insert(name.into(), value);
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty().is_empty()
    }

    /// Attributes changed since the entity was loaded or last saved
    pub fn dirty(&self) -> Record {
        self.attributes
            .iter()
            .filter(|(name, value)| self.original.get(*name) != Some(*value))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    // --- relations ---

    pub fn relation(&self, name: &str) -> Option<&Related> {
        self.relations.get(name)
    }

    pub fn set_relation(&mut self, name: impl Into<String>, related: Related) {
        self.relations.insert(name.into(), related);
    }

    pub fn relation_loaded(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    /// Whether `name` holds a non-null attribute or a present relation
    pub fn has_value(&self, name: &str) -> bool {
        self.relations.get(name).is_some_and(Related::is_present)
            || self.raw(name).is_some_and(|v| !value::is_null(v))
    }

    /// Loaded single related entity
    pub fn related_one(&self, name: &str) -> Option<&Entity> {
        match self.relations.get(name)? {
            Related::One(one) => one.as_deref(),
            Related::Many(_) => None,
        }
    }

    /// Loaded related collection
    pub fn related_many(&self, name: &str) -> Option<&Collection> {
        match self.relations.get(name)? {
            Related::Many(many) => Some(many),
            Related::One(_) => None,
        }
    }

    /// Every loaded related entity under `name`, for nested loading
    pub(crate) fn related_entities_mut(&mut self, name: &str) -> Vec<&mut Entity> {
        match self.relations.get_mut(name) {
            Some(Related::One(Some(entity))) => vec![entity.as_mut()],
            Some(Related::Many(many)) => many.iter_mut().collect(),
            _ => Vec::new(),
        }
    }

    /// Builder for the related rows of this entity
    ///
    /// # Errors
    ///
    /// `UnknownRelation` when the model has no relation named `name`.
    pub fn related_query(&self, registry: &Arc<Registry>, name: &str) -> Result<Builder> {
        let relation = RelationHandler::new(registry, &self.def).query(Some(self), name, Mode::Real)?;
        Ok(Builder::from_query(registry, relation.related, relation.query)
            .with_extra_columns(relation.extra_columns))
    }

    // --- persistence ---

    fn query(&self) -> Query {
        Query::table(self.def.table())
    }

    fn key_or_err(&self) -> Result<Value> {
        self.key().cloned().ok_or_else(|| {
            LucidError::InvalidArgument(format!(
                "{} has no value for primary key {}",
                self.def.name(),
                self.def.primary_key()
            ))
        })
    }

    /// Insert the entity, or update its dirty attributes when it exists
    pub fn save(&mut self, conn: &dyn Connection) -> Result<()> {
        let now = Value::from(Local::now().naive_local().format(DATETIME_FORMAT).to_string());
        if self.exists {
            let mut changes = self.dirty();
            if changes.is_empty() {
                return Ok(());
            }
            if self.def.has_timestamps() {
                self.attributes.insert(UPDATED_AT.to_string(), now.clone());
                changes.insert(UPDATED_AT.to_string(), now);
            }
            let key = self.key_or_err()?;
            self.query()
                .where_eq(self.def.primary_key(), key)
                .update(conn, changes)?;
        } else {
            if self.def.has_timestamps() {
                if !self.attributes.contains_key(CREATED_AT) {
                    self.attributes.insert(CREATED_AT.to_string(), now.clone());
                }
                self.attributes.insert(UPDATED_AT.to_string(), now);
            }
            let result = self.query().insert(conn, self.attributes.clone())?;
            if self.key().is_none() {
                if let Some(id) = result.last_insert_id.or_else(|| conn.last_insert_id()) {
                    self.attributes
                        .insert(self.def.primary_key().to_string(), Value::from(id));
                }
            }
            self.exists = true;
        }
        self.original = self.attributes.clone();
        Ok(())
    }

    /// Delete by primary key; returns whether a row was removed
    pub fn delete(&mut self, conn: &dyn Connection) -> Result<bool> {
        let key = self.key_or_err()?;
        let affected = self
            .query()
            .where_eq(self.def.primary_key(), key)
            .delete(conn)?;
        self.exists = false;
        Ok(affected > 0)
    }

    /// Reload attributes from the database, dropping loaded relations
    pub fn refresh(&mut self, conn: &dyn Connection) -> Result<()> {
        let key = self.key_or_err()?;
        let row = self
            .query()
            .where_eq(self.def.primary_key(), key.clone())
            .first(conn)?
            .ok_or_else(|| {
                LucidError::NotFound(format!("{} with key {key:?}", self.def.name()))
            })?;
        self.absorb(row, &[]);
        self.relations.clear();
        Ok(())
    }

    // --- serialization ---

    /// JSON object of visible attributes (cast), loaded relations, and extras
    /// under `meta`
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        for (name, stored) in &self.attributes {
            if self.def.is_hidden(name) {
                continue;
            }
            let read = match self.def.cast_for(name) {
                Some(cast) => cast.cast(name, stored).unwrap_or_else(|err| {
                    log::warn!("serializing {name} uncast: {err}");
                    stored.clone()
                }),
                None => stored.clone(),
            };
            object.insert(name.clone(), value::to_json(&read));
        }
        for (name, related) in &self.relations {
            if !self.def.is_hidden(name) {
                object.insert(name.clone(), related.to_json());
            }
        }
        if !self.extras.is_empty() {
            let meta = self
                .extras
                .iter()
                .map(|(k, v)| (k.clone(), value::to_json(v)))
                .collect();
            object.insert("meta".to_string(), serde_json::Value::Object(meta));
        }
        serde_json::Value::Object(object)
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}
