//! Ordered entity container returned by builder queries.

use crate::model::Entity;
use crate::value::{self, same_key, Record};
use sea_query::Value;
use serde::{Serialize, Serializer};

/// Entities in query order
///
/// Read helpers never mutate the receiver; [`Collection::filter`] returns a
/// new collection.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    items: Vec<Entity>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first(&self) -> Option<&Entity> {
        self.items.first()
    }

    pub fn get(&self, index: usize) -> Option<&Entity> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Entity> {
        self.items.iter_mut()
    }

    pub fn push(&mut self, entity: Entity) {
        self.items.push(entity);
    }

    pub fn as_mut_slice(&mut self) -> &mut [Entity] {
        &mut self.items
    }

    pub fn into_vec(self) -> Vec<Entity> {
        self.items
    }

    /// Primary key of every entity that has one
    pub fn ids(&self) -> Vec<Value> {
        self.items.iter().filter_map(|e| e.key().cloned()).collect()
    }

    /// Stored value of `name` (attribute or extra) on every entity, NULL when
    /// missing
    pub fn column(&self, name: &str) -> Vec<Value> {
        self.items
            .iter()
            .map(|e| e.raw(name).cloned().unwrap_or_else(value::null))
            .collect()
    }

    /// Loaded related entities of every item under `name`, flattened
    pub fn related(&self, name: &str) -> Collection {
        let mut related = Collection::new();
        for entity in &self.items {
            if let Some(one) = entity.related_one(name) {
                related.push(one.clone());
            } else if let Some(many) = entity.related_many(name) {
                related.items.extend(many.iter().cloned());
            }
        }
        related
    }

    /// Entity whose primary key matches `key`
    pub fn find(&self, key: impl Into<Value>) -> Option<&Entity> {
        let key = key.into();
        self.items
            .iter()
            .find(|e| e.key().is_some_and(|k| same_key(k, &key)))
    }

    pub fn filter(&self, mut predicate: impl FnMut(&Entity) -> bool) -> Collection {
        self.items.iter().filter(|e| predicate(*e)).cloned().collect()
    }

    /// Whether any entity holds a non-null attribute or a present relation
    /// under `name`
    pub fn any(&self, name: &str) -> bool {
        self.items.iter().any(|e| e.has_value(name))
    }

    /// First entity whose stored attributes equal every entry of `criteria`
    pub fn first_where(&self, criteria: &Record) -> Option<&Entity> {
        self.items.iter().find(|e| {
            criteria.iter().all(|(name, expected)| {
                e.raw(name)
                    .is_some_and(|actual| actual == expected || same_key(actual, expected))
            })
        })
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.items.iter().map(Entity::to_json).collect())
    }
}

impl From<Vec<Entity>> for Collection {
    fn from(items: Vec<Entity>) -> Self {
        Self { items }
    }
}

impl FromIterator<Entity> for Collection {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Collection {
    type Item = Entity;
    type IntoIter = std::vec::IntoIter<Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl Serialize for Collection {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Row;
    use crate::model::{ModelDef, Related};
    use crate::record;
    use std::sync::Arc;

    fn collection() -> Collection {
        let def = Arc::new(ModelDef::new("Product", "products"));
        let rows: Vec<Row> = vec![
            [("id", Value::from(1i64)), ("color", Value::from("#000"))]
                .into_iter()
                .collect(),
            [("id", Value::from(2i64)), ("color", Value::from("#FFF"))]
                .into_iter()
                .collect(),
            [("id", Value::from(3i64)), ("color", value::null())]
                .into_iter()
                .collect(),
        ];
        rows.into_iter()
            .map(|row| Entity::hydrate(Arc::clone(&def), row))
            .collect()
    }

    #[test]
    fn test_lookup_helpers() {
        let products = collection();
        assert_eq!(products.len(), 3);
        assert_eq!(
            products.ids(),
            vec![Value::from(1i64), Value::from(2i64), Value::from(3i64)]
        );
        assert_eq!(products.find(2i32).unwrap().raw("color"), Some(&Value::from("#FFF")));
        assert!(products.find(9i64).is_none());
        assert_eq!(products.column("color")[0], Value::from("#000"));
        assert!(value::is_null(&products.column("missing")[1]));

        let white = products.first_where(&record! { "color" => "#FFF" }).unwrap();
        assert_eq!(white.key(), Some(&Value::from(2i64)));
        assert!(products.first_where(&record! { "color" => "#F00" }).is_none());
    }

    #[test]
    fn test_filter_and_any_leave_receiver_intact() {
        let mut products = collection();
        let colored = products.filter(|e| e.has_value("color"));
        assert_eq!(colored.len(), 2);
        assert_eq!(products.len(), 3);
        assert!(products.any("color"));
        assert!(!products.any("variants"));

        let variant = products.get(0).cloned().unwrap();
        products.as_mut_slice()[2].set_relation("variants", Related::Many(Collection::new()));
        assert!(products.any("variants"));
        products.as_mut_slice()[1]
            .set_relation("variants", Related::Many(Collection::from(vec![variant])));
        assert_eq!(products.related("variants").len(), 1);
    }

    #[test]
    fn test_serializes_as_array() {
        let products = collection();
        let json = serde_json::to_value(&products).unwrap();
        assert_eq!(json[1], serde_json::json!({"id": 2, "color": "#FFF"}));
        assert_eq!(json.as_array().unwrap().len(), 3);
    }
}
