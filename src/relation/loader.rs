//! Batched eager loading of relations.
//!
//! This uses the "selectinload" strategy:
//! 1. Fetch the parent entities
//! 2. Collect the distinct parent keys for the relation
//! 3. Fetch every related row in one `WHERE relating IN (...)` query
//! 4. Group the related rows by key and attach them to their parents
//!
//! Loading `posts.comments` over N users therefore issues one query for
//! `posts` and one for `comments`, whatever N is. `morphTo` relations issue
//! one query per distinct type.
//!
//! A relation is skipped (not fetched) when any entity of the batch already
//! holds a non-null value for it; nested segments below it are still loaded.

use super::handler::{apply_constraint, Mode, RelationHandler, RelationQuery};
use super::spec::{morph_id_column, morph_type_column, RelationKind, RelationSpec};
use super::Constraint;
use crate::collection::Collection;
use crate::connection::Connection;
use crate::error::{LucidError, Result};
use crate::model::{Entity, Registry, Related};
use crate::query::{AggregateFn, Query};
use crate::value::{key_of, FromValue, Key};
use indexmap::IndexMap;
use sea_query::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

const COUNT_ALIAS: &str = "aggregate";

/// A relation path to load, optionally narrowed by a constraint
///
/// The constraint applies to the last segment of a dotted path.
///
/// ```
/// use lucid::relation::Preload;
/// use lucid::Op;
///
/// let plain: Preload = "posts.comments".into();
/// let recent = Preload::constrained("posts", |q| q.where_("views", Op::Gt, 100));
/// assert_eq!(plain.path(), "posts.comments");
/// assert_eq!(recent.path(), "posts");
/// ```
#[derive(Clone)]
pub struct Preload {
    path: String,
    constraint: Option<Constraint>,
}

impl Preload {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            constraint: None,
        }
    }

    pub fn constrained(
        path: impl Into<String>,
        constraint: impl Fn(Query) -> Query + Send + Sync + 'static,
    ) -> Self {
        Self {
            path: path.into(),
            constraint: Some(Arc::new(constraint)),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('.')
    }

    pub fn constraint(&self) -> Option<&Constraint> {
        self.constraint.as_ref()
    }
}

impl fmt::Debug for Preload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Preload")
            .field("path", &self.path)
            .field("constrained", &self.constraint.is_some())
            .finish()
    }
}

impl From<&str> for Preload {
    fn from(path: &str) -> Self {
        Preload::new(path)
    }
}

impl From<String> for Preload {
    fn from(path: String) -> Self {
        Preload::new(path)
    }
}

/// Runs preloads over a batch of entities on one connection
pub struct RelationLoader<'a> {
    registry: &'a Registry,
    conn: &'a dyn Connection,
}

impl<'a> RelationLoader<'a> {
    pub fn new(registry: &'a Registry, conn: &'a dyn Connection) -> Self {
        Self { registry, conn }
    }

    /// Load every preload, in order, into `entities`
    pub fn load(&self, entities: &mut [Entity], preloads: &[Preload]) -> Result<()> {
        if entities.is_empty() {
            return Ok(());
        }
        for preload in preloads {
            let segments: Vec<&str> = preload.segments().collect();
            let parents: Vec<&mut Entity> = entities.iter_mut().collect();
            self.load_path(parents, &segments, preload.constraint())?;
        }
        Ok(())
    }

    /// Set `<relation>_count` on every entity for each hasMany preload
    pub fn load_counts(&self, entities: &mut [Entity], preloads: &[Preload]) -> Result<()> {
        let Some(first) = entities.first() else {
            return Ok(());
        };
        let def = Arc::clone(first.def());
        let handler = RelationHandler::new(self.registry, &def);
        for preload in preloads {
            let name = preload.path();
            let relation = handler.query(None, name, Mode::Eager)?;
            if relation.kind != RelationKind::HasMany {
                return Err(LucidError::Unsupported(format!(
                    "counting {:?} relation {name}",
                    relation.kind
                )));
            }
            let keys = collect_keys(entities.iter(), &relation.parent_key);
            let mut counts: HashMap<Key, i64> = HashMap::new();
            if !keys.is_empty() {
                let query = constrain(relation.query, preload.constraint())
                    .clear_select()
                    .select([relation.relating_column.as_str()])
                    .select_aggregate(AggregateFn::Count, None, COUNT_ALIAS)
                    .where_in(&relation.relating_column, keys)
                    .group_by([relation.relating_column.as_str()]);
                for row in query.all(self.conn)? {
                    let key = row.get_index(0).and_then(key_of);
                    let count = row.get_as::<i64>(COUNT_ALIAS);
                    if let (Some(key), Some(count)) = (key, count) {
                        counts.insert(key, count);
                    }
                }
            }
            let attribute = format!("{name}_count");
            for entity in entities.iter_mut() {
                let count = entity
                    .raw(&relation.parent_key)
                    .and_then(key_of)
                    .and_then(|k| counts.get(&k).copied())
                    .unwrap_or(0);
                entity.set_extra(attribute.clone(), Value::from(count));
            }
        }
        Ok(())
    }

    fn load_path(
        &self,
        parents: Vec<&mut Entity>,
        segments: &[&str],
        constraint: Option<&Constraint>,
    ) -> Result<()> {
        let Some((name, rest)) = segments.split_first() else {
            return Ok(());
        };

        // After a morphTo the batch can mix models
        let mut by_model: IndexMap<String, Vec<&mut Entity>> = IndexMap::new();
        for parent in parents {
            by_model
                .entry(parent.model_name().to_string())
                .or_default()
                .push(parent);
        }

        let segment_constraint = if rest.is_empty() { constraint } else { None };
        for (_, mut group) in by_model {
            self.load_segment(&mut group, name, segment_constraint)?;
            if !rest.is_empty() {
                let children: Vec<&mut Entity> = group
                    .iter_mut()
                    .flat_map(|p| p.related_entities_mut(name))
                    .collect();
                if !children.is_empty() {
                    self.load_path(children, rest, constraint)?;
                }
            }
        }
        Ok(())
    }

    fn load_segment(
        &self,
        parents: &mut [&mut Entity],
        name: &str,
        constraint: Option<&Constraint>,
    ) -> Result<()> {
        let Some(first) = parents.first() else {
            return Ok(());
        };
        let def = Arc::clone(first.def());
        let handler = RelationHandler::new(self.registry, &def);
        let spec = handler.spec(name)?;

        let loaded = parents.iter().all(|p| p.relation_loaded(name));
        if loaded || parents.iter().any(|p| p.has_value(name)) {
            log::trace!("{}.{name} already present, not fetching", def.name());
            return Ok(());
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::eager_load_span(def.name(), name).entered();

        if let RelationSpec::MorphTo { morph_name } = spec {
            return self.load_morph_to(parents, &handler, name, morph_name, constraint);
        }

        let relation = handler.query(None, name, Mode::Eager)?;
        let keys = collect_keys(parents.iter().map(|p| &**p), &relation.parent_key);
        let children = if keys.is_empty() {
            log::trace!("{}.{name}: no keys, nothing to fetch", def.name());
            Vec::new()
        } else {
            self.fetch(&relation, constraint, keys)?
        };

        let mut index: HashMap<Key, Vec<Entity>> = HashMap::new();
        for child in children {
            if let Some(key) = child.raw(&relation.child_key).and_then(key_of) {
                index.entry(key).or_default().push(child);
            }
        }

        let many = relation.kind.is_many();
        for parent in parents.iter_mut() {
            let matched = parent
                .raw(&relation.parent_key)
                .and_then(key_of)
                .and_then(|k| index.get(&k));
            let related = if many {
                Related::Many(Collection::from(matched.cloned().unwrap_or_default()))
            } else {
                Related::One(matched.and_then(|m| m.first()).cloned().map(Box::new))
            };
            parent.set_relation(name, related);
        }
        Ok(())
    }

    fn load_morph_to(
        &self,
        parents: &mut [&mut Entity],
        handler: &RelationHandler<'_>,
        name: &str,
        morph_name: &str,
        constraint: Option<&Constraint>,
    ) -> Result<()> {
        let type_column = morph_type_column(morph_name);
        let id_column = morph_id_column(morph_name);

        let mut ids_by_label: IndexMap<String, IndexMap<Key, Value>> = IndexMap::new();
        for parent in parents.iter() {
            let label = parent.raw(&type_column).and_then(String::from_value);
            let id = parent.raw(&id_column);
            if let (Some(label), Some(id)) = (label, id) {
                if let Some(key) = key_of(id) {
                    ids_by_label
                        .entry(label)
                        .or_default()
                        .insert(key, id.clone());
                }
            }
        }

        let mut found: HashMap<(String, Key), Entity> = HashMap::new();
        for (label, ids) in ids_by_label {
            let relation = handler.morph_to_query(morph_name, &label)?;
            let children = self.fetch(&relation, constraint, ids.into_values().collect())?;
            for child in children {
                if let Some(key) = child.raw(&relation.child_key).and_then(key_of) {
                    found.insert((label.clone(), key), child);
                }
            }
        }

        for parent in parents.iter_mut() {
            let label = parent.raw(&type_column).and_then(String::from_value);
            let key = parent.raw(&id_column).and_then(key_of);
            let child = match (label, key) {
                (Some(label), Some(key)) => found.get(&(label, key)).cloned(),
                _ => None,
            };
            parent.set_relation(name, Related::One(child.map(Box::new)));
        }
        Ok(())
    }

    fn fetch(
        &self,
        relation: &RelationQuery,
        constraint: Option<&Constraint>,
        keys: Vec<Value>,
    ) -> Result<Vec<Entity>> {
        let rows = constrain(relation.query.clone(), constraint)
            .where_in(&relation.relating_column, keys)
            .all(self.conn)?;
        log::trace!("fetched {} {} rows", rows.len(), relation.related.name());
        Ok(rows
            .into_iter()
            .map(|row| {
                Entity::hydrate_with_extras(Arc::clone(&relation.related), row, &relation.extra_columns)
            })
            .collect())
    }
}

fn constrain(query: Query, constraint: Option<&Constraint>) -> Query {
    match constraint {
        Some(constraint) => apply_constraint(query, &**constraint),
        None => query,
    }
}

/// Distinct non-null values of `attribute`, in first-seen order
fn collect_keys<'e>(entities: impl Iterator<Item = &'e Entity>, attribute: &str) -> Vec<Value> {
    let mut keys: IndexMap<Key, Value> = IndexMap::new();
    for entity in entities {
        if let Some(value) = entity.raw(attribute) {
            if let Some(key) = key_of(value) {
                keys.entry(key).or_insert_with(|| value.clone());
            }
        }
    }
    keys.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::mock::MockConnection;
    use crate::connection::Row;
    use crate::model::ModelDef;
    use crate::query::Op;

    fn registry() -> Registry {
        Registry::new()
            .register(
                ModelDef::new("User", "users")
                    .has_many("posts", "Post", "user_id")
                    .has_one("profile", "Profile", "user_id"),
            )
            .unwrap()
            .register(
                ModelDef::new("Post", "posts")
                    .belongs_to("author", "User", "user_id")
                    .has_many("comments", "Comment", "post_id"),
            )
            .unwrap()
            .register(ModelDef::new("Comment", "comments").morph_to("commentable"))
            .unwrap()
            .register(ModelDef::new("Profile", "profiles"))
            .unwrap()
    }

    fn row(fields: Vec<(&str, Value)>) -> Row {
        fields.into_iter().collect()
    }

    fn users(registry: &Registry, ids: &[i64]) -> Vec<Entity> {
        let def = registry.model("User").unwrap();
        ids.iter()
            .map(|id| Entity::hydrate(Arc::clone(&def), row(vec![("id", Value::from(*id))])))
            .collect()
    }

    fn post(id: i64, user_id: i64) -> Row {
        row(vec![("id", Value::from(id)), ("user_id", Value::from(user_id))])
    }

    #[test]
    fn test_has_many_one_query_for_the_batch() {
        let registry = registry();
        let mut users = users(&registry, &[1, 2, 3, 2]);
        let conn = MockConnection::new().append_rows(vec![post(10, 1), post(11, 1), post(12, 3)]);

        RelationLoader::new(&registry, &conn)
            .load(&mut users, &["posts".into()])
            .unwrap();

        assert_eq!(conn.select_count(), 1);
        let (sql, bindings) = conn.log().remove(0);
        assert_eq!(sql, "SELECT * FROM `posts` WHERE `posts`.`user_id` IN (?, ?, ?)");
        assert_eq!(bindings, vec![Value::from(1i64), Value::from(2i64), Value::from(3i64)]);

        assert_eq!(users[0].related_many("posts").unwrap().len(), 2);
        assert!(users[1].related_many("posts").unwrap().is_empty());
        assert_eq!(users[2].related_many("posts").unwrap().len(), 1);
        assert!(users[3].relation_loaded("posts"));
    }

    #[test]
    fn test_has_one_and_missing_children() {
        let registry = registry();
        let mut users = users(&registry, &[1, 2]);
        let profile = row(vec![("id", Value::from(5i64)), ("user_id", Value::from(2i64))]);
        let conn = MockConnection::new().append_rows(vec![profile]);

        RelationLoader::new(&registry, &conn)
            .load(&mut users, &["profile".into()])
            .unwrap();
        assert!(users[0].related_one("profile").is_none());
        assert!(users[0].relation_loaded("profile"));
        assert_eq!(
            users[1].related_one("profile").unwrap().key(),
            Some(&Value::from(5i64))
        );
    }

    #[test]
    fn test_nested_path_and_constraint_on_last_segment() {
        let registry = registry();
        let mut users = users(&registry, &[1]);
        let comment = row(vec![("id", Value::from(100i64)), ("post_id", Value::from(10i64))]);
        let conn = MockConnection::new()
            .append_rows(vec![post(10, 1)])
            .append_rows(vec![comment]);

        let preload = Preload::constrained("posts.comments", |q| q.where_("approved", Op::Eq, 1));
        RelationLoader::new(&registry, &conn)
            .load(&mut users, &[preload])
            .unwrap();

        assert_eq!(
            conn.statements(),
            [
                "SELECT * FROM `posts` WHERE `posts`.`user_id` IN (?)",
                "SELECT * FROM `comments` WHERE `approved` = ? AND `comments`.`post_id` IN (?)",
            ]
        );
        let posts = users[0].related_many("posts").unwrap();
        let comments = posts.first().unwrap().related_many("comments").unwrap();
        assert_eq!(comments.len(), 1);
    }

    #[test]
    fn test_present_relation_is_skipped() {
        let registry = registry();
        let mut users = users(&registry, &[1, 2]);
        users[0].set_relation("posts", Related::Many(Collection::default()));
        let conn = MockConnection::new();

        RelationLoader::new(&registry, &conn)
            .load(&mut users, &["posts".into()])
            .unwrap();
        assert_eq!(conn.select_count(), 0);
        assert!(!users[1].relation_loaded("posts"));
    }

    #[test]
    fn test_null_relation_is_not_queried_again() {
        let registry = registry();
        let mut users = users(&registry, &[1, 2]);
        let conn = MockConnection::new().append_rows(Vec::new());
        let loader = RelationLoader::new(&registry, &conn);

        loader.load(&mut users, &["profile".into()]).unwrap();
        loader.load(&mut users, &["profile".into()]).unwrap();

        assert_eq!(conn.select_count(), 1);
        assert!(users.iter().all(|u| u.relation_loaded("profile")));
        assert!(users.iter().all(|u| u.related_one("profile").is_none()));
    }

    #[test]
    fn test_no_keys_no_query() {
        let registry = registry();
        let def = registry.model("Post").unwrap();
        let mut posts = vec![Entity::hydrate(def, row(vec![("id", Value::from(1i64))]))];
        let conn = MockConnection::new();

        RelationLoader::new(&registry, &conn)
            .load(&mut posts, &["author".into()])
            .unwrap();
        assert_eq!(conn.select_count(), 0);
        assert!(posts[0].relation_loaded("author"));
        assert!(posts[0].related_one("author").is_none());
    }

    #[test]
    fn test_morph_to_one_query_per_type() {
        let registry = registry();
        let def = registry.model("Comment").unwrap();
        let comment = |id: i64, kind: &str, target: i64| {
            Entity::hydrate(
                Arc::clone(&def),
                row(vec![
                    ("id", Value::from(id)),
                    ("commentable_type", Value::from(kind)),
                    ("commentable_id", Value::from(target)),
                ]),
            )
        };
        let mut comments = vec![comment(1, "posts", 10), comment(2, "users", 7), comment(3, "posts", 10)];
        let conn = MockConnection::new()
            .append_rows(vec![post(10, 7)])
            .append_rows(vec![row(vec![("id", Value::from(7i64))])]);

        RelationLoader::new(&registry, &conn)
            .load(&mut comments, &["commentable".into()])
            .unwrap();

        assert_eq!(
            conn.statements(),
            [
                "SELECT * FROM `posts` WHERE `posts`.`id` IN (?)",
                "SELECT * FROM `users` WHERE `users`.`id` IN (?)",
            ]
        );
        assert_eq!(comments[0].related_one("commentable").unwrap().model_name(), "Post");
        assert_eq!(comments[1].related_one("commentable").unwrap().model_name(), "User");
        assert_eq!(comments[2].related_one("commentable").unwrap().model_name(), "Post");
    }

    #[test]
    fn test_counts_default_to_zero() {
        let registry = registry();
        let mut users = users(&registry, &[1, 2]);
        let conn = MockConnection::new().append_rows(vec![row(vec![
            ("user_id", Value::from(1i64)),
            ("aggregate", Value::from(3i64)),
        ])]);

        RelationLoader::new(&registry, &conn)
            .load_counts(&mut users, &["posts".into()])
            .unwrap();
        assert_eq!(
            conn.statements(),
            ["SELECT `posts`.`user_id`, COUNT(*) AS `aggregate` FROM `posts` \
              WHERE `posts`.`user_id` IN (?, ?) GROUP BY `posts`.`user_id`"]
        );
        assert_eq!(users[0].extra("posts_count"), Some(&Value::from(3i64)));
        assert_eq!(users[1].extra("posts_count"), Some(&Value::from(0i64)));

        let err = RelationLoader::new(&registry, &conn)
            .load_counts(&mut users, &["profile".into()])
            .unwrap_err();
        assert!(matches!(err, LucidError::Unsupported(_)));
    }

    #[test]
    fn test_unknown_relation_fails() {
        let registry = registry();
        let mut users = users(&registry, &[1]);
        let conn = MockConnection::new();
        let err = RelationLoader::new(&registry, &conn)
            .load(&mut users, &["friends".into()])
            .unwrap_err();
        assert!(matches!(err, LucidError::UnknownRelation { .. }));
    }
}
