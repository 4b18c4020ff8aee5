//! Model metadata.

use super::cast::{Cast, CastHandler};
use crate::relation::spec::RelationSpec;
use indexmap::IndexMap;
use std::sync::Arc;

/// Static description of one model: table, key, casts, hidden attributes and
/// named relations
///
/// Built fluently and handed to [`Registry::register`](super::Registry::register).
///
/// ```
/// use lucid::ModelDef;
///
/// let post = ModelDef::new("Post", "posts")
///     .cast("published", "boolean")
///     .hidden(["secret"])
///     .belongs_to("author", "User", "user_id")
///     .has_many("comments", "Comment", "post_id");
/// assert_eq!(post.primary_key(), "id");
/// assert!(post.relation_spec("comments").is_some());
/// ```
#[derive(Debug, Clone)]
pub struct ModelDef {
    name: String,
    table: String,
    primary_key: String,
    casts: IndexMap<String, Cast>,
    hidden: Vec<String>,
    timestamps: bool,
    relations: IndexMap<String, RelationSpec>,
}

impl ModelDef {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            primary_key: "id".to_string(),
            casts: IndexMap::new(),
            hidden: Vec::new(),
            timestamps: false,
            relations: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// `table.primary_key`
    pub fn qualified_key(&self) -> String {
        format!("{}.{}", self.table, self.primary_key)
    }

    /// Label stored in `{name}_type` columns for this model
    pub fn morph_label(&self) -> &str {
        &self.table
    }

    pub fn casts(&self) -> &IndexMap<String, Cast> {
        &self.casts
    }

    pub fn cast_for(&self, attribute: &str) -> Option<&Cast> {
        self.casts.get(attribute)
    }

    pub fn is_hidden(&self, attribute: &str) -> bool {
        self.hidden.iter().any(|h| h == attribute)
    }

    pub fn has_timestamps(&self) -> bool {
        self.timestamps
    }

    pub fn relation_spec(&self, name: &str) -> Option<&RelationSpec> {
        self.relations.get(name)
    }

    pub fn relation_names(&self) -> impl Iterator<Item = &str> {
        self.relations.keys().map(String::as_str)
    }

    pub fn primary_key_name(mut self, key: impl Into<String>) -> Self {
        self.primary_key = key.into();
        self
    }

    /// Cast `attribute` with a built-in type or a registered custom cast name
    pub fn cast(mut self, attribute: impl Into<String>, name: &str) -> Self {
        self.casts.insert(attribute.into(), Cast::parse(name));
        self
    }

    /// Cast `attribute` with a handler owned by this model
    pub fn cast_with(mut self, attribute: impl Into<String>, handler: Arc<dyn CastHandler>) -> Self {
        self.casts.insert(attribute.into(), Cast::Custom(handler));
        self
    }

    /// Attributes left out of serialization
    pub fn hidden<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hidden.extend(attributes.into_iter().map(Into::into));
        self
    }

    /// Maintain `created_at` / `updated_at` on save
    pub fn timestamps(mut self) -> Self {
        self.timestamps = true;
        self
    }

    pub fn relation(mut self, name: impl Into<String>, spec: RelationSpec) -> Self {
        self.relations.insert(name.into(), spec);
        self
    }

    pub fn has_one(self, name: &str, related: &str, foreign_key: &str) -> Self {
        self.relation(
            name,
            RelationSpec::HasOne {
                related: related.to_string(),
                foreign_key: foreign_key.to_string(),
                local_key: None,
            },
        )
    }

    pub fn has_many(self, name: &str, related: &str, foreign_key: &str) -> Self {
        self.relation(
            name,
            RelationSpec::HasMany {
                related: related.to_string(),
                foreign_key: foreign_key.to_string(),
                local_key: None,
            },
        )
    }

    pub fn belongs_to(self, name: &str, related: &str, foreign_key: &str) -> Self {
        self.relation(
            name,
            RelationSpec::BelongsTo {
                related: related.to_string(),
                foreign_key: foreign_key.to_string(),
                owner_key: None,
            },
        )
    }

    /// Many-to-many through `pivot_table`
    ///
    /// `foreign_pivot_key` points at this model, `related_pivot_key` at the
    /// related one.
    pub fn many_to_many(
        self,
        name: &str,
        related: &str,
        pivot_table: &str,
        foreign_pivot_key: &str,
        related_pivot_key: &str,
    ) -> Self {
        self.relation(
            name,
            RelationSpec::ManyToMany {
                related: related.to_string(),
                pivot_table: pivot_table.to_string(),
                foreign_pivot_key: foreign_pivot_key.to_string(),
                related_pivot_key: related_pivot_key.to_string(),
                parent_key: None,
                related_key: None,
                pivot_columns: Vec::new(),
            },
        )
    }

    pub fn has_one_through(
        self,
        name: &str,
        related: &str,
        through: &str,
        first_key: &str,
        second_key: &str,
    ) -> Self {
        self.relation(
            name,
            RelationSpec::HasOneThrough {
                related: related.to_string(),
                through: through.to_string(),
                first_key: first_key.to_string(),
                second_key: second_key.to_string(),
                local_key: None,
                second_local_key: None,
            },
        )
    }

    pub fn has_many_through(
        self,
        name: &str,
        related: &str,
        through: &str,
        first_key: &str,
        second_key: &str,
    ) -> Self {
        self.relation(
            name,
            RelationSpec::HasManyThrough {
                related: related.to_string(),
                through: through.to_string(),
                first_key: first_key.to_string(),
                second_key: second_key.to_string(),
                local_key: None,
                second_local_key: None,
            },
        )
    }

    pub fn morph_to(self, name: &str) -> Self {
        self.relation(
            name,
            RelationSpec::MorphTo {
                morph_name: name.to_string(),
            },
        )
    }

    pub fn morph_one(self, name: &str, related: &str, morph_name: &str) -> Self {
        self.relation(
            name,
            RelationSpec::MorphOne {
                related: related.to_string(),
                morph_name: morph_name.to_string(),
                local_key: None,
            },
        )
    }

    pub fn morph_many(self, name: &str, related: &str, morph_name: &str) -> Self {
        self.relation(
            name,
            RelationSpec::MorphMany {
                related: related.to_string(),
                morph_name: morph_name.to_string(),
                local_key: None,
            },
        )
    }

    pub fn morph_to_many(
        self,
        name: &str,
        related: &str,
        pivot_table: &str,
        morph_name: &str,
        related_pivot_key: &str,
    ) -> Self {
        self.relation(
            name,
            RelationSpec::MorphToMany {
                related: related.to_string(),
                pivot_table: pivot_table.to_string(),
                morph_name: morph_name.to_string(),
                related_pivot_key: related_pivot_key.to_string(),
                parent_key: None,
                related_key: None,
            },
        )
    }

    pub fn morphed_by_many(
        self,
        name: &str,
        related: &str,
        pivot_table: &str,
        morph_name: &str,
        foreign_pivot_key: &str,
    ) -> Self {
        self.relation(
            name,
            RelationSpec::MorphedByMany {
                related: related.to_string(),
                pivot_table: pivot_table.to_string(),
                morph_name: morph_name.to_string(),
                foreign_pivot_key: foreign_pivot_key.to_string(),
                parent_key: None,
                related_key: None,
            },
        )
    }

    /// Replace named casts with the handlers they resolve to
    pub(crate) fn resolve_casts(
        mut self,
        resolve: impl Fn(&Cast) -> crate::Result<Cast>,
    ) -> crate::Result<Self> {
        for cast in self.casts.values_mut() {
            *cast = resolve(cast)?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::spec::RelationKind;

    #[test]
    fn test_builder_records_relations_in_order() {
        let def = ModelDef::new("Post", "posts")
            .belongs_to("author", "User", "user_id")
            .morph_many("comments", "Comment", "commentable")
            .morph_to_many("tags", "Tag", "taggables", "taggable", "tag_id");
        let names: Vec<_> = def.relation_names().collect();
        assert_eq!(names, ["author", "comments", "tags"]);
        assert_eq!(
            def.relation_spec("tags").map(RelationSpec::kind),
            Some(RelationKind::MorphToMany)
        );
        assert_eq!(def.qualified_key(), "posts.id");
        assert_eq!(def.morph_label(), "posts");
    }

    #[test]
    fn test_casts_and_hidden() {
        let def = ModelDef::new("User", "users")
            .primary_key_name("uid")
            .cast("meta", "array")
            .cast("balance", "money")
            .hidden(["password"]);
        assert_eq!(def.primary_key(), "uid");
        assert!(matches!(def.cast_for("meta"), Some(Cast::Json)));
        assert!(matches!(def.cast_for("balance"), Some(Cast::Named(_))));
        assert!(def.is_hidden("password"));
        assert!(!def.is_hidden("email"));
    }
}
