//! Relation declarations.
//!
//! A [`RelationSpec`] is the key material of one named relation on a model.
//! Keys left as `None` default to the primary key of the model they live on.

/// Type of relationship between entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// One-to-one, foreign key on the related table
    HasOne,
    /// One-to-many, foreign key on the related table
    HasMany,
    /// Many-to-one, foreign key on this table
    BelongsTo,
    /// Many-to-many through a pivot table
    ManyToMany,
    /// One-to-one reached through an intermediate model
    HasOneThrough,
    /// One-to-many reached through an intermediate model
    HasManyThrough,
    /// Inverse polymorphic: `{name}_type` picks the related model
    MorphTo,
    /// Polymorphic one-to-one
    MorphOne,
    /// Polymorphic one-to-many
    MorphMany,
    /// Polymorphic many-to-many, this model is the morph side of the pivot
    MorphToMany,
    /// Inverse of `MorphToMany`
    MorphedByMany,
}

impl RelationKind {
    /// Whether the relation yields a collection
    pub fn is_many(self) -> bool {
        matches!(
            self,
            RelationKind::HasMany
                | RelationKind::ManyToMany
                | RelationKind::HasManyThrough
                | RelationKind::MorphMany
                | RelationKind::MorphToMany
                | RelationKind::MorphedByMany
        )
    }

    /// Whether the relation goes through a pivot table
    pub fn is_pivot(self) -> bool {
        matches!(
            self,
            RelationKind::ManyToMany | RelationKind::MorphToMany | RelationKind::MorphedByMany
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelationSpec {
    HasOne {
        related: String,
        foreign_key: String,
        local_key: Option<String>,
    },
    HasMany {
        related: String,
        foreign_key: String,
        local_key: Option<String>,
    },
    BelongsTo {
        related: String,
        foreign_key: String,
        owner_key: Option<String>,
    },
    ManyToMany {
        related: String,
        pivot_table: String,
        /// Pivot column pointing at this model
        foreign_pivot_key: String,
        /// Pivot column pointing at the related model
        related_pivot_key: String,
        parent_key: Option<String>,
        related_key: Option<String>,
        /// Extra pivot columns hydrated as `pivot_<col>`
        pivot_columns: Vec<String>,
    },
    HasOneThrough {
        related: String,
        through: String,
        /// Column on the through table pointing at this model
        first_key: String,
        /// Column on the related table pointing at the through model
        second_key: String,
        local_key: Option<String>,
        second_local_key: Option<String>,
    },
    HasManyThrough {
        related: String,
        through: String,
        first_key: String,
        second_key: String,
        local_key: Option<String>,
        second_local_key: Option<String>,
    },
    MorphTo {
        morph_name: String,
    },
    MorphOne {
        related: String,
        morph_name: String,
        local_key: Option<String>,
    },
    MorphMany {
        related: String,
        morph_name: String,
        local_key: Option<String>,
    },
    MorphToMany {
        related: String,
        pivot_table: String,
        morph_name: String,
        related_pivot_key: String,
        parent_key: Option<String>,
        related_key: Option<String>,
    },
    MorphedByMany {
        related: String,
        pivot_table: String,
        morph_name: String,
        foreign_pivot_key: String,
        parent_key: Option<String>,
        related_key: Option<String>,
    },
}

impl RelationSpec {
    pub fn kind(&self) -> RelationKind {
        match self {
            RelationSpec::HasOne { .. } => RelationKind::HasOne,
            RelationSpec::HasMany { .. } => RelationKind::HasMany,
            RelationSpec::BelongsTo { .. } => RelationKind::BelongsTo,
            RelationSpec::ManyToMany { .. } => RelationKind::ManyToMany,
            RelationSpec::HasOneThrough { .. } => RelationKind::HasOneThrough,
            RelationSpec::HasManyThrough { .. } => RelationKind::HasManyThrough,
            RelationSpec::MorphTo { .. } => RelationKind::MorphTo,
            RelationSpec::MorphOne { .. } => RelationKind::MorphOne,
            RelationSpec::MorphMany { .. } => RelationKind::MorphMany,
            RelationSpec::MorphToMany { .. } => RelationKind::MorphToMany,
            RelationSpec::MorphedByMany { .. } => RelationKind::MorphedByMany,
        }
    }

    /// Related model name, `None` for `MorphTo` (decided per row)
    pub fn related(&self) -> Option<&str> {
        match self {
            RelationSpec::HasOne { related, .. }
            | RelationSpec::HasMany { related, .. }
            | RelationSpec::BelongsTo { related, .. }
            | RelationSpec::ManyToMany { related, .. }
            | RelationSpec::HasOneThrough { related, .. }
            | RelationSpec::HasManyThrough { related, .. }
            | RelationSpec::MorphOne { related, .. }
            | RelationSpec::MorphMany { related, .. }
            | RelationSpec::MorphToMany { related, .. }
            | RelationSpec::MorphedByMany { related, .. } => Some(related),
            RelationSpec::MorphTo { .. } => None,
        }
    }
}

/// `{name}_id`
pub fn morph_id_column(morph_name: &str) -> String {
    format!("{morph_name}_id")
}

/// `{name}_type`
pub fn morph_type_column(morph_name: &str) -> String {
    format!("{morph_name}_type")
}
