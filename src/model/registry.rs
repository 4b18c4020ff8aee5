//! Model registry.
//!
//! Holds every [`ModelDef`] by name, the morph map used to resolve `{name}_type`
//! labels, and the named custom casts. Registration validates casts, so a model
//! that references an unknown cast never becomes visible.

use super::cast::{CastHandler, CastRegistry};
use super::def::ModelDef;
use crate::error::{LucidError, Result};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct Registry {
    models: IndexMap<String, Arc<ModelDef>>,
    morph_map: HashMap<String, String>,
    casts: CastRegistry,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named custom cast; must come before models using it
    pub fn with_cast(mut self, name: impl Into<String>, handler: Arc<dyn CastHandler>) -> Self {
        self.casts.register(name, handler);
        self
    }

    /// Register a model
    ///
    /// # Errors
    ///
    /// `UnknownCast` when a cast name is neither built in nor registered.
    pub fn register(mut self, def: ModelDef) -> Result<Self> {
        let def = def.resolve_casts(|cast| self.casts.resolve(cast))?;
        log::debug!("registered model {} on table {}", def.name(), def.table());
        self.morph_map
            .insert(def.morph_label().to_string(), def.name().to_string());
        self.models.insert(def.name().to_string(), Arc::new(def));
        Ok(self)
    }

    /// Map an extra morph label onto a model
    pub fn morph_alias(mut self, label: impl Into<String>, model: impl Into<String>) -> Self {
        self.morph_map.insert(label.into(), model.into());
        self
    }

    pub fn model(&self, name: &str) -> Result<Arc<ModelDef>> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| LucidError::UnknownModel(name.to_string()))
    }

    /// Model for a `{name}_type` discriminator value
    pub fn model_for_morph(&self, label: &str) -> Result<Arc<ModelDef>> {
        let name = self
            .morph_map
            .get(label)
            .ok_or_else(|| LucidError::UnknownModel(label.to_string()))?;
        self.model(name)
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}
