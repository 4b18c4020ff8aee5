//! Models: metadata, registry, casts and runtime entities.
//!
//! A model is described once by a [`ModelDef`] (table, primary key, casts,
//! hidden attributes, named relations) and registered in a [`Registry`].
//! Rows fetched through a [`Builder`](crate::Builder) hydrate into
//! [`Entity`] values bound to that metadata.

pub mod cast;
pub mod def;
pub mod entity;
pub mod registry;

pub use cast::{Cast, CastHandler, CastRegistry};
pub use def::ModelDef;
pub use entity::{Entity, Related};
pub use registry::Registry;
