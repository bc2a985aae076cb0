//! # Templates: named render capabilities with input schemas.
//!
//! - [`TemplateRegistry`] explicit name → [`Template`] map, shared with the units
//! - [`Render`] the composition capability (opaque to the pool)
//! - [`InputSchema`], [`ObjectSchema`], [`FieldKind`] input validation

mod registry;
mod schema;

pub use registry::{Render, Template, TemplateRegistry};
pub use schema::{FieldKind, InputSchema, ObjectSchema};
