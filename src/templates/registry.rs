//! # Template registry.
//!
//! Maps a template name to its [`InputSchema`] and its [`Render`] capability.
//! The registry is populated explicitly at process start (no code is ever loaded
//! by name) and shared with every execution unit, which only ever looks a
//! template up and calls it.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use serde_json::Value;

use crate::core::Renderer;

use super::schema::InputSchema;

/// Composes one image from validated input.
///
/// Runs on an execution unit thread; it may block. Returning `Err` reports a
/// template error for the task. Panicking takes the unit down.
pub trait Render: Send + Sync + 'static {
    fn render(&self, input: &Value) -> Result<Bytes, String>;
}

impl<F, B, E> Render for F
where
    F: Fn(&Value) -> Result<B, E> + Send + Sync + 'static,
    B: Into<Bytes>,
    E: fmt::Display,
{
    fn render(&self, input: &Value) -> Result<Bytes, String> {
        (self)(input).map(Into::into).map_err(|e| e.to_string())
    }
}

/// A registered template.
#[derive(Clone)]
pub struct Template {
    name: Arc<str>,
    schema: Arc<dyn InputSchema>,
    render: Arc<dyn Render>,
}

impl Template {
    pub fn new(
        name: impl Into<Arc<str>>,
        schema: impl InputSchema,
        render: impl Render,
    ) -> Self {
        Self {
            name: name.into(),
            schema: Arc::new(schema),
            render: Arc::new(render),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &dyn InputSchema {
        self.schema.as_ref()
    }

    pub fn renderer(&self) -> &dyn Render {
        self.render.as_ref()
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template").field("name", &self.name).finish()
    }
}

/// Thread-safe name → template map.
#[derive(Default)]
pub struct TemplateRegistry {
    templates: DashMap<Arc<str>, Template>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a template under its name.
    pub fn register(&self, template: Template) {
        self.templates.insert(template.name.clone(), template);
    }

    /// Registers several templates.
    pub fn register_all(&self, templates: impl IntoIterator<Item = Template>) {
        for t in templates {
            self.register(t);
        }
    }

    pub fn get(&self, name: &str) -> Option<Template> {
        self.templates.get(name).map(|t| t.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Sorted list of registered names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.templates.iter().map(|e| e.key().to_string()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl Renderer for TemplateRegistry {
    fn render(&self, template: &str, input: &Value) -> Result<Bytes, String> {
        let tpl = self
            .get(template)
            .ok_or_else(|| format!("template `{template}` is not registered"))?;
        tpl.renderer().render(input)
    }
}
