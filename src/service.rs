//! # RenderService: the facade in front of the pool.
//!
//! Owns the [`TemplateRegistry`] and the [`RenderPool`] that renders with it.
//! Input is validated against the template's schema before anything reaches
//! the pool, so invalid input never consumes a unit slot.
//!
//! ```text
//! render(name, input)
//!     ├─► registry.get(name)          ──► TemplateNotFound
//!     ├─► schema.validate(input)      ──► InvalidInput
//!     ├─► pool running? (auto-init)   ──► Pool(..)
//!     └─► pool.render(name, input)    ──► Render(QueueFull | Template | Timeout | ...)
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use rendervisor::{FieldKind, ObjectSchema, RenderService, ServiceConfig};
//! use serde_json::{Value, json};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), rendervisor::ServiceError> {
//!     let service = RenderService::new(ServiceConfig::default());
//!     service.register_template(
//!         "greeting",
//!         ObjectSchema::new().required("name", FieldKind::String),
//!         |input: &Value| -> Result<Vec<u8>, String> {
//!             Ok(format!("hello {}", input["name"]).into_bytes())
//!         },
//!     );
//!
//!     let bytes = service.render("greeting", json!({"name": "ada"})).await?;
//!     assert!(!bytes.is_empty());
//!     service.shutdown().await
//! }
//! ```

use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;

use crate::config::ServiceConfig;
use crate::core::{PoolStats, RenderPool, RenderPoolBuilder};
use crate::error::{PoolError, RenderError, ServiceError};
use crate::subscribers::{Subscribe, panic_message};
use crate::templates::{InputSchema, Render, Template, TemplateRegistry};

/// Template registration, validation and pooled rendering.
pub struct RenderService {
    cfg: ServiceConfig,
    registry: Arc<TemplateRegistry>,
    pool: Arc<RenderPool>,
}

impl RenderService {
    /// Creates a service with an empty registry and a stopped pool.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(cfg: ServiceConfig) -> Self {
        Self::with_subscribers(cfg, Vec::new())
    }

    /// Same as [`new`](Self::new), with extra event subscribers on the pool.
    pub fn with_subscribers(cfg: ServiceConfig, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        let registry = Arc::new(TemplateRegistry::new());
        let pool = RenderPoolBuilder::new(cfg.pool.clone(), registry.clone())
            .with_subscribers(subscribers)
            .build();
        Self {
            cfg,
            registry,
            pool,
        }
    }

    /// Registers (or replaces) a template. Visible to running units immediately.
    pub fn register_template(
        &self,
        name: impl Into<Arc<str>>,
        schema: impl InputSchema,
        render: impl Render,
    ) {
        self.registry.register(Template::new(name, schema, render));
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    /// Sorted names of registered templates.
    pub fn templates(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn registry(&self) -> &Arc<TemplateRegistry> {
        &self.registry
    }

    pub fn pool(&self) -> &Arc<RenderPool> {
        &self.pool
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.cfg
    }

    /// Starts the pool. No-op if it is already running.
    pub async fn initialize(&self) -> Result<(), ServiceError> {
        self.pool.initialize().await?;
        Ok(())
    }

    /// Validates `input` and renders it on the pool.
    ///
    /// Starts the pool first when it is stopped and `auto_initialize` is set.
    pub async fn render(&self, name: &str, input: Value) -> Result<Bytes, ServiceError> {
        let template = self.validated(name, &input)?;

        if !self.pool.is_running() {
            if !self.cfg.auto_initialize {
                return Err(PoolError::Closed.into());
            }
            self.pool.initialize().await?;
        }

        Ok(self.pool.render(template.name(), input).await?)
    }

    /// Validates `input` and renders it on a blocking thread, bypassing the pool.
    ///
    /// No queueing, timeout or unit supervision applies.
    pub async fn render_direct(&self, name: &str, input: Value) -> Result<Bytes, ServiceError> {
        let template = self.validated(name, &input)?;

        let joined =
            tokio::task::spawn_blocking(move || template.renderer().render(&input)).await;
        match joined {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(message)) => Err(RenderError::Template { message }.into()),
            Err(e) => {
                let reason = if e.is_panic() {
                    panic_message(&*e.into_panic())
                } else {
                    e.to_string()
                };
                Err(RenderError::WorkerCrash { reason }.into())
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Drains and stops the pool.
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        self.pool.shutdown().await?;
        Ok(())
    }

    /// Drains and stops the pool, giving up after the configured grace period.
    pub async fn shutdown_with_grace(&self) -> Result<(), ServiceError> {
        self.pool.shutdown_with_grace(self.cfg.grace).await?;
        Ok(())
    }

    fn validated(&self, name: &str, input: &Value) -> Result<Template, ServiceError> {
        let template = self
            .registry
            .get(name)
            .ok_or_else(|| ServiceError::TemplateNotFound {
                name: name.to_string(),
            })?;
        template
            .schema()
            .validate(input)
            .map_err(|source| ServiceError::InvalidInput {
                name: name.to_string(),
                source,
            })?;
        Ok(template)
    }
}
