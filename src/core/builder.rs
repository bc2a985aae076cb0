use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;

use crate::{
    config::PoolConfig,
    events::Bus,
    subscribers::{LogWriter, Subscribe, SubscriberSet},
    tasks::IdGenerator,
};

use super::{pool::RenderPool, unit::Renderer};

/// Builder for constructing a [`RenderPool`] with optional features.
pub struct RenderPoolBuilder {
    cfg: PoolConfig,
    renderer: Arc<dyn Renderer>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    node_id: u16,
    log_writer: bool,
}

impl RenderPoolBuilder {
    /// Creates a new builder for the given configuration and render capability.
    pub fn new(cfg: PoolConfig, renderer: Arc<dyn Renderer>) -> Self {
        Self {
            cfg,
            renderer,
            subscribers: Vec::new(),
            node_id: 1,
            log_writer: true,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive pool events (unit lifecycle, task flow, failures)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Node id mixed into task ids (10 bits; higher bits are masked).
    pub fn with_node_id(mut self, node_id: u16) -> Self {
        self.node_id = node_id;
        self
    }

    /// Skips the built-in [`LogWriter`].
    pub fn without_log_writer(mut self) -> Self {
        self.log_writer = false;
        self
    }

    /// Builds the pool. The pool is stopped until [`RenderPool::initialize`].
    ///
    /// Must be called inside a tokio runtime: the subscriber workers and the
    /// bus listener are spawned here.
    pub fn build(self) -> Arc<RenderPool> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());

        let mut subs = self.subscribers;
        if self.log_writer {
            subs.push(Arc::new(LogWriter::new(self.cfg.verbose)));
        }

        let listener = if subs.is_empty() {
            None
        } else {
            let set = SubscriberSet::new(subs, bus.clone());
            let mut rx = bus.subscribe();
            Some(tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(ev) => set.emit(&ev),
                        Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => break,
                    }
                }
                set.shutdown().await;
            }))
        };

        Arc::new(RenderPool::new_internal(
            self.cfg,
            self.renderer,
            bus,
            IdGenerator::new(self.node_id),
            listener,
        ))
    }
}
