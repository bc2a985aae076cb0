//! # Execution unit: one OS thread running renders one at a time.
//!
//! A unit owns the receiving end of its request channel and a clone of the
//! orchestrator's inbox. It never touches pool state.
//!
//! ## Lifecycle
//! ```text
//! spawn_unit() ──► thread start ──► renderer.warm_up() ──► send Ready
//!                       │
//!                       ▼
//!        loop blocking_recv(Request::Render)
//!           ├─► renderer.render(template, input)
//!           ├─► Ok  ──► send Success { bytes, duration_ms }
//!           └─► Err ──► send Error { message }
//!                       │
//!   request channel closed (terminate) / inbox closed / panic / warm-up error
//!                       ▼
//!               send Exited { reason }
//! ```
//!
//! ## Rules
//! - Terminating a unit means dropping its [`UnitHandle`]; the thread exits after
//!   its current render returns. A reply produced after that is stale and is
//!   discarded by the orchestrator.
//! - A panicking renderer kills the thread; the orchestrator sees `Exited` with
//!   the panic message.
//! - A failed warm-up exits before `Ready`, so the unit never joins the rotation.

use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::subscribers::panic_message;

use super::protocol::{Envelope, Request, Response, UnitEvent, WorkerId};

/// The render capability units call: `render(template, input) -> bytes`.
///
/// [`TemplateRegistry`](crate::TemplateRegistry) implements it; so does any
/// `Fn(&str, &Value) -> Result<Bytes, String>`.
pub trait Renderer: Send + Sync + 'static {
    fn render(&self, template: &str, input: &Value) -> Result<Bytes, String>;

    /// Per-unit initialization, run on the unit thread before it reports ready.
    ///
    /// Counts against the startup window. An error keeps the unit out of rotation.
    fn warm_up(&self) -> Result<(), String> {
        Ok(())
    }
}

impl<F> Renderer for F
where
    F: Fn(&str, &Value) -> Result<Bytes, String> + Send + Sync + 'static,
{
    fn render(&self, template: &str, input: &Value) -> Result<Bytes, String> {
        (self)(template, input)
    }
}

/// Orchestrator-side handle; dropping it terminates the unit.
#[derive(Debug)]
pub(crate) struct UnitHandle {
    id: WorkerId,
    tx: mpsc::UnboundedSender<Request>,
}

impl UnitHandle {
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Hands a request to the unit. Fails if the thread is gone.
    pub fn send(&self, req: Request) -> Result<(), Request> {
        self.tx.send(req).map_err(|e| e.0)
    }
}

/// Spawns a unit thread named `render-unit-<id>`.
pub(crate) fn spawn_unit(
    id: WorkerId,
    renderer: Arc<dyn Renderer>,
    inbox: mpsc::UnboundedSender<Envelope>,
) -> io::Result<UnitHandle> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::Builder::new()
        .name(format!("render-unit-{}", id.0))
        .spawn(move || {
            let outcome =
                catch_unwind(AssertUnwindSafe(|| serve(id, renderer.as_ref(), rx, &inbox)));
            let reason = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(reason)) => Some(reason),
                Err(payload) => Some(format!("panicked: {}", panic_message(&*payload))),
            };
            let _ = inbox.send(Envelope {
                worker: id,
                event: UnitEvent::Exited { reason },
            });
        })?;

    Ok(UnitHandle { id, tx })
}

fn serve(
    id: WorkerId,
    renderer: &dyn Renderer,
    mut rx: mpsc::UnboundedReceiver<Request>,
    inbox: &mpsc::UnboundedSender<Envelope>,
) -> Result<(), String> {
    renderer
        .warm_up()
        .map_err(|e| format!("warm-up failed: {e}"))?;

    if inbox.send(Envelope::message(id, Response::Ready)).is_err() {
        return Ok(());
    }

    while let Some(req) = rx.blocking_recv() {
        let Request::Render {
            task_id,
            template,
            input,
        } = req;

        let started = Instant::now();
        let response = match renderer.render(&template, &input) {
            Ok(bytes) => Response::Success {
                task_id,
                bytes,
                duration_ms: started.elapsed().as_millis() as u64,
            },
            Err(message) => Response::Error { task_id, message },
        };

        if inbox.send(Envelope::message(id, response)).is_err() {
            return Ok(());
        }
    }
    Ok(())
}
