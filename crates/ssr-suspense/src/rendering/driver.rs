use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::RenderConfig;
use crate::error::SsrError;
use crate::hydration::{
    HydrationContext, PassTask, RenderMode, RenderPass, create_component, with_context,
};
use crate::rendering::hydration_script::hydration_script;
use crate::rendering::registry::FragmentRegistry;
use crate::rendering::substitution::substitute_fragments;

/// Runs `thunk` as the top-level component of `pass`.
pub(crate) fn render_root<F>(pass: &Arc<RenderPass>, render_id: &str, thunk: F) -> String
where
    F: FnOnce() -> String,
{
    with_context(HydrationContext::root(Arc::clone(pass), render_id), || create_component(thunk))
}

/// Synchronous render: every Suspense boundary shows its fallback.
pub fn render_to_string<F>(thunk: F) -> String
where
    F: FnOnce() -> String,
{
    let pass = Arc::new(RenderPass::new(RenderMode::Sync));
    render_root(&pass, "", thunk)
}

pub fn render_to_string_with<F>(thunk: F, config: &RenderConfig) -> Result<String, SsrError>
where
    F: FnOnce() -> String,
{
    config.validate()?;
    let pass = Arc::new(RenderPass::new(RenderMode::Sync));
    Ok(render_root(&pass, &config.render_id, thunk))
}

#[derive(Debug, Clone, PartialEq)]
pub struct AsyncRender {
    pub html: String,
    /// Every resource resolved during the render, by id.
    pub resources: BTreeMap<String, JsonValue>,
}

impl AsyncRender {
    pub fn hydration_script(&self, nonce: Option<&str>) -> Result<String, SsrError> {
        hydration_script(&self.resources, nonce)
    }
}

pub async fn render_to_string_async<F>(thunk: F, config: &RenderConfig) -> Result<String, SsrError>
where
    F: FnOnce() -> String,
{
    render_async(thunk, config).await.map(|render| render.html)
}

/// Out-of-order async render.
///
/// The tree is rendered once; suspended boundaries leave placeholder tokens.
/// Completion handlers then run here as their loads settle, re-rendering the
/// boundaries they finish. Once no boundary is pending, the fragments are
/// spliced into the root markup in a single substitution.
///
/// Fails with [`SsrError::Timeout`] past `config.timeout_ms`, and with
/// [`SsrError::Stalled`] as soon as boundaries are pending while nothing is
/// left that could resolve them.
pub async fn render_async<F>(thunk: F, config: &RenderConfig) -> Result<AsyncRender, SsrError>
where
    F: FnOnce() -> String,
{
    config.validate()?;

    let started = Instant::now();
    let deadline = tokio::time::Instant::now() + config.timeout();
    let (tasks, mut queue) = mpsc::unbounded_channel::<PassTask>();
    let fragments = Arc::new(FragmentRegistry::new());
    let pass = Arc::new(RenderPass::asynchronous(tasks, Arc::clone(&fragments)));

    let root = render_root(&pass, &config.render_id, thunk);

    if fragments.is_empty() {
        debug!("No boundary suspended, skipping substitution");
        return Ok(AsyncRender { html: root, resources: pass.resources_snapshot() });
    }

    debug!(pending = fragments.pending_count(), "Initial pass suspended");

    let mut inflight = FuturesUnordered::new();
    loop {
        while let Ok(task) = queue.try_recv() {
            inflight.push(task);
        }

        if fragments.is_empty() {
            break;
        }

        if inflight.is_empty() {
            let pending = fragments.pending_ids();
            let cause = pass.failures().into_iter().next().map(Box::new);
            error!(?pending, "Render stalled with no work in flight");
            return Err(SsrError::Stalled { pending, cause });
        }

        if tokio::time::timeout_at(deadline, inflight.next()).await.is_err() {
            let pending = fragments.pending_ids();
            error!(?pending, timeout_ms = config.timeout_ms, "Render timed out");
            return Err(SsrError::Timeout { timeout_ms: config.timeout_ms, pending });
        }

        // Coalesce every completion that is already ready into this turn.
        while let Some(Some(())) = inflight.next().now_or_never() {}
    }

    let failures = pass.failures();
    if !failures.is_empty() {
        warn!(count = failures.len(), "Render completed with failed loads outside suspended boundaries");
    }

    let substitution_started = Instant::now();
    let html = substitute_fragments(&root, &fragments.fragments(), config.max_substitution_passes)?;

    if config.debug_timing {
        info!(
            total_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            substitution_us =
                u64::try_from(substitution_started.elapsed().as_micros()).unwrap_or(u64::MAX),
            "Async render complete"
        );
    }

    Ok(AsyncRender { html, resources: pass.resources_snapshot() })
}
