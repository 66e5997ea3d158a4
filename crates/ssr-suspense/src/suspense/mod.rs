use rustc_hash::FxHashSet;
use std::sync::Arc;
use tracing::debug;

use crate::hydration::{HydrationContext, RenderMode, RenderPass, with_context, with_current};
use crate::rendering::substitution::placeholder;

pub type ChildRenderer = Arc<dyn Fn() -> String + Send + Sync>;

/// Fan-in bookkeeping for one Suspense boundary.
pub struct BoundaryState {
    resources: FxHashSet<String>,
    completed_count: usize,
    scope: String,
    render: ChildRenderer,
    done: bool,
}

impl BoundaryState {
    fn new(scope: impl Into<String>, render: ChildRenderer) -> Self {
        Self {
            resources: FxHashSet::default(),
            completed_count: 0,
            scope: scope.into(),
            render,
            done: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed_count == self.resources.len()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn registered_count(&self) -> usize {
        self.resources.len()
    }

    pub fn completed_count(&self) -> usize {
        self.completed_count
    }
}

impl std::fmt::Debug for BoundaryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundaryState")
            .field("resources", &self.resources)
            .field("completed_count", &self.completed_count)
            .field("scope", &self.scope)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

/// Boundary id for a scope: the scope path without its trailing dot.
pub fn boundary_id(scope_id: &str) -> &str {
    scope_id.strip_suffix('.').unwrap_or(scope_id)
}

/// Renders `children` guarded by a Suspense boundary.
///
/// In async mode the result is either the children's markup, when nothing
/// beneath them is waiting, or a `<#id#>` placeholder the driver replaces
/// once every registered resource has resolved. Sync mode always yields the
/// fallback; streaming mode always renders the children.
pub fn suspense<F>(fallback: impl Into<String>, children: F) -> String
where
    F: Fn() -> String + Send + Sync + 'static,
{
    let Some(scope) = with_current(HydrationContext::next) else {
        return fallback.into();
    };

    match scope.pass().mode() {
        RenderMode::Streaming => with_context(scope, children),
        RenderMode::Sync => fallback.into(),
        RenderMode::Async => render_boundary(scope, Arc::new(children)),
    }
}

fn render_boundary(scope: HydrationContext, render: ChildRenderer) -> String {
    let pass = Arc::clone(scope.pass());
    let id: Arc<str> = Arc::from(boundary_id(scope.id()));

    pass.lock()
        .suspense
        .entry(id.to_string())
        .and_modify(|boundary| boundary.render = Arc::clone(&render))
        .or_insert_with(|| BoundaryState::new(scope.id(), Arc::clone(&render)));

    let html = with_context(scope.within_boundary(Arc::clone(&id)), || render());

    let complete = pass.lock().suspense.get(&*id).is_some_and(BoundaryState::is_complete);
    if complete {
        return html;
    }

    if let Some(fragments) = pass.fragments() {
        fragments.register(&id);
    }
    debug!(boundary = %id, "Boundary suspended");

    placeholder(&id)
}

/// Registers an unresolved item under a boundary.
///
/// Returns `true` the first time `item_id` is registered anywhere in the
/// pass, which is when the caller must arrange for [`resolve_item`] to run.
/// Boundaries that already fired their completion accept no new items.
pub(crate) fn register(pass: &RenderPass, boundary: &Arc<str>, item_id: &str) -> bool {
    let mut state = pass.lock();

    match state.suspense.get_mut(&**boundary) {
        Some(entry) if !entry.done => {
            entry.resources.insert(item_id.to_string());
        }
        _ => return false,
    }

    let waiting = state.registrations.entry(item_id.to_string()).or_default();
    let first = waiting.is_empty();
    waiting.insert(Arc::clone(boundary));
    first
}

/// Marks `item_id` resolved for every boundary that registered it.
///
/// Registrations are one-shot: they are removed here, so a later resolution
/// of the same id never counts twice.
pub(crate) fn resolve_item(pass: &Arc<RenderPass>, item_id: &str) {
    let waiting = pass.lock().registrations.remove(item_id).unwrap_or_default();

    for boundary in waiting {
        notify_resolved(pass, &boundary);
    }
}

fn notify_resolved(pass: &Arc<RenderPass>, id: &Arc<str>) {
    let (scope, render) = {
        let mut state = pass.lock();
        let Some(boundary) = state.suspense.get_mut(&**id) else {
            return;
        };
        if boundary.done {
            return;
        }
        boundary.completed_count += 1;
        if !boundary.is_complete() {
            return;
        }
        (boundary.scope.clone(), Arc::clone(&boundary.render))
    };

    completed(pass, id, scope, &render);
}

/// Re-renders a boundary whose registrations all resolved and, if nothing new
/// suspended during the re-render, hands the markup to the driver.
fn completed(pass: &Arc<RenderPass>, id: &Arc<str>, scope: String, render: &ChildRenderer) {
    let ctx = HydrationContext::scope(Arc::clone(pass), scope, Arc::clone(id));
    let html = with_context(ctx, || render());

    let finished = {
        let mut state = pass.lock();
        match state.suspense.get_mut(&**id) {
            Some(boundary) if boundary.is_complete() && !boundary.done => {
                boundary.done = true;
                true
            }
            _ => false,
        }
    };

    if !finished {
        debug!(boundary = %id, "Boundary suspended again after re-render");
        return;
    }

    debug!(boundary = %id, "Boundary resolved");
    if let Some(fragments) = pass.fragments() {
        fragments.complete(id, html);
    }
}
