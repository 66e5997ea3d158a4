use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use super::pass::RenderPass;

/// Position of a render scope in the component tree.
///
/// Ids are dot-terminated paths (`"0.2.1."`). A child scope is always
/// `parent.id + parent.count + "."`, and the parent's counter advances once per
/// child, so identical render order always produces identical ids.
#[derive(Clone)]
pub struct HydrationContext {
    id: String,
    count: u32,
    boundary: Option<Arc<str>>,
    pass: Arc<RenderPass>,
}

impl HydrationContext {
    pub fn root(pass: Arc<RenderPass>, id: impl Into<String>) -> Self {
        Self { id: id.into(), count: 0, boundary: None, pass }
    }

    pub(crate) fn scope(pass: Arc<RenderPass>, id: impl Into<String>, boundary: Arc<str>) -> Self {
        Self { id: id.into(), count: 0, boundary: Some(boundary), pass }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Id of the nearest enclosing Suspense boundary.
    pub fn boundary(&self) -> Option<&str> {
        self.boundary.as_deref()
    }

    pub(crate) fn boundary_handle(&self) -> Option<Arc<str>> {
        self.boundary.clone()
    }

    pub fn pass(&self) -> &Arc<RenderPass> {
        &self.pass
    }

    /// Spawns the next child scope.
    pub fn next(&mut self) -> HydrationContext {
        let id = format!("{}{}.", self.id, self.count);
        self.count += 1;
        Self { id, count: 0, boundary: self.boundary.clone(), pass: Arc::clone(&self.pass) }
    }

    /// Allocates a leaf id (no trailing dot) for a resource or lazy slot.
    pub fn next_id(&mut self) -> String {
        let id = format!("{}{}", self.id, self.count);
        self.count += 1;
        id
    }

    pub(crate) fn within_boundary(mut self, boundary: Arc<str>) -> Self {
        self.boundary = Some(boundary);
        self
    }
}

impl fmt::Debug for HydrationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HydrationContext")
            .field("id", &self.id)
            .field("count", &self.count)
            .field("boundary", &self.boundary)
            .field("mode", &self.pass.mode())
            .finish()
    }
}

thread_local! {
    static ACTIVE: RefCell<Option<HydrationContext>> = const { RefCell::new(None) };
}

struct Restore(Option<HydrationContext>);

impl Drop for Restore {
    fn drop(&mut self) {
        let previous = self.0.take();
        ACTIVE.with(|slot| *slot.borrow_mut() = previous);
    }
}

/// Snapshot of the active context.
pub fn current() -> Option<HydrationContext> {
    ACTIVE.with(|slot| slot.borrow().clone())
}

/// Replaces the active context, returning the one it displaced.
pub fn set(ctx: Option<HydrationContext>) -> Option<HydrationContext> {
    ACTIVE.with(|slot| slot.replace(ctx))
}

/// Mutates the active context in place. `f` must not render.
pub fn with_current<R>(f: impl FnOnce(&mut HydrationContext) -> R) -> Option<R> {
    ACTIVE.with(|slot| slot.borrow_mut().as_mut().map(f))
}

/// Runs `f` with `ctx` active. The caller's context is restored on every exit
/// path, unwinding included.
pub fn with_context<R>(ctx: HydrationContext, f: impl FnOnce() -> R) -> R {
    let _restore = Restore(set(Some(ctx)));
    f()
}

/// Invokes a component in a fresh child scope of the active context.
pub fn create_component<R>(f: impl FnOnce() -> R) -> R {
    match with_current(HydrationContext::next) {
        Some(child) => with_context(child, f),
        None => f(),
    }
}
