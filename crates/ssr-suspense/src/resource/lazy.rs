use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use crate::error::SsrError;
use crate::hydration::{HydrationContext, RenderPass, current, with_current};
use crate::suspense;

pub type Component<P> = Arc<dyn Fn(P) -> String + Send + Sync>;

type Loader<P> = Box<dyn FnOnce() -> BoxFuture<'static, Result<Component<P>, String>> + Send>;
type ComponentLoad<P> = Shared<BoxFuture<'static, Result<Component<P>, SsrError>>>;

enum LazyState<P> {
    Idle(Option<Loader<P>>),
    Loading(ComponentLoad<P>),
    Ready(Component<P>),
    Failed(SsrError),
}

/// Wraps a component whose code is fetched on first use.
///
/// The loader runs at most once; every clone shares the load and the
/// resolved component.
pub fn lazy<P, F, Fut, C, E>(loader: F) -> Lazy<P>
where
    P: 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<C, E>> + Send + 'static,
    C: Fn(P) -> String + Send + Sync + 'static,
    E: fmt::Display + 'static,
{
    let loader: Loader<P> = Box::new(move || {
        loader()
            .map(|result| match result {
                Ok(component) => Ok(Arc::new(component) as Component<P>),
                Err(e) => Err(e.to_string()),
            })
            .boxed()
    });

    Lazy { state: Arc::new(Mutex::new(LazyState::Idle(Some(loader)))) }
}

pub struct Lazy<P> {
    state: Arc<Mutex<LazyState<P>>>,
}

impl<P> Clone for Lazy<P> {
    fn clone(&self) -> Self {
        Self { state: Arc::clone(&self.state) }
    }
}

impl<P: 'static> Lazy<P> {
    pub fn is_loaded(&self) -> bool {
        matches!(*self.state.lock(), LazyState::Ready(_))
    }

    fn component(&self) -> Option<Component<P>> {
        match &*self.state.lock() {
            LazyState::Ready(component) => Some(Arc::clone(component)),
            _ => None,
        }
    }

    /// Renders the component, or an empty slot while its code is loading.
    ///
    /// The slot always takes a position id so that sibling ids do not shift
    /// between the first render and the one after the load resolves.
    pub fn render(&self, props: P) -> String {
        let ctx = current();
        let id = with_current(HydrationContext::next_id).unwrap_or_default();

        if let Some(component) = self.component() {
            return component(props);
        }

        let Some(ctx) = ctx.filter(|ctx| ctx.pass().is_async() || ctx.pass().is_streaming()) else {
            return String::new();
        };

        let Some(load) = self.start(&id) else {
            return match self.component() {
                Some(component) => component(props),
                None => String::new(),
            };
        };

        if ctx.pass().is_async()
            && let Some(boundary) = ctx.boundary_handle()
            && suspense::register(ctx.pass(), &boundary, &id)
        {
            debug!(slot = %id, boundary = %boundary, "Lazy component suspended");
            ctx.pass().spawn(waiter(Arc::clone(ctx.pass()), id, load));
        }

        String::new()
    }

    /// Starts fetching the component without rendering it.
    pub fn preload(&self) {
        self.start("preload");
    }

    /// Starts the load if it has not started yet and returns it while pending.
    ///
    /// A loader that completes on its first poll settles synchronously and
    /// yields `None`. A pending one is spawned on the current runtime so it
    /// settles even when no boundary waits for it.
    fn start(&self, origin: &str) -> Option<ComponentLoad<P>> {
        let load = {
            let mut state = self.state.lock();
            match &mut *state {
                LazyState::Loading(load) => return Some(load.clone()),
                LazyState::Ready(_) | LazyState::Failed(_) => return None,
                LazyState::Idle(loader) => {
                    let loader = loader.take()?;
                    let load = settle(Arc::downgrade(&self.state), origin.to_string(), loader());
                    *state = LazyState::Loading(load.clone());
                    load
                }
            }
        };

        if load.clone().now_or_never().is_some() {
            return None;
        }

        drive(origin, &load);
        Some(load)
    }
}

impl<P> fmt::Debug for Lazy<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.state.lock() {
            LazyState::Idle(_) => "idle",
            LazyState::Loading(_) => "loading",
            LazyState::Ready(_) => "ready",
            LazyState::Failed(_) => "failed",
        };
        f.debug_struct("Lazy").field("state", &state).finish()
    }
}

/// Wraps a loader future so its outcome becomes the permanent state of the
/// `Lazy` that owns it.
fn settle<P: 'static>(
    state: Weak<Mutex<LazyState<P>>>,
    origin: String,
    fut: BoxFuture<'static, Result<Component<P>, String>>,
) -> ComponentLoad<P> {
    async move {
        let result = fut.await.map_err(|message| SsrError::producer(origin, message));
        if let Some(state) = state.upgrade() {
            *state.lock() = match &result {
                Ok(component) => LazyState::Ready(Arc::clone(component)),
                Err(e) => LazyState::Failed(e.clone()),
            };
        }
        result
    }
    .boxed()
    .shared()
}

fn drive<P: 'static>(origin: &str, load: &ComponentLoad<P>) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(load.clone().map(drop));
        }
        Err(_) => {
            debug!(slot = origin, "No runtime, lazy component loads only while awaited");
        }
    }
}

fn waiter<P: 'static>(
    pass: Arc<RenderPass>,
    id: String,
    load: ComponentLoad<P>,
) -> BoxFuture<'static, ()> {
    async move {
        match load.await {
            Ok(_) => suspense::resolve_item(&pass, &id),
            Err(e) => {
                warn!(slot = %id, error = %e, "Lazy component failed to load");
                pass.record_failure(&id, e);
            }
        }
    }
    .boxed()
}
