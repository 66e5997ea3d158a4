pub mod lazy;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, warn};

use crate::error::SsrError;
use crate::hydration::{HydrationContext, RenderPass, current, with_current};
use crate::suspense;

/// A load shared between the resource, the driver and any stream consumer.
pub type SharedLoad = Shared<BoxFuture<'static, Result<JsonValue, SsrError>>>;

/// Creates a resource at the next position of the active context.
///
/// Outside of any render the resource gets an empty id and never loads.
pub fn create_resource<T>(initial: Option<T>) -> Resource<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    let ctx = current();
    let id = with_current(HydrationContext::next_id).unwrap_or_default();

    Resource {
        id,
        initial,
        pass: ctx.as_ref().map(|ctx| Arc::clone(ctx.pass())),
        boundary: ctx.and_then(|ctx| ctx.boundary_handle()),
    }
}

/// A unit of asynchronous data addressed by its hydration id.
#[derive(Clone)]
pub struct Resource<T> {
    id: String,
    initial: Option<T>,
    pass: Option<Arc<RenderPass>>,
    boundary: Option<Arc<str>>,
}

impl<T> Resource<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current value: the resolved one if the pass has it, else the initial.
    ///
    /// An unresolved read in async mode registers the resource with the
    /// nearest Suspense boundary, which then waits for it.
    pub fn read(&self) -> Option<T> {
        let Some(pass) = &self.pass else {
            return self.initial.clone();
        };

        if let Some(value) = pass.resolved(&self.id) {
            return match decode(value) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(resource = %self.id, error = %e, "Resolved value did not decode, using initial");
                    self.initial.clone()
                }
            };
        }

        if pass.is_async()
            && let Some(boundary) = self.reading_boundary()
        {
            suspense::register(pass, &boundary, &self.id);
        }

        self.initial.clone()
    }

    /// The boundary around the code reading the resource, which may differ
    /// from the one that was active when it was created.
    fn reading_boundary(&self) -> Option<Arc<str>> {
        match current() {
            Some(ctx) => ctx.boundary_handle(),
            None => self.boundary.clone(),
        }
    }

    /// Starts loading the resource with `producer`.
    ///
    /// `producer` is only invoked when nothing is cached or already loading
    /// for this id. A future that is ready on its first poll is stored right
    /// away, so a later `read` in the same pass sees the value.
    pub fn load<F, Fut, E>(&self, producer: F) -> LoadHandle<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let Some(pass) = self.pass.as_ref().filter(|p| p.is_async() || p.is_streaming()) else {
            return LoadHandle::never();
        };

        if let Some(value) = pass.resolved(&self.id) {
            return LoadHandle::ready(Ok(value));
        }

        if let Some(load) = pass.inflight(&self.id) {
            return LoadHandle::pending(load);
        }

        let id = self.id.clone();
        let mut fut = producer()
            .map(move |result| {
                let value = result.map_err(|e| SsrError::producer(&id, e))?;
                serde_json::to_value(&value).map_err(|e| SsrError::serialization(e.to_string()))
            })
            .boxed();

        if let Some(result) = (&mut fut).now_or_never() {
            match &result {
                Ok(value) => pass.store_resource(&self.id, value.clone()),
                Err(e) => pass.record_failure(&self.id, e.clone()),
            }
            return LoadHandle::ready(result);
        }

        let load = fut.shared();

        if pass.is_streaming() {
            debug!(resource = %self.id, "Handing pending resource to sink");
            pass.write_resource(&self.id, load.clone());
            return LoadHandle::pending(load);
        }

        pass.track_inflight(&self.id, load.clone());
        pass.spawn(completion(Arc::clone(pass), self.id.clone(), load.clone()));

        LoadHandle::pending(load)
    }
}

impl<T> fmt::Debug for Resource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.id)
            .field("boundary", &self.boundary)
            .finish_non_exhaustive()
    }
}

/// Completion handler run by the driver once a pending load settles.
fn completion(pass: Arc<RenderPass>, id: String, load: SharedLoad) -> BoxFuture<'static, ()> {
    async move {
        match load.await {
            Ok(value) => {
                pass.store_resource(&id, value);
                suspense::resolve_item(&pass, &id);
            }
            Err(e) => {
                warn!(resource = %id, error = %e, "Resource rejected");
                pass.record_failure(&id, e);
            }
        }
    }
    .boxed()
}

fn decode<T: DeserializeOwned>(value: JsonValue) -> Result<T, SsrError> {
    serde_json::from_value(value).map_err(|e| SsrError::deserialization(e.to_string()))
}

enum LoadState {
    Ready(Result<JsonValue, SsrError>),
    Pending(SharedLoad),
    Never,
}

/// Awaitable result of [`Resource::load`].
pub struct LoadHandle<T> {
    state: LoadState,
    _value: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> LoadHandle<T> {
    fn ready(result: Result<JsonValue, SsrError>) -> Self {
        Self { state: LoadState::Ready(result), _value: PhantomData }
    }

    fn pending(load: SharedLoad) -> Self {
        Self { state: LoadState::Pending(load), _value: PhantomData }
    }

    fn never() -> Self {
        Self { state: LoadState::Never, _value: PhantomData }
    }

    /// The result, if the load has already settled.
    pub fn resolved(&self) -> Option<Result<T, SsrError>> {
        let result = match &self.state {
            LoadState::Ready(result) => result.clone(),
            LoadState::Pending(load) => load.peek()?.clone(),
            LoadState::Never => return None,
        };
        Some(result.and_then(decode))
    }

    pub fn is_pending(&self) -> bool {
        self.resolved().is_none()
    }
}

impl<T: DeserializeOwned> Future for LoadHandle<T> {
    type Output = Result<T, SsrError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            LoadState::Ready(result) => Poll::Ready(result.clone().and_then(decode)),
            LoadState::Pending(load) => load.poll_unpin(cx).map(|result| result.and_then(decode)),
            LoadState::Never => Poll::Pending,
        }
    }
}
