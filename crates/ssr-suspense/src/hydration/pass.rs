use futures::future::BoxFuture;
use parking_lot::{Mutex, MutexGuard};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::SsrError;
use crate::rendering::registry::FragmentRegistry;
use crate::rendering::streaming::{PendingResource, ResourceSink};
use crate::resource::SharedLoad;
use crate::suspense::BoundaryState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RenderMode {
    /// No deferred mechanism: boundaries render their fallback.
    #[default]
    Sync,
    /// Placeholders now, fragments substituted once every boundary resolves.
    Async,
    /// Boundaries render eagerly; pending resources go to a `ResourceSink`.
    Streaming,
}

impl RenderMode {
    pub fn is_async(self) -> bool {
        self == Self::Async
    }

    pub fn is_streaming(self) -> bool {
        self == Self::Streaming
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderMode::Sync => write!(f, "sync"),
            RenderMode::Async => write!(f, "async"),
            RenderMode::Streaming => write!(f, "streaming"),
        }
    }
}

pub(crate) type PassTask = BoxFuture<'static, ()>;

#[derive(Default)]
pub(crate) struct PassState {
    pub(crate) resources: FxHashMap<String, JsonValue>,
    pub(crate) suspense: FxHashMap<String, BoundaryState>,
    /// Unresolved item id -> boundaries waiting on it.
    pub(crate) registrations: FxHashMap<String, FxHashSet<Arc<str>>>,
    pub(crate) inflight: FxHashMap<String, SharedLoad>,
    pub(crate) failures: Vec<SsrError>,
}

/// State shared by every scope of one render pass.
///
/// Contexts hold it by `Arc`; ids and counters stay per-context values.
pub struct RenderPass {
    mode: RenderMode,
    state: Mutex<PassState>,
    tasks: Option<mpsc::UnboundedSender<PassTask>>,
    resource_sink: Option<Arc<dyn ResourceSink>>,
    fragments: Option<Arc<FragmentRegistry>>,
}

impl RenderPass {
    pub fn new(mode: RenderMode) -> Self {
        Self {
            mode,
            state: Mutex::new(PassState::default()),
            tasks: None,
            resource_sink: None,
            fragments: None,
        }
    }

    pub(crate) fn asynchronous(
        tasks: mpsc::UnboundedSender<PassTask>,
        fragments: Arc<FragmentRegistry>,
    ) -> Self {
        Self { tasks: Some(tasks), fragments: Some(fragments), ..Self::new(RenderMode::Async) }
    }

    pub fn streaming(sink: Arc<dyn ResourceSink>) -> Self {
        Self { resource_sink: Some(sink), ..Self::new(RenderMode::Streaming) }
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn is_async(&self) -> bool {
        self.mode.is_async()
    }

    pub fn is_streaming(&self) -> bool {
        self.mode.is_streaming()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, PassState> {
        self.state.lock()
    }

    pub(crate) fn fragments(&self) -> Option<&Arc<FragmentRegistry>> {
        self.fragments.as_ref()
    }

    pub fn resolved(&self, id: &str) -> Option<JsonValue> {
        self.state.lock().resources.get(id).cloned()
    }

    pub fn is_resolved(&self, id: &str) -> bool {
        self.state.lock().resources.contains_key(id)
    }

    /// Stores a resolved value. Ids are write-once: a later write is ignored.
    pub(crate) fn store_resource(&self, id: &str, value: JsonValue) {
        let mut state = self.state.lock();
        state.inflight.remove(id);
        if state.resources.contains_key(id) {
            debug!(resource = id, "Ignoring second resolution of resource");
            return;
        }
        state.resources.insert(id.to_string(), value);
    }

    pub(crate) fn inflight(&self, id: &str) -> Option<SharedLoad> {
        self.state.lock().inflight.get(id).cloned()
    }

    pub(crate) fn track_inflight(&self, id: &str, load: SharedLoad) {
        self.state.lock().inflight.insert(id.to_string(), load);
    }

    pub fn is_loading(&self, id: &str) -> bool {
        self.state.lock().inflight.contains_key(id)
    }

    pub(crate) fn record_failure(&self, id: &str, error: SsrError) {
        let mut state = self.state.lock();
        state.inflight.remove(id);
        state.failures.push(error);
    }

    pub fn failures(&self) -> Vec<SsrError> {
        self.state.lock().failures.clone()
    }

    /// Resolved resources ordered by id, ready for serialization.
    pub fn resources_snapshot(&self) -> BTreeMap<String, JsonValue> {
        self.state.lock().resources.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub(crate) fn spawn(&self, task: PassTask) {
        match &self.tasks {
            Some(tasks) => {
                if tasks.send(task).is_err() {
                    debug!("Render driver finished, dropping late completion task");
                }
            }
            None => debug!(mode = %self.mode, "No driver attached to pass, dropping task"),
        }
    }

    pub(crate) fn write_resource(&self, id: &str, pending: SharedLoad) {
        if let Some(sink) = &self.resource_sink {
            sink.write_resource(id, PendingResource::new(pending));
        }
    }
}

impl fmt::Debug for RenderPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RenderPass")
            .field("mode", &self.mode)
            .field("resources", &state.resources.len())
            .field("boundaries", &state.suspense.len())
            .field("inflight", &state.inflight.len())
            .finish_non_exhaustive()
    }
}
