mod stream;
mod types;

pub use stream::{ChannelSink, ResourceStream, channel_sink};
pub use types::{PendingResource, ResourceChunk, ResourceSink};

use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::RenderConfig;
use crate::error::SsrError;
use crate::hydration::RenderPass;
use crate::rendering::driver::render_root;
use crate::rendering::hydration_script::hydration_script;

/// Markup of a streaming render plus the resources that were already
/// resolved when the shell finished.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamingShell {
    pub html: String,
    pub resolved: BTreeMap<String, JsonValue>,
}

impl StreamingShell {
    pub fn hydration_script(&self, nonce: Option<&str>) -> Result<String, SsrError> {
        hydration_script(&self.resolved, nonce)
    }
}

pub struct StreamingRender {
    pub shell: StreamingShell,
    pub resources: ResourceStream,
}

/// Renders every boundary eagerly; loads still pending are delivered through
/// the returned [`ResourceStream`] as they settle.
pub fn render_streaming<F>(thunk: F, config: &RenderConfig) -> Result<StreamingRender, SsrError>
where
    F: FnOnce() -> String,
{
    let (sink, resources) = channel_sink();
    let shell = render_streaming_with_sink(thunk, config, Arc::new(sink))?;

    Ok(StreamingRender { shell, resources })
}

/// Streaming render that hands pending resources to a caller-provided sink.
pub fn render_streaming_with_sink<F>(
    thunk: F,
    config: &RenderConfig,
    sink: Arc<dyn ResourceSink>,
) -> Result<StreamingShell, SsrError>
where
    F: FnOnce() -> String,
{
    config.validate()?;

    let pass = Arc::new(RenderPass::streaming(sink));
    let html = render_root(&pass, &config.render_id, thunk);
    let resolved = pass.resources_snapshot();

    debug!(resolved = resolved.len(), "Streaming shell rendered");

    Ok(StreamingShell { html, resolved })
}
