pub mod config;
pub mod error;
pub mod hydration;
pub mod rendering;
pub mod resource;
pub mod suspense;

pub use config::{ConfigError, RenderConfig};
pub use error::SsrError;
pub use hydration::{HydrationContext, RenderMode, RenderPass, create_component};
pub use rendering::{
    AsyncRender, ResourceChunk, ResourceSink, ResourceStream, StreamingRender, StreamingShell,
    hydration_script, render_async, render_streaming, render_to_string, render_to_string_async,
    render_to_string_with,
};
pub use resource::lazy::{Lazy, lazy};
pub use resource::{LoadHandle, Resource, create_resource};
pub use suspense::suspense;
