pub mod driver;
pub mod hydration_script;
pub mod registry;
pub mod streaming;
pub mod substitution;

mod tests;

pub use driver::{
    AsyncRender, render_async, render_to_string, render_to_string_async, render_to_string_with,
};
pub use hydration_script::hydration_script;
pub use registry::FragmentRegistry;
pub use streaming::{
    ChannelSink, PendingResource, ResourceChunk, ResourceSink, ResourceStream, StreamingRender,
    StreamingShell, channel_sink, render_streaming, render_streaming_with_sink,
};
pub use substitution::{find_placeholders, placeholder, substitute_fragments};
