mod context;
mod pass;

pub use context::{HydrationContext, create_component, current, set, with_context, with_current};
pub use pass::{RenderMode, RenderPass};
pub(crate) use pass::PassTask;
