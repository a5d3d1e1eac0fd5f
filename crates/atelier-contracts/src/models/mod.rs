mod registry;
mod selectors;

pub use registry::{ModelRegistry, ModelSpec, DEFAULT_THINKING_BUDGET};
pub use selectors::{ModelSelection, ModelSelector};
