pub mod events;
pub mod layout;
pub mod render;
pub mod resource;


// Re-export key types for easier usage
pub use events::{EventBus, EventFilter, EventKind, LayoutEvent};
pub use layout::{
    Block, BlockConfig, BlockDefaults, BlockRegistry, BlockVisit, DataValue, DisplayedBlock,
    InlineAsset, Layout, LayoutError, ReferencedAsset, placeholder,
};
pub use render::{DataMap, FileExtRenderer, RenderError, Renderer, TextTemplateRenderer};
pub use resource::{DeferredValue, ResourceEntry, Taggable, TaggedResource};
