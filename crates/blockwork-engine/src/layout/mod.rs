/*!
 * # Layout Module
 *
 * Pages are composed from a tree of named [`Block`]s, produced in two
 * steps: **resolve** then **render**.
 *
 * Resolve executes a block's view (template + data) without touching its
 * sub-blocks; the resulting body contains one literal placeholder comment
 * per sub-block the view declared. Render then walks the tree and replaces
 * each placeholder with the recursively rendered content of its block,
 * resolving just-in-time any block first reached during rendering.
 *
 * - **`block`**: the [`Block`] data model and block-level operations
 * - **`registry`**: [`BlockRegistry`], owner of all blocks for one pass
 * - **`layout`**: the [`Layout`] orchestrator driving both phases and
 *   emitting lifecycle events at each hook point
 *
 * A layout and its registry live for exactly one render pass; nothing here
 * is shared across concurrent passes.
 */

pub mod block;
pub mod layout;
pub mod registry;

pub use block::{Block, DataValue, DisplayedBlock, InlineAsset, LayoutError};
pub use layout::{
    BlockConfig, BlockDefaults, BlockVisit, Layout, ReferencedAsset, placeholder,
};
pub use registry::BlockRegistry;
