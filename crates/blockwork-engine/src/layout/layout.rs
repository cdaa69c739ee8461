use std::backtrace::Backtrace;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::block::{Block, InlineAsset, LayoutError};
use super::registry::BlockRegistry;
use crate::events::{EventBus, EventFilter, EventKind, LayoutEvent};
use crate::render::Renderer;

/// The literal marker a parent body carries for a sub-block's content.
///
/// This is a textual contract: the marker must appear verbatim in the
/// parent's resolved body for substitution to occur.
pub fn placeholder(id: &str) -> String {
    format!("<!-- placeholder for block {id} -->")
}

/// Replace every occurrence of `id`'s placeholder with `content`.
///
/// Kept behind one function so a structured substitution could replace the
/// string search without touching the `content` contract.
fn substitute_placeholder(body: &str, id: &str, content: &str) -> String {
    body.replace(&placeholder(id), content)
}

/// Options applied to every newly configured block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockDefaults {
    pub options: BTreeMap<String, Value>,
    pub meta: BTreeMap<String, Value>,
}

impl BlockDefaults {
    /// Fill defaults in for keys the call omitted; explicit entries win.
    fn fill_into(&self, config: &mut BlockConfig) {
        for (name, value) in &self.options {
            config
                .options
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
        for (name, value) in &self.meta {
            config
                .meta
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

/// One configuration step for a block: the closed set of facets `set`
/// understands, each with its own merge strategy (scalars replace, maps
/// merge key-wise with new entries winning, lists append).
///
/// Unknown facet names are rejected at deserialization time.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlockConfig {
    pub body: Option<String>,
    pub template: Option<String>,
    pub options: BTreeMap<String, Value>,
    pub data: BTreeMap<String, Value>,
    pub meta: BTreeMap<String, Value>,
    pub assets: BTreeMap<String, Vec<String>>,
    pub requires: Vec<String>,
    pub first_assets: Vec<String>,
    pub inline: BTreeMap<String, Vec<InlineAsset>>,
}

impl BlockConfig {
    fn apply_to(self, block: &mut Block) {
        if let Some(body) = self.body {
            block.body = body;
        }
        if let Some(template) = self.template {
            block.set_template(template);
        }
        for (name, value) in self.options {
            block.options.insert(name, value);
        }
        for (name, value) in self.data {
            block.data.insert(name, value.into());
        }
        for (name, value) in self.meta {
            block.meta.insert(name, value);
        }
        for (target, files) in self.assets {
            block.assets.entry(target).or_default().extend(files);
        }
        block.requires.extend(self.requires);
        block.first_assets.extend(self.first_assets);
        for (target, items) in self.inline {
            block.inline.entry(target).or_default().extend(items);
        }
    }
}

/// A referenced asset declaration, independent of the block tree, consumed
/// by cache-busting/bundling tooling. Keyed by `"alias:version"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencedAsset {
    pub alias: String,
    pub path: String,
    pub version: String,
    pub target: String,
    pub first: bool,
    pub requires: Vec<String>,
}

/// What the structural traversal reports for one declared block.
#[derive(Debug)]
pub struct BlockVisit<'a> {
    pub block: Option<&'a Block>,
    pub shown: bool,
    pub exists: bool,
}

/// The layout object: block definitions to render one page.
///
/// It owns the [`BlockRegistry`], can add and remove blocks, renders the
/// tree in cascade from its root block, and can emit lifecycle events
/// through an optional [`EventBus`]. Built fresh for each render pass.
pub struct Layout {
    pub id: Option<String>,
    pub description: Option<String>,
    root: String,
    pub registry: BlockRegistry,
    renderer: Box<dyn Renderer>,
    bus: Option<EventBus>,
    debug_enabled: bool,
    default_options: BlockDefaults,
    referenced_assets: BTreeMap<String, ReferencedAsset>,
}

impl Layout {
    pub fn new(renderer: Box<dyn Renderer>) -> Self {
        Self {
            id: None,
            description: None,
            root: "root".to_string(),
            registry: BlockRegistry::new(),
            renderer,
            bus: None,
            debug_enabled: false,
            default_options: BlockDefaults::default(),
            referenced_assets: BTreeMap::new(),
        }
    }

    pub fn set_root(&mut self, root: impl Into<String>) {
        self.root = root.into();
    }

    pub fn root_id(&self) -> &str {
        &self.root
    }

    /// The block the render cascade starts from.
    pub fn root_block(&self) -> Option<&Block> {
        self.registry.get(&self.root)
    }

    pub fn attach_bus(&mut self, bus: EventBus) {
        self.bus = Some(bus);
    }

    pub fn enable_debug(&mut self, enabled: bool) {
        self.debug_enabled = enabled;
    }

    pub fn set_default_options(&mut self, defaults: BlockDefaults) {
        self.default_options = defaults;
    }

    // --- block rendering ---

    /// Resolve one block to produce its raw body.
    ///
    /// Hooks fire whether or not the block exists. Right after a
    /// successful resolve, every displayed sub-block present in the
    /// registry gets its parent id set to this block (last writer wins).
    pub fn resolve(&mut self, id: &str) -> Result<(), LayoutError> {
        self.emit(LayoutEvent::BeforeBlockResolve { id: id.to_string() });
        let displayed = match self.registry.get_mut(id) {
            Some(block) => {
                block.resolve(self.renderer.as_ref())?;
                Some(
                    block
                        .displayed_block_ids()
                        .map(str::to_string)
                        .collect::<Vec<_>>(),
                )
            }
            None => {
                log::debug!("resolve requested for unknown block '{id}'");
                None
            }
        };
        if let Some(children) = displayed {
            for child_id in children {
                if let Some(child) = self.registry.get_mut(&child_id) {
                    child.set_parent_block(id);
                }
            }
        }
        self.emit(LayoutEvent::AfterBlockResolve { id: id.to_string() });
        Ok(())
    }

    /// Resolve blocks in cascade from a starting block id: the block
    /// itself, then each displayed sub-block, depth-first in list order.
    /// Declared sub-blocks missing from the registry are skipped.
    pub fn resolve_in_cascade(&mut self, id: &str) -> Result<(), LayoutError> {
        self.resolve(id)?;
        let children: Vec<String> = match self.registry.get(id) {
            Some(block) => block.displayed_block_ids().map(str::to_string).collect(),
            None => return Ok(()),
        };
        for child in children {
            self.resolve_in_cascade(&child)?;
        }
        Ok(())
    }

    /// Render a block and return its content, resolving it just-in-time
    /// when the cascade never reached it.
    ///
    /// Each displayed sub-block's placeholder is replaced by that block's
    /// recursively computed content; a declared-but-absent sub-block
    /// substitutes as empty. The substituted body is persisted back onto
    /// the block. Render hooks fire even for absent blocks.
    pub fn get_content(&mut self, id: &str) -> Result<String, LayoutError> {
        let children = match self.registry.get_mut(id) {
            Some(block) => {
                if !block.is_resolved() {
                    block.resolve(self.renderer.as_ref())?;
                }
                Some(
                    block
                        .displayed_block_ids()
                        .map(str::to_string)
                        .collect::<Vec<_>>(),
                )
            }
            None => None,
        };
        self.emit(LayoutEvent::BeforeBlockRender { id: id.to_string() });
        if let Some(children) = children {
            let mut body = self
                .registry
                .get(id)
                .map(|block| block.body.clone())
                .unwrap_or_default();
            for child_id in &children {
                let content = self.get_content(child_id)?;
                body = substitute_placeholder(&body, child_id, &content);
            }
            if let Some(block) = self.registry.get_mut(id) {
                block.body = body;
            }
        }
        self.emit(LayoutEvent::AfterBlockRender { id: id.to_string() });
        // re-read: render hooks may have mutated the body
        Ok(self
            .registry
            .get(id)
            .map(|block| block.body.clone())
            .unwrap_or_default())
    }

    /// Render the layout from its root block and return the composed page.
    pub fn render(&mut self) -> Result<String, LayoutError> {
        let root = self.root.clone();
        log::debug!("rendering layout from root block '{root}'");

        self.emit(LayoutEvent::BeforeLayoutResolve);
        self.resolve_in_cascade(&root)?;
        self.emit(LayoutEvent::AfterLayoutResolve);

        self.emit(LayoutEvent::BeforeLayoutRender);
        self.get_content(&root)?;
        self.emit(LayoutEvent::AfterLayoutRender);

        Ok(self
            .registry
            .get(&root)
            .map(|block| block.body.clone())
            .unwrap_or_default())
    }

    // --- block manipulation ---

    pub fn get(&self, id: &str) -> Option<&Block> {
        self.registry.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Block> {
        self.registry.get_mut(id)
    }

    /// Get or create (and register) a block configuration.
    pub fn get_or_create(&mut self, id: &str) -> &mut Block {
        let debug_enabled = self.debug_enabled;
        self.registry.get_or_insert_with(id, || {
            let mut block = Block::new(id);
            if debug_enabled {
                block.stack = Some(Backtrace::force_capture().to_string());
            }
            block
        })
    }

    /// Configure the given block id, creating the block when needed.
    /// Layout defaults fill in facet keys the call omits.
    pub fn set(&mut self, id: &str, mut config: BlockConfig) -> &mut Block {
        self.default_options.fill_into(&mut config);
        let block = self.get_or_create(id);
        config.apply_to(block);
        block
    }

    /// Configure multiple blocks at once.
    pub fn set_multiple(
        &mut self,
        configs: impl IntoIterator<Item = (String, BlockConfig)>,
    ) {
        for (id, config) in configs {
            self.set(&id, config);
        }
    }

    /// Remove the given block id from the registry.
    pub fn remove(&mut self, id: &str) -> bool {
        self.registry.remove(id)
    }

    // --- event dispatching ---

    /// Forward an event to the attached bus; a no-op without one.
    /// Events are an optional side channel, never required for rendering.
    pub fn emit(&mut self, event: LayoutEvent) {
        if let Some(bus) = self.bus.as_mut() {
            bus.emit(&event, &mut self.registry);
        }
    }

    /// Subscribe on the attached bus; a no-op without one.
    pub fn on(
        &mut self,
        filter: EventFilter,
        callback: impl FnMut(&LayoutEvent, &mut BlockRegistry) + 'static,
    ) {
        if let Some(bus) = self.bus.as_mut() {
            bus.on(filter, callback);
        }
    }

    pub fn on_before_resolve(
        &mut self,
        callback: impl FnMut(&LayoutEvent, &mut BlockRegistry) + 'static,
    ) {
        self.on(EventFilter::Kind(EventKind::BeforeLayoutResolve), callback);
    }

    pub fn on_after_resolve(
        &mut self,
        callback: impl FnMut(&LayoutEvent, &mut BlockRegistry) + 'static,
    ) {
        self.on(EventFilter::Kind(EventKind::AfterLayoutResolve), callback);
    }

    pub fn on_before_render(
        &mut self,
        callback: impl FnMut(&LayoutEvent, &mut BlockRegistry) + 'static,
    ) {
        self.on(EventFilter::Kind(EventKind::BeforeLayoutRender), callback);
    }

    pub fn on_after_render(
        &mut self,
        callback: impl FnMut(&LayoutEvent, &mut BlockRegistry) + 'static,
    ) {
        self.on(EventFilter::Kind(EventKind::AfterLayoutRender), callback);
    }

    pub fn on_before_resolve_any_block(
        &mut self,
        callback: impl FnMut(&LayoutEvent, &mut BlockRegistry) + 'static,
    ) {
        self.on(EventFilter::Kind(EventKind::BeforeBlockResolve), callback);
    }

    pub fn on_after_resolve_any_block(
        &mut self,
        callback: impl FnMut(&LayoutEvent, &mut BlockRegistry) + 'static,
    ) {
        self.on(EventFilter::Kind(EventKind::AfterBlockResolve), callback);
    }

    pub fn on_before_block_resolve(
        &mut self,
        id: impl Into<String>,
        callback: impl FnMut(&LayoutEvent, &mut BlockRegistry) + 'static,
    ) {
        self.on(
            EventFilter::Block(EventKind::BeforeBlockResolve, id.into()),
            callback,
        );
    }

    pub fn on_after_block_resolve(
        &mut self,
        id: impl Into<String>,
        callback: impl FnMut(&LayoutEvent, &mut BlockRegistry) + 'static,
    ) {
        self.on(
            EventFilter::Block(EventKind::AfterBlockResolve, id.into()),
            callback,
        );
    }

    pub fn on_before_render_any_block(
        &mut self,
        callback: impl FnMut(&LayoutEvent, &mut BlockRegistry) + 'static,
    ) {
        self.on(EventFilter::Kind(EventKind::BeforeBlockRender), callback);
    }

    pub fn on_after_render_any_block(
        &mut self,
        callback: impl FnMut(&LayoutEvent, &mut BlockRegistry) + 'static,
    ) {
        self.on(EventFilter::Kind(EventKind::AfterBlockRender), callback);
    }

    pub fn on_before_block_render(
        &mut self,
        id: impl Into<String>,
        callback: impl FnMut(&LayoutEvent, &mut BlockRegistry) + 'static,
    ) {
        self.on(
            EventFilter::Block(EventKind::BeforeBlockRender, id.into()),
            callback,
        );
    }

    pub fn on_after_block_render(
        &mut self,
        id: impl Into<String>,
        callback: impl FnMut(&LayoutEvent, &mut BlockRegistry) + 'static,
    ) {
        self.on(
            EventFilter::Block(EventKind::AfterBlockRender, id.into()),
            callback,
        );
    }

    /// The controller released its hand on the layout and will stop
    /// modifying it.
    pub fn on_controller_build_finish(
        &mut self,
        callback: impl FnMut(&LayoutEvent, &mut BlockRegistry) + 'static,
    ) {
        self.on(EventFilter::Kind(EventKind::ControllerBuildFinish), callback);
    }

    /// All transform operations are finished; fires before response
    /// forging.
    pub fn on_layout_build_finish(
        &mut self,
        callback: impl FnMut(&LayoutEvent, &mut BlockRegistry) + 'static,
    ) {
        self.on(EventFilter::Kind(EventKind::LayoutBuildFinish), callback);
    }

    // --- reference-able assets ---

    /// Declare a reference-able asset, keyed by `"alias:version"`.
    pub fn register_asset(
        &mut self,
        alias: impl Into<String>,
        path: impl Into<String>,
        version: impl Into<String>,
        target: impl Into<String>,
        first: bool,
        requires: Vec<String>,
    ) {
        let alias = alias.into();
        let version = version.into();
        let key = format!("{alias}:{version}");
        self.referenced_assets.insert(
            key,
            ReferencedAsset {
                alias,
                path: path.into(),
                version,
                target: target.into(),
                first,
                requires,
            },
        );
    }

    pub fn referenced_assets(&self) -> &BTreeMap<String, ReferencedAsset> {
        &self.referenced_assets
    }

    pub fn referenced_asset(&self, key: &str) -> Option<&ReferencedAsset> {
        self.referenced_assets.get(key)
    }

    // --- block iteration ---

    /// Traverse blocks by their displayed structure, starting from `start`:
    /// the block itself, then every declared sub-block (whether or not it
    /// exists), depth-first, with a slash-delimited path. Only meaningful
    /// once a render pass has populated the displayed lists.
    pub fn traverse_blocks_with_structure<F>(&self, start: &str, mut f: F)
    where
        F: FnMut(&str, Option<&str>, &str, BlockVisit<'_>),
    {
        let Some(root) = self.registry.get(start) else {
            return;
        };
        let path = format!("/{start}");
        f(
            start,
            None,
            &path,
            BlockVisit {
                block: Some(root),
                shown: true,
                exists: true,
            },
        );
        self.traverse_children(root, &path, &mut f);
    }

    fn traverse_children<F>(&self, block: &Block, path: &str, f: &mut F)
    where
        F: FnMut(&str, Option<&str>, &str, BlockVisit<'_>),
    {
        for displayed in &block.displayed_blocks {
            let sub = self.registry.get(&displayed.id);
            let sub_path = format!("{path}/{}", displayed.id);
            f(
                &displayed.id,
                Some(block.id()),
                &sub_path,
                BlockVisit {
                    block: sub,
                    shown: displayed.shown,
                    exists: sub.is_some(),
                },
            );
            if let Some(sub) = sub {
                self.traverse_children(sub, &sub_path, f);
            }
        }
    }

    /// Flattened, depth-first list of every block id displayed under `id`.
    pub fn displayed_ids_recursive(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(block) = self.registry.get(id) {
            for child in block.displayed_block_ids() {
                out.push(child.to_string());
                out.extend(self.displayed_ids_recursive(child));
            }
        }
        out
    }
}

impl std::fmt::Debug for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layout")
            .field("id", &self.id)
            .field("root", &self.root)
            .field("blocks", &self.registry.len())
            .field("debug_enabled", &self.debug_enabled)
            .finish()
    }
}
