use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::render::{RenderError, Renderer};
use crate::resource::{DeferredValue, Taggable, TaggedResource};

/// Data name reserved for the view context; callers may never supply it.
pub const RESERVED_DATA_NAME: &str = "block";

#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("Forbidden data name '{0}': reserved and cannot be overwritten")]
    ForbiddenDataName(String),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// A block-data value: either a literal, or deferred until just before the
/// renderer needs it.
#[derive(Debug)]
pub enum DataValue {
    Literal(Value),
    Deferred(Box<dyn DeferredValue>),
}

impl DataValue {
    /// Produce the concrete value, resolving a deferred one.
    pub fn unwrap_value(&self) -> Value {
        match self {
            DataValue::Literal(value) => value.clone(),
            DataValue::Deferred(deferred) => deferred.resolve(),
        }
    }

    /// The value's own tag contribution, when it exposes one.
    pub fn tag_contribution(&self) -> Option<TaggedResource> {
        match self {
            DataValue::Literal(_) => None,
            DataValue::Deferred(deferred) => deferred.tagged_resource(),
        }
    }
}

impl From<Value> for DataValue {
    fn from(value: Value) -> Self {
        DataValue::Literal(value)
    }
}

/// A sub-block a block has declared intent to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayedBlock {
    pub id: String,
    pub shown: bool,
}

/// An inline JS/CSS snippet attached to an asset target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineAsset {
    pub kind: String,
    pub content: String,
}

/// A render-able element of a layout.
///
/// It has a template, options, data, meta, and can get attached assets.
/// It is executed to render a portion of the whole page and can declare
/// sub-blocks to display. Its id is unique across the whole render
/// operation, enforced by the owning registry.
#[derive(Debug)]
pub struct Block {
    /// Unique id, assigned at creation and immutable after.
    id: String,
    /// The HTML content of the block. When set, the template is ignored.
    pub body: String,
    /// Mixin options; always contains a `template` entry.
    pub options: BTreeMap<String, Value>,
    /// Data injected into the view as template variables.
    pub data: BTreeMap<String, DataValue>,
    /// Mixin meta attached to the block; carries at least `from` and `etag`.
    pub meta: BTreeMap<String, Value>,
    /// target => file assets attached to this block.
    pub assets: BTreeMap<String, Vec<String>>,
    /// target => inline assets attached to this block.
    pub inline: BTreeMap<String, Vec<InlineAsset>>,
    /// Assets to promote ahead of the rest of their target.
    pub first_assets: Vec<String>,
    /// Asset requirements, `vendor-asset-alias:semver`.
    pub requires: Vec<String>,
    /// Legacy translation entries, kept only for resource tagging.
    pub intl: Vec<String>,
    /// Flips false -> true exactly once, in `resolve`.
    resolved: bool,
    /// Id of the block whose render pass most recently displayed this one.
    parent_id: Option<String>,
    /// Blocks this block has attempted to render, in display order.
    pub displayed_blocks: Vec<DisplayedBlock>,
    /// Captured call-site trace, populated only in debug mode.
    pub stack: Option<String>,
}

fn default_options() -> BTreeMap<String, Value> {
    BTreeMap::from([("template".to_string(), Value::String(String::new()))])
}

fn default_meta() -> BTreeMap<String, Value> {
    BTreeMap::from([
        ("from".to_string(), Value::Bool(false)),
        ("etag".to_string(), Value::String(String::new())),
    ])
}

impl Block {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            body: String::new(),
            options: default_options(),
            data: BTreeMap::new(),
            meta: default_meta(),
            assets: BTreeMap::new(),
            inline: BTreeMap::new(),
            first_assets: Vec::new(),
            requires: Vec::new(),
            intl: Vec::new(),
            resolved: false,
            parent_id: None,
            displayed_blocks: Vec::new(),
            stack: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Resolve the view within the block context.
    ///
    /// No-op once resolved. A non-empty `body` is kept verbatim and the
    /// template is never consulted; otherwise the renderer output for
    /// (template, unwrapped data) becomes the body. Either way the data is
    /// unwrapped first, so a reserved data name fails the resolve.
    pub fn resolve(&mut self, renderer: &dyn Renderer) -> Result<(), LayoutError> {
        if self.resolved {
            return Ok(());
        }
        self.resolved = true;
        let template = self.template();
        let data = self.unwrap_data(&[RESERVED_DATA_NAME])?;
        if self.body.is_empty() {
            log::debug!("resolving block '{}' (template: {:?})", self.id, template);
            self.body = renderer.render(template.as_deref(), &data)?;
        }
        Ok(())
    }

    /// Clear some settings of the block.
    ///
    /// `what` is `"all"` (or empty) to reset body, data, assets and
    /// options, or any combination of `template`, `data`, `options`,
    /// `assets`, `meta` (substring match, so `"template,data"` clears
    /// both). Unrecognized tokens are ignored.
    pub fn clear(&mut self, what: &str) {
        if what == "all" || what.is_empty() {
            self.body.clear();
            self.data.clear();
            self.assets.clear();
            self.options = default_options();
            return;
        }
        if what.contains("template") {
            self.options
                .insert("template".to_string(), Value::String(String::new()));
        }
        if what.contains("data") {
            self.data.clear();
        }
        if what.contains("options") {
            self.options = default_options();
        }
        if what.contains("assets") {
            self.assets.clear();
        }
        if what.contains("meta") {
            self.meta.clear();
        }
    }

    /// `template` is a file path or a module file target
    /// (`My/Module:/path/file.ext`).
    pub fn set_template(&mut self, template: impl Into<String>) -> &mut Self {
        self.options
            .insert("template".to_string(), Value::String(template.into()));
        self
    }

    /// The effective template reference, `None` when unset or empty.
    pub fn template(&self) -> Option<String> {
        match self.options.get("template") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    /// Set by the orchestrator when a parent's render pass displays this
    /// block; last writer wins.
    pub fn set_parent_block(&mut self, parent_id: impl Into<String>) {
        self.parent_id = Some(parent_id.into());
    }

    pub fn parent_block_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    /// Add inline JS/CSS content to one of the available targets.
    pub fn add_inline(
        &mut self,
        target: impl Into<String>,
        kind: impl Into<String>,
        content: impl Into<String>,
    ) {
        self.inline.entry(target.into()).or_default().push(InlineAsset {
            kind: kind.into(),
            content: content.into(),
        });
    }

    /// Attach file assets, appending per target and preserving duplicates.
    /// With `first`, the same files are also promoted via `first_assets`.
    pub fn add_assets(
        &mut self,
        assets: impl IntoIterator<Item = (String, Vec<String>)>,
        first: bool,
    ) {
        for (target, files) in assets {
            if first {
                self.first_assets.extend(files.iter().cloned());
            }
            self.assets.entry(target).or_default().extend(files);
        }
    }

    /// Add one asset requirement of the form `vendor-asset-alias:semver`,
    /// skipped when already present.
    pub fn add_asset_require(&mut self, require: impl Into<String>) {
        let require = require.into();
        if !self.requires.contains(&require) {
            self.requires.push(require);
        }
    }

    /// Add several requirements at once; no deduplication.
    pub fn extend_asset_requires(&mut self, requires: impl IntoIterator<Item = String>) {
        self.requires.extend(requires);
    }

    /// Layer defaults under the block's data: existing entries win.
    pub fn set_default_data(
        &mut self,
        defaults: impl IntoIterator<Item = (String, DataValue)>,
    ) -> &mut Self {
        for (name, value) in defaults {
            self.data.entry(name).or_insert(value);
        }
        self
    }

    /// Layer defaults under the block's meta: existing entries win.
    pub fn set_default_meta(
        &mut self,
        defaults: impl IntoIterator<Item = (String, Value)>,
    ) -> &mut Self {
        for (name, value) in defaults {
            self.meta.entry(name).or_insert(value);
        }
        self
    }

    /// Get one unwrapped data value.
    pub fn get_data(&self, name: &str) -> Option<Value> {
        self.data.get(name).map(DataValue::unwrap_value)
    }

    /// Unwrap all data attached to this block.
    ///
    /// A name listed in `excluded` that is present in the data fails with
    /// [`LayoutError::ForbiddenDataName`]; it is never silently skipped.
    pub fn unwrap_data(
        &self,
        excluded: &[&str],
    ) -> Result<BTreeMap<String, Value>, LayoutError> {
        let mut unwrapped = BTreeMap::new();
        for (name, value) in &self.data {
            if excluded.contains(&name.as_str()) {
                return Err(LayoutError::ForbiddenDataName(name.clone()));
            }
            unwrapped.insert(name.clone(), value.unwrap_value());
        }
        Ok(unwrapped)
    }

    /// Ids of the blocks this view has tried to display, in order.
    pub fn displayed_block_ids(&self) -> impl Iterator<Item = &str> {
        self.displayed_blocks.iter().map(|d| d.id.as_str())
    }

    /// True when this block declares `id` among its displayed sub-blocks.
    pub fn displays(&self, id: &str) -> bool {
        self.displayed_blocks.iter().any(|d| d.id == id)
    }

    /// Record the id of a block this view displays.
    pub fn register_displayed_block(&mut self, id: impl Into<String>, shown: bool) {
        self.displayed_blocks.push(DisplayedBlock {
            id: id.into(),
            shown,
        });
    }

    /// Insert right after the first occurrence of `after_id`, or append
    /// when it is not present.
    pub fn register_displayed_block_after(
        &mut self,
        after_id: &str,
        id: impl Into<String>,
        shown: bool,
    ) {
        let entry = DisplayedBlock {
            id: id.into(),
            shown,
        };
        match self.displayed_blocks.iter().position(|d| d.id == after_id) {
            Some(index) => self.displayed_blocks.insert(index + 1, entry),
            None => self.displayed_blocks.push(entry),
        }
    }

    /// Insert right before the first occurrence of `before_id`, or prepend
    /// when it is not present.
    pub fn register_displayed_block_before(
        &mut self,
        before_id: &str,
        id: impl Into<String>,
        shown: bool,
    ) {
        let entry = DisplayedBlock {
            id: id.into(),
            shown,
        };
        match self.displayed_blocks.iter().position(|d| d.id == before_id) {
            Some(index) => self.displayed_blocks.insert(index, entry),
            None => self.displayed_blocks.insert(0, entry),
        }
    }
}

impl Taggable for Block {
    /// Compute the resources attached to this block as a tag object.
    ///
    /// Unresolved blocks produce an empty tag.
    fn tagged_resource(&self) -> TaggedResource {
        let mut res = TaggedResource::new();
        if !self.resolved {
            return res;
        }
        res.add_resource(self.id.as_str());
        if let Some(template) = self.template() {
            res.add_resource_as(template, "template");
        }
        for (target, assets) in &self.assets {
            for (i, asset) in assets.iter().enumerate() {
                if asset.is_empty() {
                    continue;
                }
                res.add_resource(target.as_str());
                res.add_resource(i as u64);
                res.add_resource_as(asset.as_str(), "asset");
            }
        }
        for (i, intl) in self.intl.iter().enumerate() {
            res.add_resource(i as u64);
            res.add_resource_as(intl.as_str(), "intl");
        }
        for (name, data) in &self.data {
            match data.tag_contribution() {
                Some(tag) => res.add_tagged_resource(tag, name),
                None => res.add_named_resource(data.unwrap_value(), "po", Some(name)),
            }
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{RecordingRenderer, RenderLog};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn displayed_ids(block: &Block) -> Vec<&str> {
        block.displayed_block_ids().collect()
    }

    #[test]
    fn resolve_is_idempotent_and_invokes_the_renderer_once() {
        let log = RenderLog::default();
        let renderer = RecordingRenderer::new(log.clone()).with_body("nav.html", "<nav/>");

        let mut block = Block::new("nav");
        block.set_template("nav.html");
        block.resolve(&renderer).unwrap();
        block.resolve(&renderer).unwrap();

        assert_eq!(block.body, "<nav/>");
        assert!(block.is_resolved());
        assert_eq!(log.entries(), vec!["nav.html"]);
    }

    #[test]
    fn preset_body_skips_the_renderer_but_still_resolves() {
        let log = RenderLog::default();
        let renderer = RecordingRenderer::new(log.clone());

        let mut block = Block::new("static");
        block.set_template("ignored.html");
        block.body = "<p>literal</p>".to_string();
        block.resolve(&renderer).unwrap();

        assert!(block.is_resolved());
        assert_eq!(block.body, "<p>literal</p>");
        assert_eq!(log.entries(), Vec::<String>::new());
    }

    #[test]
    fn reserved_data_name_fails_the_resolve() {
        let renderer = RecordingRenderer::new(RenderLog::default());
        let mut block = Block::new("bad");
        block
            .data
            .insert("block".to_string(), json!("oops").into());

        let result = block.resolve(&renderer);
        assert!(matches!(result, Err(LayoutError::ForbiddenDataName(name)) if name == "block"));
        // resolved flipped before the failure: the transition happens once
        assert!(block.is_resolved());
    }

    #[test]
    fn unwrap_data_without_reserved_name_returns_everything() {
        let mut block = Block::new("ok");
        block.data.insert("title".to_string(), json!("hello").into());
        block.data.insert("count".to_string(), json!(2).into());

        let data = block.unwrap_data(&[RESERVED_DATA_NAME]).unwrap();
        assert_eq!(data.get("title"), Some(&json!("hello")));
        assert_eq!(data.get("count"), Some(&json!(2)));
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn deferred_data_values_resolve_at_unwrap_time() {
        #[derive(Debug)]
        struct Now;
        impl crate::resource::DeferredValue for Now {
            fn resolve(&self) -> Value {
                json!("deferred-value")
            }
        }

        let mut block = Block::new("lazy");
        block
            .data
            .insert("when".to_string(), DataValue::Deferred(Box::new(Now)));

        assert_eq!(block.get_data("when"), Some(json!("deferred-value")));
        let data = block.unwrap_data(&[]).unwrap();
        assert_eq!(data.get("when"), Some(&json!("deferred-value")));
    }

    #[test]
    fn clear_all_keeps_meta_but_resets_the_rest() {
        let mut block = Block::new("b");
        block.body = "body".to_string();
        block.set_template("t.html");
        block.data.insert("k".to_string(), json!(1).into());
        block.assets.insert("head".to_string(), vec!["a.css".to_string()]);
        block.meta.insert("custom".to_string(), json!(true));

        block.clear("all");

        assert_eq!(block.body, "");
        assert!(block.data.is_empty());
        assert!(block.assets.is_empty());
        assert_eq!(block.template(), None);
        assert_eq!(block.meta.get("custom"), Some(&json!(true)));
    }

    #[rstest]
    #[case("data,meta", false, true, true)]
    #[case("template", true, false, false)]
    #[case("nonsense", false, false, false)]
    fn clear_resets_only_the_named_facets(
        #[case] what: &str,
        #[case] template_cleared: bool,
        #[case] data_cleared: bool,
        #[case] meta_cleared: bool,
    ) {
        let mut block = Block::new("b");
        block.body = "body".to_string();
        block.set_template("t.html");
        block.data.insert("k".to_string(), json!(1).into());
        block.meta.insert("m".to_string(), json!(2));

        block.clear(what);

        assert_eq!(block.body, "body");
        assert_eq!(block.template().is_none(), template_cleared);
        assert_eq!(block.data.is_empty(), data_cleared);
        assert_eq!(block.meta.is_empty(), meta_cleared);
    }

    #[test]
    fn default_data_never_overrides_existing_entries() {
        let mut block = Block::new("b");
        block.data.insert("y".to_string(), json!(9).into());

        block.set_default_data([
            ("x".to_string(), DataValue::from(json!(1))),
            ("y".to_string(), DataValue::from(json!(2))),
        ]);

        assert_eq!(block.get_data("x"), Some(json!(1)));
        assert_eq!(block.get_data("y"), Some(json!(9)));
    }

    #[test]
    fn assets_append_and_promote_first() {
        let mut block = Block::new("b");
        block.add_assets([("head".to_string(), vec!["a.css".to_string()])], false);
        block.add_assets([("head".to_string(), vec!["b.css".to_string()])], true);

        assert_eq!(
            block.assets.get("head"),
            Some(&vec!["a.css".to_string(), "b.css".to_string()])
        );
        assert_eq!(block.first_assets, vec!["b.css".to_string()]);
    }

    #[test]
    fn single_requires_are_a_set_but_bulk_requires_concatenate() {
        let mut block = Block::new("b");
        block.add_asset_require("jquery:2.x");
        block.add_asset_require("jquery:2.x");
        assert_eq!(block.requires, vec!["jquery:2.x".to_string()]);

        block.extend_asset_requires(vec![
            "jquery:2.x".to_string(),
            "normalize.css:1.x".to_string(),
        ]);
        assert_eq!(
            block.requires,
            vec![
                "jquery:2.x".to_string(),
                "jquery:2.x".to_string(),
                "normalize.css:1.x".to_string()
            ]
        );
    }

    #[test]
    fn add_inline_appends_to_the_target() {
        let mut block = Block::new("b");
        block.add_inline("head", "css", "body{margin:0}");
        block.add_inline("head", "js", "init();");

        let head = block.inline.get("head").unwrap();
        assert_eq!(head.len(), 2);
        assert_eq!(head[0].kind, "css");
        assert_eq!(head[1].content, "init();");
    }

    #[rstest]
    // after an existing anchor: a, b, d -> a, b, c, d
    #[case(&["a", "b", "d"], "b", &["a", "b", "c", "d"])]
    // missing anchor appends
    #[case(&["a", "b"], "missing", &["a", "b", "c"])]
    fn register_displayed_block_after_inserts_or_appends(
        #[case] initial: &[&str],
        #[case] anchor: &str,
        #[case] expected: &[&str],
    ) {
        let mut block = Block::new("parent");
        for id in initial {
            block.register_displayed_block(*id, true);
        }
        block.register_displayed_block_after(anchor, "c", true);
        assert_eq!(displayed_ids(&block), expected);
    }

    #[rstest]
    #[case(&["a", "b"], "b", &["a", "c", "b"])]
    // missing anchor prepends
    #[case(&["a", "b"], "missing", &["c", "a", "b"])]
    fn register_displayed_block_before_inserts_or_prepends(
        #[case] initial: &[&str],
        #[case] anchor: &str,
        #[case] expected: &[&str],
    ) {
        let mut block = Block::new("parent");
        for id in initial {
            block.register_displayed_block(*id, true);
        }
        block.register_displayed_block_before(anchor, "c", true);
        assert_eq!(displayed_ids(&block), expected);
    }

    #[test]
    fn unresolved_blocks_tag_empty() {
        let mut block = Block::new("b");
        block.set_template("t.html");
        block.add_assets([("head".to_string(), vec!["a.css".to_string()])], false);
        assert!(block.tagged_resource().is_empty());
    }

    #[test]
    fn resolved_blocks_tag_id_template_and_assets() {
        let renderer = RecordingRenderer::new(RenderLog::default()).with_body("t.html", "x");
        let mut block = Block::new("b");
        block.set_template("t.html");
        block.add_assets([("head".to_string(), vec!["a.css".to_string()])], false);
        block.resolve(&renderer).unwrap();

        let tag = block.tagged_resource();
        assert!(!tag.is_empty());
        let values: Vec<String> = tag
            .entries()
            .iter()
            .filter_map(|e| match e {
                crate::resource::ResourceEntry::Plain { value, .. } => {
                    value.as_str().map(str::to_string)
                }
                _ => None,
            })
            .collect();
        assert!(values.contains(&"b".to_string()));
        assert!(values.contains(&"t.html".to_string()));
        assert!(values.contains(&"a.css".to_string()));
    }
}
