//! Lifecycle events emitted while a layout resolves and renders.
//!
//! The original wire protocol is string-named (`before_block_resolve`,
//! `before_resolve_<id>`, ...). Here each lifecycle point is a variant of
//! [`LayoutEvent`]; listeners subscribe either to a kind (the "any block"
//! names) or to a kind plus a block id (the `<id>`-suffixed names).
//! [`LayoutEvent::name`] and [`LayoutEvent::scoped_name`] reproduce the
//! wire-format names for logging and interop.
//!
//! Emission is an optional side channel: a layout without an attached bus
//! renders exactly the same content.

use crate::layout::BlockRegistry;

/// One lifecycle event, carrying the block id where one applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LayoutEvent {
    BeforeLayoutResolve,
    AfterLayoutResolve,
    BeforeLayoutRender,
    AfterLayoutRender,
    BeforeBlockResolve { id: String },
    AfterBlockResolve { id: String },
    BeforeBlockRender { id: String },
    AfterBlockRender { id: String },
    /// The controller released its hand on the layout.
    ControllerBuildFinish,
    /// All transforms ran; the response is about to be forged.
    LayoutBuildFinish,
}

/// The event kind without its payload, used for subscription filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    BeforeLayoutResolve,
    AfterLayoutResolve,
    BeforeLayoutRender,
    AfterLayoutRender,
    BeforeBlockResolve,
    AfterBlockResolve,
    BeforeBlockRender,
    AfterBlockRender,
    ControllerBuildFinish,
    LayoutBuildFinish,
}

impl LayoutEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LayoutEvent::BeforeLayoutResolve => EventKind::BeforeLayoutResolve,
            LayoutEvent::AfterLayoutResolve => EventKind::AfterLayoutResolve,
            LayoutEvent::BeforeLayoutRender => EventKind::BeforeLayoutRender,
            LayoutEvent::AfterLayoutRender => EventKind::AfterLayoutRender,
            LayoutEvent::BeforeBlockResolve { .. } => EventKind::BeforeBlockResolve,
            LayoutEvent::AfterBlockResolve { .. } => EventKind::AfterBlockResolve,
            LayoutEvent::BeforeBlockRender { .. } => EventKind::BeforeBlockRender,
            LayoutEvent::AfterBlockRender { .. } => EventKind::AfterBlockRender,
            LayoutEvent::ControllerBuildFinish => EventKind::ControllerBuildFinish,
            LayoutEvent::LayoutBuildFinish => EventKind::LayoutBuildFinish,
        }
    }

    /// The block id this event is about, for per-block events.
    pub fn block_id(&self) -> Option<&str> {
        match self {
            LayoutEvent::BeforeBlockResolve { id }
            | LayoutEvent::AfterBlockResolve { id }
            | LayoutEvent::BeforeBlockRender { id }
            | LayoutEvent::AfterBlockRender { id } => Some(id),
            _ => None,
        }
    }

    /// The generic wire-format name (`before_block_resolve`, ...).
    pub fn name(&self) -> &'static str {
        match self.kind() {
            EventKind::BeforeLayoutResolve => "before_layout_resolve",
            EventKind::AfterLayoutResolve => "after_layout_resolve",
            EventKind::BeforeLayoutRender => "before_layout_render",
            EventKind::AfterLayoutRender => "after_layout_render",
            EventKind::BeforeBlockResolve => "before_block_resolve",
            EventKind::AfterBlockResolve => "after_block_resolve",
            EventKind::BeforeBlockRender => "before_block_render",
            EventKind::AfterBlockRender => "after_block_render",
            EventKind::ControllerBuildFinish => "controller_build_finish",
            EventKind::LayoutBuildFinish => "layout_build_finish",
        }
    }

    /// The id-suffixed wire-format name (`before_resolve_<id>`, ...),
    /// for per-block events only.
    pub fn scoped_name(&self) -> Option<String> {
        let id = self.block_id()?;
        let prefix = match self.kind() {
            EventKind::BeforeBlockResolve => "before_resolve",
            EventKind::AfterBlockResolve => "after_resolve",
            EventKind::BeforeBlockRender => "before_render",
            EventKind::AfterBlockRender => "after_render",
            _ => return None,
        };
        Some(format!("{prefix}_{id}"))
    }
}

/// Which events a listener wants to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    /// Every event of this kind, whatever the block.
    Kind(EventKind),
    /// Events of this kind about one specific block id.
    Block(EventKind, String),
}

impl EventFilter {
    pub fn matches(&self, event: &LayoutEvent) -> bool {
        match self {
            EventFilter::Kind(kind) => *kind == event.kind(),
            EventFilter::Block(kind, id) => {
                *kind == event.kind() && event.block_id() == Some(id.as_str())
            }
        }
    }
}

type Callback = Box<dyn FnMut(&LayoutEvent, &mut BlockRegistry)>;

struct Listener {
    filter: EventFilter,
    callback: Callback,
}

/// A callback-registration table dispatching [`LayoutEvent`]s.
///
/// Listeners receive the registry so they can mutate block state at the
/// hook points; they run synchronously, in registration order.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Listener>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(
        &mut self,
        filter: EventFilter,
        callback: impl FnMut(&LayoutEvent, &mut BlockRegistry) + 'static,
    ) {
        self.listeners.push(Listener {
            filter,
            callback: Box::new(callback),
        });
    }

    pub fn emit(&mut self, event: &LayoutEvent, registry: &mut BlockRegistry) {
        for listener in &mut self.listeners {
            if listener.filter.matches(event) {
                (listener.callback)(event, registry);
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Block;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn kind_filter_matches_any_block() {
        let filter = EventFilter::Kind(EventKind::BeforeBlockRender);
        assert!(filter.matches(&LayoutEvent::BeforeBlockRender {
            id: "nav".to_string()
        }));
        assert!(filter.matches(&LayoutEvent::BeforeBlockRender {
            id: "footer".to_string()
        }));
        assert!(!filter.matches(&LayoutEvent::AfterBlockRender {
            id: "nav".to_string()
        }));
    }

    #[test]
    fn block_filter_matches_only_its_id() {
        let filter = EventFilter::Block(EventKind::AfterBlockResolve, "nav".to_string());
        assert!(filter.matches(&LayoutEvent::AfterBlockResolve {
            id: "nav".to_string()
        }));
        assert!(!filter.matches(&LayoutEvent::AfterBlockResolve {
            id: "footer".to_string()
        }));
    }

    #[test]
    fn wire_names_match_the_original_protocol() {
        let event = LayoutEvent::BeforeBlockResolve {
            id: "nav".to_string(),
        };
        assert_eq!(event.name(), "before_block_resolve");
        assert_eq!(event.scoped_name().as_deref(), Some("before_resolve_nav"));

        assert_eq!(LayoutEvent::BeforeLayoutRender.name(), "before_layout_render");
        assert_eq!(LayoutEvent::BeforeLayoutRender.scoped_name(), None);
        assert_eq!(
            LayoutEvent::ControllerBuildFinish.name(),
            "controller_build_finish"
        );
    }

    #[test]
    fn listeners_run_in_registration_order_and_can_mutate_blocks() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();

        let first = Rc::clone(&seen);
        bus.on(EventFilter::Kind(EventKind::BeforeBlockRender), move |event, _| {
            first.borrow_mut().push(format!("first:{}", event.name()));
        });
        let second = Rc::clone(&seen);
        bus.on(
            EventFilter::Block(EventKind::BeforeBlockRender, "nav".to_string()),
            move |_, registry| {
                second.borrow_mut().push("second".to_string());
                if let Some(block) = registry.get_mut("nav") {
                    block.body = "mutated".to_string();
                }
            },
        );

        let mut registry = BlockRegistry::new();
        registry.set("nav", Block::new("nav"));
        bus.emit(
            &LayoutEvent::BeforeBlockRender {
                id: "nav".to_string(),
            },
            &mut registry,
        );

        assert_eq!(
            *seen.borrow(),
            vec!["first:before_block_render".to_string(), "second".to_string()]
        );
        assert_eq!(registry.get("nav").map(|b| b.body.as_str()), Some("mutated"));
    }

    #[test]
    fn emit_without_matching_listener_is_silent() {
        let mut bus = EventBus::new();
        let mut registry = BlockRegistry::new();
        bus.emit(&LayoutEvent::LayoutBuildFinish, &mut registry);
        assert_eq!(bus.listener_count(), 0);
    }
}
