//! Tagged resources: the identifiers a resolved block contributes to
//! HTTP-cache signature computation.
//!
//! The engine only accumulates identifiers; turning a [`TaggedResource`]
//! into an actual ETag is the caller's business. Entries carry a `kind`
//! discriminator (`"po"` for plain values, `"template"`, `"asset"`,
//! `"intl"`) so signing tools can weigh them differently.

use serde::Serialize;
use serde_json::Value;

/// An accumulated, ordered set of cache-relevant identifiers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaggedResource {
    entries: Vec<ResourceEntry>,
}

/// One identifier inside a [`TaggedResource`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ResourceEntry {
    Plain {
        value: Value,
        kind: String,
        name: Option<String>,
    },
    /// A nested tag contributed by a data value that knows how to tag itself.
    Nested {
        name: String,
        resource: TaggedResource,
    },
}

impl TaggedResource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ResourceEntry] {
        &self.entries
    }

    /// Add a plain value under the default `"po"` kind.
    pub fn add_resource(&mut self, value: impl Into<Value>) {
        self.add_named_resource(value, "po", None);
    }

    /// Add a plain value under an explicit kind.
    pub fn add_resource_as(&mut self, value: impl Into<Value>, kind: &str) {
        self.add_named_resource(value, kind, None);
    }

    pub fn add_named_resource(
        &mut self,
        value: impl Into<Value>,
        kind: &str,
        name: Option<&str>,
    ) {
        self.entries.push(ResourceEntry::Plain {
            value: value.into(),
            kind: kind.to_string(),
            name: name.map(str::to_string),
        });
    }

    /// Fold another tag in, keyed by the data entry name it came from.
    pub fn add_tagged_resource(&mut self, resource: TaggedResource, name: &str) {
        self.entries.push(ResourceEntry::Nested {
            name: name.to_string(),
            resource,
        });
    }
}

/// Implemented by anything that can describe itself as cache-relevant
/// identifiers. Blocks implement it; data values may.
pub trait Taggable {
    fn tagged_resource(&self) -> TaggedResource;
}

/// A deferred block-data value, resolved just before being handed to the
/// renderer. The closed counterpart of the original's "unwrap if
/// unwrappable" capability probe.
pub trait DeferredValue: std::fmt::Debug {
    /// Produce the concrete value.
    fn resolve(&self) -> Value;

    /// Cache-relevant identifiers for this value, if it has any.
    fn tagged_resource(&self) -> Option<TaggedResource> {
        None
    }
}
