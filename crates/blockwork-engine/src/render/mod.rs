//! The renderer seam: turning a template reference plus a data mapping
//! into a string.
//!
//! The engine itself never interprets templates; blocks call through the
//! [`Renderer`] trait. Two implementations ship with the crate:
//! [`FileExtRenderer`] multiplexes over registered engines by file
//! extension, and [`TextTemplateRenderer`] is a minimal `{{ name }}`
//! interpolating engine used by the CLI and tests.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

/// The unwrapped data mapping handed to a renderer.
pub type DataMap = BTreeMap<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("No renderer registered for extension '{0}'")]
    UnknownExtension(String),
    #[error("Template reference has no extension: {0}")]
    MissingExtension(String),
    #[error("Template not found: {0}")]
    TemplateNotFound(PathBuf),
    #[error("Failed to read template {path}: {source}")]
    TemplateRead {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A template-execution engine.
///
/// `template` is `None` for blocks that have neither a literal body nor a
/// template; such blocks resolve to an empty body. Rendering must be pure
/// from the engine's point of view.
pub trait Renderer {
    fn render(&self, template: Option<&str>, data: &DataMap) -> Result<String, RenderError>;
}

/// Strip the module qualifier from a template reference.
///
/// References are either plain paths (`blocks/nav.html`) or
/// module-qualified (`My/Module:/blocks/nav.html`).
pub fn template_path(template: &str) -> &str {
    match template.split_once(':') {
        Some((_, path)) => path.trim_start_matches('/'),
        None => template,
    }
}

/// Dispatches to a registered engine based on the template's extension.
#[derive(Default)]
pub struct FileExtRenderer {
    renderers: BTreeMap<String, Box<dyn Renderer>>,
}

impl FileExtRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, ext: impl Into<String>, renderer: Box<dyn Renderer>) {
        self.renderers.insert(ext.into(), renderer);
    }
}

impl Renderer for FileExtRenderer {
    fn render(&self, template: Option<&str>, data: &DataMap) -> Result<String, RenderError> {
        let Some(template) = template else {
            return Ok(String::new());
        };
        let ext = Path::new(template_path(template))
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| RenderError::MissingExtension(template.to_string()))?;
        match self.renderers.get(ext) {
            Some(renderer) => renderer.render(Some(template), data),
            None => Err(RenderError::UnknownExtension(ext.to_string())),
        }
    }
}

impl std::fmt::Debug for FileExtRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileExtRenderer")
            .field("extensions", &self.renderers.keys().collect::<Vec<_>>())
            .finish()
    }
}

static VAR_PATTERN: OnceLock<Regex> = OnceLock::new();

fn var_pattern() -> &'static Regex {
    VAR_PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.]*)\s*\}\}").expect("Invalid variable regex")
    })
}

/// A small text-template engine: loads the template file under `root` and
/// interpolates `{{ name }}` variables from the data map.
///
/// String values are HTML-escaped; other JSON values are serialized as-is;
/// missing names interpolate to nothing. Placeholder comments pass through
/// untouched for the layout to substitute later.
#[derive(Debug, Clone)]
pub struct TextTemplateRenderer {
    root: PathBuf,
}

impl TextTemplateRenderer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn interpolate(&self, source: &str, data: &DataMap) -> String {
        var_pattern()
            .replace_all(source, |caps: &regex::Captures| {
                match data.get(&caps[1]) {
                    Some(Value::String(s)) => html_escape::encode_text(s).into_owned(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                }
            })
            .into_owned()
    }
}

impl Renderer for TextTemplateRenderer {
    fn render(&self, template: Option<&str>, data: &DataMap) -> Result<String, RenderError> {
        let Some(template) = template else {
            return Ok(String::new());
        };
        let path = self.root.join(template_path(template));
        if !path.exists() {
            return Err(RenderError::TemplateNotFound(path));
        }
        let source =
            fs::read_to_string(&path).map_err(|source| RenderError::TemplateRead { path, source })?;
        Ok(self.interpolate(&source, data))
    }
}
