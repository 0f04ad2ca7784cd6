//! Element lookup contract and its `scraper` implementation
//!
//! The engine only ever talks to [`Element`]; any document driver that can
//! answer path lookups, text and attribute reads can feed it. [`HtmlDocument`]
//! is the bundled driver for static HTML.

mod path;

pub use path::PathCache;

use std::fmt;
use std::sync::Arc;

use scraper::{ElementRef, Html};

use crate::error::PathError;
use path::Anchor;

/// A node in a path-addressable document tree.
///
/// Lookups are relative to the element they are called on.
pub trait Element {
    /// All elements matching `path`, in document order.
    fn find_elements(&self, path: &str) -> Result<Vec<Box<dyn Element + '_>>, PathError>;

    /// First element matching `path`.
    fn find_element(&self, path: &str) -> Result<Option<Box<dyn Element + '_>>, PathError> {
        Ok(self.find_elements(path)?.into_iter().next())
    }

    /// Text content of the element and its descendants.
    fn text(&self) -> String;

    fn attribute(&self, name: &str) -> Option<String>;

    /// Direct children with the given tag name.
    fn children_by_tag(&self, tag: &str) -> Vec<Box<dyn Element + '_>>;
}

/// A parsed HTML document.
pub struct HtmlDocument {
    html: Html,
    paths: Arc<PathCache>,
}

impl HtmlDocument {
    /// Parse a complete HTML document.
    pub fn parse(source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
            paths: Arc::new(PathCache::new()),
        }
    }

    /// Parse an HTML fragment (no implied `<head>`).
    pub fn parse_fragment(source: &str) -> Self {
        Self {
            html: Html::parse_fragment(source),
            paths: Arc::new(PathCache::new()),
        }
    }

    /// Share a compiled-path cache with other documents.
    pub fn with_path_cache(mut self, paths: Arc<PathCache>) -> Self {
        self.paths = paths;
        self
    }

    /// The document node; top-level extraction starts here.
    pub fn root(&self) -> HtmlElement<'_> {
        HtmlElement {
            anchor: Anchor::Document(&self.html),
            paths: &self.paths,
        }
    }

    pub fn html(&self) -> &Html {
        &self.html
    }

    pub fn path_cache(&self) -> &Arc<PathCache> {
        &self.paths
    }
}

impl fmt::Debug for HtmlDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HtmlDocument")
            .field("compiled_paths", &self.paths.len())
            .finish_non_exhaustive()
    }
}

/// An element (or the document node) of an [`HtmlDocument`].
#[derive(Clone, Copy)]
pub struct HtmlElement<'a> {
    anchor: Anchor<'a>,
    paths: &'a PathCache,
}

impl<'a> HtmlElement<'a> {
    /// Typed variant of [`Element::find_elements`].
    pub fn select(&self, path: &str) -> Result<Vec<HtmlElement<'a>>, PathError> {
        let compiled = self.paths.compile(path)?;
        Ok(compiled
            .evaluate(self.anchor)
            .into_iter()
            .map(|anchor| HtmlElement {
                anchor,
                paths: self.paths,
            })
            .collect())
    }

    /// Tag name, or `None` for the document node.
    pub fn tag_name(&self) -> Option<&'a str> {
        self.anchor.element().map(|el| el.value().name())
    }

    /// Outer HTML of the element.
    pub fn html(&self) -> String {
        match self.anchor {
            Anchor::Document(html) => html.root_element().html(),
            Anchor::Element(el) => el.html(),
        }
    }

    pub fn element_ref(&self) -> Option<ElementRef<'a>> {
        self.anchor.element()
    }
}

impl Element for HtmlElement<'_> {
    fn find_elements(&self, path: &str) -> Result<Vec<Box<dyn Element + '_>>, PathError> {
        Ok(self
            .select(path)?
            .into_iter()
            .map(|el| Box::new(el) as Box<dyn Element + '_>)
            .collect())
    }

    fn text(&self) -> String {
        self.anchor.string_value().trim().to_string()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.anchor.attr(name).map(String::from)
    }

    fn children_by_tag(&self, tag: &str) -> Vec<Box<dyn Element + '_>> {
        let children: Vec<ElementRef<'_>> = match self.anchor {
            Anchor::Document(html) => vec![html.root_element()],
            Anchor::Element(el) => el.children().filter_map(ElementRef::wrap).collect(),
        };
        children
            .into_iter()
            .filter(|el| el.value().name().eq_ignore_ascii_case(tag))
            .map(|el| {
                Box::new(HtmlElement {
                    anchor: Anchor::Element(el),
                    paths: self.paths,
                }) as Box<dyn Element + '_>
            })
            .collect()
    }
}

impl fmt::Debug for HtmlElement<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag_name() {
            Some(tag) => write!(f, "<{tag}>"),
            None => write!(f, "#document"),
        }
    }
}
