//! Declarative entity extraction from HTML-like documents
//!
//! Target types describe their fields once (where each value lives, how to
//! clean and convert it, whether it may be missing) and the engine fills
//! fresh instances from any document that implements [`Element`]:
//! - scalar and list values from element text or attributes
//! - URL-attribute fields (`src` by default)
//! - regex-gated conditional fields
//! - nested entities, one or many, at any depth
//!
//! ```ignore
//! let product: Product = Extractor::new().extract_html(html)?;
//! ```

pub mod config;
pub mod convert;
pub mod dom;
pub mod engine;
pub mod error;
pub mod factory;
pub mod schema;
pub mod strategy;

pub use config::ExtractorConfig;
pub use convert::{ConversionRegistry, Converter, FromValue, Transformer, Value};
pub use dom::{Element, HtmlDocument, HtmlElement};
pub use engine::Extractor;
pub use error::{ConversionError, ExtractError, FieldRef, PathError, Result};
pub use schema::{DescriptorRegistry, Entity, EntityDescriptor, SchemaBuilder};
