//! Entity metadata: what to extract, from where, and how to store it
//!
//! An [`Entity`] declares its fields once in [`Entity::describe`]; the result
//! is an immutable [`EntityDescriptor`] that the engine interprets against a
//! document.

mod builder;
mod registry;

pub use builder::{FieldDecl, NestedDecl, NestedOutput, NestedTarget, SchemaBuilder};
pub use registry::DescriptorRegistry;

use std::fmt;

use regex::Regex;

use crate::convert::{ConversionRegistry, Pipeline, Value};
use crate::dom::Element;
use crate::engine::Extractor;
use crate::error::{ConversionError, ExtractError, FieldRef, Result};

/// A type that can be extracted from a document.
///
/// ```ignore
/// #[derive(Default)]
/// struct Product {
///     title: String,
///     price: f64,
///     tags: Vec<String>,
/// }
///
/// impl Entity for Product {
///     const NAME: &'static str = "Product";
///
///     fn describe(schema: &mut SchemaBuilder<'_, Self>) {
///         schema.field("title", "//h1").transform("trim").set(|p, v: String| p.title = v);
///         schema
///             .field("price", "//span[@class='price']")
///             .transform("digits")
///             .convert("float")
///             .set(|p, v: f64| p.price = v);
///         schema.list("tags", "//li[@class='tag']").set(|p, v: Vec<String>| p.tags = v);
///     }
/// }
/// ```
pub trait Entity: Default + Send + 'static {
    /// Class name used in error messages and logs.
    const NAME: &'static str;

    /// Declare the fields, in extraction order.
    fn describe(schema: &mut SchemaBuilder<'_, Self>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Scalar,
    List,
}

/// One regex-gated alternative of a conditional field.
#[derive(Debug, Clone)]
pub struct ConditionalRule {
    pub(crate) pattern: Regex,
    pub(crate) then_path: String,
}

impl ConditionalRule {
    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    /// Path template; `{name}` is filled from the named capture group.
    pub fn then_path(&self) -> &str {
        &self.then_path
    }
}

#[derive(Debug, Clone)]
pub struct ConditionalSpec {
    pub(crate) guard_path: String,
    pub(crate) rules: Vec<ConditionalRule>,
}

impl ConditionalSpec {
    pub fn guard_path(&self) -> &str {
        &self.guard_path
    }

    pub fn rules(&self) -> &[ConditionalRule] {
        &self.rules
    }
}

/// Which extraction strategy serves a field.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// Element text or attribute, one value or a list.
    Value,
    /// An attribute holding a resource location (`src` unless overridden).
    Url,
    /// The first rule whose pattern matches the guard text picks the path.
    Conditional(ConditionalSpec),
    /// Another entity, extracted with the matched element as its root.
    Nested { class: &'static str },
}

pub(crate) type Assign<E> = Box<dyn Fn(&mut E, Value) -> std::result::Result<(), ConversionError> + Send + Sync>;

/// Nested extraction plus assignment, with the nested type erased.
pub(crate) trait NestedBinding<E>: Send + Sync {
    fn populate(
        &self,
        engine: &Extractor,
        entity: &mut E,
        field: &FieldDescriptor<E>,
        root: &dyn Element,
        depth: usize,
    ) -> Result<()>;
}

pub(crate) enum FieldBinding<E> {
    Value { pipeline: Pipeline, assign: Assign<E> },
    Nested(Box<dyn NestedBinding<E>>),
}

/// A single declared field of an entity.
pub struct FieldDescriptor<E> {
    pub(crate) class: &'static str,
    pub(crate) name: &'static str,
    pub(crate) path: Option<String>,
    pub(crate) attribute: Option<String>,
    pub(crate) cardinality: Cardinality,
    pub(crate) optional: bool,
    pub(crate) kind: FieldKind,
    pub(crate) binding: FieldBinding<E>,
}

impl<E> FieldDescriptor<E> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Lookup path; conditional fields may have none.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn attribute(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn is_nested(&self) -> bool {
        matches!(self.kind, FieldKind::Nested { .. })
    }

    /// Conversion steps, `None` for nested fields.
    pub fn pipeline(&self) -> Option<&Pipeline> {
        match &self.binding {
            FieldBinding::Value { pipeline, .. } => Some(pipeline),
            FieldBinding::Nested(_) => None,
        }
    }

    pub fn location(&self) -> FieldRef {
        FieldRef::new(self.class, self.name)
    }
}

impl<E> fmt::Debug for FieldDescriptor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("field", &self.location())
            .field("path", &self.path)
            .field("attribute", &self.attribute)
            .field("cardinality", &self.cardinality)
            .field("optional", &self.optional)
            .field("kind", &self.kind)
            .field("pipeline", &self.pipeline())
            .finish()
    }
}

/// Ordered field table of one entity type.
pub struct EntityDescriptor<E> {
    class: &'static str,
    fields: Vec<FieldDescriptor<E>>,
}

impl<E: Entity> EntityDescriptor<E> {
    /// Run `E::describe` and validate the declarations.
    pub fn build(conversions: &ConversionRegistry) -> Result<Self> {
        let mut schema = SchemaBuilder::new(conversions);
        E::describe(&mut schema);
        let fields = schema.finish().map_err(|reason| ExtractError::Schema {
            class: E::NAME,
            reason,
        })?;
        Ok(Self {
            class: E::NAME,
            fields,
        })
    }
}

impl<E> EntityDescriptor<E> {
    pub fn class(&self) -> &'static str {
        self.class
    }

    pub fn fields(&self) -> &[FieldDescriptor<E>] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor<E>> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<E> fmt::Debug for EntityDescriptor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("class", &self.class)
            .field("fields", &self.fields)
            .finish()
    }
}
