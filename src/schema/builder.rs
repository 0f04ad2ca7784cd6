//! Fluent field declarations

use std::collections::HashSet;
use std::marker::PhantomData;

use regex::Regex;

use super::{
    Cardinality, ConditionalRule, ConditionalSpec, Entity, FieldBinding, FieldDescriptor,
    FieldKind, NestedBinding,
};
use crate::convert::{ConversionRegistry, FromValue, Value, IDENTITY, STRING};
use crate::dom::Element;
use crate::engine::Extractor;
use crate::error::Result;
use crate::strategy;

/// Collects the field declarations of one entity.
///
/// Problems (unknown step keys, bad patterns, duplicate names) are collected
/// and reported together when the descriptor is built.
pub struct SchemaBuilder<'r, E> {
    conversions: &'r ConversionRegistry,
    fields: Vec<FieldDescriptor<E>>,
    names: HashSet<&'static str>,
    problems: Vec<String>,
}

impl<'r, E: Entity> SchemaBuilder<'r, E> {
    pub(crate) fn new(conversions: &'r ConversionRegistry) -> Self {
        Self {
            conversions,
            fields: Vec::new(),
            names: HashSet::new(),
            problems: Vec::new(),
        }
    }

    /// Step table the field keys resolve against.
    pub fn conversions(&self) -> &ConversionRegistry {
        self.conversions
    }

    /// A single value read from the first element matching `path`.
    pub fn field<'s>(&'s mut self, name: &'static str, path: &str) -> FieldDecl<'s, 'r, E> {
        FieldDecl::new(self, name, Some(path), Cardinality::Scalar, DeclKind::Value)
    }

    /// One value per element matching `path`, in document order.
    pub fn list<'s>(&'s mut self, name: &'static str, path: &str) -> FieldDecl<'s, 'r, E> {
        FieldDecl::new(self, name, Some(path), Cardinality::List, DeclKind::Value)
    }

    /// The `src` attribute (or another, via [`FieldDecl::attribute`]) of the
    /// first element matching `path`.
    pub fn url<'s>(&'s mut self, name: &'static str, path: &str) -> FieldDecl<'s, 'r, E> {
        let mut decl = FieldDecl::new(self, name, Some(path), Cardinality::Scalar, DeclKind::Url);
        decl.attribute = Some("src".to_string());
        decl
    }

    /// A value whose location depends on the text at `guard_path`.
    ///
    /// Add alternatives with [`FieldDecl::rule`]; [`FieldDecl::fallback`]
    /// names the path used when no rule matches.
    pub fn conditional<'s>(
        &'s mut self,
        name: &'static str,
        guard_path: &str,
    ) -> FieldDecl<'s, 'r, E> {
        FieldDecl::new(
            self,
            name,
            None,
            Cardinality::Scalar,
            DeclKind::Conditional {
                guard_path: guard_path.to_string(),
                rules: Vec::new(),
            },
        )
    }

    /// Another entity extracted from the element(s) matching `path`.
    ///
    /// The setter's argument type picks the cardinality: `C` or `Option<C>`
    /// for one, `Vec<C>` for many.
    pub fn nested<'s, C: Entity>(
        &'s mut self,
        name: &'static str,
        path: &str,
    ) -> NestedDecl<'s, 'r, E, C> {
        NestedDecl {
            schema: self,
            name,
            path: path.to_string(),
            optional: false,
            _nested: PhantomData,
        }
    }

    fn push(&mut self, field: FieldDescriptor<E>) {
        self.fields.push(field);
    }

    fn claim(&mut self, name: &'static str, mut problems: Vec<String>) -> bool {
        if name.trim().is_empty() {
            problems.push("field name is empty".to_string());
        } else if !self.names.insert(name) {
            problems.push("declared more than once".to_string());
        }
        let ok = problems.is_empty();
        self.problems
            .extend(problems.into_iter().map(|p| format!("field `{name}`: {p}")));
        ok
    }

    pub(crate) fn finish(self) -> std::result::Result<Vec<FieldDescriptor<E>>, String> {
        if self.problems.is_empty() {
            Ok(self.fields)
        } else {
            Err(self.problems.join("; "))
        }
    }
}

enum DeclKind {
    Value,
    Url,
    Conditional {
        guard_path: String,
        rules: Vec<(String, String)>,
    },
}

/// A value, list, URL or conditional field being declared.
#[must_use = "a field is only declared once `.set(...)` is called"]
pub struct FieldDecl<'s, 'r, E> {
    schema: &'s mut SchemaBuilder<'r, E>,
    name: &'static str,
    path: Option<String>,
    attribute: Option<String>,
    cardinality: Cardinality,
    optional: bool,
    transformer: String,
    converter: String,
    kind: DeclKind,
    problems: Vec<String>,
}

impl<'s, 'r, E: Entity> FieldDecl<'s, 'r, E> {
    fn new(
        schema: &'s mut SchemaBuilder<'r, E>,
        name: &'static str,
        path: Option<&str>,
        cardinality: Cardinality,
        kind: DeclKind,
    ) -> Self {
        Self {
            schema,
            name,
            path: path.map(str::to_string),
            attribute: None,
            cardinality,
            optional: false,
            transformer: IDENTITY.to_string(),
            converter: STRING.to_string(),
            kind,
            problems: Vec::new(),
        }
    }

    /// No match yields an absent value instead of an error.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Read this attribute instead of the element text.
    pub fn attribute(mut self, name: &str) -> Self {
        self.attribute = Some(name.to_string());
        self
    }

    /// Transformer key (default `identity`).
    pub fn transform(mut self, key: &str) -> Self {
        self.transformer = key.to_string();
        self
    }

    /// Converter key (default `string`).
    pub fn convert(mut self, key: &str) -> Self {
        self.converter = key.to_string();
        self
    }

    /// Conditional alternative: when `pattern` matches the guard text, read
    /// from `then_path`. Rules are tried in declaration order.
    pub fn rule(mut self, pattern: &str, then_path: &str) -> Self {
        match &mut self.kind {
            DeclKind::Conditional { rules, .. } => {
                rules.push((pattern.to_string(), then_path.to_string()));
            }
            _ => self.problems.push("rules need a conditional field".to_string()),
        }
        self
    }

    /// Conditional path used when no rule matches.
    pub fn fallback(mut self, path: &str) -> Self {
        match self.kind {
            DeclKind::Conditional { .. } => self.path = Some(path.to_string()),
            _ => self.problems.push("fallback needs a conditional field".to_string()),
        }
        self
    }

    /// Finish the declaration with the setter that stores the value.
    pub fn set<T, F>(self, setter: F)
    where
        T: FromValue + 'static,
        F: Fn(&mut E, T) + Send + Sync + 'static,
    {
        let Self {
            schema,
            name,
            path,
            attribute,
            cardinality,
            optional,
            transformer,
            converter,
            kind,
            mut problems,
        } = self;

        if let Some(path) = &path {
            if path.trim().is_empty() {
                problems.push("path is empty".to_string());
            }
        }
        if attribute.as_deref().is_some_and(|a| a.trim().is_empty()) {
            problems.push("attribute name is empty".to_string());
        }
        if optional && T::from_value(Value::Null).is_err() {
            problems.push(
                "optional field needs a setter type that can be absent, such as `Option<Url>`"
                    .to_string(),
            );
        }

        let kind = match kind {
            DeclKind::Value => FieldKind::Value,
            DeclKind::Url => FieldKind::Url,
            DeclKind::Conditional { guard_path, rules } => {
                if guard_path.trim().is_empty() {
                    problems.push("guard path is empty".to_string());
                }
                if rules.is_empty() {
                    problems.push("conditional field has no rules".to_string());
                }
                let rules = rules
                    .into_iter()
                    .filter_map(|(pattern, then_path)| match Regex::new(&pattern) {
                        Ok(pattern) => Some(ConditionalRule { pattern, then_path }),
                        Err(e) => {
                            problems.push(format!("invalid pattern `{pattern}`: {e}"));
                            None
                        }
                    })
                    .collect();
                FieldKind::Conditional(ConditionalSpec { guard_path, rules })
            }
        };

        let pipeline = match schema.conversions.pipeline(&transformer, &converter) {
            Ok(pipeline) => Some(pipeline),
            Err(e) => {
                problems.push(e.to_string());
                None
            }
        };

        if !schema.claim(name, problems) {
            return;
        }
        let Some(pipeline) = pipeline else {
            return;
        };

        schema.push(FieldDescriptor {
            class: E::NAME,
            name,
            path,
            attribute,
            cardinality,
            optional,
            kind,
            binding: FieldBinding::Value {
                pipeline,
                assign: Box::new(move |entity, value| {
                    setter(entity, T::from_value(value)?);
                    Ok(())
                }),
            },
        });
    }
}

/// What a nested lookup produced.
#[derive(Debug)]
pub enum NestedOutput<C> {
    Absent,
    One(C),
    Many(Vec<C>),
}

/// Setter argument types for nested fields.
pub trait NestedTarget<C>: Sized {
    const CARDINALITY: Cardinality;

    fn from_nested(output: NestedOutput<C>) -> Self;
}

/// An absent optional entity becomes `C::default()`.
impl<C: Entity> NestedTarget<C> for C {
    const CARDINALITY: Cardinality = Cardinality::Scalar;

    fn from_nested(output: NestedOutput<C>) -> Self {
        match output {
            NestedOutput::One(entity) => entity,
            NestedOutput::Many(entities) => entities.into_iter().next().unwrap_or_default(),
            NestedOutput::Absent => C::default(),
        }
    }
}

impl<C: Entity> NestedTarget<C> for Option<C> {
    const CARDINALITY: Cardinality = Cardinality::Scalar;

    fn from_nested(output: NestedOutput<C>) -> Self {
        match output {
            NestedOutput::One(entity) => Some(entity),
            NestedOutput::Many(entities) => entities.into_iter().next(),
            NestedOutput::Absent => None,
        }
    }
}

impl<C: Entity> NestedTarget<C> for Vec<C> {
    const CARDINALITY: Cardinality = Cardinality::List;

    fn from_nested(output: NestedOutput<C>) -> Self {
        match output {
            NestedOutput::One(entity) => vec![entity],
            NestedOutput::Many(entities) => entities,
            NestedOutput::Absent => Vec::new(),
        }
    }
}

/// A nested-entity field being declared.
#[must_use = "a field is only declared once `.set(...)` is called"]
pub struct NestedDecl<'s, 'r, E, C> {
    schema: &'s mut SchemaBuilder<'r, E>,
    name: &'static str,
    path: String,
    optional: bool,
    _nested: PhantomData<fn() -> C>,
}

impl<E: Entity, C: Entity> NestedDecl<'_, '_, E, C> {
    /// A missing or failing nested entity is left absent instead of failing
    /// the parent. For lists, failing items are dropped.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn set<T, F>(self, setter: F)
    where
        T: NestedTarget<C> + 'static,
        F: Fn(&mut E, T) + Send + Sync + 'static,
    {
        let mut problems = Vec::new();
        if self.path.trim().is_empty() {
            problems.push("path is empty".to_string());
        }
        if !self.schema.claim(self.name, problems) {
            return;
        }

        self.schema.push(FieldDescriptor {
            class: E::NAME,
            name: self.name,
            path: Some(self.path),
            attribute: None,
            cardinality: T::CARDINALITY,
            optional: self.optional,
            kind: FieldKind::Nested { class: C::NAME },
            binding: FieldBinding::Nested(Box::new(NestedSlot::<C, T, F> {
                setter,
                _types: PhantomData,
            })),
        });
    }
}

struct NestedSlot<C, T, F> {
    setter: F,
    _types: PhantomData<fn() -> (C, T)>,
}

impl<E, C, T, F> NestedBinding<E> for NestedSlot<C, T, F>
where
    E: Entity,
    C: Entity,
    T: NestedTarget<C> + 'static,
    F: Fn(&mut E, T) + Send + Sync,
{
    fn populate(
        &self,
        engine: &Extractor,
        entity: &mut E,
        field: &FieldDescriptor<E>,
        root: &dyn Element,
        depth: usize,
    ) -> Result<()> {
        let output = strategy::nested::extract::<E, C>(engine, field, root, depth)?;
        (self.setter)(entity, T::from_nested(output));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractError;
    use crate::schema::EntityDescriptor;

    #[derive(Default)]
    struct Review {
        stars: u8,
    }

    impl Entity for Review {
        const NAME: &'static str = "Review";

        fn describe(schema: &mut SchemaBuilder<'_, Self>) {
            schema
                .field("stars", "span[@class='stars']")
                .convert("integer")
                .set(|r, v: u8| r.stars = v);
        }
    }

    #[derive(Default)]
    struct Product {
        title: String,
        image: Option<String>,
        reviews: Vec<Review>,
        best: Option<Review>,
        shipping: String,
    }

    impl Entity for Product {
        const NAME: &'static str = "Product";

        fn describe(schema: &mut SchemaBuilder<'_, Self>) {
            schema.field("title", "//h1").transform("trim").set(|p, v: String| p.title = v);
            schema.url("image", "//img").optional().set(|p, v: Option<String>| p.image = v);
            schema.nested::<Review>("reviews", "//li").set(|p, v: Vec<Review>| p.reviews = v);
            schema
                .nested::<Review>("best", "//li[1]")
                .optional()
                .set(|p, v: Option<Review>| p.best = v);
            schema
                .conditional("shipping", "//p[@class='ship']")
                .rule("(?i)express", "//span[@class='express']")
                .fallback("//span[@class='standard']")
                .set(|p, v: String| p.shipping = v);
        }
    }

    #[test]
    fn test_descriptor_preserves_declaration_order() {
        let descriptor = EntityDescriptor::<Product>::build(&ConversionRegistry::default()).unwrap();
        let names: Vec<&str> = descriptor.fields().iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["title", "image", "reviews", "best", "shipping"]);

        let image = descriptor.field("image").unwrap();
        assert_eq!(image.attribute(), Some("src"));
        assert!(image.is_optional());
        assert!(matches!(image.kind(), FieldKind::Url));

        let reviews = descriptor.field("reviews").unwrap();
        assert_eq!(reviews.cardinality(), Cardinality::List);
        assert!(matches!(reviews.kind(), FieldKind::Nested { class: "Review" }));
        assert!(reviews.pipeline().is_none());
        assert_eq!(descriptor.field("best").unwrap().cardinality(), Cardinality::Scalar);

        let title = descriptor.field("title").unwrap();
        assert_eq!(title.pipeline().unwrap().transformer_key(), "trim");
        assert_eq!(title.pipeline().unwrap().converter_key(), "string");
        assert_eq!(title.location().to_string(), "Product.title");

        let FieldKind::Conditional(spec) = descriptor.field("shipping").unwrap().kind() else {
            panic!("shipping should be conditional");
        };
        assert_eq!(spec.guard_path(), "//p[@class='ship']");
        assert_eq!(spec.rules().len(), 1);
        assert_eq!(descriptor.field("shipping").unwrap().path(), Some("//span[@class='standard']"));
    }

    #[derive(Default)]
    struct Broken {
        a: String,
    }

    impl Entity for Broken {
        const NAME: &'static str = "Broken";

        fn describe(schema: &mut SchemaBuilder<'_, Self>) {
            schema.field("a", "//a").transform("rot13").set(|b, v: String| b.a = v);
            schema.field("a", "//b").set(|b, v: String| b.a = v);
            schema
                .conditional("c", "//c")
                .rule("(unclosed", "//d")
                .set(|b, v: String| b.a = v);
            schema.list("d", "//d").rule("x", "//e").set(|b, v: String| b.a = v);
        }
    }

    #[test]
    fn test_schema_problems_are_collected() {
        let err = EntityDescriptor::<Broken>::build(&ConversionRegistry::default()).unwrap_err();
        let ExtractError::Schema { class, reason } = err else {
            panic!("expected a schema error");
        };
        assert_eq!(class, "Broken");
        assert!(reason.contains("no transformer registered under `rot13`"), "{reason}");
        assert!(reason.contains("field `a`: declared more than once"), "{reason}");
        assert!(reason.contains("invalid pattern `(unclosed`"), "{reason}");
        assert!(reason.contains("field `d`: rules need a conditional field"), "{reason}");
    }

    #[derive(Default)]
    struct Loose {
        link: Option<url::Url>,
    }

    impl Entity for Loose {
        const NAME: &'static str = "Loose";

        fn describe(schema: &mut SchemaBuilder<'_, Self>) {
            schema
                .url("link", "//a")
                .attribute("href")
                .optional()
                .convert("url")
                .set(|l, v: url::Url| l.link = Some(v));
            schema
                .url("image", "//img")
                .optional()
                .convert("url")
                .set(|l, v: Option<url::Url>| l.link = l.link.take().or(v));
        }
    }

    #[test]
    fn test_optional_field_needs_absent_capable_setter() {
        let err = EntityDescriptor::<Loose>::build(&ConversionRegistry::default()).unwrap_err();
        let ExtractError::Schema { reason, .. } = err else {
            panic!("expected a schema error");
        };
        assert!(reason.contains("field `link`: optional field needs a setter type"), "{reason}");
        assert!(!reason.contains("field `image`"), "{reason}");
    }

    #[test]
    fn test_nested_targets() {
        let one = || NestedOutput::One(Review { stars: 4 });
        assert_eq!(<Review as NestedTarget<Review>>::from_nested(one()).stars, 4);
        let absent = <Option<Review> as NestedTarget<Review>>::from_nested(NestedOutput::Absent);
        assert!(absent.is_none());
        assert_eq!(<Review as NestedTarget<Review>>::from_nested(NestedOutput::Absent).stars, 0);
        assert_eq!(<Vec<Review> as NestedTarget<Review>>::from_nested(one()).len(), 1);
    }
}
