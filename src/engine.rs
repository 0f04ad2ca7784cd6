//! Extraction engine: walks an entity's descriptor against a document

use std::sync::Arc;

use tracing::{debug_span, trace};

use crate::config::ExtractorConfig;
use crate::convert::{ConversionRegistry, Pipeline, Value};
use crate::dom::{Element, HtmlDocument};
use crate::error::{ExtractError, Result};
use crate::factory;
use crate::schema::{DescriptorRegistry, Entity, FieldBinding, FieldDescriptor};
use crate::strategy::{self, RawValue};

/// Populates entities from documents.
///
/// Cheap to clone; clones share the descriptor cache. Safe to use from
/// several threads at once.
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    registry: Arc<DescriptorRegistry>,
    config: ExtractorConfig,
}

impl Extractor {
    /// An extractor with the built-in conversion steps.
    pub fn new() -> Self {
        Self::default()
    }

    /// An extractor resolving field steps against `conversions`.
    pub fn with_conversions(conversions: ConversionRegistry) -> Self {
        Self::with_registry(Arc::new(DescriptorRegistry::with_conversions(conversions)))
    }

    /// An extractor sharing an existing descriptor cache.
    pub fn with_registry(registry: Arc<DescriptorRegistry>) -> Self {
        Self {
            registry,
            config: ExtractorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ExtractorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &Arc<DescriptorRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract `E` with `root` as the base for every field path.
    pub fn extract<E: Entity>(&self, root: &dyn Element) -> Result<E> {
        self.extract_at(root, 0)
    }

    /// Parse `html` as a document and extract `E` from its root.
    pub fn extract_html<E: Entity>(&self, html: &str) -> Result<E> {
        let document = HtmlDocument::parse(html);
        self.extract(&document.root())
    }

    /// One `E` per element matching `path`, in document order.
    pub fn extract_all<E: Entity>(&self, root: &dyn Element, path: &str) -> Result<Vec<E>> {
        root.find_elements(path)?
            .iter()
            .map(|element| self.extract(element.as_ref()))
            .collect()
    }

    pub(crate) fn extract_at<E: Entity>(&self, root: &dyn Element, depth: usize) -> Result<E> {
        if depth > self.config.max_depth {
            return Err(ExtractError::DepthExceeded {
                class: E::NAME,
                max_depth: self.config.max_depth,
            });
        }

        let span = debug_span!("extract", class = E::NAME, depth);
        let _guard = span.enter();

        let descriptor = self.registry.describe::<E>()?;
        let mut entity = factory::create::<E>()?;
        for field in descriptor.fields() {
            trace!(field = field.name(), "extracting field");
            self.populate(&mut entity, field, root, depth)?;
        }
        Ok(entity)
    }

    fn populate<E: Entity>(
        &self,
        entity: &mut E,
        field: &FieldDescriptor<E>,
        root: &dyn Element,
        depth: usize,
    ) -> Result<()> {
        match &field.binding {
            FieldBinding::Value { pipeline, assign } => {
                let raw = strategy::resolve(field, root)?;
                let value = convert(field, pipeline, &raw)?;
                assign(entity, value).map_err(|source| ExtractError::Mapping {
                    at: field.location(),
                    value: raw.to_string(),
                    source,
                })
            }
            FieldBinding::Nested(binding) => binding.populate(self, entity, field, root, depth),
        }
    }
}

/// Run raw text through the field's pipeline; absence becomes `Value::Null`.
fn convert<E>(field: &FieldDescriptor<E>, pipeline: &Pipeline, raw: &RawValue) -> Result<Value> {
    let apply = |text: &String| {
        pipeline.apply(text).map_err(|source| ExtractError::Mapping {
            at: field.location(),
            value: text.clone(),
            source,
        })
    };
    match raw {
        RawValue::Absent => Ok(Value::Null),
        RawValue::One(text) => apply(text),
        RawValue::Many(items) => items
            .iter()
            .map(apply)
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::ConversionError;
    use crate::schema::SchemaBuilder;

    #[derive(Debug, Default, PartialEq)]
    struct Sparse {
        title: Option<String>,
        price: Option<f64>,
        tags: Vec<String>,
        published: Option<NaiveDate>,
    }

    impl Entity for Sparse {
        const NAME: &'static str = "Sparse";

        fn describe(schema: &mut SchemaBuilder<'_, Self>) {
            schema.field("title", "//h1").optional().set(|s, v: Option<String>| s.title = v);
            schema
                .field("price", "//span[@class='price']")
                .optional()
                .transform("digits")
                .convert("float")
                .set(|s, v: Option<f64>| s.price = v);
            schema.list("tags", "//li[@class='tag']").set(|s, v: Vec<String>| s.tags = v);
            schema
                .field("published", "//time")
                .optional()
                .convert("date")
                .set(|s, v: Option<NaiveDate>| s.published = v);
        }
    }

    #[test]
    fn test_all_optional_fields_tolerate_empty_document() {
        let sparse: Sparse = Extractor::new().extract_html("<p>nothing here</p>").unwrap();
        assert_eq!(sparse, Sparse::default());
    }

    #[test]
    fn test_all_optional_fields_populate() {
        let html = r#"
            <h1>Desk</h1>
            <span class="price">€1.299,00</span>
            <li class="tag">oak</li><li class="tag">large</li>
            <time>3rd March 2024</time>
        "#;
        let sparse: Sparse = Extractor::new().extract_html(html).unwrap();
        assert_eq!(
            sparse,
            Sparse {
                title: Some("Desk".to_string()),
                price: Some(1299.0),
                tags: vec!["oak".to_string(), "large".to_string()],
                published: NaiveDate::from_ymd_opt(2024, 3, 3),
            }
        );
    }

    #[derive(Debug, Default)]
    struct Event {
        name: String,
        date: NaiveDate,
    }

    impl Entity for Event {
        const NAME: &'static str = "Event";

        fn describe(schema: &mut SchemaBuilder<'_, Self>) {
            schema.field("name", "//h2").optional().set(|e, v: String| e.name = v);
            schema
                .field("date", "//div[@id='x']")
                .convert("date")
                .set(|e, v: NaiveDate| e.date = v);
        }
    }

    #[test]
    fn test_date_field_parses_ordinal_dates() {
        let event: Event = Extractor::new()
            .extract_html(r#"<div id="x">28th February 2023</div>"#)
            .unwrap();
        assert_eq!(event.date, NaiveDate::from_ymd_opt(2023, 2, 28).unwrap());
        assert_eq!(event.name, "");
    }

    #[test]
    fn test_unparseable_date_is_mapping_error() {
        let err = Extractor::new()
            .extract_html::<Event>(r#"<h2>Launch</h2><div id="x">not a date</div>"#)
            .unwrap_err();
        match err {
            ExtractError::Mapping { at, value, source } => {
                assert_eq!(at.to_string(), "Event.date");
                assert_eq!(value, "not a date");
                assert!(matches!(source, ConversionError::Unparseable { target: "date", .. }));
            }
            other => panic!("expected a mapping error, got {other:?}"),
        }
    }

    #[test]
    fn test_required_field_without_match_fails() {
        let err = Extractor::new()
            .extract_html::<Event>("<h2>Launch</h2>")
            .unwrap_err();
        assert!(matches!(err, ExtractError::MissingRequiredField { .. }));
        assert_eq!(err.field_path().as_deref(), Some("Event.date"));
    }

    #[derive(Debug, Default)]
    struct Tagged {
        ids: Vec<String>,
    }

    impl Entity for Tagged {
        const NAME: &'static str = "Tagged";

        fn describe(schema: &mut SchemaBuilder<'_, Self>) {
            schema.list("ids", "//li[@data-testid]").set(|t, v: Vec<String>| t.ids = v);
        }
    }

    #[test]
    fn test_list_keeps_document_order() {
        let html = r#"
            <ul><li data-testid="1">a</li><li>x</li></ul>
            <ol><li data-testid="2">b</li><li data-testid="3">c</li></ol>
        "#;
        let tagged: Tagged = Extractor::new().extract_html(html).unwrap();
        assert_eq!(tagged.ids, vec!["a", "b", "c"]);

        let empty: Tagged = Extractor::new().extract_html("<ul></ul>").unwrap();
        assert!(empty.ids.is_empty());
    }

    #[derive(Debug, Default)]
    struct Counter {
        value: i64,
    }

    impl Entity for Counter {
        const NAME: &'static str = "Counter";

        fn describe(schema: &mut SchemaBuilder<'_, Self>) {
            schema
                .field("value", "//b")
                .convert("integer")
                .set(|c, v: i64| c.value = v);
        }
    }

    #[test]
    fn test_numeric_round_trip() {
        let extractor = Extractor::new();
        for v in [0_i64, 42, -7, 9_007_199_254_740_993] {
            let counter: Counter = extractor.extract_html(&format!("<b>{v}</b>")).unwrap();
            assert_eq!(counter.value, v);
        }
    }

    #[test]
    fn test_extract_all_in_document_order() {
        let html = "<div class='c'><b>1</b></div><div class='c'><b>2</b></div><div><b>9</b></div>";
        let document = HtmlDocument::parse(html);
        let counters: Vec<Counter> = Extractor::new()
            .extract_all(&document.root(), "//div[@class='c']")
            .unwrap();
        let values: Vec<i64> = counters.iter().map(|c| c.value).collect();
        assert_eq!(values, vec![1, 2]);
    }

    #[derive(Debug, Default)]
    struct Narrow {
        level: u8,
    }

    impl Entity for Narrow {
        const NAME: &'static str = "Narrow";

        fn describe(schema: &mut SchemaBuilder<'_, Self>) {
            schema
                .field("level", "//b")
                .convert("integer")
                .set(|n, v: u8| n.level = v);
        }
    }

    #[test]
    fn test_setter_type_errors_are_mapping_errors() {
        let err = Extractor::new().extract_html::<Narrow>("<b>300</b>").unwrap_err();
        assert!(matches!(
            err,
            ExtractError::Mapping { ref value, source: ConversionError::OutOfRange { .. }, .. } if value == "300"
        ));
    }

    #[derive(Debug, Default)]
    struct Flattened {
        tags: String,
    }

    impl Entity for Flattened {
        const NAME: &'static str = "Flattened";

        fn describe(schema: &mut SchemaBuilder<'_, Self>) {
            schema.list("tags", "//li").set(|f, v: String| f.tags = v);
        }
    }

    #[test]
    fn test_rejected_list_reports_raw_items() {
        let err = Extractor::new()
            .extract_html::<Flattened>("<ul><li>x</li><li>y</li></ul>")
            .unwrap_err();
        assert!(matches!(
            err,
            ExtractError::Mapping { ref value, source: ConversionError::TypeMismatch { .. }, .. } if value == "x, y"
        ));
    }

    #[derive(Debug, Default)]
    struct Unresolvable;

    impl Entity for Unresolvable {
        const NAME: &'static str = "Unresolvable";

        fn describe(schema: &mut SchemaBuilder<'_, Self>) {
            schema.field("x", "//x").transform("rot13").set(|_, _: String| {});
        }
    }

    #[test]
    fn test_schema_errors_surface_from_extract() {
        let extractor = Extractor::new();
        let err = extractor.extract_html::<Unresolvable>("<x>1</x>").unwrap_err();
        assert!(matches!(err, ExtractError::Schema { class: "Unresolvable", .. }));
        assert!(!extractor.registry().contains::<Unresolvable>());
    }

    #[test]
    fn test_custom_conversions() {
        let mut conversions = ConversionRegistry::default();
        conversions.register_transformer("rot13", |s: &str| {
            s.chars()
                .map(|c| match c {
                    'a'..='m' | 'A'..='M' => (c as u8 + 13) as char,
                    'n'..='z' | 'N'..='Z' => (c as u8 - 13) as char,
                    _ => c,
                })
                .collect::<String>()
        });
        let extractor = Extractor::with_conversions(conversions);
        assert!(extractor.extract_html::<Unresolvable>("<x>1</x>").is_ok());
    }

    #[test]
    fn test_parallel_extraction_shares_descriptors() {
        let extractor = Extractor::new();
        let values: Vec<i64> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8_i64)
                .map(|i| {
                    let extractor = &extractor;
                    scope.spawn(move || {
                        extractor
                            .extract_html::<Counter>(&format!("<b>{i}</b>"))
                            .map(|c| c.value)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap().unwrap())
                .collect()
        });
        assert_eq!(values, (0..8).collect::<Vec<i64>>());
        assert_eq!(extractor.registry().len(), 1);
    }
}
