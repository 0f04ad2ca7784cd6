//! Recursive extraction of nested entities

use tracing::debug;

use super::{lookup, lookup_first};
use crate::dom::Element;
use crate::engine::Extractor;
use crate::error::{ExtractError, Result};
use crate::schema::{Cardinality, Entity, FieldDescriptor, NestedOutput};

/// Extract entity `C` from the element(s) matching the field path.
///
/// Failures inside the nested entity are wrapped so the error carries the
/// full field trail. An optional field absorbs them (and missing matches),
/// except for [`ExtractError::DepthExceeded`].
pub(crate) fn extract<E, C: Entity>(
    engine: &Extractor,
    field: &FieldDescriptor<E>,
    root: &dyn Element,
    depth: usize,
) -> Result<NestedOutput<C>> {
    let at = field.location();
    let path = field.path().ok_or_else(|| ExtractError::Schema {
        class: field.class,
        reason: format!("nested field `{}` has no path", field.name()),
    })?;
    let optional = field.is_optional();

    let absorb = |err: ExtractError| -> Result<()> {
        let err = ExtractError::Nested {
            at,
            source: Box::new(err),
        };
        if optional && !matches!(err.root_cause(), ExtractError::DepthExceeded { .. }) {
            debug!(field = %at, error = %err, "optional nested entity dropped");
            Ok(())
        } else {
            Err(err)
        }
    };

    match field.cardinality() {
        Cardinality::Scalar => {
            let Some(element) = lookup_first(root, path, at)? else {
                if optional {
                    debug!(field = %at, path, "optional nested entity has no match");
                    return Ok(NestedOutput::Absent);
                }
                return Err(ExtractError::MissingRequiredField {
                    at,
                    path: path.to_string(),
                });
            };
            match engine.extract_at::<C>(element.as_ref(), depth + 1) {
                Ok(entity) => Ok(NestedOutput::One(entity)),
                Err(err) => absorb(err).map(|()| NestedOutput::Absent),
            }
        }
        Cardinality::List => {
            let elements = lookup(root, path, at)?;
            let mut entities = Vec::with_capacity(elements.len());
            for element in &elements {
                match engine.extract_at::<C>(element.as_ref(), depth + 1) {
                    Ok(entity) => entities.push(entity),
                    Err(err) => absorb(err)?,
                }
            }
            Ok(NestedOutput::Many(entities))
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::config::ExtractorConfig;
    use crate::dom::{Element, HtmlDocument};
    use crate::engine::Extractor;
    use crate::error::ExtractError;
    use crate::schema::{Entity, SchemaBuilder};

    #[derive(Debug, Default, PartialEq)]
    struct Seller {
        name: String,
        rating: f64,
    }

    impl Entity for Seller {
        const NAME: &'static str = "Seller";

        fn describe(schema: &mut SchemaBuilder<'_, Self>) {
            schema.field("name", "./b").set(|s, v: String| s.name = v);
            schema
                .field("rating", ".//span[@class='rating']")
                .convert("float")
                .set(|s, v: f64| s.rating = v);
        }
    }

    #[derive(Debug, Default, PartialEq)]
    struct Listing {
        title: String,
        seller: Seller,
        backup: Option<Seller>,
        resellers: Vec<Seller>,
    }

    impl Entity for Listing {
        const NAME: &'static str = "Listing";

        fn describe(schema: &mut SchemaBuilder<'_, Self>) {
            schema.field("title", "//h1").set(|l, v: String| l.title = v);
            schema
                .nested::<Seller>("seller", "//div[@class='seller']")
                .set(|l, v: Seller| l.seller = v);
            schema
                .nested::<Seller>("backup", "//div[@class='backup']")
                .optional()
                .set(|l, v: Option<Seller>| l.backup = v);
            schema
                .nested::<Seller>("resellers", "//li[@class='reseller']")
                .optional()
                .set(|l, v: Vec<Seller>| l.resellers = v);
        }
    }

    const PAGE: &str = r#"
        <h1>Lamp</h1>
        <div class="seller"><b>Ana</b> <span class="rating">4.5</span></div>
        <ul>
            <li class="reseller"><b>Bo</b> <span class="rating">3</span></li>
            <li class="reseller"><b>Cy</b> <span class="rating">n/a</span></li>
            <li class="reseller"><b>Di</b> <span class="rating">5</span></li>
        </ul>
    "#;

    fn seller(name: &str, rating: f64) -> Seller {
        Seller {
            name: name.to_string(),
            rating,
        }
    }

    #[test]
    fn test_nested_entities_and_dropped_items() {
        let listing: Listing = Extractor::new().extract_html(PAGE).unwrap();
        assert_eq!(
            listing,
            Listing {
                title: "Lamp".to_string(),
                seller: seller("Ana", 4.5),
                backup: None,
                resellers: vec![seller("Bo", 3.0), seller("Di", 5.0)],
            }
        );
    }

    #[test]
    fn test_optional_nested_failure_becomes_none() {
        let backup = r#"<div class="backup"><b>Ed</b> <span class="rating">soon</span></div>"#;
        let page = format!("{PAGE}{backup}");
        let listing: Listing = Extractor::new().extract_html(&page).unwrap();
        assert_eq!(listing.backup, None);
        assert_eq!(listing.seller, seller("Ana", 4.5));

        let page = page.replace("soon", "2.5");
        let listing: Listing = Extractor::new().extract_html(&page).unwrap();
        assert_eq!(listing.backup, Some(seller("Ed", 2.5)));
    }

    #[test]
    fn test_nested_equals_independent_extraction() {
        let doc = HtmlDocument::parse(PAGE);
        let extractor = Extractor::new();
        let listing: Listing = extractor.extract(&doc.root()).unwrap();

        let root = doc.root();
        let seller_root = root.find_element("//div[@class='seller']").unwrap().unwrap();
        let alone: Seller = extractor.extract(seller_root.as_ref()).unwrap();
        assert_eq!(listing.seller, alone);
    }

    #[test]
    fn test_required_nested_failure_carries_trail() {
        let page = PAGE.replace("4.5", "four");
        let err = Extractor::new().extract_html::<Listing>(&page).unwrap_err();
        assert_eq!(err.field_path().as_deref(), Some("Listing.seller.rating"));
        assert!(matches!(err.root_cause(), ExtractError::Mapping { .. }));
    }

    #[test]
    fn test_required_nested_without_match() {
        let err = Extractor::new()
            .extract_html::<Listing>("<h1>Lamp</h1>")
            .unwrap_err();
        assert!(matches!(err, ExtractError::MissingRequiredField { .. }));
        assert_eq!(err.field_path().as_deref(), Some("Listing.seller"));
    }

    #[derive(Debug, Default)]
    struct Node {
        children: Vec<Node>,
    }

    impl Entity for Node {
        const NAME: &'static str = "Node";

        fn describe(schema: &mut SchemaBuilder<'_, Self>) {
            schema
                .nested::<Node>("children", "./div")
                .optional()
                .set(|n, v: Vec<Node>| n.children = v);
        }
    }

    fn depth_of(node: &Node) -> usize {
        node.children.iter().map(|c| 1 + depth_of(c)).max().unwrap_or(0)
    }

    #[test]
    fn test_depth_limit_is_never_absorbed() {
        let html = "<div><div><div><div></div></div></div></div>";
        let doc = HtmlDocument::parse_fragment(html);
        let root = doc.root().select("//div").unwrap()[0];

        let roomy = Extractor::new();
        let node: Node = roomy.extract(&root).unwrap();
        assert_eq!(depth_of(&node), 3);

        let tight = Extractor::new().with_config(ExtractorConfig { max_depth: 2 });
        let err = tight.extract::<Node>(&root).unwrap_err();
        assert!(matches!(
            err.root_cause(),
            ExtractError::DepthExceeded { class: "Node", max_depth: 2 }
        ));
        assert_eq!(err.field_path().as_deref(), Some("Node.children.children.children"));
    }
}
