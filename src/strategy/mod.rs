//! Field extraction strategies
//!
//! Each strategy turns a field declaration plus a root element into raw text
//! ([`RawValue`]). Nested fields are the exception: they produce entities and
//! are driven from the schema binding through [`nested::extract`].

mod conditional;
mod list;
pub(crate) mod nested;
mod scalar;
mod url;

use std::fmt;

use crate::dom::Element;
use crate::error::{ExtractError, FieldRef, Result};
use crate::schema::{Cardinality, FieldDescriptor, FieldKind};

/// Raw text found for a field, before conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    Absent,
    One(String),
    Many(Vec<String>),
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Absent => Ok(()),
            RawValue::One(text) => f.write_str(text),
            RawValue::Many(items) => f.write_str(&items.join(", ")),
        }
    }
}

/// Run the strategy for a non-nested field.
pub(crate) fn resolve<E>(field: &FieldDescriptor<E>, root: &dyn Element) -> Result<RawValue> {
    let at = field.location();
    match (field.kind(), field.cardinality()) {
        (FieldKind::Conditional(spec), _) => conditional::extract(root, field, spec),
        (FieldKind::Url, _) => url::extract(root, field),
        (FieldKind::Value, Cardinality::List) => {
            list::extract(root, required_path(field)?, field.attribute(), at)
        }
        (FieldKind::Value, Cardinality::Scalar) => scalar::extract(
            root,
            required_path(field)?,
            field.attribute(),
            field.is_optional(),
            at,
        ),
        (FieldKind::Nested { class }, _) => Err(ExtractError::Schema {
            class: field.class,
            reason: format!("field `{}` holds {class} and has no raw value", field.name()),
        }),
    }
}

fn required_path<E>(field: &FieldDescriptor<E>) -> Result<&str> {
    field.path().ok_or_else(|| ExtractError::Schema {
        class: field.class,
        reason: format!("field `{}` has no path", field.name()),
    })
}

/// Resolve `path` against `root`, tagging lookup failures with the field.
fn lookup<'e>(
    root: &'e dyn Element,
    path: &str,
    at: FieldRef,
) -> Result<Vec<Box<dyn Element + 'e>>> {
    root.find_elements(path)
        .map_err(|source| ExtractError::PathEvaluation {
            at: Some(at),
            source,
        })
}

fn lookup_first<'e>(
    root: &'e dyn Element,
    path: &str,
    at: FieldRef,
) -> Result<Option<Box<dyn Element + 'e>>> {
    root.find_element(path)
        .map_err(|source| ExtractError::PathEvaluation {
            at: Some(at),
            source,
        })
}

/// Text or attribute value of an element.
fn read(element: &dyn Element, attribute: Option<&str>) -> Option<String> {
    match attribute {
        Some(name) => element.attribute(name),
        None => Some(element.text()),
    }
}
