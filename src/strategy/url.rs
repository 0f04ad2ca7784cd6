//! Resource locations read from an attribute

use super::{scalar, RawValue};
use crate::dom::Element;
use crate::error::{ExtractError, Result};
use crate::schema::FieldDescriptor;

const DEFAULT_ATTRIBUTE: &str = "src";

/// Resource location held in an attribute of the first match.
pub(super) fn extract<E>(root: &dyn Element, field: &FieldDescriptor<E>) -> Result<RawValue> {
    let path = field.path().ok_or_else(|| ExtractError::Schema {
        class: field.class,
        reason: format!("url field `{}` has no path", field.name()),
    })?;
    let attribute = field.attribute().unwrap_or(DEFAULT_ATTRIBUTE);
    scalar::extract(
        root,
        path,
        Some(attribute),
        field.is_optional(),
        field.location(),
    )
}
