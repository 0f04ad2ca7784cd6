//! All-matches field values

use super::{lookup, read, RawValue};
use crate::dom::Element;
use crate::error::{FieldRef, Result};

/// Text (or `attribute`) of every element matching `path`, in document order.
///
/// Zero matches is an empty list; a missing attribute reads as `""`.
pub(super) fn extract(
    root: &dyn Element,
    path: &str,
    attribute: Option<&str>,
    at: FieldRef,
) -> Result<RawValue> {
    let items = lookup(root, path, at)?
        .iter()
        .map(|element| read(element.as_ref(), attribute).unwrap_or_default())
        .collect();
    Ok(RawValue::Many(items))
}
