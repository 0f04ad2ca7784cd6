//! First-match field values

use tracing::debug;

use super::{lookup_first, read, RawValue};
use crate::dom::Element;
use crate::error::{ExtractError, FieldRef, Result};

/// Text (or `attribute`) of the first element matching `path`.
///
/// A matched element without the attribute counts as no match.
pub(super) fn extract(
    root: &dyn Element,
    path: &str,
    attribute: Option<&str>,
    optional: bool,
    at: FieldRef,
) -> Result<RawValue> {
    let found = lookup_first(root, path, at)?;
    match found.as_deref().and_then(|element| read(element, attribute)) {
        Some(raw) => Ok(RawValue::One(raw)),
        None if optional => {
            debug!(field = %at, path, "optional field has no match");
            Ok(RawValue::Absent)
        }
        None => Err(ExtractError::MissingRequiredField {
            at,
            path: path.to_string(),
        }),
    }
}
