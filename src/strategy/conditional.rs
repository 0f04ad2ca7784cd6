//! Regex-gated field locations

use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::{debug, trace, warn};

use super::{lookup_first, scalar, RawValue};
use crate::dom::Element;
use crate::error::{ExtractError, Result};
use crate::schema::{ConditionalRule, ConditionalSpec, FieldDescriptor};

/// `{name}` in a rule's then-path.
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// Pick the value location by testing the guard text against each rule.
///
/// First matching rule wins. With no guard element or no matching rule the
/// fallback path is used. Without one the field is absent if optional and
/// missing otherwise.
pub(super) fn extract<E>(
    root: &dyn Element,
    field: &FieldDescriptor<E>,
    spec: &ConditionalSpec,
) -> Result<RawValue> {
    let at = field.location();
    let guard = lookup_first(root, spec.guard_path(), at)?.map(|element| element.text());

    if let Some(guard) = guard {
        for rule in spec.rules() {
            let Some(caps) = rule.pattern().captures(&guard) else {
                continue;
            };
            match then_path(rule, &caps) {
                Ok(path) => {
                    trace!(field = %at, pattern = rule.pattern().as_str(), %path, "conditional rule matched");
                    return scalar::extract(
                        root,
                        &path,
                        field.attribute(),
                        field.is_optional(),
                        at,
                    );
                }
                Err(err) => warn!(field = %at, error = %err, "skipping conditional rule"),
            }
        }
    }

    match field.path() {
        Some(path) => scalar::extract(root, path, field.attribute(), field.is_optional(), at),
        None if field.is_optional() => {
            debug!(field = %at, "no conditional rule applies");
            Ok(RawValue::Absent)
        }
        None => Err(ExtractError::MissingRequiredField {
            at,
            path: spec.guard_path().to_string(),
        }),
    }
}

/// Fill `{name}` placeholders from the rule's named capture groups.
///
/// A group that took no part in the match fills in as `""`; a name the
/// pattern does not define is an error.
pub(crate) fn then_path(rule: &ConditionalRule, caps: &Captures<'_>) -> Result<String> {
    let mut unknown = None;
    let filled = PLACEHOLDER.replace_all(rule.then_path(), |placeholder: &Captures<'_>| {
        let name = &placeholder[1];
        let defined = rule.pattern().capture_names().flatten().any(|n| n == name);
        if !defined {
            unknown.get_or_insert_with(|| name.to_string());
        }
        caps.name(name)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    });

    match unknown {
        Some(group) => Err(ExtractError::AmbiguousConditional {
            pattern: rule.pattern().as_str().to_string(),
            group,
        }),
        None => Ok(filled.into_owned()),
    }
}
