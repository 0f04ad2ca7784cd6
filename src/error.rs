//! Error types for the extraction engine.

use std::fmt;

use thiserror::Error;

/// Location of a field inside an entity schema, rendered as `Class.field`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRef {
    pub class: &'static str,
    pub field: &'static str,
}

impl FieldRef {
    pub fn new(class: &'static str, field: &'static str) -> Self {
        Self { class, field }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class, self.field)
    }
}

/// Main error type for entity extraction.
///
/// An extraction call reports exactly one of these: the first field failure
/// that was not absorbed by the field's optionality.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The target entity could not be constructed.
    #[error("cannot instantiate {class}: {reason}")]
    Instantiation { class: &'static str, reason: String },

    /// A path expression was malformed or the element lookup failed.
    #[error("{}{source}", .at.map(|at| format!("{at}: ")).unwrap_or_default())]
    PathEvaluation {
        at: Option<FieldRef>,
        #[source]
        source: PathError,
    },

    /// A required scalar or nested field had no matching element.
    #[error("{at}: no element matches required path `{path}`")]
    MissingRequiredField { at: FieldRef, path: String },

    /// A conversion step rejected the raw value.
    #[error("{at}: cannot map {value:?}: {source}")]
    Mapping {
        at: FieldRef,
        value: String,
        #[source]
        source: ConversionError,
    },

    /// A conditional rule references a capture group its pattern lacks.
    ///
    /// Never surfaced by the engine: the rule is skipped instead.
    #[error("conditional rule `{pattern}` references unknown capture group `{group}`")]
    AmbiguousConditional { pattern: String, group: String },

    /// The entity schema could not be turned into a descriptor.
    #[error("invalid schema for {class}: {reason}")]
    Schema { class: &'static str, reason: String },

    /// Nested extraction went deeper than the configured limit.
    #[error("maximum nesting depth {max_depth} exceeded while extracting {class}")]
    DepthExceeded { class: &'static str, max_depth: usize },

    /// A nested entity failed; `source` is the nested failure.
    #[error("{at}: {source}")]
    Nested {
        at: FieldRef,
        #[source]
        source: Box<ExtractError>,
    },
}

impl ExtractError {
    /// Field location of this error, ignoring nesting.
    pub fn location(&self) -> Option<FieldRef> {
        match self {
            ExtractError::PathEvaluation { at, .. } => *at,
            ExtractError::MissingRequiredField { at, .. }
            | ExtractError::Mapping { at, .. }
            | ExtractError::Nested { at, .. } => Some(*at),
            _ => None,
        }
    }

    /// Dotted path from the outermost entity to the failing field,
    /// e.g. `Listing.seller.rating`.
    pub fn field_path(&self) -> Option<String> {
        let mut class = None;
        let mut segments = Vec::new();
        let mut current = self;

        loop {
            if let Some(at) = current.location() {
                class.get_or_insert(at.class);
                segments.push(at.field);
            }
            match current {
                ExtractError::Nested { source, .. } => current = source,
                _ => break,
            }
        }

        let class = class?;
        Some(
            std::iter::once(class)
                .chain(segments)
                .collect::<Vec<_>>()
                .join("."),
        )
    }

    /// The innermost error behind any `Nested` wrappers.
    pub fn root_cause(&self) -> &ExtractError {
        match self {
            ExtractError::Nested { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Errors raised by path evaluation in the element layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The path expression could not be parsed.
    #[error("invalid path `{path}` at offset {offset}: {reason}")]
    Syntax {
        path: String,
        offset: usize,
        reason: String,
    },

    /// A `css:` path held an invalid selector.
    #[error("invalid CSS selector `{selector}`: {reason}")]
    Selector { selector: String, reason: String },

    /// The document driver failed to perform the lookup.
    #[error("lookup of `{path}` failed: {reason}")]
    Lookup { path: String, reason: String },
}

/// Errors raised by the conversion pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    /// The text does not parse as the converter's target type.
    #[error("cannot parse {input:?} as {target}: {reason}")]
    Unparseable {
        input: String,
        target: &'static str,
        reason: String,
    },

    /// The converted value does not fit the field's Rust type.
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// The value parsed but does not fit the target integer width.
    #[error("{value} is out of range for {target}")]
    OutOfRange { value: String, target: &'static str },

    /// An absent value was assigned to a type with no empty value.
    #[error("absent value cannot be assigned to {target}")]
    Absent { target: &'static str },
}

/// A transformer or converter key with nothing registered under it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no {kind} registered under `{key}`")]
pub struct UnknownStep {
    pub kind: &'static str,
    pub key: String,
}

impl From<PathError> for ExtractError {
    fn from(source: PathError) -> Self {
        ExtractError::PathEvaluation { at: None, source }
    }
}

/// Result type for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_path_follows_nesting() {
        let leaf = ExtractError::MissingRequiredField {
            at: FieldRef::new("Seller", "rating"),
            path: "//span[@class='rating']".to_string(),
        };
        let err = ExtractError::Nested {
            at: FieldRef::new("Listing", "seller"),
            source: Box::new(leaf),
        };

        assert_eq!(err.field_path().as_deref(), Some("Listing.seller.rating"));
        assert!(matches!(
            err.root_cause(),
            ExtractError::MissingRequiredField { .. }
        ));
    }

    #[test]
    fn test_display_includes_location() {
        let err = ExtractError::PathEvaluation {
            at: Some(FieldRef::new("Listing", "title")),
            source: PathError::Syntax {
                path: "//h1[".to_string(),
                offset: 5,
                reason: "unterminated predicate".to_string(),
            },
        };
        let message = err.to_string();
        assert!(message.starts_with("Listing.title: invalid path"));

        let bare = ExtractError::PathEvaluation {
            at: None,
            source: PathError::Lookup {
                path: "//a".to_string(),
                reason: "driver closed".to_string(),
            },
        };
        assert_eq!(bare.to_string(), "lookup of `//a` failed: driver closed");
        assert_eq!(bare.field_path(), None);
    }
}
