//! Keyed table of pipeline steps

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::converters::{
    BooleanConverter, Converter, DateConverter, DateTimeConverter, FloatConverter,
    IntegerConverter, StringConverter, UrlConverter,
};
use super::pipeline::Pipeline;
use super::transformers::{
    CollapseWhitespace, Digits, Identity, Lowercase, Split, Transformer, Trim, Uppercase,
};
use crate::error::UnknownStep;

/// Default transformer key.
pub const IDENTITY: &str = "identity";
/// Default converter key.
pub const STRING: &str = "string";

/// Transformers and converters addressable by a stable symbolic key.
///
/// Field declarations name their steps by key; the keys are resolved once,
/// when the entity descriptor is built.
#[derive(Clone)]
pub struct ConversionRegistry {
    transformers: HashMap<String, Arc<dyn Transformer>>,
    converters: HashMap<String, Arc<dyn Converter>>,
}

impl ConversionRegistry {
    /// A registry with nothing registered, not even the defaults.
    pub fn empty() -> Self {
        Self {
            transformers: HashMap::new(),
            converters: HashMap::new(),
        }
    }

    /// A registry preloaded with the built-in steps.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();

        registry.register_transformer(IDENTITY, Identity);
        registry.register_transformer("trim", Trim);
        registry.register_transformer("lowercase", Lowercase);
        registry.register_transformer("uppercase", Uppercase);
        registry.register_transformer("collapse_whitespace", CollapseWhitespace);
        registry.register_transformer("digits", Digits);
        registry.register_transformer("first_line", Split::new("\n", 0));

        registry.register_converter(STRING, StringConverter);
        registry.register_converter("integer", IntegerConverter::new(false));
        registry.register_converter("integer_or_null", IntegerConverter::new(true));
        registry.register_converter("float", FloatConverter::new(false));
        registry.register_converter("float_or_null", FloatConverter::new(true));
        registry.register_converter("boolean", BooleanConverter);
        registry.register_converter("date", DateConverter::new(false));
        registry.register_converter("date_or_null", DateConverter::new(true));
        registry.register_converter("datetime", DateTimeConverter::new(false));
        registry.register_converter("datetime_or_null", DateTimeConverter::new(true));
        registry.register_converter("url", UrlConverter::new());

        registry
    }

    /// Register a transformer, replacing any previous one under `key`.
    pub fn register_transformer(
        &mut self,
        key: impl Into<String>,
        transformer: impl Transformer + 'static,
    ) -> &mut Self {
        self.transformers.insert(key.into(), Arc::new(transformer));
        self
    }

    /// Register a converter, replacing any previous one under `key`.
    pub fn register_converter(
        &mut self,
        key: impl Into<String>,
        converter: impl Converter + 'static,
    ) -> &mut Self {
        self.converters.insert(key.into(), Arc::new(converter));
        self
    }

    pub fn transformer(&self, key: &str) -> Option<Arc<dyn Transformer>> {
        self.transformers.get(key).cloned()
    }

    pub fn converter(&self, key: &str) -> Option<Arc<dyn Converter>> {
        self.converters.get(key).cloned()
    }

    pub fn has_transformer(&self, key: &str) -> bool {
        self.transformers.contains_key(key)
    }

    pub fn has_converter(&self, key: &str) -> bool {
        self.converters.contains_key(key)
    }

    /// Registered transformer keys, sorted.
    pub fn transformer_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.transformers.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Registered converter keys, sorted.
    pub fn converter_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.converters.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Resolve both steps of a pipeline.
    pub fn pipeline(&self, transformer: &str, converter: &str) -> Result<Pipeline, UnknownStep> {
        let transform = self.transformer(transformer).ok_or_else(|| UnknownStep {
            kind: "transformer",
            key: transformer.to_string(),
        })?;
        let convert = self.converter(converter).ok_or_else(|| UnknownStep {
            kind: "converter",
            key: converter.to_string(),
        })?;
        Ok(Pipeline::new(transformer, transform, converter, convert))
    }
}

impl Default for ConversionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for ConversionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionRegistry")
            .field("transformers", &self.transformer_keys())
            .field("converters", &self.converter_keys())
            .finish()
    }
}
