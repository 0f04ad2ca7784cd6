//! Transform-then-convert chains

use std::fmt;
use std::sync::Arc;

use super::converters::Converter;
use super::transformers::Transformer;
use super::value::Value;
use crate::error::ConversionError;

/// A resolved transform-then-convert pair.
#[derive(Clone)]
pub struct Pipeline {
    transformer_key: String,
    transformer: Arc<dyn Transformer>,
    converter_key: String,
    converter: Arc<dyn Converter>,
}

impl Pipeline {
    pub(crate) fn new(
        transformer_key: &str,
        transformer: Arc<dyn Transformer>,
        converter_key: &str,
        converter: Arc<dyn Converter>,
    ) -> Self {
        Self {
            transformer_key: transformer_key.to_string(),
            transformer,
            converter_key: converter_key.to_string(),
            converter,
        }
    }

    /// Run raw text through both steps.
    pub fn apply(&self, raw: &str) -> Result<Value, ConversionError> {
        let transformed = self.transformer.transform(raw);
        self.converter.convert(&transformed)
    }

    pub fn transformer_key(&self) -> &str {
        &self.transformer_key
    }

    pub fn converter_key(&self) -> &str {
        &self.converter_key
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pipeline({} -> {})", self.transformer_key, self.converter_key)
    }
}
