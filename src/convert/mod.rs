//! Two-stage value conversion: transform (text -> text), then convert
//! (text -> [`Value`]).

pub mod converters;
mod pipeline;
mod registry;
pub mod transformers;
mod value;

pub use converters::Converter;
pub use pipeline::Pipeline;
pub use registry::{ConversionRegistry, IDENTITY, STRING};
pub use transformers::Transformer;
pub use value::{FromValue, Value};
