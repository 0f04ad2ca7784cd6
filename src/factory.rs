//! Fresh target instances for each extraction call

use std::any::Any;
use std::panic;

use crate::error::{ExtractError, Result};
use crate::schema::Entity;

/// Default-construct `E`, reporting a panicking constructor as an error.
pub fn create<E: Entity>() -> Result<E> {
    panic::catch_unwind(E::default).map_err(|payload| ExtractError::Instantiation {
        class: E::NAME,
        reason: panic_message(payload.as_ref()),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "constructor panicked".to_string()
    }
}
