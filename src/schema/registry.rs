//! Cached entity descriptors keyed by type

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use super::{Entity, EntityDescriptor};
use crate::convert::ConversionRegistry;
use crate::error::{ExtractError, Result};

type CachedDescriptor = Arc<dyn Any + Send + Sync>;

/// Lazily built entity descriptors, one per entity type.
///
/// Descriptors are built on first use and kept until [`clear`](Self::clear).
/// Concurrent first requests for the same type may each build one; the first
/// insert wins and every caller gets that one.
pub struct DescriptorRegistry {
    conversions: ConversionRegistry,
    descriptors: RwLock<HashMap<TypeId, CachedDescriptor>>,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self::with_conversions(ConversionRegistry::default())
    }

    pub fn with_conversions(conversions: ConversionRegistry) -> Self {
        Self {
            conversions,
            descriptors: RwLock::new(HashMap::new()),
        }
    }

    pub fn conversions(&self) -> &ConversionRegistry {
        &self.conversions
    }

    /// Descriptor for `E`, built on the first call.
    pub fn describe<E: Entity>(&self) -> Result<Arc<EntityDescriptor<E>>> {
        let key = TypeId::of::<E>();

        let cached = self
            .descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();
        if let Some(cached) = cached {
            debug!(class = E::NAME, "entity descriptor cache hit");
            return Self::downcast::<E>(cached);
        }

        debug!(class = E::NAME, "building entity descriptor");
        let built: CachedDescriptor = Arc::new(EntityDescriptor::<E>::build(&self.conversions)?);

        let stored = {
            let mut descriptors = self
                .descriptors
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(descriptors.entry(key).or_insert(built))
        };
        Self::downcast::<E>(stored)
    }

    fn downcast<E: Entity>(cached: CachedDescriptor) -> Result<Arc<EntityDescriptor<E>>> {
        cached
            .downcast::<EntityDescriptor<E>>()
            .map_err(|_| ExtractError::Schema {
                class: E::NAME,
                reason: "cached descriptor has a different type".to_string(),
            })
    }

    /// Whether a descriptor for `E` has been built.
    pub fn contains<E: Entity>(&self) -> bool {
        self.descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&TypeId::of::<E>())
    }

    pub fn len(&self) -> usize {
        self.descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached descriptor.
    pub fn clear(&self) {
        self.descriptors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Default for DescriptorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DescriptorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorRegistry")
            .field("descriptors", &self.len())
            .field("conversions", &self.conversions)
            .finish()
    }
}
