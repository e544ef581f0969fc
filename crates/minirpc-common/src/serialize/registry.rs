use std::collections::HashMap;
use std::sync::Arc;

use crate::protocol::error::{MinirpcError, Result};

use super::{BinarySerializer, JsonSerializer, Serializer};

/// Maps serializer codes to serializers.
///
/// [`SerializerRegistry::new`] pre-registers the two built-in codecs (codes 1
/// and 2). A server owns one registry, fills it before it starts accepting
/// connections, and only reads it afterwards.
///
/// # Example
///
/// ```
/// use minirpc_common::serialize::SerializerRegistry;
///
/// let registry = SerializerRegistry::new();
/// assert_eq!(registry.get(1).unwrap().name(), "json");
/// assert!(registry.get(42).is_err());
/// ```
#[derive(Clone)]
pub struct SerializerRegistry {
    serializers: HashMap<u8, Arc<dyn Serializer>>,
}

impl SerializerRegistry {
    /// Creates a registry with the built-in serializers.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(JsonSerializer));
        registry.register(Arc::new(BinarySerializer));
        registry
    }

    /// Creates a registry with no serializers at all.
    pub fn empty() -> Self {
        Self {
            serializers: HashMap::new(),
        }
    }

    /// Registers a serializer under its code, returning the one it replaced.
    pub fn register(&mut self, serializer: Arc<dyn Serializer>) -> Option<Arc<dyn Serializer>> {
        tracing::debug!(code = serializer.code(), name = serializer.name(), "Registering serializer");
        self.serializers.insert(serializer.code(), serializer)
    }

    /// Looks up a serializer by code.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedSerializer` for an unregistered code.
    pub fn get(&self, code: u8) -> Result<Arc<dyn Serializer>> {
        self.serializers
            .get(&code)
            .cloned()
            .ok_or(MinirpcError::UnsupportedSerializer(code))
    }

    /// Registered codes in ascending order.
    pub fn codes(&self) -> Vec<u8> {
        let mut codes: Vec<u8> = self.serializers.keys().copied().collect();
        codes.sort_unstable();
        codes
    }
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SerializerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerializerRegistry")
            .field("codes", &self.codes())
            .finish()
    }
}
