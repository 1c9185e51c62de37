//! A central, explicit tagged-union registry keyed on a discriminator string.
//!
//! The source this platform is modeled on resolves a stringly-typed `api_class` (or
//! `provider_class`/`adapter_class`) to a concrete type via runtime name-mangling
//! (importing a module path built from the discriminator string). Per the redesign note
//! on dynamic polymorphic discriminators, this crate instead exposes an explicit
//! registry: each concrete type registers a decode function under its discriminator
//! string once, at startup, and lookups are a plain `HashMap` get.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::error::{DfmError, Error};

/// Decodes a JSON value known to carry a given discriminator into a concrete `T`.
pub type Decoder<T> = fn(Value) -> Result<T, Error>;

/// A registry mapping discriminator strings to decode functions for one polymorphic
/// family (e.g. all `FunctionCall` variants, or all `ProviderConfig` variants).
pub struct PolymorphicRegistry<T> {
    discriminator_field: &'static str,
    decoders: HashMap<String, Decoder<T>>,
}

impl<T> fmt::Debug for PolymorphicRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolymorphicRegistry")
            .field("discriminator_field", &self.discriminator_field)
            .field("registered", &self.decoders.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<T> PolymorphicRegistry<T> {
    /// Create an empty registry keyed on `discriminator_field` (e.g. `"api_class"`).
    #[must_use]
    pub fn new(discriminator_field: &'static str) -> Self {
        Self {
            discriminator_field,
            decoders: HashMap::new(),
        }
    }

    /// Register a decoder for one discriminator value. Registering the same key twice
    /// replaces the previous decoder; this is intentional, it lets tests override a
    /// production registration.
    pub fn register(&mut self, key: impl Into<String>, decoder: Decoder<T>) {
        self.decoders.insert(key.into(), decoder);
    }

    /// Every discriminator value currently registered.
    pub fn known_keys(&self) -> impl Iterator<Item = &str> {
        self.decoders.keys().map(String::as_str)
    }

    /// Resolve and invoke the decoder for `value`'s discriminator field.
    pub fn decode(&self, value: Value) -> Result<T, DfmError> {
        let key = value
            .get(self.discriminator_field)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                DfmError::data(
                    format!("missing discriminator field '{}'", self.discriminator_field),
                    Some(self.discriminator_field.to_string()),
                )
            })?
            .to_string();

        let decoder = self.decoders.get(key.as_str()).ok_or_else(|| {
            DfmError::data(
                format!("unknown {} '{}'", self.discriminator_field, key),
                Some(self.discriminator_field.to_string()),
            )
        })?;

        decoder(value).map_err(DfmError::from)
    }
}
