//! Declarative site configuration: `{site, providers: {tag: ProviderConfig}, ...}`,
//! loaded from the `SITE_CONFIG` TOML file named in the platform's environment
//! variable contract.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// What a provider's entry for one `api_class` points to: either the adapter
/// implementation class to use directly, or an `AdapterConfig` record carrying
/// per-adapter knobs whose own `adapter_class` field names the implementation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdapterEntry {
    ImplClass(String),
    Config(Value),
}

impl AdapterEntry {
    /// The adapter implementation class this entry ultimately resolves to.
    pub fn implementation_class(&self) -> Result<String> {
        match self {
            AdapterEntry::ImplClass(name) => Ok(name.clone()),
            AdapterEntry::Config(value) => value
                .get("adapter_class")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    Error::UnknownImplementation(
                        "AdapterConfig entry missing adapter_class".to_string(),
                    )
                }),
        }
    }

    /// The raw `AdapterConfig` JSON, if this entry carries one.
    #[must_use]
    pub fn config(&self) -> Option<&Value> {
        match self {
            AdapterEntry::ImplClass(_) => None,
            AdapterEntry::Config(value) => Some(value),
        }
    }
}

/// One provider's declaration: which logical provider implementation it is
/// (`provider_class`), its own configuration fields, and which `api_class`es it
/// serves.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub provider_class: String,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub adapters: HashMap<String, AdapterEntry>,
}

/// A site's full declarative configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SiteConfig {
    pub site: String,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default)]
    pub resources: Option<Value>,
}

fn default_heartbeat_interval_secs() -> u64 {
    5
}

impl SiteConfig {
    /// Parse a `SiteConfig` from TOML text, as read from the `SITE_CONFIG` file.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// The declared entry for `tag`, if this site has such a provider.
    #[must_use]
    pub fn provider(&self, tag: &str) -> Option<&ProviderEntry> {
        self.providers.get(tag)
    }

    /// Every provider tag whose interface declares `api_class`, for discovery when
    /// a `FunctionCall`'s `provider` field is left unset.
    #[must_use]
    pub fn providers_serving(&self, api_class: &str) -> Vec<&str> {
        self.providers
            .iter()
            .filter(|(_, entry)| entry.adapters.contains_key(api_class))
            .map(|(tag, _)| tag.as_str())
            .collect()
    }
}
