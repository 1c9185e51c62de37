//! Adapter factory resolution: given a `FunctionCall`, find the implementation that
//! should execute it and bind it to its already-instantiated input adapters.
//!
//! Per the platform's explicit-registry redesign, there is no reflection over
//! constructor parameter names here: every adapter type registers a
//! [`AdapterFactory`] that names its own declared inputs up front and binds them
//! explicitly from a map the caller assembles.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dfm_core::FunctionCall;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::site::SiteConfig;

/// Everything a factory needs to construct one adapter instance.
pub struct AdapterConstructContext<'a, A, P> {
    /// The call this adapter executes.
    pub call: &'a FunctionCall,
    /// The provider instance this adapter was resolved against.
    pub provider: Arc<P>,
    /// The raw `AdapterConfig` the site declared for this call's `api_class`, if
    /// any.
    pub adapter_config: Option<&'a Value>,
    /// This adapter's already-instantiated inputs, keyed by the declared input name
    /// the factory named in [`AdapterFactory::declared_inputs`].
    pub inputs: HashMap<String, A>,
}

/// Builds one adapter implementation.
#[async_trait]
pub trait AdapterFactory<A, P>: Send + Sync {
    /// The implementation class name this factory builds (the resolved target of a
    /// [`crate::site::AdapterEntry`], not the `api_class` discriminator — several
    /// `api_class`es may resolve to the same implementation under different
    /// providers or configs).
    fn implementation_class(&self) -> &str;

    /// The input names this adapter expects bound, in no particular order. Used by
    /// callers to know which of a call's referenced nodes must be resolved before
    /// this adapter can be constructed.
    fn declared_inputs(&self) -> &[String];

    /// Construct the adapter.
    async fn construct(&self, ctx: AdapterConstructContext<'_, A, P>) -> Result<A>;
}

/// Where a `FunctionCall` resolves to: which provider will run it and what
/// implementation factory to invoke.
pub struct ResolvedTarget<'a> {
    pub provider_tag: String,
    pub implementation_class: String,
    pub adapter_config: Option<&'a Value>,
}

/// Registry of adapter factories, keyed by implementation class name, paired with
/// the site configuration used to resolve a call's `api_class` + `provider` into a
/// target implementation.
pub struct AdapterRegistry<A, P> {
    site: SiteConfig,
    factories: HashMap<String, Arc<dyn AdapterFactory<A, P>>>,
}

impl<A, P> AdapterRegistry<A, P> {
    #[must_use]
    pub fn new(site: SiteConfig) -> Self {
        AdapterRegistry {
            site,
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, factory: Arc<dyn AdapterFactory<A, P>>) {
        self.factories
            .insert(factory.implementation_class().to_string(), factory);
    }

    /// Resolve `call` to a concrete provider tag and implementation class. The
    /// call must already carry a `provider`; for provider-less discovery use
    /// [`crate::site::SiteConfig::providers_serving`] directly to enumerate
    /// candidates instead.
    pub fn resolve<'a>(&'a self, call: &'a FunctionCall) -> Result<ResolvedTarget<'a>> {
        if call.provider.is_empty() {
            return Err(Error::UnknownProvider("<unset>".to_string()));
        }
        let provider_tag = call.provider.as_str();

        let provider_entry = self
            .site
            .provider(provider_tag)
            .ok_or_else(|| Error::UnknownProvider(provider_tag.to_string()))?;

        let entry = provider_entry.adapters.get(&call.api_class).ok_or_else(|| {
            Error::UnknownApiClass {
                provider: provider_tag.to_string(),
                api_class: call.api_class.clone(),
            }
        })?;

        Ok(ResolvedTarget {
            provider_tag: provider_tag.to_string(),
            implementation_class: entry.implementation_class()?,
            adapter_config: entry.config(),
        })
    }

    /// Look up the factory for an already-resolved implementation class.
    pub fn factory_for(&self, implementation_class: &str) -> Result<Arc<dyn AdapterFactory<A, P>>> {
        self.factories
            .get(implementation_class)
            .cloned()
            .ok_or_else(|| Error::UnknownImplementation(implementation_class.to_string()))
    }

    /// The site this registry resolves against.
    #[must_use]
    pub fn site(&self) -> &SiteConfig {
        &self.site
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::{AdapterEntry, ProviderEntry};
    use uuid::Uuid;

    fn sample_site() -> SiteConfig {
        let mut site = SiteConfig {
            site: "site-a".to_string(),
            providers: HashMap::new(),
            heartbeat_interval_secs: 5,
            resources: None,
        };
        let mut adapters = HashMap::new();
        adapters.insert(
            "adapter.LoadLayer".to_string(),
            AdapterEntry::ImplClass("adapter.EsriLoadLayer".to_string()),
        );
        site.providers.insert(
            "esri".to_string(),
            ProviderEntry {
                provider_class: "provider.EsriProvider".to_string(),
                config: Value::Null,
                adapters,
            },
        );
        site
    }

    fn call_with_provider(api_class: &str, provider: &str) -> FunctionCall {
        FunctionCall {
            api_class: api_class.to_string(),
            provider: provider.to_string(),
            node_id: Uuid::nil(),
            is_output: false,
            force_compute: false,
            params: serde_json::Map::new(),
        }
    }

    #[test]
    fn resolves_known_call_to_implementation_class() {
        let registry: AdapterRegistry<(), ()> = AdapterRegistry::new(sample_site());
        let call = call_with_provider("adapter.LoadLayer", "esri");
        let resolved = registry.resolve(&call).unwrap();
        assert_eq!(resolved.provider_tag, "esri");
        assert_eq!(resolved.implementation_class, "adapter.EsriLoadLayer");
    }

    #[test]
    fn unknown_provider_tag_is_an_error() {
        let registry: AdapterRegistry<(), ()> = AdapterRegistry::new(sample_site());
        let call = call_with_provider("adapter.LoadLayer", "nowhere");
        assert!(matches!(registry.resolve(&call), Err(Error::UnknownProvider(_))));
    }

    #[test]
    fn unknown_api_class_is_an_error() {
        let registry: AdapterRegistry<(), ()> = AdapterRegistry::new(sample_site());
        let call = call_with_provider("adapter.Nonexistent", "esri");
        assert!(matches!(
            registry.resolve(&call),
            Err(Error::UnknownApiClass { .. })
        ));
    }

    #[test]
    fn factory_for_unregistered_class_is_an_error() {
        let registry: AdapterRegistry<(), ()> = AdapterRegistry::new(sample_site());
        assert!(matches!(
            registry.factory_for("adapter.EsriLoadLayer"),
            Err(Error::UnknownImplementation(_))
        ));
    }
}
