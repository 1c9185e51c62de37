//! Lazy, memoized provider instantiation.
//!
//! A provider is constructed once per `(site, tag)` and lives for the site's
//! lifetime. Generic over the instantiated provider type `P` so this crate never
//! needs to depend on whatever crate defines providers (`dfm-services`, typically)
//! — the type-erased-by-name lookup itself is what's reused here, the same
//! registration-by-name pattern as a remote node registry, just keyed by provider
//! tag instead of node name.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::{Error, Result};
use crate::site::SiteConfig;

/// Builds one concrete provider type from its declared configuration.
#[async_trait]
pub trait ProviderFactory<P>: Send + Sync {
    /// The `provider_class` discriminator this factory handles.
    fn provider_class(&self) -> &str;

    /// Construct the provider. `config` is the provider entry's raw configuration
    /// object (its `config` field in [`crate::site::ProviderEntry`]).
    async fn construct(&self, site: &str, tag: &str, config: &Value) -> Result<P>;
}

/// Registry of provider factories for one site, memoizing each tag's instance the
/// first time it's requested.
pub struct ProviderRegistry<P> {
    site: SiteConfig,
    factories: HashMap<String, Arc<dyn ProviderFactory<P>>>,
    instances: std::sync::Mutex<HashMap<String, Arc<OnceCell<Arc<P>>>>>,
}

impl<P> ProviderRegistry<P> {
    /// A registry for `site`, with no factories registered yet.
    #[must_use]
    pub fn new(site: SiteConfig) -> Self {
        ProviderRegistry {
            site,
            factories: HashMap::new(),
            instances: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Register a factory for a `provider_class`. Registering the same class twice
    /// replaces the previous factory.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory<P>>) {
        self.factories
            .insert(factory.provider_class().to_string(), factory);
    }

    /// This registry's site configuration.
    #[must_use]
    pub fn site(&self) -> &SiteConfig {
        &self.site
    }

    /// Get (constructing if necessary) the provider instance for `tag`. Construction
    /// happens at most once per tag even under concurrent callers; the losing
    /// callers await the same in-flight construction rather than racing it.
    pub async fn get_or_create(&self, tag: &str) -> Result<Arc<P>> {
        let entry = self
            .site
            .provider(tag)
            .ok_or_else(|| Error::UnknownProvider(tag.to_string()))?;
        let factory = self
            .factories
            .get(&entry.provider_class)
            .ok_or_else(|| Error::UnknownProviderClass(entry.provider_class.clone()))?
            .clone();

        let cell = {
            let mut instances = self.instances.lock().unwrap_or_else(|e| e.into_inner());
            instances
                .entry(tag.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let site_name = self.site.site.clone();
        let config = entry.config.clone();
        let tag_owned = tag.to_string();
        let provider = cell
            .get_or_try_init(|| async move {
                debug!(site = %site_name, tag = %tag_owned, "instantiating provider");
                factory.construct(&site_name, &tag_owned, &config).await.map(Arc::new)
            })
            .await?;
        Ok(provider.clone())
    }
}
