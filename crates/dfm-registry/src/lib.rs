// Copyright 2026 DFM Platform Team

//! Site / Provider / Adapter registry.
//!
//! A [`site::SiteConfig`] declares which providers a site runs and which adapter
//! implementation handles each `api_class` a provider serves. [`provider::ProviderRegistry`]
//! lazily instantiates and memoizes providers per tag; [`adapter::AdapterRegistry`]
//! resolves a `FunctionCall` to the implementation factory that should execute it.
//!
//! Both registries are generic over the instantiated provider/adapter types so this
//! crate has no dependency on the dataflow runtime crate that defines them.

pub mod adapter;
pub mod error;
pub mod provider;
pub mod site;

pub use adapter::{AdapterConstructContext, AdapterFactory, AdapterRegistry, ResolvedTarget};
pub use error::{Error, Result};
pub use provider::{ProviderFactory, ProviderRegistry};
pub use site::{AdapterEntry, ProviderEntry, SiteConfig};
