//! The Execute engine: claims a `Job`, compiles its block into a live adapter
//! graph, and either aggregates discovery advice or pumps leaf streams to
//! completion, appending every response to the request's state.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dfm_core::block::{Block, FunctionCall, NodeId};
use dfm_core::{DfmError, Job, Package, Response};
use dfm_discovery::{generate_advice, Discoverable, SerializedAdvice};
use dfm_redis::{Channel, Conn, Mailbox, RequestStateStore};
use dfm_registry::{AdapterConstructContext, AdapterRegistry, ProviderRegistry};
use dfm_runtime::adapter::Adapter;
use dfm_runtime::cancellation::CancellationScope;
use dfm_runtime::get_or_create::StreamRegistry;
use dfm_runtime::stream::StreamItem;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ExecuteConfig;
use crate::discovery::DiscoveryResponse;

/// Everything one compiled node needs to expose to the execute loop: both the
/// narrower `Adapter` view the stream runtime needs and the `Discoverable` view
/// the discovery engine needs. Rust 1.80 has no stable trait-object upcasting,
/// so a compiled node exposes both views explicitly rather than letting callers
/// coerce a `&dyn Node` down to either one.
pub trait Node: Send + Sync {
    fn as_adapter(&self) -> &dyn Adapter;
    fn as_discoverable(&self) -> &dyn Discoverable;
}

/// A compiled node, shared between the node that constructed it and whatever
/// downstream nodes bind it as an input.
pub type NodeHandle = Arc<dyn Node>;

/// One claimed job's compiled block: every node instantiated in dependency
/// order, the nodes nobody downstream references (the streams the dispatch
/// loop actually pumps), and each node's folded fingerprint for cache lookups.
struct Compiled {
    nodes: HashMap<NodeId, NodeHandle>,
    leaves: Vec<NodeId>,
    force_compute: HashMap<NodeId, bool>,
}

/// Scan every node's params for UUID-shaped strings, the same heuristic
/// `dfm_core::block::check_refs` uses to validate references, but collecting
/// into a set instead of validating against one.
fn collect_references(value: &Value, into: &mut HashSet<NodeId>) {
    match value {
        Value::String(s) => {
            if let Ok(id) = Uuid::parse_str(s) {
                into.insert(id);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_references(item, into);
            }
        }
        _ => {}
    }
}

fn bound_input_id(call: &FunctionCall, name: &str) -> Option<NodeId> {
    match call.params.get(name)? {
        Value::String(s) => Uuid::parse_str(s).ok(),
        _ => None,
    }
}

/// Runs the claim/compile/dispatch/ack loop against the `execute` channel.
/// Generic over the provider type `P`; this crate has no concrete providers of
/// its own, so a deployment wires its own `P` and registers its adapter/
/// provider factories before calling [`ExecuteEngine::run`].
pub struct ExecuteEngine<P> {
    /// Configured fallback; `resolve_this_site` prefers whatever the uplink
    /// collaborator has published to the mailbox, per request.
    this_site: String,
    adapters: AdapterRegistry<NodeHandle, P>,
    providers: ProviderRegistry<P>,
    store: RequestStateStore,
    mailbox: Mailbox,
    execute_channel: Channel,
    uplink_channel: Channel,
    cache_dir: Option<PathBuf>,
    heartbeat_interval: Duration,
}

impl<P: Send + Sync + 'static> ExecuteEngine<P> {
    pub async fn bind(
        this_site: impl Into<String>,
        consumer_name: impl Into<String>,
        conn: Conn,
        adapters: AdapterRegistry<NodeHandle, P>,
        providers: ProviderRegistry<P>,
        cache_dir: Option<PathBuf>,
        heartbeat_interval: Duration,
    ) -> dfm_redis::Result<Self> {
        let consumer_name = consumer_name.into();
        let execute_channel = Channel::bind(conn.clone(), "ANY", "EXECUTE", "req", consumer_name.clone()).await?;
        let uplink_channel = Channel::bind(conn.clone(), "ANY", "UPLINK", "req", consumer_name).await?;
        Ok(ExecuteEngine {
            this_site: this_site.into(),
            adapters,
            providers,
            store: RequestStateStore::new(conn.clone()),
            mailbox: Mailbox::new(conn),
            execute_channel,
            uplink_channel,
            cache_dir,
            heartbeat_interval,
        })
    }

    /// The site name authoritative for this claim: the uplink collaborator's
    /// published name when present, else this worker's own configuration.
    async fn resolve_this_site(&self) -> String {
        match self.mailbox.this_site().await {
            Ok(Some(published)) => published,
            Ok(None) => self.this_site.clone(),
            Err(e) => {
                warn!(error = %e, "failed to read published this_site, falling back to configuration");
                self.this_site.clone()
            }
        }
    }

    /// Claim and process messages off the `execute` channel until cancelled.
    pub async fn run(&self) {
        loop {
            match self.execute_channel.read(1).await {
                Ok(messages) if messages.is_empty() => {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                Ok(messages) => {
                    for message in messages {
                        self.handle_one(&message.payload).await;
                        if let Err(e) = self.execute_channel.ack(&message.id).await {
                            warn!(error = %e, "failed to ack execute message");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "execute channel read failed");
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
            }
        }
    }

    /// Process one claimed job. Never panics: every failure is logged and
    /// reflected as an Error response (or simply dropped, for a job whose
    /// payload itself is unreadable) instead of propagating out of this
    /// method, so a single bad job never takes the worker down.
    async fn handle_one(&self, payload: &str) {
        let job: Job = match serde_json::from_str(payload) {
            Ok(job) => job,
            Err(e) => {
                warn!(error = %e, "dropping malformed job on execute channel");
                return;
            }
        };

        let this_site = self.resolve_this_site().await;
        if job.execute.targets_remote_site(&this_site) {
            self.relay(job).await;
            return;
        }

        let request_id = job.request_id;
        let scope = CancellationScope::new();
        let registry = StreamRegistry::new(scope.clone(), self.cache_dir.clone());

        let compiled = match self.compile(&job.execute.body).await {
            Ok(compiled) => compiled,
            Err(e) => {
                warn!(error = %e, %request_id, "compile failed");
                self.append(request_id, Response::error(None, &e)).await;
                return;
            }
        };

        if job.is_discovery {
            self.run_discovery(request_id, &compiled).await;
        } else {
            self.run_dispatch(request_id, &compiled, &registry, &this_site).await;
        }

        scope.cancel();
    }

    async fn relay(&self, job: Job) {
        let target_site = job.execute.site.clone().unwrap_or_default();
        let package = Package {
            source_site: self.this_site.clone(),
            target_site,
            job,
        };
        match serde_json::to_string(&package) {
            Ok(encoded) => {
                if let Err(e) = self.uplink_channel.publish(&encoded).await {
                    warn!(error = %e, request_id = %package.job.request_id, "failed to publish to uplink");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode package for uplink"),
        }
    }

    /// Compile every node in `block` (already topologically sorted per the
    /// block-scoping invariant) into a live `NodeHandle`, folding each node's
    /// own hash dict with the already-computed fingerprints of its declared
    /// inputs.
    async fn compile(&self, block: &Block) -> Result<Compiled, DfmError> {
        let mut referenced = HashSet::new();
        for call in block.iter() {
            for value in call.params.values() {
                collect_references(value, &mut referenced);
            }
        }

        let mut nodes: HashMap<NodeId, NodeHandle> = HashMap::new();
        let mut fingerprints: HashMap<NodeId, String> = HashMap::new();
        let mut force_compute: HashMap<NodeId, bool> = HashMap::new();

        for call in block.iter() {
            let resolved = self.adapters.resolve(call)?;
            let factory = self.adapters.factory_for(&resolved.implementation_class)?;
            let provider = self.providers.get_or_create(&resolved.provider_tag).await?;

            let mut inputs: HashMap<String, NodeHandle> = HashMap::new();
            for name in factory.declared_inputs() {
                if let Some(input_id) = bound_input_id(call, name) {
                    if let Some(handle) = nodes.get(&input_id) {
                        inputs.insert(name.clone(), handle.clone());
                    }
                }
            }

            let ctx = AdapterConstructContext {
                call,
                provider,
                adapter_config: resolved.adapter_config,
                inputs,
            };
            let node = factory.construct(ctx).await?;

            let mut hash_dict: Map<String, Value> = node.as_adapter().collect_local_hash_dict();
            for name in factory.declared_inputs() {
                if let Some(input_id) = bound_input_id(call, name) {
                    if let Some(fingerprint) = fingerprints.get(&input_id) {
                        hash_dict.insert(name.clone(), Value::String(fingerprint.clone()));
                    }
                }
            }

            let digest = dfm_cache::fingerprint(&hash_dict);
            fingerprints.insert(call.node_id, digest);
            force_compute.insert(call.node_id, call.force_compute);
            nodes.insert(call.node_id, node);
        }

        let leaves: Vec<NodeId> = block
            .iter()
            .map(|call| call.node_id)
            .filter(|id| !referenced.contains(id))
            .collect();

        Ok(Compiled { nodes, leaves, force_compute })
    }

    async fn run_discovery(&self, request_id: Uuid, compiled: &Compiled) {
        let mut response = DiscoveryResponse::new();
        for (node_id, node) in &compiled.nodes {
            let advice = generate_advice(node.as_discoverable()).await;
            response.insert(*node_id, advice.as_ref().map(SerializedAdvice::from));
        }

        match serde_json::to_value(&response) {
            Ok(value) => {
                let response = Response {
                    node_id: None,
                    timestamp: chrono::Utc::now(),
                    body: dfm_core::ResponseBody::Value { value },
                };
                self.append(request_id, response).await;
            }
            Err(e) => {
                warn!(error = %e, %request_id, "failed to encode discovery response");
                self.append(request_id, Response::error(None, &DfmError::server(e.to_string())))
                    .await;
            }
        }
    }

    async fn run_dispatch(&self, request_id: Uuid, compiled: &Compiled, registry: &StreamRegistry, this_site: &str) {
        if compiled.leaves.is_empty() {
            return;
        }

        let (tx, mut rx) = mpsc::channel::<(NodeId, StreamItem)>(64);

        for &leaf_id in &compiled.leaves {
            let Some(node) = compiled.nodes.get(&leaf_id).cloned() else {
                continue;
            };
            let hash_dict = node.as_adapter().collect_local_hash_dict();
            let force_compute = self.leaf_force_compute(compiled, leaf_id);
            let tx = tx.clone();

            let stream = registry.get_or_create_stream(node.as_adapter(), hash_dict, force_compute).await;
            tokio::spawn(async move {
                let mut cursor = stream.cursor();
                loop {
                    let item = cursor.advance().await;
                    let terminal = item.is_terminal();
                    if tx.send((leaf_id, item)).await.is_err() {
                        return;
                    }
                    if terminal {
                        return;
                    }
                }
            });
        }
        drop(tx);

        let mut pending: HashSet<NodeId> = compiled.leaves.iter().copied().collect();
        while !pending.is_empty() {
            match tokio::time::timeout(self.heartbeat_interval, rx.recv()).await {
                Ok(Some((node_id, StreamItem::Value(value)))) => {
                    let surfaces = compiled
                        .nodes
                        .get(&node_id)
                        .is_some_and(|node| node.as_adapter().is_output());
                    if surfaces {
                        self.append(request_id, Response::value(node_id, value)).await;
                    }
                }
                Ok(Some((node_id, StreamItem::Error(message)))) => {
                    let err = DfmError::resource(message);
                    self.append(request_id, Response::error(Some(node_id), &err)).await;
                    pending.remove(&node_id);
                }
                Ok(Some((node_id, StreamItem::End))) => {
                    pending.remove(&node_id);
                }
                Ok(None) => break,
                Err(_elapsed) => {
                    self.append(request_id, Response::heartbeat(this_site)).await;
                }
            }
        }
    }

    /// `force_compute` never cascades to inputs; a leaf's own call decides
    /// whether its own stream bypasses the cache.
    fn leaf_force_compute(&self, compiled: &Compiled, leaf_id: NodeId) -> bool {
        compiled.force_compute.get(&leaf_id).copied().unwrap_or(false)
    }

    async fn append(&self, request_id: Uuid, response: Response) {
        if let Err(e) = self.store.append_response(request_id, &response).await {
            warn!(error = %e, %request_id, "failed to append response");
        }
    }
}

pub async fn run(config: ExecuteConfig) -> anyhow::Result<()> {
    let conn = Conn::connect(&config.redis.to_redis_config()).await?;
    let adapters: AdapterRegistry<NodeHandle, ()> = AdapterRegistry::new(config.site.clone());
    let providers: ProviderRegistry<()> = ProviderRegistry::new(config.site.clone());

    let engine = ExecuteEngine::bind(
        config.site_name.clone(),
        config.consumer_name.clone(),
        conn,
        adapters,
        providers,
        config.cache_dir.clone(),
        config.heartbeat_interval,
    )
    .await?;

    info!(site = %config.site_name, consumer = %config.consumer_name, "dfm-execute running");
    engine.run().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfm_core::block::ParamValue;
    use dfm_core::process::Execute as ExecuteBlock;
    use dfm_redis::RedisConfig;
    use futures::stream::BoxStream;
    use futures::StreamExt;
    use std::collections::HashMap as Map2;
    use uuid::Uuid;

    struct ConstAdapter {
        node_id: Uuid,
        value: Value,
        params: Map<String, Value>,
        is_output: bool,
    }

    #[async_trait]
    impl Adapter for ConstAdapter {
        fn node_id(&self) -> Uuid {
            self.node_id
        }
        fn is_output(&self) -> bool {
            self.is_output
        }
        fn collect_local_hash_dict(&self) -> Map<String, Value> {
            let mut m = Map::new();
            m.insert("value".to_string(), self.value.clone());
            m
        }
        fn stream_body(&self, _scope: &CancellationScope) -> BoxStream<'static, std::result::Result<Value, String>> {
            let value = self.value.clone();
            futures::stream::once(async move { Ok(value) }).boxed()
        }
    }

    impl Discoverable for ConstAdapter {
        fn advisors(&self) -> Vec<Arc<dyn dfm_discovery::FieldAdvisor>> {
            Vec::new()
        }
        fn params(&self) -> &Map<String, Value> {
            &self.params
        }
    }

    struct ConstNode(ConstAdapter);
    impl Node for ConstNode {
        fn as_adapter(&self) -> &dyn Adapter {
            &self.0
        }
        fn as_discoverable(&self) -> &dyn Discoverable {
            &self.0
        }
    }

    struct ConstFactory;

    #[async_trait]
    impl dfm_registry::AdapterFactory<NodeHandle, ()> for ConstFactory {
        fn implementation_class(&self) -> &str {
            "test.Const"
        }
        fn declared_inputs(&self) -> &[String] {
            &[]
        }
        async fn construct(&self, ctx: AdapterConstructContext<'_, NodeHandle, ()>) -> dfm_registry::Result<NodeHandle> {
            let value = ctx.call.params.get("value").cloned().unwrap_or(Value::Null);
            Ok(Arc::new(ConstNode(ConstAdapter {
                node_id: ctx.call.node_id,
                value,
                params: ctx.call.params.clone(),
                is_output: ctx.call.is_output,
            })))
        }
    }

    fn sample_site() -> dfm_registry::SiteConfig {
        let mut site = dfm_registry::SiteConfig {
            site: "localhost".to_string(),
            providers: std::collections::HashMap::new(),
            heartbeat_interval_secs: 1,
            resources: None,
        };
        let mut adapters = std::collections::HashMap::new();
        adapters.insert(
            "test.Const".to_string(),
            dfm_registry::AdapterEntry::ImplClass("test.Const".to_string()),
        );
        site.providers.insert(
            "dfm".to_string(),
            dfm_registry::ProviderEntry {
                provider_class: "test.NoopProvider".to_string(),
                config: Value::Null,
                adapters,
            },
        );
        site
    }

    struct NoopProviderFactory;
    #[async_trait]
    impl dfm_registry::ProviderFactory<()> for NoopProviderFactory {
        fn provider_class(&self) -> &str {
            "test.NoopProvider"
        }
        async fn construct(&self, _site: &str, _tag: &str, _config: &Value) -> dfm_registry::Result<()> {
            Ok(())
        }
    }

    async fn test_engine() -> ExecuteEngine<()> {
        let conn = Conn::connect(&RedisConfig::fake()).await.unwrap();
        let mut adapters: AdapterRegistry<NodeHandle, ()> = AdapterRegistry::new(sample_site());
        adapters.register(Arc::new(ConstFactory));
        let mut providers: ProviderRegistry<()> = ProviderRegistry::new(sample_site());
        providers.register(Arc::new(NoopProviderFactory));

        ExecuteEngine::bind(
            "localhost",
            format!("test-{}", Uuid::new_v4()),
            conn,
            adapters,
            providers,
            None,
            Duration::from_millis(200),
        )
        .await
        .unwrap()
    }

    fn single_node_block(is_output: bool) -> (ExecuteBlock, NodeId) {
        let (block, id) = dfm_core::block::with_block_scope(|builder| {
            let handle = builder.add_node(
                "test.Const",
                "dfm",
                None,
                is_output,
                false,
                Map2::from([("value".to_string(), ParamValue::Json(serde_json::json!(42)))]),
            )?;
            Ok(handle.id())
        })
        .unwrap();
        (ExecuteBlock { site: None, body: block }, id)
    }

    #[tokio::test]
    async fn resolve_this_site_falls_back_to_configuration_when_unpublished() {
        let engine = test_engine().await;
        assert_eq!(engine.resolve_this_site().await, "localhost");
    }

    #[tokio::test]
    async fn resolve_this_site_prefers_the_published_mailbox_value() {
        let engine = test_engine().await;
        engine.mailbox.set_this_site("remote-site").await.unwrap();
        assert_eq!(engine.resolve_this_site().await, "remote-site");
    }

    #[tokio::test]
    async fn compiles_and_dispatches_a_single_node_to_completion() {
        let engine = test_engine().await;
        let (execute_block, node_id) = single_node_block(true);
        let scope = CancellationScope::new();
        let registry = StreamRegistry::new(scope.clone(), None);

        let compiled = engine.compile(&execute_block.body).await.unwrap();
        assert_eq!(compiled.leaves, vec![node_id]);

        let request_id = Uuid::new_v4();
        engine
            .store
            .persist(&dfm_core::RequestState::new(
                request_id,
                dfm_core::Process::build(None, None, None, |_| Ok(())).unwrap(),
            ))
            .await
            .unwrap();

        engine.run_dispatch(request_id, &compiled, &registry, "localhost").await;

        let state = engine.store.load(request_id).await.unwrap().unwrap();
        let values: Vec<_> = state.responses.iter().filter(|r| r.body.is_value()).collect();
        assert_eq!(values.len(), 1);
        scope.cancel();
    }

    #[tokio::test]
    async fn a_non_output_leaf_never_surfaces_a_value_response() {
        let engine = test_engine().await;
        let (execute_block, node_id) = single_node_block(false);
        let scope = CancellationScope::new();
        let registry = StreamRegistry::new(scope.clone(), None);

        let compiled = engine.compile(&execute_block.body).await.unwrap();
        assert_eq!(compiled.leaves, vec![node_id]);

        let request_id = Uuid::new_v4();
        engine
            .store
            .persist(&dfm_core::RequestState::new(
                request_id,
                dfm_core::Process::build(None, None, None, |_| Ok(())).unwrap(),
            ))
            .await
            .unwrap();

        engine.run_dispatch(request_id, &compiled, &registry, "localhost").await;

        let state = engine.store.load(request_id).await.unwrap().unwrap();
        let values: Vec<_> = state.responses.iter().filter(|r| r.body.is_value()).collect();
        assert!(values.is_empty());
        scope.cancel();
    }
}
