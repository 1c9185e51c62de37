//! The cache-aware `get_or_create_stream` contract: memoize one stream per
//! adapter node, replay from cache when a valid one exists, and otherwise fork
//! a cache-writer task alongside the live producer.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::adapter::Adapter;
use crate::cancellation::CancellationScope;
use crate::stream::{Stream, StreamItem};

/// Per-request registry memoizing one [`Stream`] per adapter node and owning
/// the cancellation scope every stream/cache-writer task it spawns registers
/// under.
pub struct StreamRegistry {
    cache_base_dir: Option<PathBuf>,
    scope: CancellationScope,
    streams: Mutex<HashMap<Uuid, Arc<Stream>>>,
}

impl StreamRegistry {
    #[must_use]
    pub fn new(scope: CancellationScope, cache_base_dir: Option<PathBuf>) -> Self {
        StreamRegistry {
            cache_base_dir,
            scope,
            streams: Mutex::new(HashMap::new()),
        }
    }

    /// The scope this registry's streams and cache writers are registered
    /// under; cancelling it tears down everything this registry has created.
    #[must_use]
    pub fn scope(&self) -> &CancellationScope {
        &self.scope
    }

    /// Return the memoized stream for `adapter`, constructing it on first
    /// call. `hash_dict` must already fold in the adapter's own
    /// [`Adapter::collect_local_hash_dict`] plus its already-resolved input
    /// adapters' fingerprints — this registry does not walk the dependency
    /// graph itself.
    pub async fn get_or_create_stream(
        &self,
        adapter: &dyn Adapter,
        hash_dict: Map<String, Value>,
        force_compute: bool,
    ) -> Arc<Stream> {
        let node_id = adapter.node_id();
        if let Some(existing) = self.streams.lock().unwrap().get(&node_id).cloned() {
            return existing;
        }

        let stream = self.build_stream(adapter, hash_dict, force_compute).await;
        self.streams
            .lock()
            .unwrap()
            .entry(node_id)
            .or_insert(stream)
            .clone()
    }

    async fn build_stream(
        &self,
        adapter: &dyn Adapter,
        hash_dict: Map<String, Value>,
        force_compute: bool,
    ) -> Arc<Stream> {
        if let Some(base_dir) = &self.cache_base_dir {
            if !force_compute {
                let digest = dfm_cache::fingerprint(&hash_dict);
                let handle = dfm_cache::CacheHandle::new(base_dir, &digest);
                if let Some(values) = handle.try_read().await {
                    return Stream::from_values(values);
                }
            }
        }

        let child_scope = self.scope.child();
        let producer = adapter.stream_body(&child_scope);
        let live = Stream::from_producer(&child_scope, producer);

        if let Some(base_dir) = &self.cache_base_dir {
            let digest = dfm_cache::fingerprint(&hash_dict);
            let handle = dfm_cache::CacheHandle::new(base_dir, &digest);
            self.spawn_cache_writer(&child_scope, handle, hash_dict, live.clone());
        }

        live
    }

    fn spawn_cache_writer(
        &self,
        scope: &CancellationScope,
        handle: dfm_cache::CacheHandle,
        hash_dict: Map<String, Value>,
        stream: Arc<Stream>,
    ) {
        let handle_task = tokio::spawn(async move {
            let mut writer = match handle.begin_write(hash_dict).await {
                Ok(writer) => writer,
                Err(e) => {
                    tracing::warn!(error = %e, "cache writer could not start, leaving no cache behind");
                    return;
                }
            };
            let mut cursor = stream.cursor();
            loop {
                match cursor.advance().await {
                    StreamItem::Value(value) => {
                        if let Err(e) = writer.write_value(&value).await {
                            tracing::warn!(error = %e, "cache writer failed mid-stream, abandoning without a sentinel");
                            return;
                        }
                    }
                    StreamItem::Error(_) => return,
                    StreamItem::End => {
                        if let Err(e) = writer.finish().await {
                            tracing::warn!(error = %e, "cache writer failed to publish sentinel");
                        }
                        return;
                    }
                }
            }
        });
        scope.register(handle_task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use futures::StreamExt;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAdapter {
        node_id: Uuid,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Adapter for CountingAdapter {
        fn node_id(&self) -> Uuid {
            self.node_id
        }

        fn is_output(&self) -> bool {
            true
        }

        fn collect_local_hash_dict(&self) -> Map<String, Value> {
            Map::new()
        }

        fn stream_body(&self, _scope: &CancellationScope) -> BoxStream<'static, std::result::Result<Value, String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            futures::stream::iter(vec![Ok(json!(1)), Ok(json!(2))]).boxed()
        }
    }

    #[tokio::test]
    async fn second_call_returns_the_memoized_stream_without_reconstructing() {
        let registry = StreamRegistry::new(CancellationScope::new(), None);
        let calls = Arc::new(AtomicUsize::new(0));
        let adapter = CountingAdapter {
            node_id: Uuid::new_v4(),
            calls: calls.clone(),
        };

        let first = registry
            .get_or_create_stream(&adapter, Map::new(), false)
            .await;
        let second = registry
            .get_or_create_stream(&adapter, Map::new(), false)
            .await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cache_miss_falls_through_to_live_and_populates_cache_for_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let registry = StreamRegistry::new(CancellationScope::new(), Some(dir.path().to_path_buf()));
        let calls = Arc::new(AtomicUsize::new(0));
        let adapter = CountingAdapter {
            node_id: Uuid::new_v4(),
            calls: calls.clone(),
        };

        let stream = registry
            .get_or_create_stream(&adapter, Map::new(), false)
            .await;
        let mut cursor = stream.cursor();
        assert_eq!(cursor.advance().await, StreamItem::Value(json!(1)));
        assert_eq!(cursor.advance().await, StreamItem::Value(json!(2)));
        assert_eq!(cursor.advance().await, StreamItem::End);

        // give the forked cache-writer task a chance to publish its sentinel
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let digest = dfm_cache::fingerprint(&Map::new());
        let handle = dfm_cache::CacheHandle::new(dir.path(), &digest);
        let cached = handle.try_read().await.expect("cache writer should have published");
        assert_eq!(cached, vec![json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn force_compute_skips_an_existing_cache() {
        let dir = tempfile::tempdir().unwrap();
        let digest = dfm_cache::fingerprint(&Map::new());
        let handle = dfm_cache::CacheHandle::new(dir.path(), &digest);
        let mut writer = handle.begin_write(Map::new()).await.unwrap();
        writer.write_value(&json!("cached")).await.unwrap();
        writer.finish().await.unwrap();

        let registry = StreamRegistry::new(CancellationScope::new(), Some(dir.path().to_path_buf()));
        let calls = Arc::new(AtomicUsize::new(0));
        let adapter = CountingAdapter {
            node_id: Uuid::new_v4(),
            calls: calls.clone(),
        };

        let stream = registry
            .get_or_create_stream(&adapter, Map::new(), true)
            .await;
        let mut cursor = stream.cursor();
        assert_eq!(cursor.advance().await, StreamItem::Value(json!(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
