// Copyright 2026 DFM Platform Team

//! Fingerprint-addressed, sentinel-validated artifact cache substrate.
//!
//! An adapter's fingerprint is a hex digest over the parameters that affect its
//! produced artifact (excluding node id, `is_output`, `force_compute`) plus,
//! recursively, its input adapters' fingerprints. The fingerprint keys a cache
//! directory (`dfm_cache_<digest>`) holding a `CacheMetadata` JSON, a `CacheSentinel`
//! JSON written only after every value has been persisted, and the artifact values
//! themselves. A directory without a valid, parseable sentinel is considered absent —
//! this is the crate's central invariant, exercised throughout the test suite below.

mod atomic;
pub mod error;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::warn;

pub use error::{Error, Result};

/// Compute the hex digest fingerprint for a canonical hash dict. Key order does not
/// affect the result: `serde_json::Map` iterates in sorted key order by default
/// (no `preserve_order` feature enabled anywhere in this workspace), so two
/// semantically-equal dicts built in different insertion orders fingerprint
/// identically.
#[must_use]
pub fn fingerprint(hash_dict: &Map<String, Value>) -> String {
    // `to_string` on a `Map` serializes keys in the map's iteration order, which for
    // the default (non-`preserve_order`) `serde_json::Map` is sorted — giving a
    // canonical serialization without an explicit sort step here.
    let canonical = serde_json::to_string(hash_dict).unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(digest)
}

/// The on-disk folder name for a given fingerprint.
#[must_use]
pub fn cache_dir_name(digest: &str) -> String {
    format!("dfm_cache_{digest}")
}

/// Debugging record written alongside a cache directory: the inputs that produced its
/// fingerprint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// When the cache directory was created.
    pub created: DateTime<Utc>,
    /// The hash dict that produced this directory's fingerprint.
    pub hash_dict: Map<String, Value>,
}

/// Marker written only after every stream element has been persisted. Its presence
/// (and successful parse) is the sole signal that a cache directory is complete.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheSentinel {
    /// When the sentinel was published.
    pub created: DateTime<Utc>,
    /// How many elements the writer persisted before publishing this sentinel.
    pub num_elements_written: usize,
}

const METADATA_FILE: &str = "_dfm_cache_metadata.json";
const SENTINEL_FILE: &str = "_dfm_cache_sentinel.json";

/// A handle to one fingerprint's cache directory under `base_dir`.
#[derive(Clone, Debug)]
pub struct CacheHandle {
    dir: PathBuf,
}

impl CacheHandle {
    /// Address the cache directory for `digest` under `base_dir`.
    #[must_use]
    pub fn new(base_dir: &Path, digest: &str) -> Self {
        CacheHandle {
            dir: base_dir.join(cache_dir_name(digest)),
        }
    }

    /// The cache directory path.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    fn sentinel_path(&self) -> PathBuf {
        self.dir.join(SENTINEL_FILE)
    }

    fn value_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("value_{index:010}.json"))
    }

    /// Attempt to read a valid sentinel. Any failure (directory absent, sentinel
    /// absent, malformed JSON, IO error) is logged at `warn!` and treated as "no
    /// cache" — never propagated as a hard error, per the cache-errors-are-swallowed
    /// policy.
    pub async fn read_sentinel(&self) -> Option<CacheSentinel> {
        match tokio::fs::read(self.sentinel_path()).await {
            Ok(bytes) => match serde_json::from_slice::<CacheSentinel>(&bytes) {
                Ok(sentinel) => Some(sentinel),
                Err(e) => {
                    warn!(dir = %self.dir.display(), error = %e, "cache sentinel malformed, treating as absent");
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "cache sentinel unreadable, treating as absent");
                None
            }
        }
    }

    /// Load up to `n` cached values, in order, stopping (and logging) at the first
    /// missing or malformed artifact file rather than failing the whole read.
    pub async fn load_values(&self, n: usize) -> Vec<Value> {
        let mut values = Vec::with_capacity(n);
        for i in 0..n {
            match tokio::fs::read(self.value_path(i)).await {
                Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                    Ok(v) => values.push(v),
                    Err(e) => {
                        warn!(dir = %self.dir.display(), index = i, error = %e, "cache artifact malformed, stopping replay short");
                        break;
                    }
                },
                Err(e) => {
                    warn!(dir = %self.dir.display(), index = i, error = %e, "cache artifact missing, stopping replay short");
                    break;
                }
            }
        }
        values
    }

    /// The full read-path contract: valid sentinel plus a matching number of loadable
    /// values, or `None` if anything along the way fails. Never returns an `Err` —
    /// callers always fall through to live computation on `None`.
    pub async fn try_read(&self) -> Option<Vec<Value>> {
        let sentinel = self.read_sentinel().await?;
        let values = self.load_values(sentinel.num_elements_written).await;
        if values.len() != sentinel.num_elements_written {
            warn!(
                dir = %self.dir.display(),
                expected = sentinel.num_elements_written,
                actual = values.len(),
                "cache truncated relative to sentinel, treating as absent"
            );
            return None;
        }
        Some(values)
    }

    /// Begin a fresh write: delete any existing directory for this fingerprint,
    /// recreate it, and persist `CacheMetadata`. Returns a [`CacheWriter`] the caller
    /// drives one value at a time.
    pub async fn begin_write(&self, hash_dict: Map<String, Value>) -> Result<CacheWriter> {
        if tokio::fs::metadata(&self.dir).await.is_ok() {
            tokio::fs::remove_dir_all(&self.dir).await?;
        }
        tokio::fs::create_dir_all(&self.dir).await?;

        let metadata = CacheMetadata {
            created: Utc::now(),
            hash_dict,
        };
        let encoded = serde_json::to_vec_pretty(&metadata)?;
        atomic::write_atomic(&self.metadata_path(), &encoded).await?;

        Ok(CacheWriter {
            handle: self.clone(),
            num_written: 0,
        })
    }
}

/// Drives the write path for one fingerprint: persist values as they arrive, then
/// publish the sentinel once the producing stream has run to completion. If the
/// writer is dropped (or `abort`ed) before [`CacheWriter::finish`] is called, the
/// directory is simply left without a sentinel and is considered absent on next
/// access — exactly the "on writer exception, no sentinel" contract.
pub struct CacheWriter {
    handle: CacheHandle,
    num_written: usize,
}

impl CacheWriter {
    /// Persist one value at the next index.
    pub async fn write_value(&mut self, value: &Value) -> Result<()> {
        let path = self.handle.value_path(self.num_written);
        let encoded = serde_json::to_vec(value)?;
        atomic::write_atomic(&path, &encoded).await?;
        self.num_written += 1;
        Ok(())
    }

    /// How many values have been persisted so far.
    #[must_use]
    pub fn num_written(&self) -> usize {
        self.num_written
    }

    /// Atomically publish the sentinel, making this cache directory visible to
    /// readers. Consumes the writer: there is exactly one sentinel publication per
    /// write pass.
    pub async fn finish(self) -> Result<()> {
        let sentinel = CacheSentinel {
            created: Utc::now(),
            num_elements_written: self.num_written,
        };
        let encoded = serde_json::to_vec_pretty(&sentinel)?;
        atomic::write_atomic(&self.handle.sentinel_path(), &encoded).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hash_dict(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn fingerprint_is_deterministic_and_order_independent() {
        let a = hash_dict(&[("site", json!("esri")), ("layer", json!("metar"))]);
        let b = hash_dict(&[("layer", json!("metar")), ("site", json!("esri"))]);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn fingerprint_differs_for_different_inputs() {
        let a = hash_dict(&[("site", json!("esri"))]);
        let b = hash_dict(&[("site", json!("gfs"))]);
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[tokio::test]
    async fn missing_directory_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let handle = CacheHandle::new(dir.path(), "deadbeef");
        assert!(handle.try_read().await.is_none());
    }

    #[tokio::test]
    async fn full_write_then_read_round_trips_values() {
        let dir = tempfile::tempdir().unwrap();
        let handle = CacheHandle::new(dir.path(), "deadbeef");

        let mut writer = handle
            .begin_write(hash_dict(&[("site", json!("esri"))]))
            .await
            .unwrap();
        writer.write_value(&json!(1)).await.unwrap();
        writer.write_value(&json!(2)).await.unwrap();
        writer.write_value(&json!(3)).await.unwrap();
        writer.finish().await.unwrap();

        let values = handle.try_read().await.expect("cache should be complete");
        assert_eq!(values, vec![json!(1), json!(2), json!(3)]);
    }

    #[tokio::test]
    async fn partial_cache_without_sentinel_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let handle = CacheHandle::new(dir.path(), "deadbeef");

        let mut writer = handle.begin_write(Map::new()).await.unwrap();
        writer.write_value(&json!("only one")).await.unwrap();
        // writer dropped here without calling finish()

        assert!(handle.try_read().await.is_none());
    }

    #[tokio::test]
    async fn next_writer_clears_previous_partial_cache() {
        let dir = tempfile::tempdir().unwrap();
        let handle = CacheHandle::new(dir.path(), "deadbeef");

        let mut writer = handle.begin_write(Map::new()).await.unwrap();
        writer.write_value(&json!("stale")).await.unwrap();
        drop(writer);

        let mut writer = handle.begin_write(Map::new()).await.unwrap();
        writer.write_value(&json!("fresh")).await.unwrap();
        writer.finish().await.unwrap();

        let values = handle.try_read().await.unwrap();
        assert_eq!(values, vec![json!("fresh")]);
    }

    #[tokio::test]
    async fn corrupt_sentinel_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let handle = CacheHandle::new(dir.path(), "deadbeef");
        tokio::fs::create_dir_all(handle.dir()).await.unwrap();
        tokio::fs::write(handle.dir().join(SENTINEL_FILE), b"not json")
            .await
            .unwrap();

        assert!(handle.try_read().await.is_none());
    }
}
