//! Atomic file writes: write to a uniquely-named temp file, fsync, then rename over
//! the target. Renames are atomic on the same filesystem, so readers never observe a
//! partially-written file.

use std::cell::Cell;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};

static PROCESS_COUNTER: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static THREAD_COUNTER: Cell<u64> = const { Cell::new(0) };
}

/// A temp-file suffix unique within this process: a monotonic per-process counter
/// combined with a per-thread counter, avoiding the overhead of a UUID per write while
/// still guaranteeing no two concurrent writers in this process pick the same name.
fn unique_suffix() -> String {
    let process_seq = PROCESS_COUNTER.fetch_add(1, Ordering::Relaxed);
    let thread_seq = THREAD_COUNTER.with(|c| {
        let v = c.get();
        c.set(v + 1);
        v
    });
    format!("{}.{}.{process_seq}.{thread_seq}", std::process::id(), now_nanos())
}

fn now_nanos() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

/// Write `contents` to `target` atomically: writes to a sibling temp file, fsyncs it,
/// then renames it over `target`.
pub async fn write_atomic(target: &Path, contents: &[u8]) -> Result<()> {
    let dir = target.parent().ok_or_else(|| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "target has no parent directory",
        ))
    })?;
    let temp_name = format!(
        ".{}.tmp-{}",
        target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("cache-entry"),
        unique_suffix()
    );
    let temp_path = dir.join(temp_name);

    let mut file = tokio::fs::File::create(&temp_path).await?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&temp_path, target).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn atomic_write_produces_readable_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("sentinel.json");

        write_atomic(&target, b"{\"ok\":true}").await.unwrap();

        let read_back = tokio::fs::read(&target).await.unwrap();
        assert_eq!(read_back, b"{\"ok\":true}");
    }

    #[tokio::test]
    async fn atomic_write_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("sentinel.json");

        write_atomic(&target, b"first").await.unwrap();
        write_atomic(&target, b"second").await.unwrap();

        let read_back = tokio::fs::read(&target).await.unwrap();
        assert_eq!(read_back, b"second");
    }

    #[tokio::test]
    async fn concurrent_writers_never_collide_on_temp_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut handles = Vec::new();
        for i in 0..16 {
            let target = dir.path().join(format!("entry-{i}.json"));
            handles.push(tokio::spawn(async move {
                write_atomic(&target, format!("{i}").as_bytes())
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
    }
}
