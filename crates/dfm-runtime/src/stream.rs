//! Restartable, multi-consumer lazy streams.
//!
//! Per the platform's redesign note on the original async-generator-pushing-to-a-
//! sentinel-future pattern, this models a stream as an append-only value log plus a
//! terminal tag, fanned out to any number of independent cursors rather than as a
//! literal chain of future slots: each consumer holds its own cursor and observes
//! the same sequence in the same order, which is the externally visible contract
//! the original machinery existed to provide.

use std::sync::{Arc, Mutex};

use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Notify;

use crate::cancellation::CancellationScope;

/// One item observed by a stream consumer.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamItem {
    /// A produced value.
    Value(Value),
    /// The producer raised an exception; this is the terminal item — no further
    /// items follow it.
    Error(String),
    /// The producer exhausted normally; this is the terminal item.
    End,
}

impl StreamItem {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamItem::Value(_))
    }
}

struct Inner {
    items: Mutex<Vec<StreamItem>>,
    notify: Notify,
}

impl Inner {
    fn push(&self, item: StreamItem) {
        self.items.lock().unwrap().push(item);
        self.notify.notify_waiters();
    }
}

/// A restartable, multi-consumer stream of one adapter's output.
pub struct Stream {
    inner: Arc<Inner>,
}

impl Stream {
    /// Drive `producer` in a background task registered under `scope`, appending
    /// each item it yields. A producer `Err` or natural exhaustion both append a
    /// single terminal item and stop the task.
    #[must_use]
    pub fn from_producer(
        scope: &CancellationScope,
        mut producer: BoxStream<'static, std::result::Result<Value, String>>,
    ) -> Arc<Self> {
        let inner = Arc::new(Inner {
            items: Mutex::new(Vec::new()),
            notify: Notify::new(),
        });
        let task_inner = inner.clone();
        let task_scope = scope.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = task_scope.cancelled() => return,
                    next = producer.next() => match next {
                        Some(Ok(value)) => task_inner.push(StreamItem::Value(value)),
                        Some(Err(message)) => {
                            task_inner.push(StreamItem::Error(message));
                            return;
                        }
                        None => {
                            task_inner.push(StreamItem::End);
                            return;
                        }
                    },
                }
            }
        });
        scope.register(handle);
        Arc::new(Stream { inner })
    }

    /// Build a stream from already-materialized values (the cache replay path);
    /// the trailing item is immediately `End`, with no background task.
    #[must_use]
    pub fn from_values(values: Vec<Value>) -> Arc<Self> {
        let mut items: Vec<StreamItem> = values.into_iter().map(StreamItem::Value).collect();
        items.push(StreamItem::End);
        Arc::new(Stream {
            inner: Arc::new(Inner {
                items: Mutex::new(items),
                notify: Notify::new(),
            }),
        })
    }

    /// A fresh, independent cursor over this stream starting at index 0.
    #[must_use]
    pub fn cursor(self: &Arc<Self>) -> StreamCursor {
        StreamCursor {
            inner: self.inner.clone(),
            index: 0,
        }
    }
}

/// One consumer's position within a [`Stream`]. Cursors are independent: two
/// cursors over the same stream observe the identical sequence regardless of
/// which advances first.
pub struct StreamCursor {
    inner: Arc<Inner>,
    index: usize,
}

impl StreamCursor {
    /// Await and return the next item, advancing the cursor. Once a terminal
    /// item (`Error`/`End`) has been returned, every subsequent call returns
    /// that same terminal item again without advancing further.
    pub async fn advance(&mut self) -> StreamItem {
        loop {
            {
                let items = self.inner.items.lock().unwrap();
                if let Some(item) = items.get(self.index) {
                    let item = item.clone();
                    if !item.is_terminal() {
                        self.index += 1;
                    }
                    return item;
                }
            }
            self.inner.notify.notified().await;
        }
    }
}
