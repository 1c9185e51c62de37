//! The Nullary/Unary/BinaryZip operator model: the three shapes an [`Adapter`]'s
//! stream body can take, and the combinators that unfold each into a linear
//! [`Stream`](crate::stream::Stream).

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::cancellation::CancellationScope;
use crate::stream::Stream;

type ValueResult = std::result::Result<Value, String>;

/// What a Unary adapter's `body(x)` produced for one pulled-in value, before the
/// stream layer unfolds it into zero or more linear output items.
pub enum BodyOutput {
    /// Yields exactly the one value.
    Single(Value),
    /// Yields the value the awaitable resolves to.
    Future(BoxFuture<'static, ValueResult>),
    /// Yields every value the nested stream produces, in order.
    Sequence(BoxStream<'static, ValueResult>),
    /// A batch awaited in submission order: item `i`'s value is yielded before
    /// item `i+1`'s even if `i+1` resolves first.
    Sequential(Vec<BoxFuture<'static, ValueResult>>),
    /// A batch awaited as each one completes, in completion order.
    Concurrent(Vec<BoxFuture<'static, ValueResult>>),
}

impl BodyOutput {
    fn into_stream(self) -> BoxStream<'static, ValueResult> {
        match self {
            BodyOutput::Single(v) => futures::stream::once(async { Ok(v) }).boxed(),
            BodyOutput::Future(fut) => futures::stream::once(fut).boxed(),
            BodyOutput::Sequence(s) => s,
            BodyOutput::Sequential(futs) => futures::stream::iter(futs).then(|f| f).boxed(),
            BodyOutput::Concurrent(futs) => {
                futures::stream::FuturesUnordered::from_iter(futs).boxed()
            }
        }
    }
}

/// Things a call's adapter declares about its cache fingerprint and how it turns
/// a produced value into a wire response. Every adapter kind (Nullary/Unary/
/// BinaryZip) implements this in addition to providing its producer stream.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// This call's node identifier.
    fn node_id(&self) -> Uuid;

    /// Whether this adapter's values are surfaced to the client as responses.
    fn is_output(&self) -> bool;

    /// The parameter subset that affects this adapter's produced artifact. Node
    /// id, `is_output`, and `force_compute` are never included here: callers
    /// fold in input-adapter fingerprints and those three flags separately.
    fn collect_local_hash_dict(&self) -> Map<String, Value>;

    /// Convert one produced value into a wire response body. The default wraps
    /// it as a plain Value response.
    async fn prepare_to_send(&self, value: Value) -> dfm_core::ResponseBody {
        dfm_core::ResponseBody::Value { value }
    }

    /// Build this adapter's producer: the live sequence of values it yields
    /// when it has no cached stream to replay. Called at most once per
    /// adapter instance; the stream layer is responsible for memoizing it.
    fn stream_body(&self, scope: &CancellationScope) -> BoxStream<'static, ValueResult>;
}

/// A Nullary adapter's producer has no upstream; its `stream_body` is used
/// directly as the live stream.
#[must_use]
pub fn nullary_stream(
    scope: &CancellationScope,
    producer: BoxStream<'static, ValueResult>,
) -> std::sync::Arc<Stream> {
    Stream::from_producer(scope, producer)
}

/// Pull each value from `upstream` and apply `body`, unfolding its
/// [`BodyOutput`] into the linear output sequence. Terminates when `upstream`
/// terminates (propagating its terminal item), or on the first error `body`
/// itself produces.
pub fn unary_stream<F>(
    scope: &CancellationScope,
    upstream: std::sync::Arc<Stream>,
    body: F,
) -> std::sync::Arc<Stream>
where
    F: Fn(Value) -> BodyOutput + Send + Sync + 'static,
{
    use crate::stream::StreamItem;

    let produced: BoxStream<'static, ValueResult> = async_stream::stream! {
        let mut cursor = upstream.cursor();
        loop {
            match cursor.advance().await {
                StreamItem::Value(v) => {
                    let mut inner = body(v).into_stream();
                    while let Some(item) = inner.next().await {
                        yield item;
                    }
                }
                StreamItem::Error(message) => {
                    yield Err(message);
                    return;
                }
                StreamItem::End => return,
            }
        }
    }
    .boxed();

    Stream::from_producer(scope, produced)
}

/// Pull one value from each of `left` and `right` in lockstep, combining them
/// with `combine`. Terminates as soon as either upstream terminates.
pub fn binary_zip_stream<F>(
    scope: &CancellationScope,
    left: std::sync::Arc<Stream>,
    right: std::sync::Arc<Stream>,
    combine: F,
) -> std::sync::Arc<Stream>
where
    F: Fn(Value, Value) -> Value + Send + Sync + 'static,
{
    use crate::stream::StreamItem;

    let produced: BoxStream<'static, ValueResult> = async_stream::stream! {
        let mut left_cursor = left.cursor();
        let mut right_cursor = right.cursor();
        loop {
            let (l, r) = tokio::join!(left_cursor.advance(), right_cursor.advance());
            match (l, r) {
                (StreamItem::Value(lv), StreamItem::Value(rv)) => yield Ok(combine(lv, rv)),
                (StreamItem::Error(message), _) | (_, StreamItem::Error(message)) => {
                    yield Err(message);
                    return;
                }
                _ => return,
            }
        }
    }
    .boxed();

    Stream::from_producer(scope, produced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream::iter;
    use serde_json::json;

    fn values(vs: Vec<Value>) -> BoxStream<'static, ValueResult> {
        iter(vs.into_iter().map(Ok)).boxed()
    }

    #[tokio::test]
    async fn unary_single_doubles_each_value() {
        let scope = CancellationScope::new();
        let upstream = Stream::from_producer(&scope, values(vec![json!(1), json!(2)]));
        let doubled = unary_stream(&scope, upstream, |v| {
            BodyOutput::Single(json!(v.as_i64().unwrap() * 2))
        });
        let mut cursor = doubled.cursor();
        use crate::stream::StreamItem;
        assert_eq!(cursor.advance().await, StreamItem::Value(json!(2)));
        assert_eq!(cursor.advance().await, StreamItem::Value(json!(4)));
        assert_eq!(cursor.advance().await, StreamItem::End);
    }

    #[tokio::test]
    async fn unary_sequential_batch_preserves_submission_order() {
        let scope = CancellationScope::new();
        let upstream = Stream::from_producer(&scope, values(vec![json!(1)]));
        let expanded = unary_stream(&scope, upstream, |_| {
            BodyOutput::Sequential(vec![
                async { Ok(json!("a")) }.boxed(),
                async {
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                    Ok(json!("b"))
                }
                .boxed(),
            ])
        });
        let mut cursor = expanded.cursor();
        use crate::stream::StreamItem;
        assert_eq!(cursor.advance().await, StreamItem::Value(json!("a")));
        assert_eq!(cursor.advance().await, StreamItem::Value(json!("b")));
        assert_eq!(cursor.advance().await, StreamItem::End);
    }

    #[tokio::test]
    async fn binary_zip_terminates_with_the_shorter_upstream() {
        let scope = CancellationScope::new();
        let left = Stream::from_producer(&scope, values(vec![json!(1), json!(2), json!(3)]));
        let right = Stream::from_producer(&scope, values(vec![json!("x"), json!("y")]));
        let zipped = binary_zip_stream(&scope, left, right, |l, r| json!([l, r]));
        let mut cursor = zipped.cursor();
        use crate::stream::StreamItem;
        assert_eq!(cursor.advance().await, StreamItem::Value(json!([1, "x"])));
        assert_eq!(cursor.advance().await, StreamItem::Value(json!([2, "y"])));
        assert_eq!(cursor.advance().await, StreamItem::End);
    }

    #[tokio::test]
    async fn unary_propagates_upstream_error() {
        let scope = CancellationScope::new();
        let upstream_producer = futures::stream::iter(vec![Err("boom".to_string())]).boxed();
        let upstream = Stream::from_producer(&scope, upstream_producer);
        let passthrough = unary_stream(&scope, upstream, BodyOutput::Single);
        let mut cursor = passthrough.cursor();
        use crate::stream::StreamItem;
        assert_eq!(cursor.advance().await, StreamItem::Error("boom".to_string()));
    }
}
