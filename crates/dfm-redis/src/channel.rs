//! At-least-once FIFO pub/sub over Redis Streams. Each logical channel is a
//! `(source, destination, topic)` triple, named per [`crate::keys`]; every
//! subscriber consumes through a named consumer group so messages are
//! acknowledged, not just observed.

use crate::conn::Conn;
use crate::error::Result;
use crate::keys::{group_name, stream_name};

/// One inbound message: its stream entry id (ack token) and payload.
pub struct Message {
    pub id: String,
    pub payload: String,
}

/// A publisher/subscriber handle bound to one channel and consumer identity.
pub struct Channel {
    conn: Conn,
    stream: String,
    group: String,
    consumer: String,
}

impl Channel {
    /// Bind to `(src, dst, topic)` as `consumer` within the channel's consumer
    /// group. Creating the group is idempotent: a concurrent creator racing to
    /// `XGROUP CREATE` is not an error.
    pub async fn bind(conn: Conn, src: &str, dst: &str, topic: &str, consumer: impl Into<String>) -> Result<Self> {
        let stream = stream_name(src, dst, topic);
        let group = group_name(src, dst, topic);
        conn.ensure_group(&stream, &group).await?;
        Ok(Channel {
            conn,
            stream,
            group,
            consumer: consumer.into(),
        })
    }

    /// Publish a payload, returning the stream-assigned entry id.
    pub async fn publish(&self, payload: &str) -> Result<String> {
        self.conn.xadd(&self.stream, payload).await
    }

    /// Read up to `count` not-yet-delivered messages for this consumer.
    pub async fn read(&self, count: usize) -> Result<Vec<Message>> {
        let entries = self
            .conn
            .xreadgroup(&self.stream, &self.group, &self.consumer, count)
            .await?;
        Ok(entries
            .into_iter()
            .map(|(id, payload)| Message { id, payload })
            .collect())
    }

    /// Acknowledge a delivered message so it is not redelivered.
    pub async fn ack(&self, message_id: &str) -> Result<()> {
        self.conn.xack(&self.stream, &self.group, message_id).await
    }
}
