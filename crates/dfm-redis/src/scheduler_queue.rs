//! Deadline-ordered scheduler queue backed by a Redis sorted set: members are
//! serialized [`dfm_core::Job`]s scored by their deadline in unix seconds.

use chrono::{DateTime, Utc};
use dfm_core::Job;

use crate::conn::Conn;
use crate::error::Result;
use crate::keys::scheduler_queue_key;

pub struct SchedulerQueue {
    conn: Conn,
}

impl SchedulerQueue {
    #[must_use]
    pub fn new(conn: Conn) -> Self {
        SchedulerQueue { conn }
    }

    /// Insert a job, scored by its deadline. Jobs with no deadline should be
    /// dispatched immediately by the caller instead of queued (see
    /// [`dfm_core::Job::due_immediately`]); this method does not special-case
    /// that, it always scores by the given `deadline_unix_secs`.
    pub async fn insert(&self, deadline_unix_secs: f64, job: &Job) -> Result<()> {
        let encoded = serde_json::to_string(job)?;
        self.conn
            .zadd(&scheduler_queue_key(), deadline_unix_secs, &encoded)
            .await
    }

    /// Atomically pop every job whose deadline is at or before `now`, in
    /// deadline order, so the caller can dispatch them.
    pub async fn pop_ready(&self, now: DateTime<Utc>) -> Result<Vec<Job>> {
        let raw = self
            .conn
            .zpop_ready(&scheduler_queue_key(), now.timestamp() as f64)
            .await?;
        raw.into_iter()
            .map(|s| serde_json::from_str(&s).map_err(Into::into))
            .collect()
    }
}
