//! Job and Package: the units carried over pubsub channels.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::process::Execute;

/// The unit dispatched on the `execute`/`scheduler` pubsub channels.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Job {
    /// The originating request's identifier.
    pub request_id: Uuid,
    /// The site the request was originally submitted to.
    pub home_site: String,
    /// Optional deadline; presence and value drive the scheduler's ingest decision.
    pub deadline: Option<DateTime<FixedOffset>>,
    /// The execute block to run.
    pub execute: Execute,
    /// Whether this job should be run in discovery mode rather than executed.
    pub is_discovery: bool,
}

impl Job {
    /// Whether the scheduler should forward this job immediately rather than queue it:
    /// true when there is no deadline, or the deadline is non-positive, or it is
    /// already due relative to `now`.
    #[must_use]
    pub fn due_immediately(&self, now: DateTime<FixedOffset>) -> bool {
        match &self.deadline {
            None => true,
            Some(d) => d.timestamp() <= 0 || *d <= now,
        }
    }
}

/// A `Job` wrapped for cross-site relay over the `uplink` channel.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Package {
    /// The site that produced this package.
    pub source_site: String,
    /// The site the job should be delivered to.
    pub target_site: String,
    /// The wrapped job.
    pub job: Job,
}
