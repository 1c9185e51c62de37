//! The Scheduler service: a deadline-ordered holding area between Process and
//! Execute. Runs two cooperative loops against the same `SchedulerQueue` —
//! ingest consumes the `scheduler` channel and either forwards a due job
//! straight through or parks it in the sorted set; promote periodically pops
//! whatever has come due and forwards it.

use chrono::Utc;
use dfm_core::Job;
use dfm_redis::{Channel, Conn, SchedulerQueue};
use tracing::{info, warn};

use crate::config::SchedulerConfig;

const SOURCE: &str = "ANY";

pub struct Scheduler {
    queue: SchedulerQueue,
    inbox: Channel,
    outbox: Channel,
    promote_tick: std::time::Duration,
}

impl Scheduler {
    pub async fn bind(conn: Conn, consumer: impl Into<String>, promote_tick: std::time::Duration) -> dfm_redis::Result<Self> {
        let consumer = consumer.into();
        let inbox = Channel::bind(conn.clone(), SOURCE, "SCHEDULER", "req", consumer.clone()).await?;
        let outbox = Channel::bind(conn.clone(), SOURCE, "EXECUTE", "req", consumer).await?;
        Ok(Scheduler {
            queue: SchedulerQueue::new(conn),
            inbox,
            outbox,
            promote_tick,
        })
    }

    /// Run both loops concurrently until cancelled. Never returns on its own.
    pub async fn run(self) {
        tokio::join!(self.ingest_loop(), self.promote_loop());
    }

    async fn ingest_loop(&self) {
        loop {
            match self.inbox.read(16).await {
                Ok(messages) if messages.is_empty() => {
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                }
                Ok(messages) => {
                    for message in messages {
                        self.ingest_one(&message.payload).await;
                        if let Err(e) = self.inbox.ack(&message.id).await {
                            warn!(error = %e, "failed to ack scheduler inbox message");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "scheduler inbox read failed");
                    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                }
            }
        }
    }

    async fn ingest_one(&self, payload: &str) {
        let job: Job = match serde_json::from_str(payload) {
            Ok(job) => job,
            Err(e) => {
                warn!(error = %e, "dropping malformed job on scheduler inbox");
                return;
            }
        };

        let now = Utc::now();
        let now_fixed = now.with_timezone(&chrono::FixedOffset::east_opt(0).unwrap());
        if job.due_immediately(now_fixed) {
            self.forward(&job).await;
            return;
        }

        let deadline_secs = job.deadline.expect("due_immediately ruled out None above").timestamp() as f64;
        if let Err(e) = self.queue.insert(deadline_secs, &job).await {
            warn!(error = %e, request_id = %job.request_id, "failed to park job in scheduler queue");
        }
    }

    async fn promote_loop(&self) {
        let mut ticker = tokio::time::interval(self.promote_tick);
        loop {
            ticker.tick().await;
            let now = Utc::now();
            match self.queue.pop_ready(now).await {
                Ok(jobs) => {
                    for job in jobs {
                        self.forward(&job).await;
                    }
                }
                Err(e) => warn!(error = %e, "scheduler promote tick failed"),
            }
        }
    }

    async fn forward(&self, job: &Job) {
        let encoded = match serde_json::to_string(job) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, request_id = %job.request_id, "failed to encode job for forwarding");
                return;
            }
        };
        match self.outbox.publish(&encoded).await {
            Ok(_) => info!(request_id = %job.request_id, "job forwarded to execute"),
            Err(e) => warn!(error = %e, request_id = %job.request_id, "failed to forward job to execute"),
        }
    }
}

pub async fn run(config: SchedulerConfig) -> anyhow::Result<()> {
    let conn = Conn::connect(&config.redis.to_redis_config()).await?;
    let scheduler = Scheduler::bind(conn, "scheduler", config.promote_tick).await?;
    scheduler.run().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, FixedOffset};
    use dfm_core::block::Block;
    use dfm_core::process::Execute;
    use dfm_redis::RedisConfig;
    use uuid::Uuid;

    async fn fake_conn() -> Conn {
        Conn::connect(&RedisConfig::fake()).await.unwrap()
    }

    fn job_with_deadline(deadline: Option<chrono::DateTime<FixedOffset>>) -> Job {
        Job {
            request_id: Uuid::new_v4(),
            home_site: "localhost".into(),
            deadline,
            execute: Execute {
                site: None,
                body: Block::new(),
            },
            is_discovery: false,
        }
    }

    #[tokio::test]
    async fn a_job_with_no_deadline_is_forwarded_immediately() {
        let conn = fake_conn().await;
        let scheduler = Scheduler::bind(conn.clone(), "test", std::time::Duration::from_millis(10))
            .await
            .unwrap();
        let job = job_with_deadline(None);
        scheduler.ingest_one(&serde_json::to_string(&job).unwrap()).await;

        let execute_inbox = Channel::bind(conn, "ANY", "EXECUTE", "req", "verify").await.unwrap();
        let messages = execute_inbox.read(10).await.unwrap();
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn a_future_deadline_is_parked_not_forwarded() {
        let conn = fake_conn().await;
        let scheduler = Scheduler::bind(conn.clone(), "test", std::time::Duration::from_millis(10))
            .await
            .unwrap();
        let future = Utc::now().with_timezone(&FixedOffset::east_opt(0).unwrap()) + ChronoDuration::hours(1);
        let job = job_with_deadline(Some(future));
        scheduler.ingest_one(&serde_json::to_string(&job).unwrap()).await;

        let execute_inbox = Channel::bind(conn, "ANY", "EXECUTE", "req", "verify").await.unwrap();
        let messages = execute_inbox.read(10).await.unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn promote_forwards_jobs_whose_deadline_has_passed() {
        let conn = fake_conn().await;
        let scheduler = Scheduler::bind(conn.clone(), "test", std::time::Duration::from_millis(10))
            .await
            .unwrap();
        let past = Utc::now().with_timezone(&FixedOffset::east_opt(0).unwrap()) - ChronoDuration::hours(1);
        let job = job_with_deadline(Some(past));
        scheduler
            .queue
            .insert(job.deadline.unwrap().timestamp() as f64, &job)
            .await
            .unwrap();

        let now = Utc::now();
        let popped = scheduler.queue.pop_ready(now).await.unwrap();
        for job in &popped {
            scheduler.forward(job).await;
        }

        let execute_inbox = Channel::bind(conn, "ANY", "EXECUTE", "req", "verify").await.unwrap();
        let messages = execute_inbox.read(10).await.unwrap();
        assert_eq!(messages.len(), 1);
    }
}
