// Copyright 2026 DFM Platform Team

//! Redis substrate: the keyed request-state store, the deadline-ordered scheduler
//! queue, and at-least-once pub/sub channels between sites.
//!
//! Every piece is built over [`conn::Conn`], which is either a real
//! `ConnectionManager` or the in-process [`fake::FakeConn`] selected by
//! `RedisConfig::fake` / the platform's `USE_FAKE_REDIS` setting, so callers and
//! their tests share one code path regardless of backend.

pub mod channel;
pub mod conn;
pub mod error;
pub mod fake;
pub mod keys;
pub mod scheduler_queue;
pub mod store;

pub use channel::{Channel, Message};
pub use conn::{Conn, RedisConfig};
pub use error::{Error, Result};
pub use scheduler_queue::SchedulerQueue;
pub use store::{Mailbox, RequestStateStore};
