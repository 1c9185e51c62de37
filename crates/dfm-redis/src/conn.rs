//! Connection handle: either a real Redis `ConnectionManager` or the in-process
//! fake backend selected by `USE_FAKE_REDIS`.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

use crate::error::{Error, Result};
use crate::fake::FakeConn;

/// How to reach the Redis substrate.
#[derive(Clone, Debug)]
pub struct RedisConfig {
    /// `redis://` connection string. Ignored when `use_fake` is set.
    pub url: String,
    /// When true, every [`Conn`] constructed from this config is the in-process
    /// fake backend instead of a live connection. Mirrors the platform's
    /// `USE_FAKE_REDIS` test-mode switch.
    pub use_fake: bool,
}

impl RedisConfig {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        RedisConfig {
            url: url.into(),
            use_fake: false,
        }
    }

    #[must_use]
    pub fn fake() -> Self {
        RedisConfig {
            url: String::new(),
            use_fake: true,
        }
    }
}

/// A connection to the Redis substrate, real or faked.
#[derive(Clone)]
pub enum Conn {
    Real(ConnectionManager),
    Fake(FakeConn),
}

impl Conn {
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        if config.use_fake {
            info!("dfm-redis: using in-process fake backend (USE_FAKE_REDIS)");
            return Ok(Conn::Fake(FakeConn::new()));
        }
        let client = redis::Client::open(config.url.as_str())?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Conn::Real(manager))
    }

    pub(crate) async fn get(&self, key: &str) -> Result<Option<String>> {
        match self {
            Conn::Real(m) => {
                let mut conn = m.clone();
                Ok(conn.get(key).await?)
            }
            Conn::Fake(f) => Ok(f.get(key)),
        }
    }

    pub(crate) async fn set(&self, key: &str, value: &str) -> Result<()> {
        match self {
            Conn::Real(m) => {
                let mut conn = m.clone();
                let _: () = conn.set(key, value).await?;
                Ok(())
            }
            Conn::Fake(f) => {
                f.set(key, value);
                Ok(())
            }
        }
    }

    /// Atomically append `item` (already-serialized JSON) into the JSON array at
    /// `doc[field]`, where `doc` is the JSON object stored at `key`. Uses
    /// `cjson`, built into Redis's Lua scripting, so the mutation is a single
    /// round trip with no read-modify-write race.
    pub(crate) async fn append_json_array(&self, key: &str, field: &str, item: &str) -> Result<()> {
        match self {
            Conn::Real(m) => {
                const SCRIPT: &str = r"
                    local doc = redis.call('GET', KEYS[1])
                    if not doc then
                        return redis.error_reply('no document at key')
                    end
                    local obj = cjson.decode(doc)
                    local arr = obj[ARGV[1]]
                    if arr == nil then
                        arr = {}
                    end
                    table.insert(arr, cjson.decode(ARGV[2]))
                    obj[ARGV[1]] = arr
                    redis.call('SET', KEYS[1], cjson.encode(obj))
                    return 1
                ";
                let mut conn = m.clone();
                redis::Script::new(SCRIPT)
                    .key(key)
                    .arg(field)
                    .arg(item)
                    .invoke_async::<i64>(&mut conn)
                    .await?;
                Ok(())
            }
            Conn::Fake(f) => f.append_json_array(key, field, item),
        }
    }

    pub(crate) async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<()> {
        match self {
            Conn::Real(m) => {
                let mut conn = m.clone();
                let _: () = conn.zadd(key, member, score).await?;
                Ok(())
            }
            Conn::Fake(f) => {
                f.zadd(key, score, member);
                Ok(())
            }
        }
    }

    /// Pop every member scored `<= max_score`, atomically removing them from the
    /// set, returning them in ascending score order.
    pub(crate) async fn zpop_ready(&self, key: &str, max_score: f64) -> Result<Vec<String>> {
        match self {
            Conn::Real(m) => {
                const SCRIPT: &str = r"
                    local members = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
                    if #members > 0 then
                        redis.call('ZREM', KEYS[1], unpack(members))
                    end
                    return members
                ";
                let mut conn = m.clone();
                let members: Vec<String> = redis::Script::new(SCRIPT)
                    .key(key)
                    .arg(max_score)
                    .invoke_async(&mut conn)
                    .await?;
                Ok(members)
            }
            Conn::Fake(f) => Ok(f.zpop_ready(key, max_score)),
        }
    }

    pub(crate) async fn xadd(&self, stream: &str, payload: &str) -> Result<String> {
        match self {
            Conn::Real(m) => {
                let mut conn = m.clone();
                let id: String = conn.xadd(stream, "*", &[("payload", payload)]).await?;
                Ok(id)
            }
            Conn::Fake(f) => Ok(f.xadd(stream, payload)),
        }
    }

    pub(crate) async fn ensure_group(&self, stream: &str, group: &str) -> Result<()> {
        match self {
            Conn::Real(m) => {
                let mut conn = m.clone();
                let result: std::result::Result<(), redis::RedisError> = redis::cmd("XGROUP")
                    .arg("CREATE")
                    .arg(stream)
                    .arg(group)
                    .arg("$")
                    .arg("MKSTREAM")
                    .query_async(&mut conn)
                    .await;
                match result {
                    Ok(()) => Ok(()),
                    Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
                    Err(e) => Err(Error::GroupCreate {
                        stream: stream.to_string(),
                        group: group.to_string(),
                        reason: e.to_string(),
                    }),
                }
            }
            Conn::Fake(f) => {
                f.ensure_group(stream, group);
                Ok(())
            }
        }
    }

    pub(crate) async fn xreadgroup(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<(String, String)>> {
        match self {
            Conn::Real(m) => {
                let mut conn = m.clone();
                let opts = redis::streams::StreamReadOptions::default()
                    .group(group, consumer)
                    .count(count);
                let reply: redis::streams::StreamReadReply = conn
                    .xread_options(&[stream], &[">"], &opts)
                    .await?;
                let mut out = Vec::new();
                for key in reply.keys {
                    for id in key.ids {
                        let payload: String = id
                            .map
                            .get("payload")
                            .and_then(|v| redis::from_redis_value::<String>(v).ok())
                            .unwrap_or_default();
                        out.push((id.id, payload));
                    }
                }
                Ok(out)
            }
            Conn::Fake(f) => Ok(f.xreadgroup(stream, group, count)),
        }
    }

    pub(crate) async fn xack(&self, stream: &str, group: &str, id: &str) -> Result<()> {
        match self {
            Conn::Real(m) => {
                let mut conn = m.clone();
                let _: i64 = conn.xack(stream, group, &[id]).await?;
                Ok(())
            }
            Conn::Fake(f) => {
                f.xack(stream, group, id);
                Ok(())
            }
        }
    }
}
