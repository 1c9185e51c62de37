//! Keyed document store for per-request state, at `request:<id>`, plus the
//! plain string mailboxes collaborators and services exchange out-of-band.

use dfm_core::{RequestState, Response};
use uuid::Uuid;

use crate::conn::Conn;
use crate::error::{Error, Result};
use crate::keys::{mailbox_key, request_key, this_site_key};

/// Persisted request state, backed by the keyed store.
pub struct RequestStateStore {
    conn: Conn,
}

impl RequestStateStore {
    #[must_use]
    pub fn new(conn: Conn) -> Self {
        RequestStateStore { conn }
    }

    /// Persist a freshly-ingested or fully-replaced request state.
    pub async fn persist(&self, state: &RequestState) -> Result<()> {
        let key = request_key(&state.request_id.to_string());
        let encoded = serde_json::to_string(state)?;
        self.conn.set(&key, &encoded).await
    }

    /// Load the current state for a request, if any.
    pub async fn load(&self, request_id: Uuid) -> Result<Option<RequestState>> {
        let key = request_key(&request_id.to_string());
        match self.conn.get(&key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Atomically append one response to the request's response log. Readers
    /// paging through `.responses` always observe a consistent prefix: this
    /// append is a single round trip, never a read-modify-write from the
    /// caller's side.
    pub async fn append_response(&self, request_id: Uuid, response: &Response) -> Result<()> {
        let key = request_key(&request_id.to_string());
        let encoded = serde_json::to_string(response)?;
        self.conn
            .append_json_array(&key, "responses", &encoded)
            .await
            .map_err(|e| match e {
                Error::NotFound(_) => Error::NotFound(request_id.to_string()),
                other => other,
            })
    }
}

/// Plain string key-value mailboxes: the uplink collaborator's advertised
/// `this_site` name, and per-request named mailboxes for inter-pipeline
/// message passing. Neither is a JSON document, unlike [`RequestStateStore`].
pub struct Mailbox {
    conn: Conn,
}

impl Mailbox {
    #[must_use]
    pub fn new(conn: Conn) -> Self {
        Mailbox { conn }
    }

    /// The site name the uplink collaborator has published, if any. Execute
    /// falls back to its own configuration when this is absent.
    pub async fn this_site(&self) -> Result<Option<String>> {
        self.conn.get(&this_site_key()).await
    }

    /// Publish this site's advertised name. Called by the uplink collaborator;
    /// kept here since execute reads it back through the same mailbox.
    pub async fn set_this_site(&self, value: &str) -> Result<()> {
        self.conn.set(&this_site_key(), value).await
    }

    pub async fn get(&self, request_id: Uuid, name: &str) -> Result<Option<String>> {
        self.conn.get(&mailbox_key(&request_id.to_string(), name)).await
    }

    pub async fn set(&self, request_id: Uuid, name: &str, value: &str) -> Result<()> {
        self.conn.set(&mailbox_key(&request_id.to_string(), name), value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::RedisConfig;
    use dfm_core::Process;

    async fn fake_conn() -> Conn {
        Conn::connect(&RedisConfig::fake()).await.unwrap()
    }

    fn sample_state() -> RequestState {
        RequestState::new(
            Uuid::new_v4(),
            Process::build(None, None, None, |_| Ok(())).unwrap(),
        )
    }

    #[tokio::test]
    async fn persist_then_load_round_trips() {
        let store = RequestStateStore::new(fake_conn().await);
        let state = sample_state();
        store.persist(&state).await.unwrap();
        let loaded = store.load(state.request_id).await.unwrap().unwrap();
        assert_eq!(loaded.request_id, state.request_id);
    }

    #[tokio::test]
    async fn load_missing_request_is_none() {
        let store = RequestStateStore::new(fake_conn().await);
        assert!(store.load(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn append_response_grows_the_log_and_persists() {
        let store = RequestStateStore::new(fake_conn().await);
        let state = sample_state();
        store.persist(&state).await.unwrap();

        let node = Uuid::new_v4();
        store
            .append_response(state.request_id, &Response::value(node, serde_json::json!(1)))
            .await
            .unwrap();
        store
            .append_response(state.request_id, &Response::value(node, serde_json::json!(2)))
            .await
            .unwrap();

        let loaded = store.load(state.request_id).await.unwrap().unwrap();
        assert_eq!(loaded.responses.len(), 2);
    }

    #[tokio::test]
    async fn append_response_to_unknown_request_errors() {
        let store = RequestStateStore::new(fake_conn().await);
        let node = Uuid::new_v4();
        let err = store
            .append_response(Uuid::new_v4(), &Response::value(node, serde_json::json!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn this_site_is_absent_until_published() {
        let mailbox = Mailbox::new(fake_conn().await);
        assert!(mailbox.this_site().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn this_site_round_trips_once_published() {
        let mailbox = Mailbox::new(fake_conn().await);
        mailbox.set_this_site("site-a").await.unwrap();
        assert_eq!(mailbox.this_site().await.unwrap(), Some("site-a".to_string()));
    }

    #[tokio::test]
    async fn mailbox_set_then_get_round_trips_per_request() {
        let conn = fake_conn().await;
        let mailbox = Mailbox::new(conn);
        let request_id = Uuid::new_v4();
        mailbox.set(request_id, "progress", "42%").await.unwrap();
        assert_eq!(mailbox.get(request_id, "progress").await.unwrap(), Some("42%".to_string()));
        assert!(mailbox.get(Uuid::new_v4(), "progress").await.unwrap().is_none());
    }
}
