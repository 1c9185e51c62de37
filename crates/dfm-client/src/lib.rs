// Copyright 2026 DFM Platform Team

//! Thin typed async HTTP client for the Process service: `version()`,
//! `process()` with retry on transport failure, a polling `responses()`
//! iterator, and `raise_on_error()`.

pub mod error;

use std::collections::HashSet;
use std::time::Duration;

use dfm_core::{Process, Response, ResponseBody};
use serde::Deserialize;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::debug;
use uuid::Uuid;

pub use error::{Error, Result};

/// Server version info returned by `GET /version`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct VersionInfo {
    pub version: String,
    pub name: String,
}

/// How many times `process()` retries a transport failure, and the base delay
/// between attempts, before giving up.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

/// How long the `responses()` iterator sleeps after a 204 before polling
/// again.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Page size requested per `GET /request/responses/:id` call.
const DEFAULT_PAGE_SIZE: usize = 64;

/// A typed client bound to one Process service base URL.
#[derive(Clone)]
pub struct DfmClient {
    http: reqwest::Client,
    base_url: String,
    retry_policy: RetryPolicy,
    poll_interval: Duration,
    auth_header: Option<(String, String)>,
}

impl DfmClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        DfmClient {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            retry_policy: RetryPolicy::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            auth_header: None,
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Attach a credential sent as `header_name: value` on every request, for
    /// sites with `AUTH_METHOD` enabled.
    #[must_use]
    pub fn with_auth_header(mut self, header_name: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth_header = Some((header_name.into(), value.into()));
        self
    }

    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_header {
            Some((name, value)) => builder.header(name, value),
            None => builder,
        }
    }

    /// `GET /version`.
    pub async fn version(&self) -> Result<VersionInfo> {
        let url = format!("{}/version", self.base_url);
        let response = self.apply_auth(self.http.get(&url)).send().await?;
        let info = response.error_for_status()?.json::<VersionInfo>().await?;
        Ok(info)
    }

    /// `POST /process?mode=execute|discovery`, returning the assigned request
    /// identifier. Transport failures are retried with exponential backoff up
    /// to `retry_policy.max_retries`; a server rejection (4xx) fails
    /// immediately without retrying.
    pub async fn process(&self, process: &Process, mode: ProcessMode) -> Result<Uuid> {
        let strategy = ExponentialBackoff::from_millis(self.retry_policy.base_delay.as_millis() as u64)
            .map(jitter)
            .take(self.retry_policy.max_retries);

        let result = RetryIf::spawn(
            strategy,
            || self.try_submit(process, mode),
            |e: &Error| e.is_retryable(),
        )
        .await;

        result.map_err(|e| {
            if e.is_retryable() {
                Error::RetriesExhausted(e.to_string())
            } else {
                e
            }
        })
    }

    async fn try_submit(&self, process: &Process, mode: ProcessMode) -> Result<Uuid> {
        let url = format!("{}/process", self.base_url);
        let response = self
            .apply_auth(self.http.post(&url))
            .query(&[("mode", mode.as_str())])
            .json(process)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Rejected { status, body });
        }

        #[derive(Deserialize)]
        struct ProcessAck {
            request_id: Uuid,
        }
        let ack: ProcessAck = response.json().await?;
        Ok(ack.request_id)
    }

    /// Page through `GET /request/responses/:id`, returning the raw server
    /// slice starting at `index`. `size == 0` asks for everything from
    /// `index` onward.
    async fn fetch_page(&self, request_id: Uuid, index: usize, size: usize) -> Result<Option<Vec<Response>>> {
        let url = format!("{}/request/responses/{request_id}", self.base_url);
        let response = self
            .apply_auth(self.http.get(&url))
            .query(&[("index", index.to_string()), ("size", size.to_string())])
            .send()
            .await?;

        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Err(Error::UnknownRequest(request_id)),
            reqwest::StatusCode::NO_CONTENT => Ok(None),
            status if status.is_success() => {
                let page = response.json::<Vec<Response>>().await?;
                Ok(Some(page))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::Rejected {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    /// Build a polling iterator over one request's response log, per the
    /// filtering/termination contract documented on [`ResponseIterator`].
    #[must_use]
    pub fn responses(&self, request_id: Uuid, options: ResponseIterOptions) -> ResponseIterator<'_> {
        let had_stop_nodes = !options.stop_node_ids.is_empty();
        ResponseIterator {
            client: self,
            request_id,
            next_index: 0,
            options,
            had_stop_nodes,
        }
    }
}

/// The `mode` query parameter on `POST /process`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessMode {
    Execute,
    Discovery,
}

impl ProcessMode {
    fn as_str(self) -> &'static str {
        match self {
            ProcessMode::Execute => "execute",
            ProcessMode::Discovery => "discovery",
        }
    }
}

/// Filtering and termination configuration for [`DfmClient::responses`].
#[derive(Clone, Debug, Default)]
pub struct ResponseIterOptions {
    /// The iterator terminates once every id in this set has produced at
    /// least one `Value` response; the set shrinks as each node is
    /// satisfied. An empty set means "never terminate on its own" — the
    /// caller is expected to wrap iteration in `tokio::time::timeout` if a
    /// bounded wait is required.
    pub stop_node_ids: HashSet<dfm_core::NodeId>,
    /// Whether `Error` responses are surfaced by `next()` rather than
    /// silently skipped.
    pub return_errors: bool,
    /// Whether `Status`/`Heartbeat` responses are surfaced by `next()`
    /// rather than silently skipped.
    pub return_statuses: bool,
}

/// An asynchronous iterator over one request's response log. Internally pages
/// through `GET /request/responses/:id`; a 204 (empty slice) yields `None`
/// from `next()` rather than terminating the iterator, letting the caller
/// decide whether and how long to keep polling.
pub struct ResponseIterator<'a> {
    client: &'a DfmClient,
    request_id: Uuid,
    next_index: usize,
    options: ResponseIterOptions,
    had_stop_nodes: bool,
}

impl<'a> ResponseIterator<'a> {
    fn passes_filter(&self, response: &Response) -> bool {
        match &response.body {
            ResponseBody::Value { .. } => true,
            ResponseBody::Error { .. } => self.options.return_errors,
            ResponseBody::Status { .. } | ResponseBody::Heartbeat { .. } => self.options.return_statuses,
        }
    }

    /// Fetch and return the next surfaced response, or `None` if the server
    /// currently has nothing new (the caller may sleep and call again). The
    /// iterator is considered exhausted once [`Self::done`] returns true.
    pub async fn next(&mut self) -> Result<Option<Response>> {
        loop {
            let page = self
                .client
                .fetch_page(self.request_id, self.next_index, DEFAULT_PAGE_SIZE)
                .await?;

            let Some(page) = page else {
                debug!(request_id = %self.request_id, "no new responses, caller may retry after sleeping");
                return Ok(None);
            };

            if page.is_empty() {
                return Ok(None);
            }

            for response in page {
                self.next_index += 1;
                if let (ResponseBody::Value { .. }, Some(node_id)) = (&response.body, response.node_id) {
                    self.options.stop_node_ids.remove(&node_id);
                }
                if self.passes_filter(&response) {
                    return Ok(Some(response));
                }
            }
        }
    }

    /// Whether the stop-node set (if any was configured) has been fully
    /// satisfied. An iterator configured with an empty stop set is never
    /// `done` and must be bounded externally, per the platform's decision not
    /// to add an internal timeout here.
    #[must_use]
    pub fn done(&self) -> bool {
        self.had_stop_nodes && self.options.stop_node_ids.is_empty()
    }

    /// Sleep for the configured poll interval; convenience for callers
    /// driving their own `while !iter.done()` loop around `next()`.
    pub async fn sleep_before_retry(&self) {
        tokio::time::sleep(self.client.poll_interval).await;
    }
}

/// Raise if `response` carries an `Error` body; otherwise return `Ok(())`.
pub fn raise_on_error(response: &Response) -> Result<()> {
    if let ResponseBody::Error {
        http_status_code,
        message,
        ..
    } = &response.body
    {
        return Err(Error::ServerReported {
            http_status_code: *http_status_code,
            message: message.clone(),
            node_id: response.node_id,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn version_decodes_server_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "version": "1.2.3",
                "name": "dfm-process"
            })))
            .mount(&server)
            .await;

        let client = DfmClient::new(server.uri());
        let info = client.version().await.unwrap();
        assert_eq!(info.version, "1.2.3");
        assert_eq!(info.name, "dfm-process");
    }

    #[tokio::test]
    async fn process_happy_path_returns_request_id() {
        let server = MockServer::start().await;
        let request_id = Uuid::new_v4();

        Mock::given(method("POST"))
            .and(path("/process"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"request_id": request_id})))
            .mount(&server)
            .await;

        let client = DfmClient::new(server.uri());
        let process = Process::build(Some("localhost".into()), None, None, |_| Ok(())).unwrap();
        let got = client.process(&process, ProcessMode::Execute).await.unwrap();
        assert_eq!(got, request_id);
    }

    #[tokio::test]
    async fn process_rejection_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/process"))
            .respond_with(ResponseTemplate::new(422).set_body_string("deadline missing zone"))
            .expect(1)
            .mount(&server)
            .await;

        let client = DfmClient::new(server.uri());
        let process = Process::build(None, None, None, |_| Ok(())).unwrap();
        let err = client.process(&process, ProcessMode::Execute).await.unwrap_err();
        assert!(matches!(err, Error::Rejected { status: 422, .. }));
    }

    #[tokio::test]
    async fn responses_unknown_request_id_errors() {
        let server = MockServer::start().await;
        let request_id = Uuid::new_v4();
        Mock::given(method("GET"))
            .and(path(format!("/request/responses/{request_id}")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = DfmClient::new(server.uri());
        let mut iter = client.responses(request_id, ResponseIterOptions::default());
        let err = iter.next().await.unwrap_err();
        assert!(matches!(err, Error::UnknownRequest(id) if id == request_id));
    }

    #[tokio::test]
    async fn responses_empty_slice_yields_none_without_erroring() {
        let server = MockServer::start().await;
        let request_id = Uuid::new_v4();
        Mock::given(method("GET"))
            .and(path(format!("/request/responses/{request_id}")))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = DfmClient::new(server.uri());
        let mut iter = client.responses(request_id, ResponseIterOptions::default());
        assert_eq!(iter.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn responses_skips_heartbeats_unless_requested() {
        let server = MockServer::start().await;
        let request_id = Uuid::new_v4();
        let node_id = Uuid::new_v4();
        let page = vec![
            Response::heartbeat("localhost"),
            Response::value(node_id, json!(42)),
        ];
        Mock::given(method("GET"))
            .and(path(format!("/request/responses/{request_id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(&page))
            .mount(&server)
            .await;

        let client = DfmClient::new(server.uri());
        let mut iter = client.responses(request_id, ResponseIterOptions::default());
        let next = iter.next().await.unwrap().unwrap();
        assert!(matches!(next.body, ResponseBody::Value { .. }));
    }

    #[test]
    fn raise_on_error_passes_through_values() {
        let response = Response::value(Uuid::new_v4(), json!(1));
        assert!(raise_on_error(&response).is_ok());
    }

    #[test]
    fn raise_on_error_raises_on_error_body() {
        let err = dfm_core::DfmError::data("bad field", None);
        let response = Response::error(None, &err);
        let raised = raise_on_error(&response).unwrap_err();
        assert!(matches!(raised, Error::ServerReported { http_status_code: 400, .. }));
    }
}
