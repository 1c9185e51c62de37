//! The Response tagged union and the per-request persisted response log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::block::NodeId;
use crate::error::DfmError;

/// The body of a `Response`, tagged on `api_class` for wire compatibility with the
/// rest of the platform's polymorphic types.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "api_class")]
pub enum ResponseBody {
    /// A JSON payload yielded by an output-flagged adapter.
    #[serde(rename = "dfm.api.response.ValueResponse")]
    Value {
        /// The value produced by the adapter.
        value: serde_json::Value,
    },
    /// A status update, not tied to a particular value.
    #[serde(rename = "dfm.api.response.StatusResponse")]
    Status {
        /// Site that emitted the status.
        site: String,
        /// Human-readable status message.
        message: String,
    },
    /// A liveness signal emitted while a request is still running but no value has
    /// advanced recently.
    #[serde(rename = "dfm.api.response.HeartbeatResponse")]
    Heartbeat {
        /// Site that emitted the heartbeat.
        site: String,
    },
    /// A failure tied to a node, carrying the HTTP-like status code taxonomy.
    #[serde(rename = "dfm.api.response.ErrorResponse")]
    Error {
        /// HTTP-like status code from the error taxonomy.
        http_status_code: u16,
        /// Human-readable error message.
        message: String,
        /// Best-effort traceback/context rendering.
        traceback: Option<String>,
    },
}

impl ResponseBody {
    /// Build an `ErrorResponse` body from a [`DfmError`].
    #[must_use]
    pub fn from_error(err: &DfmError) -> Self {
        let traceback = match err {
            DfmError::Generic { traceback, .. } => traceback.clone(),
            _ => None,
        };
        ResponseBody::Error {
            http_status_code: err.http_status_code(),
            message: err.to_string(),
            traceback,
        }
    }

    /// Whether this body is a `Value` variant.
    #[must_use]
    pub fn is_value(&self) -> bool {
        matches!(self, ResponseBody::Value { .. })
    }

    /// Whether this body is an `Error` variant.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, ResponseBody::Error { .. })
    }
}

/// A single response appended to a request's response log.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Response {
    /// The node that produced this response, when applicable (heartbeats and some
    /// status responses are not tied to a node).
    pub node_id: Option<NodeId>,
    /// Server-assigned timestamp.
    pub timestamp: DateTime<Utc>,
    /// The tagged response body.
    pub body: ResponseBody,
}

impl Response {
    /// Construct a `Value` response tagged to a node, stamped with the current time.
    #[must_use]
    pub fn value(node_id: NodeId, value: serde_json::Value) -> Self {
        Response {
            node_id: Some(node_id),
            timestamp: Utc::now(),
            body: ResponseBody::Value { value },
        }
    }

    /// Construct an `Error` response tagged to a node, stamped with the current time.
    #[must_use]
    pub fn error(node_id: Option<NodeId>, err: &DfmError) -> Self {
        Response {
            node_id,
            timestamp: Utc::now(),
            body: ResponseBody::from_error(err),
        }
    }

    /// Construct a `Heartbeat` response for a site, stamped with the current time.
    #[must_use]
    pub fn heartbeat(site: impl Into<String>) -> Self {
        Response {
            node_id: None,
            timestamp: Utc::now(),
            body: ResponseBody::Heartbeat { site: site.into() },
        }
    }

    /// Construct a `Status` response for a site, stamped with the current time.
    #[must_use]
    pub fn status(site: impl Into<String>, message: impl Into<String>) -> Self {
        Response {
            node_id: None,
            timestamp: Utc::now(),
            body: ResponseBody::Status {
                site: site.into(),
                message: message.into(),
            },
        }
    }
}

/// Per-request record persisted in the keyed state store under `request:<id>`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RequestState {
    /// The request's identifier.
    pub request_id: Uuid,
    /// The submitted process document.
    pub body: crate::process::Process,
    /// The monotonically growing response log.
    pub responses: Vec<Response>,
}

impl RequestState {
    /// Construct a freshly-ingested request state with an empty response log.
    #[must_use]
    pub fn new(request_id: Uuid, body: crate::process::Process) -> Self {
        RequestState {
            request_id,
            body,
            responses: Vec::new(),
        }
    }

    /// Append a response to the log.
    pub fn push(&mut self, response: Response) {
        self.responses.push(response);
    }

    /// Return the slice of responses `[index, index+size)`. `size == 0` means "all
    /// from `index` onward," matching the paging contract of
    /// `GET /request/responses/{id}`.
    #[must_use]
    pub fn slice(&self, index: usize, size: usize) -> &[Response] {
        if index >= self.responses.len() {
            return &[];
        }
        let end = if size == 0 {
            self.responses.len()
        } else {
            (index + size).min(self.responses.len())
        };
        &self.responses[index..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_response_round_trips() {
        let r = Response::value(Uuid::new_v4(), serde_json::json!({"x": 1}));
        let encoded = serde_json::to_string(&r).unwrap();
        let decoded: Response = serde_json::from_str(&encoded).unwrap();
        assert_eq!(r, decoded);
    }

    #[test]
    fn error_response_carries_status_code() {
        let err = DfmError::data("bad field", Some("name".into()));
        let r = Response::error(None, &err);
        match r.body {
            ResponseBody::Error {
                http_status_code, ..
            } => assert_eq!(http_status_code, 400),
            _ => panic!("expected error body"),
        }
    }

    #[test]
    fn slice_paging_matches_contract() {
        let mut state = RequestState::new(
            Uuid::new_v4(),
            crate::process::Process::build(None, None, None, |_| Ok(())).unwrap(),
        );
        for i in 0..5 {
            state.push(Response::value(Uuid::new_v4(), serde_json::json!(i)));
        }

        assert_eq!(state.slice(0, 2).len(), 2);
        assert_eq!(state.slice(0, 0).len(), 5);
        assert_eq!(state.slice(10, 0).len(), 0);
        assert_eq!(state.slice(3, 10).len(), 2);
    }
}
