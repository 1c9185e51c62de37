//! Pluggable header-based authentication.
//!
//! Mirrors the extract/enforce split the registry's own middleware uses:
//! [`auth_context_middleware`] never rejects a request, it only records what it
//! found in the request extensions; [`require_auth_middleware`] reads that back
//! out and is the one layer that actually returns 403. Splitting the two means a
//! handler that wants to know who (if anyone) authenticated, without requiring it,
//! can just read the extension directly.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::config::AuthMethod;

/// What `auth_context_middleware` found on the request, read back by
/// `require_auth_middleware` and available to any handler via `Extension`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthContext {
    /// Auth is disabled (`AUTH_METHOD=none`); every request is trusted.
    Disabled,
    /// The configured header was present and non-empty.
    Trusted,
    /// The configured header was missing or empty.
    Untrusted,
}

#[derive(Clone)]
pub struct AuthState {
    pub method: AuthMethod,
}

/// Extract an [`AuthContext`] from the request's headers and stash it in the
/// request extensions. Always calls through to `next`; never rejects.
pub async fn auth_context_middleware(
    State(state): State<AuthState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    let context = match &state.method {
        AuthMethod::Disabled => AuthContext::Disabled,
        AuthMethod::Header { header_name } => match header_present(&headers, header_name) {
            true => AuthContext::Trusted,
            false => AuthContext::Untrusted,
        },
    };
    request.extensions_mut().insert(context);
    next.run(request).await
}

fn header_present(headers: &HeaderMap, name: &str) -> bool {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| !v.is_empty())
}

/// Reject the request with 403 unless [`auth_context_middleware`] found a trusted
/// (or disabled) context.
pub async fn require_auth_middleware(request: Request, next: Next) -> Response {
    let context = request.extensions().get::<AuthContext>().cloned();
    match context {
        Some(AuthContext::Untrusted) | None => {
            (StatusCode::FORBIDDEN, Json(json!({"error": "authentication required"}))).into_response()
        }
        Some(AuthContext::Disabled) | Some(AuthContext::Trusted) => next.run(request).await,
    }
}
