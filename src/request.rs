//! Incoming request as seen by validators and handlers.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::HeaderMap;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::auth::AuthOutcome;
use crate::context::HostContext;
use crate::query::ListQuery;

/// One dispatched HTTP request.
///
/// Cloning is cheap; clones share the body buffer, the host context and the
/// cancellation token.
#[derive(Clone)]
pub struct Request {
    pub(crate) id: String,
    pub(crate) app: String,
    pub(crate) action: String,
    pub(crate) path: String,
    pub(crate) method: String,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) query: HashMap<String, Vec<String>>,
    pub(crate) auth: AuthOutcome,
    pub(crate) cancel: CancellationToken,
    pub(crate) context: Arc<HostContext>,
}

impl Request {
    pub(crate) fn new(
        context: Arc<HostContext>,
        method: String,
        path: String,
        raw_query: Option<&str>,
        headers: HeaderMap,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            app: String::new(),
            action: String::new(),
            path,
            method,
            headers,
            body: Bytes::new(),
            query: parse_query(raw_query.unwrap_or("")),
            auth: AuthOutcome::anonymous(),
            cancel: CancellationToken::new(),
            context,
        }
    }

    /// Unique id, used for every log line and telemetry report about this request.
    pub fn id(&self) -> &str { &self.id }
    pub fn app(&self) -> &str { &self.app }
    pub fn action(&self) -> &str { &self.action }
    pub fn path(&self) -> &str { &self.path }
    pub fn method(&self) -> &str { &self.method }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn query(&self) -> &HashMap<String, Vec<String>> { &self.query }
    pub fn auth(&self) -> &AuthOutcome { &self.auth }
    pub fn context(&self) -> &HostContext { &self.context }

    /// Principal bound by the route's validator, if any.
    pub fn principal_id(&self) -> Option<&str> {
        self.auth.principal_id.as_deref()
    }

    /// Case-insensitive header lookup. Non-UTF-8 values are treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// First value of a query parameter.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query.get(key).and_then(|values| values.first()).map(String::as_str)
    }

    /// Query parameters interpreted as a list/search request.
    pub fn list_query(&self) -> ListQuery {
        ListQuery::from_params(&self.query)
    }

    /// Deserializes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body).inspect_err(|e| {
            tracing::warn!(request_id = %self.id, error = %e, "failed to decode request body");
        })
    }

    /// Token cancelled when the client goes away. Only streaming routes observe it.
    pub fn cancellation(&self) -> &CancellationToken { &self.cancel }
}

fn parse_query(raw: &str) -> HashMap<String, Vec<String>> {
    let mut query: HashMap<String, Vec<String>> = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        query.entry(key.into_owned()).or_default().push(value.into_owned());
    }
    query
}
