//! Outgoing response type and the [`IntoResponse`] conversion trait.
//!
//! Build a [`Response`] in your handler and return it. Text and byte bodies go
//! out verbatim. Anything else is kept as a value and JSON-encoded by the
//! dispatcher, so an encoding failure turns into a clean 500 instead of a
//! half-written body.

use bytes::Bytes;
use http::StatusCode;
use serde::Serialize;

// ── Canned bodies ────────────────────────────────────────────────────────────

pub(crate) const NOT_FOUND_BODY: &str = r#"{"Msg": "doesn't exist"}"#;
pub(crate) const AUTH_FAILED_BODY: &str = r#"{"Msg": "Auth failed, please try again"}"#;
pub(crate) const INTERNAL_ERROR_BODY: &str = r#"{"Msg": "something went wrong on our side"}"#;
const INVALID_ACTION_BODY: &str = r#"{"Msg": "invalid action"}"#;

// ── Body ─────────────────────────────────────────────────────────────────────

/// A serializable value whose encoding is deferred to the response pipeline.
pub trait Encode: Send + 'static {
    fn encode(&self) -> Result<Vec<u8>, serde_json::Error>;
}

impl<T: Serialize + Send + 'static> Encode for T {
    fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Response payload.
pub enum Body {
    Text(String),
    Bytes(Bytes),
    Value(Box<dyn Encode>),
}

impl From<String> for Body {
    fn from(s: String) -> Self { Self::Text(s) }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self { Self::Text(s.to_owned()) }
}

impl From<Vec<u8>> for Body {
    fn from(b: Vec<u8>) -> Self { Self::Bytes(Bytes::from(b)) }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self { Self::Bytes(b) }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing response.
///
/// ```rust
/// use switchyard::Response;
/// use http::StatusCode;
///
/// Response::text("OK!");
/// Response::json(vec![1, 2, 3]);
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .json(42);
/// ```
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Body,
}

impl Response {
    /// `200 OK` with `body`, sent verbatim.
    pub fn text(body: impl Into<String>) -> Self {
        Self::with_body(StatusCode::OK, Body::Text(body.into()))
    }

    /// `200 OK` with raw bytes, sent verbatim.
    pub fn bytes(body: impl Into<Bytes>) -> Self {
        Self::with_body(StatusCode::OK, Body::Bytes(body.into()))
    }

    /// `200 OK` with `value` JSON-encoded at send time.
    pub fn json<T: Serialize + Send + 'static>(value: T) -> Self {
        Self::with_body(StatusCode::OK, Body::Value(Box::new(value)))
    }

    /// `200 OK` with `{"Msg": "<msg>"}`.
    pub fn message(msg: &str) -> Self {
        Self::text(msg_body(msg))
    }

    /// `404` with `{"Msg": "doesn't exist"}`.
    pub fn not_found() -> Self {
        Self::with_body(StatusCode::NOT_FOUND, Body::from(NOT_FOUND_BODY))
    }

    /// `404` with a custom message.
    pub fn not_found_with_message(msg: &str) -> Self {
        Self::with_body(StatusCode::NOT_FOUND, Body::Text(msg_body(msg)))
    }

    /// `404` for an action the app recognises but refuses.
    pub fn invalid_action() -> Self {
        Self::with_body(StatusCode::NOT_FOUND, Body::from(INVALID_ACTION_BODY))
    }

    /// `400`, echoing `err` back to the client. Only for errors the client caused.
    pub fn client_error(err: impl std::fmt::Display) -> Self {
        Self::with_body(StatusCode::BAD_REQUEST, Body::Text(msg_body(&err.to_string())))
    }

    pub fn auth_failed() -> Self {
        Self::with_body(StatusCode::UNAUTHORIZED, Body::from(AUTH_FAILED_BODY))
    }

    /// Generic `500`. Report the cause through
    /// [`HostContext::error_response`](crate::HostContext::error_response) instead
    /// when one is at hand.
    pub fn internal_error() -> Self {
        Self::with_body(StatusCode::INTERNAL_SERVER_ERROR, Body::from(INTERNAL_ERROR_BODY))
    }

    pub(crate) fn method_not_allowed(method: &str, path: &str) -> Self {
        Self::with_body(
            StatusCode::METHOD_NOT_ALLOWED,
            Body::Text(format!("{method} not allowed on {path}")),
        )
    }

    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: Vec::new(), status: StatusCode::OK }
    }

    pub fn status(&self) -> StatusCode { self.status }

    pub fn is_success(&self) -> bool { self.status == StatusCode::OK }

    pub fn is_not_found(&self) -> bool { self.status == StatusCode::NOT_FOUND }

    fn with_body(status: StatusCode, body: Body) -> Self {
        Self { status, headers: Vec::new(), body }
    }
}

fn msg_body(msg: &str) -> String {
    // serde_json quotes and escapes the message; a &str always serializes.
    let quoted = serde_json::to_string(msg).unwrap_or_else(|_| String::from("\"\""));
    format!(r#"{{"Msg": {quoted}}}"#)
}

// ── ResponseBuilder ──────────────────────────────────────────────────────────

/// Fluent builder for [`Response`]. Defaults to `200 OK`.
pub struct ResponseBuilder {
    headers: Vec<(String, String)>,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(Body::Text(body.into()))
    }

    pub fn bytes(self, body: impl Into<Bytes>) -> Response {
        self.finish(Body::Bytes(body.into()))
    }

    pub fn json<T: Serialize + Send + 'static>(self, value: T) -> Response {
        self.finish(Body::Value(Box::new(value)))
    }

    pub fn no_body(self) -> Response {
        self.finish(Body::Bytes(Bytes::new()))
    }

    fn finish(self, body: Body) -> Response {
        Response { status: self.status, headers: self.headers, body }
    }
}

// ── IntoResponse ─────────────────────────────────────────────────────────────

/// Conversion into a [`Response`]. Implement it to return your own types.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// A bare status: empty body.
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response {
        Response::builder().status(self).no_body()
    }
}
