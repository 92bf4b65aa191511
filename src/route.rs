//! Route declarations as apps write them.

use std::sync::Arc;

use crate::auth::{AuthValidator, BoxedValidator};
use crate::handler::{BoxedHandler, BoxedStreamHandler, Handler, StreamHandler};
use crate::method::Method;

#[derive(Clone)]
pub(crate) enum RouteKind {
    Unary(BoxedHandler),
    Stream(BoxedStreamHandler),
}

/// One `(action, method)` endpoint of an app.
///
/// ```rust
/// use switchyard::{Method, Request, Response, Route, validators::SharedTokenValidator};
///
/// async fn create(_req: Request) -> Response { Response::text("created") }
///
/// let route = Route::new("/items/", create)
///     .method(Method::Post)
///     .validator(SharedTokenValidator);
/// ```
#[derive(Clone)]
pub struct Route {
    pub(crate) action: String,
    pub(crate) method: Option<Method>,
    pub(crate) kind: RouteKind,
    pub(crate) validators: Vec<BoxedValidator>,
}

impl Route {
    /// A unary route. The method defaults to GET.
    pub fn new(action: impl Into<String>, handler: impl Handler) -> Self {
        Self::with_kind(action.into(), RouteKind::Unary(handler.into_boxed_handler()))
    }

    /// A server-sent event route. The method defaults to GET.
    pub fn stream(action: impl Into<String>, handler: impl StreamHandler) -> Self {
        Self::with_kind(action.into(), RouteKind::Stream(handler.into_boxed_stream_handler()))
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Appends a validator. Only the first one registered decides access.
    pub fn validator(mut self, validator: impl AuthValidator) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Appends an already shared validator.
    pub fn shared_validator(mut self, validator: BoxedValidator) -> Self {
        self.validators.push(validator);
        self
    }

    fn with_kind(action: String, kind: RouteKind) -> Self {
        Self { action, method: None, kind, validators: Vec::new() }
    }

    /// Slash-trimmed action and the effective method.
    pub(crate) fn normalized(mut self) -> Self {
        self.action = self.action.trim_matches('/').to_owned();
        self.method.get_or_insert(Method::Get);
        self
    }

    pub(crate) fn effective_method(&self) -> Method {
        self.method.unwrap_or(Method::Get)
    }

    pub(crate) fn is_stream(&self) -> bool {
        matches!(self.kind, RouteKind::Stream(_))
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("action", &self.action)
            .field("method", &self.method)
            .field("stream", &self.is_stream())
            .field("validators", &self.validators.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Request, Response};

    async fn noop(_req: Request) -> Response {
        Response::text("")
    }

    #[test]
    fn normalizes_action_and_defaults_to_get() {
        let route = Route::new("//list/", noop).normalized();
        assert_eq!(route.action, "list");
        assert_eq!(route.method, Some(Method::Get));

        let route = Route::new("/", noop).method(Method::Post).normalized();
        assert_eq!(route.action, "");
        assert_eq!(route.method, Some(Method::Post));
    }
}
