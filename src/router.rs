//! The immutable route table and the path decoder in front of it.
//!
//! Paths have at most two segments, `/{app}` or `/{app}/{action}`. A matchit
//! tree turns the raw path into those two names, then three hash lookups find
//! the route: app, action, method. Anything deeper than two segments simply
//! does not match the tree.

use std::collections::HashMap;

use matchit::Router as MatchitRouter;

use crate::error::Error;
use crate::method::Method;
use crate::route::Route;

pub(crate) type MethodMap = HashMap<Method, Route>;

/// `app → action → method → route`. Built once by the host, then read-only.
pub(crate) struct RouteTable {
    apps: HashMap<String, HashMap<String, MethodMap>>,
    decoder: MatchitRouter<()>,
}

/// Where a path landed in the table.
pub(crate) struct Resolved<'a> {
    pub(crate) app: String,
    pub(crate) action: String,
    pub(crate) methods: &'a MethodMap,
}

impl RouteTable {
    pub(crate) fn new() -> Result<Self, Error> {
        let mut decoder = MatchitRouter::new();
        decoder.insert("/{app}", ())?;
        decoder.insert("/{app}/{action}", ())?;
        Ok(Self { apps: HashMap::new(), decoder })
    }

    /// Registers an app title. A title can only be taken once.
    pub(crate) fn add_app(&mut self, app: &str) -> Result<(), Error> {
        if self.apps.contains_key(app) {
            return Err(Error::DuplicateApp(app.to_owned()));
        }
        self.apps.insert(app.to_owned(), HashMap::new());
        Ok(())
    }

    /// Normalizes `route` and files it under `app`.
    pub(crate) fn insert(&mut self, app: &str, route: Route) -> Result<(), Error> {
        let route = route.normalized();
        let method = route.effective_method();
        if method == Method::Options {
            return Err(Error::UnroutableMethod {
                app: app.to_owned(),
                action: route.action,
                method,
            });
        }
        let methods = self
            .apps
            .entry(app.to_owned())
            .or_default()
            .entry(route.action.clone())
            .or_default();

        if methods.contains_key(&method) {
            return Err(Error::DuplicateRoute {
                app: app.to_owned(),
                action: route.action,
                method,
            });
        }
        tracing::debug!(app, action = %route.action, %method, "route registered");
        methods.insert(method, route);
        Ok(())
    }

    /// Splits `path` into app and action. `None` when it has no segment or
    /// more than two.
    pub(crate) fn decode(&self, path: &str) -> Option<(String, String)> {
        let normalized = format!("/{}", path.trim_matches('/'));
        let matched = self.decoder.at(&normalized).ok()?;
        let app = matched.params.get("app")?.to_owned();
        let action = matched.params.get("action").unwrap_or_default().to_owned();
        Some((app, action))
    }

    pub(crate) fn resolve(&self, path: &str) -> Option<Resolved<'_>> {
        let (app, action) = self.decode(path)?;
        let methods = self.apps.get(&app)?.get(&action)?;
        Some(Resolved { app, action, methods })
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
    fn decodes_one_and_two_segments() {
        let table = RouteTable::new().unwrap();
        assert_eq!(table.decode("/orders/list"), Some(("orders".into(), "list".into())));
        assert_eq!(table.decode("/orders/list/"), Some(("orders".into(), "list".into())));
        assert_eq!(table.decode("/orders"), Some(("orders".into(), String::new())));
        assert_eq!(table.decode("/orders/"), Some(("orders".into(), String::new())));
        assert_eq!(table.decode("/"), None);
        assert_eq!(table.decode("/a/b/c"), None);
    }

    #[test]
    fn duplicate_action_and_method_is_rejected() {
        let mut table = RouteTable::new().unwrap();
        table.add_app("orders").unwrap();
        table.insert("orders", Route::new("list", noop)).unwrap();
        table.insert("orders", Route::new("list", noop).method(Method::Post)).unwrap();

        let err = table.insert("orders", Route::new("/list/", noop)).unwrap_err();
        assert!(matches!(err, Error::DuplicateRoute { method: Method::Get, .. }));
        assert!(matches!(table.add_app("orders"), Err(Error::DuplicateApp(_))));
    }

    #[test]
    fn options_routes_are_rejected() {
        let mut table = RouteTable::new().unwrap();
        table.add_app("orders").unwrap();

        let err = table.insert("orders", Route::new("opt", noop).method(Method::Options)).unwrap_err();
        assert!(matches!(err, Error::UnroutableMethod { method: Method::Options, .. }));
        assert!(table.resolve("/orders/opt").is_none());
    }

    #[test]
    fn resolve_requires_known_app_and_action() {
        let mut table = RouteTable::new().unwrap();
        table.add_app("orders").unwrap();
        table.insert("orders", Route::new("list", noop)).unwrap();

        let resolved = table.resolve("/orders/list").unwrap();
        assert_eq!((resolved.app.as_str(), resolved.action.as_str()), ("orders", "list"));
        assert!(resolved.methods.contains_key(&Method::Get));
        assert!(table.resolve("/orders/missing").is_none());
        assert!(table.resolve("/missing/list").is_none());
    }
}
