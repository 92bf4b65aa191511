//! The application-module contract.

use crate::host::Host;
use crate::queue::QueueRoute;
use crate::route::Route;

/// An independently written module mounted on the host under its title.
///
/// Its routes are served at `/{title}/{action}` and its queue handlers are
/// bound to the queues configured for their refs.
///
/// ```rust
/// use switchyard::{App, Request, Response, Route};
///
/// struct Orders;
///
/// impl App for Orders {
///     fn title(&self) -> &str { "orders" }
///
///     fn routes(&self) -> Vec<Route> {
///         vec![Route::new("list", list)]
///     }
/// }
///
/// async fn list(_req: Request) -> Response {
///     Response::json(vec!["o-1", "o-2"])
/// }
/// ```
pub trait App: Send + Sync + 'static {
    fn title(&self) -> &str;

    fn routes(&self) -> Vec<Route>;

    fn queue_handlers(&self) -> Vec<QueueRoute> {
        Vec::new()
    }

    /// Called once every app is registered, with the finished host, so apps
    /// can look each other up.
    fn init(&self, _host: &Host) {}
}
