//! Built-in health-check app.
//!
//! | Probe | Path | Body |
//! |---|---|---|
//! | **Liveness** | `GET /health/get` | `OK!` |
//! | **Readiness** | `GET /health/ready` | `ready` |
//!
//! Both routes are public and have no dependencies: if the process can answer
//! HTTP at all, it is alive. Mount your own app with a readiness route if you
//! need to gate on downstream services.

use crate::app::App;
use crate::request::Request;
use crate::response::Response;
use crate::route::Route;

pub struct Health;

impl App for Health {
    fn title(&self) -> &str {
        "health"
    }

    fn routes(&self) -> Vec<Route> {
        vec![Route::new("get", liveness), Route::new("ready", readiness)]
    }
}

pub async fn liveness(_req: Request) -> Response {
    Response::text("OK!")
}

pub async fn readiness(_req: Request) -> Response {
    Response::text("ready")
}
