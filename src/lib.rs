//! # switchyard
//!
//! A service host that mounts independently written application modules on
//! one HTTP endpoint and on a set of message queues.
//!
//! ## What the host owns
//!
//! - **Routing**: `/{app}/{action}`, one immutable table built at startup
//! - **Auth**: pluggable validators per route, first validator decides
//! - **Responses**: text and bytes verbatim, values as JSON, gzip when large
//! - **Server-sent events**: long-lived streams with heartbeats and disconnect detection
//! - **Queue consumers**: one poller per bound queue, one task per message, panics contained
//!
//! What apps own is everything else: their handlers and what they return.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use switchyard::{App, Config, Host, Method, Request, Response, Route, Server};
//! use switchyard::validators::SharedTokenValidator;
//!
//! struct Orders;
//!
//! impl App for Orders {
//!     fn title(&self) -> &str { "orders" }
//!
//!     fn routes(&self) -> Vec<Route> {
//!         vec![
//!             Route::new("list", list),
//!             Route::new("create", create)
//!                 .method(Method::Post)
//!                 .validator(SharedTokenValidator),
//!         ]
//!     }
//! }
//!
//! async fn list(_req: Request) -> Response {
//!     Response::json(vec!["o-1", "o-2"])
//! }
//!
//! async fn create(req: Request) -> Response {
//!     if req.body().is_empty() {
//!         return Response::client_error("empty body");
//!     }
//!     Response::message("created")
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), switchyard::Error> {
//!     let host = Host::builder(Config::default()).app(Orders).build()?;
//!     Server::bind(([0, 0, 0, 0], 8080).into()).serve(host).await
//! }
//! ```

mod app;
mod auth;
mod compress;
mod config;
mod context;
mod dispatch;
mod error;
mod handler;
mod host;
mod method;
mod query;
mod request;
mod response;
mod route;
mod router;
mod server;
mod telemetry;

pub mod health;
pub mod pool;
pub mod queue;
pub mod sse;
pub mod validators;

pub use app::App;
pub use auth::{AuthOutcome, AuthValidator, BoxedValidator};
pub use config::{Config, ConfigError, ConsumerConfig, Environment};
pub use context::{Analytics, HostContext, NoopAnalytics};
pub use dispatch::ResponseBody;
pub use error::{BoxError, Error};
pub use handler::{Handler, StreamHandler};
pub use host::{Host, HostBuilder};
pub use method::{Method, UnknownMethod};
pub use query::{DEFAULT_PAGE_SIZE, ListQuery, MAX_PAGE_SIZE};
pub use request::Request;
pub use response::{Body, Encode, IntoResponse, Response, ResponseBuilder};
pub use route::Route;
pub use server::Server;
pub use sse::{EventStream, StreamEvent};
pub use telemetry::{LogTelemetry, Telemetry};
