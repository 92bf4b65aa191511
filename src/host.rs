//! The host: every app's routes and queue bindings, built once.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::app::App;
use crate::config::Config;
use crate::context::{Analytics, HostContext, NoopAnalytics};
use crate::error::Error;
use crate::queue::{Consumer, QueueBinding, QueueTransport};
use crate::router::RouteTable;
use crate::telemetry::{LogTelemetry, Telemetry};

/// The assembled service. Immutable after [`HostBuilder::build`]; share it
/// through the returned `Arc`.
pub struct Host {
    pub(crate) context: Arc<HostContext>,
    pub(crate) table: RouteTable,
    apps: Vec<Arc<dyn App>>,
    bindings: Vec<QueueBinding>,
}

impl Host {
    pub fn builder(config: Config) -> HostBuilder {
        HostBuilder {
            config,
            telemetry: Arc::new(LogTelemetry),
            analytics: Arc::new(NoopAnalytics),
            transport: None,
            apps: Vec::new(),
        }
    }

    pub fn context(&self) -> &HostContext {
        &self.context
    }

    pub fn config(&self) -> &Config {
        self.context.config()
    }

    /// The app registered under `title`.
    pub fn app(&self, title: &str) -> Option<&dyn App> {
        self.apps.iter().find(|app| app.title() == title).map(|app| app.as_ref())
    }

    /// Physical queue name configured for `queue_ref`.
    pub fn queue_name(&self, queue_ref: &str) -> Option<&str> {
        self.context.queue_name(queue_ref)
    }

    /// Resolves every bound queue's URL and starts one consumer per binding.
    ///
    /// Consumers run for the life of the process; the handles are only useful
    /// to tests and to callers that want to abort them.
    pub async fn start_consumers(&self) -> Result<Vec<JoinHandle<()>>, Error> {
        if self.bindings.is_empty() {
            return Ok(Vec::new());
        }
        let transport = self.context.transport().ok_or(Error::MissingQueueTransport)?;

        let mut handles = Vec::with_capacity(self.bindings.len());
        for binding in &self.bindings {
            let url = transport.queue_url(&binding.queue_name).await?;
            info!(app = %binding.app, queue_ref = %binding.queue_ref, queue = %binding.queue_name, "starting consumer");
            let consumer = Consumer::new(
                binding,
                url,
                Arc::clone(&transport),
                self.context.telemetry_handle(),
                self.context.config().consumer.clone(),
            );
            handles.push(consumer.spawn());
        }
        Ok(handles)
    }
}

/// Collects apps and collaborators, then validates everything in one go.
pub struct HostBuilder {
    config: Config,
    telemetry: Arc<dyn Telemetry>,
    analytics: Arc<dyn Analytics>,
    transport: Option<Arc<dyn QueueTransport>>,
    apps: Vec<Arc<dyn App>>,
}

impl HostBuilder {
    pub fn telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn analytics(mut self, analytics: Arc<dyn Analytics>) -> Self {
        self.analytics = analytics;
        self
    }

    pub fn queue_transport(mut self, transport: Arc<dyn QueueTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn app(mut self, app: impl App) -> Self {
        self.apps.push(Arc::new(app));
        self
    }

    /// Builds the route table and the queue bindings, then runs every app's
    /// `init` against the finished host.
    ///
    /// Fails on an invalid config, a duplicate app title, a duplicate
    /// `(app, action, method)`, a queue ref missing from `config.queues`, or
    /// one app binding the same queue twice.
    pub fn build(self) -> Result<Arc<Host>, Error> {
        self.config.validate()?;

        let mut table = RouteTable::new()?;
        let mut bindings = Vec::new();

        for app in &self.apps {
            let title = app.title();
            table.add_app(title)?;
            for route in app.routes() {
                table.insert(title, route)?;
            }

            let mut bound = HashSet::new();
            for queue_route in app.queue_handlers() {
                let queue_name = self
                    .config
                    .queues
                    .get(&queue_route.queue_ref)
                    .cloned()
                    .ok_or_else(|| Error::UnknownQueueRef {
                        app: title.to_owned(),
                        queue_ref: queue_route.queue_ref.clone(),
                    })?;
                if !bound.insert(queue_name.clone()) {
                    return Err(Error::DuplicateQueueBinding { app: title.to_owned(), queue: queue_name });
                }
                bindings.push(QueueBinding {
                    app: title.to_owned(),
                    queue_ref: queue_route.queue_ref,
                    queue_name,
                    handler: queue_route.handler,
                });
            }
            info!(app = title, "app registered");
        }

        let context = HostContext::new(self.config, self.telemetry, self.analytics, self.transport);
        let host = Arc::new(Host {
            context: Arc::new(context),
            table,
            apps: self.apps,
            bindings,
        });

        for app in &host.apps {
            app.init(&host);
        }
        Ok(host)
    }
}
