use std::{
    convert::Infallible,
    io,
    net::SocketAddr,
    sync::{Arc, Weak},
    time::{Duration, Instant},
};

use http_body_util::Full;
use hyper::{
    body::{Bytes, Incoming},
    server::conn::http1,
    service::service_fn,
    Request, Response, StatusCode,
};
use hyper_util::{rt::TokioIo, server::graceful::GracefulShutdown};
use serde_json::json;
use tokio::{
    net::TcpListener,
    sync::{oneshot, RwLock},
    task::{JoinHandle, JoinSet},
};
use tracing::{debug, info, warn};

use crate::{
    events::EventSink,
    interpreter::{Interpreter, RequestSnapshot},
    server::{Registry, DEFAULT_SHUTDOWN_GRACE},
};

/// One HTTP listener bound to a single mock port.
///
/// Routes are looked up in the registry on every request, so the listener
/// never restarts when scripts change.
pub(crate) struct MockListener {
    port: u16,
    shutdown: oneshot::Sender<Duration>,
    task: JoinHandle<bool>,
}

impl MockListener {
    pub(crate) async fn start(
        addr: SocketAddr,
        registry: Weak<RwLock<Registry>>,
        events: Arc<dyn EventSink>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();
        let (shutdown, shutdown_rx) = oneshot::channel();
        info!(port, "Mock listener on http://{}/", listener.local_addr()?);
        events.record(
            "MockServerStart",
            Duration::ZERO,
            json!({"port": port, "address": addr.to_string()}),
        );
        let task = tokio::spawn(serve(listener, port, registry, events, shutdown_rx));
        Ok(Self {
            port,
            shutdown,
            task,
        })
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    /// Stops accepting immediately, then waits up to `grace` for in-flight
    /// connections. Returns `true` when connections had to be aborted.
    pub(crate) async fn shutdown(self, grace: Duration) -> bool {
        let _ = self.shutdown.send(grace);
        match self.task.await {
            Ok(forced) => forced,
            Err(err) => {
                warn!(port = self.port, "Mock listener task failed: {}", err);
                true
            }
        }
    }
}

async fn serve(
    listener: TcpListener,
    port: u16,
    registry: Weak<RwLock<Registry>>,
    events: Arc<dyn EventSink>,
    mut shutdown_rx: oneshot::Receiver<Duration>,
) -> bool {
    let graceful = GracefulShutdown::new();
    let mut connections = JoinSet::new();

    let grace = loop {
        tokio::select! {
            biased;
            grace = &mut shutdown_rx => break grace.unwrap_or(DEFAULT_SHUTDOWN_GRACE),
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            accepted = listener.accept() => {
                let (stream, remote) = match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!(port, "Failed to accept connection: {}", err);
                        continue;
                    }
                };
                debug!(port, %remote, "Accepted connection");
                let io = TokioIo::new(stream);
                let registry = registry.clone();
                let events = events.clone();
                let service = service_fn(move |req| dispatch(req, port, registry.clone(), events.clone()));
                let connection = graceful.watch(http1::Builder::new().serve_connection(io, service));
                connections.spawn(async move {
                    if let Err(err) = connection.await {
                        debug!(port, "Error serving connection: {:?}", err);
                    }
                });
            }
        }
    };

    drop(listener);
    let forced = tokio::time::timeout(grace, graceful.shutdown()).await.is_err();
    if forced {
        warn!(port, ?grace, "Grace period elapsed, closing remaining connections");
    }
    connections.shutdown().await;
    info!(port, "Mock listener stopped");
    forced
}

async fn dispatch(
    req: Request<Incoming>,
    port: u16,
    registry: Weak<RwLock<Registry>>,
    events: Arc<dyn EventSink>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let method = req.method().clone();
    let path = String::from(req.uri().path());

    let script = match registry.upgrade() {
        Some(registry) => {
            let registry = registry.read().await;
            registry.lookup(port, method.as_str(), &path)
        }
        None => None,
    };
    let Some(script) = script else {
        debug!(port, %method, %path, "No route");
        events.record(
            "MockRequest",
            started.elapsed(),
            json!({"port": port, "method": method.as_str(), "path": path, "status": 404}),
        );
        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = StatusCode::NOT_FOUND;
        return Ok(response);
    };

    let request = RequestSnapshot::read(req).await;
    let mut interpreter = Interpreter::new(&request);
    interpreter.run(&script);
    let rendered = interpreter.finish();
    let status = rendered.status.as_u16();
    let variables = serde_json::to_value(&rendered.variables).unwrap_or_default();
    let response = rendered.into_response().await;

    events.record(
        "MockRequest",
        started.elapsed(),
        json!({
            "port": port,
            "method": method.as_str(),
            "path": path,
            "status": status,
            "variables": variables,
        }),
    );
    Ok(response)
}
