use std::{
    collections::HashMap,
    convert::Infallible,
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::{Duration, Instant},
};

use http_body_util::{BodyExt, Full};
use hyper::{
    body::{Body, Bytes},
    header::{HeaderValue, CONTENT_TYPE},
    server::conn::http1,
    service::service_fn,
    Method, Request, Response, StatusCode,
};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use tokio::{net::TcpListener, sync::RwLock, task::JoinSet};
use tracing::{debug, info, warn};

use crate::{
    events::{EventSink, TracingEvents},
    instruction::Instruction,
    interchange::{RegisterRoute, ResetPort, StatusResponse},
    listener::MockListener,
};

pub const DEFAULT_CONTROL_PORT: u16 = 8888;
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Decoded instructions for one route, shared with in-flight requests.
pub type Script = Arc<[Instruction]>;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Address every mock listener binds on.
    pub mock_host: IpAddr,
    /// How long a reset waits for in-flight requests before aborting them.
    pub shutdown_grace: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            mock_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub port: u16,
    pub method: String,
    pub path: String,
}

impl RouteKey {
    pub fn new(port: u16, method: &str, path: &str) -> Self {
        Self {
            port,
            method: String::from(method),
            path: String::from(path),
        }
    }
}

#[derive(Default)]
pub(crate) struct Registry {
    routes: HashMap<RouteKey, Script>,
    listeners: HashMap<u16, MockListener>,
}

impl Registry {
    pub(crate) fn lookup(&self, port: u16, method: &str, path: &str) -> Option<Script> {
        self.routes.get(&RouteKey::new(port, method, path)).cloned()
    }
}

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Port 0 cannot host a mock route")]
    InvalidPort,
    #[error("Failed to start mock listener on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },
}

/// Owns the route table and the listeners serving it.
///
/// Cloning is cheap; every clone manages the same registry.
#[derive(Clone)]
pub struct Controller {
    registry: Arc<RwLock<Registry>>,
    config: Arc<ControllerConfig>,
    events: Arc<dyn EventSink>,
}

impl Controller {
    pub fn new(config: ControllerConfig) -> Self {
        Self::with_events(config, Arc::new(TracingEvents))
    }

    pub fn with_events(config: ControllerConfig, events: Arc<dyn EventSink>) -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry::default())),
            config: Arc::new(config),
            events,
        }
    }

    /// Stores (or replaces) the script for `(port, method, path)` and makes sure
    /// a listener is running on the port. The route is only stored once the
    /// listener is bound.
    pub async fn register_route(&self, request: RegisterRoute) -> Result<(), ControllerError> {
        let started = Instant::now();
        let result = self.try_register_route(&request).await;
        match &result {
            Ok(()) => self.events.record(
                "RegisterRoute",
                started.elapsed(),
                json!({
                    "port": request.port,
                    "method": request.method,
                    "path": request.path,
                    "instructions": request.response_func.len(),
                }),
            ),
            Err(err) => self.events.record(
                "RegisterRouteError",
                started.elapsed(),
                json!({
                    "port": request.port,
                    "method": request.method,
                    "path": request.path,
                    "error": err.to_string(),
                }),
            ),
        }
        result
    }

    async fn try_register_route(&self, request: &RegisterRoute) -> Result<(), ControllerError> {
        let port = request.port;
        if port == 0 {
            return Err(ControllerError::InvalidPort);
        }

        let script: Script = request
            .response_func
            .iter()
            .map(Instruction::decode)
            .collect::<Vec<_>>()
            .into();
        for instruction in script.iter() {
            if let Instruction::Invalid { group, func, reason } = instruction {
                warn!(
                    port,
                    method = %request.method,
                    path = %request.path,
                    group = %group,
                    func = %func,
                    "Instruction will be skipped: {}",
                    reason
                );
            }
        }

        let key = RouteKey::new(port, &request.method, &request.path);
        let mut registry = self.registry.write().await;
        if !registry.listeners.contains_key(&port) {
            let addr = SocketAddr::new(self.config.mock_host, port);
            let listener =
                MockListener::start(addr, Arc::downgrade(&self.registry), self.events.clone())
                    .await
                    .map_err(|source| ControllerError::Bind { port, source })?;
            registry.listeners.insert(port, listener);
        }
        registry.routes.insert(key, script);
        info!(port, method = %request.method, path = %request.path, "Route registered");
        Ok(())
    }

    /// Drops every route on `port` and stops its listener. Unknown ports are a no-op.
    pub async fn reset_port(&self, port: u16) {
        let started = Instant::now();
        let listener = {
            let mut registry = self.registry.write().await;
            registry.routes.retain(|key, _| key.port != port);
            registry.listeners.remove(&port)
        };
        let Some(listener) = listener else {
            debug!(port, "Nothing to reset");
            self.events
                .record("ResetPort", started.elapsed(), json!({"port": port, "running": false}));
            return;
        };

        if listener.shutdown(self.config.shutdown_grace).await {
            self.events.record(
                "ResetPortError",
                started.elapsed(),
                json!({"port": port, "error": "grace period elapsed"}),
            );
        } else {
            self.events
                .record("ResetPort", started.elapsed(), json!({"port": port, "running": true}));
        }
        info!(port, "Port reset");
    }

    /// Stops every listener concurrently and clears the route table.
    /// Returns the ports that were running.
    pub async fn reset_all(&self) -> Vec<u16> {
        let started = Instant::now();
        let listeners: Vec<MockListener> = {
            let mut registry = self.registry.write().await;
            registry.routes.clear();
            registry.listeners.drain().map(|(_, listener)| listener).collect()
        };

        let mut ports: Vec<u16> = listeners.iter().map(MockListener::port).collect();
        ports.sort_unstable();

        let grace = self.config.shutdown_grace;
        let mut shutdowns = JoinSet::new();
        for listener in listeners {
            shutdowns.spawn(listener.shutdown(grace));
        }
        while shutdowns.join_next().await.is_some() {}

        self.events
            .record("ResetAll", started.elapsed(), json!({"ports_reset": ports}));
        info!(?ports, "All ports reset");
        ports
    }

    pub async fn lookup(&self, port: u16, method: &str, path: &str) -> Option<Script> {
        self.registry.read().await.lookup(port, method, path)
    }

    pub async fn running_ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self.registry.read().await.listeners.keys().copied().collect();
        ports.sort_unstable();
        ports
    }
}

const REGISTER_ROUTE: &str = "/registerRoute";
const RESET_PORT: &str = "/resetPort";
const RESET_ALL: &str = "/resetAll";

pub async fn handler<T>(
    req: Request<T>,
    controller: Controller,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    T: Body,
    T::Error: std::fmt::Debug,
{
    let started = Instant::now();
    let method = req.method().clone();
    let path = String::from(req.uri().path());

    let response = match (&method, path.as_str()) {
        (&Method::POST, REGISTER_ROUTE) => handle_register_route(req, &controller).await,
        (&Method::POST, RESET_PORT) => handle_reset_port(req, &controller).await,
        (&Method::POST, RESET_ALL) => {
            let ports = controller.reset_all().await;
            status_response(
                StatusCode::OK,
                StatusResponse::ok(format!("Reset {} port(s)", ports.len())),
            )
        }
        (_, REGISTER_ROUTE | RESET_PORT | RESET_ALL) => status_response(
            StatusCode::METHOD_NOT_ALLOWED,
            StatusResponse::error("Method not allowed"),
        ),
        _ => {
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = StatusCode::NOT_FOUND;
            response
        }
    };

    controller.events.record(
        "ControlRequest",
        started.elapsed(),
        json!({
            "method": method.as_str(),
            "path": path,
            "status": response.status().as_u16(),
        }),
    );
    Ok(response)
}

async fn handle_register_route<T>(req: Request<T>, controller: &Controller) -> Response<Full<Bytes>>
where
    T: Body,
    T::Error: std::fmt::Debug,
{
    let request = match read_json::<_, RegisterRoute>(req).await {
        Ok(request) => request,
        Err(response) => return response,
    };
    match controller.register_route(request).await {
        Ok(()) => status_response(StatusCode::OK, StatusResponse::ok("Route registered")),
        Err(err @ ControllerError::InvalidPort) => {
            status_response(StatusCode::BAD_REQUEST, StatusResponse::error(err.to_string()))
        }
        Err(err @ ControllerError::Bind { .. }) => {
            warn!("{}", err);
            status_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                StatusResponse::error(err.to_string()),
            )
        }
    }
}

async fn handle_reset_port<T>(req: Request<T>, controller: &Controller) -> Response<Full<Bytes>>
where
    T: Body,
    T::Error: std::fmt::Debug,
{
    let request = match read_json::<_, ResetPort>(req).await {
        Ok(request) => request,
        Err(response) => return response,
    };
    controller.reset_port(request.port).await;
    status_response(
        StatusCode::OK,
        StatusResponse::ok(format!("Port {} reset", request.port)),
    )
}

async fn read_json<T, U>(req: Request<T>) -> Result<U, Response<Full<Bytes>>>
where
    T: Body,
    T::Error: std::fmt::Debug,
    U: DeserializeOwned,
{
    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            debug!("Failed to read control request body: {:?}", err);
            return Err(status_response(
                StatusCode::BAD_REQUEST,
                StatusResponse::error("Cannot read request body"),
            ));
        }
    };
    serde_json::from_slice::<U>(&body).map_err(|err| {
        status_response(
            StatusCode::BAD_REQUEST,
            StatusResponse::error(format!("Invalid request body: {}", err)),
        )
    })
}

fn status_response(status: StatusCode, message: StatusResponse) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(&message).unwrap_or_default();
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

pub struct SocketBinding {
    pub port: u16,
    pub listener: TcpListener,
}

pub async fn bind_socket(
    addr: SocketAddr,
) -> Result<SocketBinding, Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    let port = listener.local_addr()?.port();
    Ok(SocketBinding { port, listener })
}

pub async fn run_controlplane(
    listener: TcpListener,
    controller: Controller,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let address = listener.local_addr()?;
    controller.events.record(
        "ControlServerStart",
        Duration::ZERO,
        json!({"address": address.to_string()}),
    );
    loop {
        let controller = controller.clone();
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::task::spawn(async move {
            if let Err(err) = http1::Builder::new()
                .serve_connection(io, service_fn(move |req| handler(req, controller.clone())))
                .await
            {
                debug!("Error serving control connection: {:?}", err);
            }
        });
    }
}
