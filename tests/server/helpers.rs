use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use burattino::{
    client::Client,
    server::{bind_socket, run_controlplane, Controller, ControllerConfig},
};

pub(crate) struct TestServer {
    pub(crate) control_plane: u16,
    pub(crate) controller: Controller,
}

impl TestServer {
    pub(crate) fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.control_plane)
    }

    pub(crate) fn client(&self) -> Client {
        Client::new(&self.url())
    }
}

pub(crate) fn test_config() -> ControllerConfig {
    ControllerConfig {
        mock_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        shutdown_grace: Duration::from_secs(2),
    }
}

pub(crate) async fn start_server() -> TestServer {
    let control_plane = bind_socket(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let controller = Controller::new(test_config());
    let server = run_controlplane(control_plane.listener, controller.clone());
    let _ = tokio::spawn(server);
    TestServer {
        control_plane: control_plane.port,
        controller,
    }
}

/// A port that was free a moment ago.
pub(crate) fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .expect("no free port")
}

/// Distinct free ports; the reserving sockets are held until all are picked.
pub(crate) fn free_ports<const N: usize>() -> [u16; N] {
    let reserved: Vec<std::net::TcpListener> = (0..N)
        .map(|_| std::net::TcpListener::bind("127.0.0.1:0").expect("no free port"))
        .collect();
    std::array::from_fn(|i| reserved[i].local_addr().expect("no local addr").port())
}

pub(crate) fn mock_url(port: u16, path: &str) -> String {
    format!("http://127.0.0.1:{}{}", port, path)
}

/// Pooled connections would outlive a port reset, so every request dials fresh.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .expect("Failed to build http client")
}
