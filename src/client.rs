use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::{
    interchange::{RegisterRoute, ResetPort, ResponseFunc},
    network_client::{ClientNetworkError, NetworkClient},
};

/// Talks to a running control plane.
///
/// ```no_run
/// # async fn demo() -> Result<(), burattino::client::ClientError> {
/// use burattino::{client::Client, funcs::*};
///
/// let client = Client::new("http://127.0.0.1:8888");
/// client
///     .register_route(9001, "GET", "/hello", vec![
///         set_status_code("", 200),
///         set_json_body("", r#"{"msg":"hi"}"#),
///     ])
///     .await?;
/// client.reset_port(9001).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    control_plane_url: String,
}

impl Client {
    pub fn new(control_plane_url: &str) -> Self {
        Self {
            control_plane_url: String::from(control_plane_url.trim_end_matches('/')),
        }
    }

    /// Replaces any script already registered for the same port, method and path.
    pub async fn register_route(
        &self,
        port: u16,
        method: &str,
        path: &str,
        response_func: Vec<ResponseFunc>,
    ) -> Result<(), ClientError> {
        let message = RegisterRoute {
            port,
            method: String::from(method),
            path: String::from(path),
            response_func,
        };
        self.post("/registerRoute", Some(&message)).await
    }

    pub async fn reset_port(&self, port: u16) -> Result<(), ClientError> {
        self.post("/resetPort", Some(&ResetPort { port })).await
    }

    pub async fn reset_all(&self) -> Result<(), ClientError> {
        self.post::<()>("/resetAll", None).await
    }

    async fn post<T: Serialize>(&self, path: &str, message: Option<&T>) -> Result<(), ClientError> {
        let body = NetworkClient::post(&self.control_plane_url, path, message)
            .await
            .map_err(|err| match err {
                ClientNetworkError::InvalidUrl => ClientError::InvalidUrl,
                ClientNetworkError::UnexpectedStatus { status, body } => {
                    ClientError::Rejected { status, body }
                }
                ClientNetworkError::FailedToSerializeCommand => ClientError::FailedToSerializeCommand,
                ClientNetworkError::FailedToConnectToControlPlane
                | ClientNetworkError::ResponseReadError => ClientError::FailedToConnectToControlPlane,
            })?;
        debug!(path, "Control plane answered {}", String::from_utf8_lossy(&body));
        Ok(())
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ClientError {
    #[error("Invalid control plane url")]
    InvalidUrl,
    #[error("Failed to connect to control plane")]
    FailedToConnectToControlPlane,
    #[error("Failed to serialize command")]
    FailedToSerializeCommand,
    #[error("Control plane rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },
}
