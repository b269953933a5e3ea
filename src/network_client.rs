use hyper::{body::Bytes, Method, StatusCode};
use serde::Serialize;
use thiserror::Error;

use crate::hyper_helpers::{authority_of, request_to, HyperHelpers, RequestExt, ResponseExt};

pub(crate) struct NetworkClient;

impl NetworkClient {
    /// POSTs to `path` on the control plane. `message` of `None` sends an
    /// empty body. Anything but `200 OK` is an error.
    pub(crate) async fn post<T>(
        control_plane_url: &str,
        path: &str,
        message: Option<&T>,
    ) -> Result<Bytes, ClientNetworkError>
    where
        T: Serialize,
    {
        let (address, authority) =
            authority_of(control_plane_url).ok_or(ClientNetworkError::InvalidUrl)?;

        let builder = request_to(Method::POST, &authority, path);
        let request = match message {
            Some(message) => builder.json(message),
            None => builder.empty(),
        }
        .map_err(|_| ClientNetworkError::FailedToSerializeCommand)?;

        let response = HyperHelpers::send(&address, request)
            .await
            .map_err(|_| ClientNetworkError::FailedToConnectToControlPlane)?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|_| ClientNetworkError::ResponseReadError)?;

        if status == StatusCode::OK {
            Ok(body)
        } else {
            Err(ClientNetworkError::UnexpectedStatus {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            })
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ClientNetworkError {
    #[error("Invalid control plane url")]
    InvalidUrl,
    #[error("Failed to connect to control plane")]
    FailedToConnectToControlPlane,
    #[error("Failed to serialize command")]
    FailedToSerializeCommand,
    #[error("Failed to read response")]
    ResponseReadError,
    #[error("Control plane answered {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
}
