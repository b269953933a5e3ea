use std::error::Error;

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::{
    body::{Body, Bytes, Incoming},
    header::{CONTENT_TYPE, HOST},
    Request, Response,
};
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::debug;

/// One-shot HTTP/1 exchanges over a fresh TCP connection.
pub struct HyperHelpers;

impl HyperHelpers {
    pub async fn send<B>(
        address: &str,
        request: Request<B>,
    ) -> Result<Response<Incoming>, RequestError>
    where
        B: Body + 'static + Send,
        B::Data: Send,
        B::Error: Into<Box<dyn Error + Send + Sync>>,
    {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|_| RequestError::CannotConnect)?;
        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|_| RequestError::PeerNotHttp)?;

        tokio::task::spawn(async move {
            if let Err(err) = conn.await {
                debug!("Connection failed: {:?}", err);
            }
        });

        sender
            .send_request(request)
            .await
            .map_err(|_| RequestError::SendError)
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum RequestError {
    #[error("Peer is not speaking HTTP")]
    PeerNotHttp,
    #[error("Cannot send request")]
    SendError,
    #[error("Cannot connect")]
    CannotConnect,
    #[error("Cannot serialize body")]
    CannotSerializeBody,
    #[error("Cannot build request")]
    CannotBuildRequest,
}

#[derive(Error, Debug, PartialEq)]
pub enum ResponseError {
    #[error("Cannot fetch body")]
    CannotFetchBody,
}

pub trait RequestExt {
    fn json<T>(self, body: T) -> Result<Request<Full<Bytes>>, RequestError>
    where
        T: serde::Serialize;

    fn empty(self) -> Result<Request<Full<Bytes>>, RequestError>;
}

impl RequestExt for hyper::http::request::Builder {
    fn json<T>(self, body: T) -> Result<Request<Full<Bytes>>, RequestError>
    where
        T: serde::Serialize,
    {
        let message =
            serde_json::to_string(&body).map_err(|_| RequestError::CannotSerializeBody)?;

        self.header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(message)))
            .map_err(|_| RequestError::CannotBuildRequest)
    }

    fn empty(self) -> Result<Request<Full<Bytes>>, RequestError> {
        self.body(Full::new(Bytes::new()))
            .map_err(|_| RequestError::CannotBuildRequest)
    }
}

/// Splits an `http://host:port/...` URL into the address to dial and the
/// value of the `Host` header.
pub fn authority_of(url: &str) -> Option<(String, String)> {
    let uri = url.parse::<hyper::Uri>().ok()?;
    let host = uri.host()?;
    let port = uri.port_u16().unwrap_or(80);
    let authority = uri
        .authority()
        .map(|authority| String::from(authority.as_str()))?;
    Some((format!("{}:{}", host, port), authority))
}

/// Builder with the `Host` header already set for `authority`.
pub fn request_to(method: hyper::Method, authority: &str, path: &str) -> hyper::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(path)
        .header(HOST, authority)
}

#[async_trait]
pub trait ResponseExt {
    async fn bytes(self) -> Result<Bytes, ResponseError>;
}

#[async_trait]
impl ResponseExt for Response<Incoming> {
    async fn bytes(self) -> Result<Bytes, ResponseError> {
        let bytes = self
            .into_body()
            .collect()
            .await
            .map_err(|_| ResponseError::CannotFetchBody)?
            .to_bytes();
        Ok(bytes)
    }
}
