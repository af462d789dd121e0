//! Pluggable request handlers.
//!
//! A handler turns one [`Request`] into one [`Response`]. The dispatcher owns
//! the deadline: a handler future still pending when the connection deadline
//! passes is dropped and a 500 fallback is written instead. Handlers that block
//! the executor thread cannot be interrupted this way and must not do so.

use std::future::Future;

use http::status::InvalidStatusCode;
use http::StatusCode;

use crate::config::ResponseConfig;
use crate::http::{Request, Response};

/// Computes the response for a request.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, request: Request) -> impl Future<Output = Response> + Send;
}

/// Answers every request with the same bytes.
#[derive(Debug, Clone)]
pub struct FixedResponse {
    response: Response,
}

impl FixedResponse {
    pub fn new(response: Response) -> Self {
        Self { response }
    }

    pub fn from_config(config: &ResponseConfig) -> Result<Self, InvalidStatusCode> {
        let status = StatusCode::from_u16(config.status)?;
        Ok(Self::new(Response::text(
            status,
            &config.content_type,
            &config.body,
        )))
    }

    pub fn response(&self) -> &Response {
        &self.response
    }
}

impl Default for FixedResponse {
    fn default() -> Self {
        Self::new(Response::text(StatusCode::OK, "text/plain", "Hello, World!"))
    }
}

impl Handler for FixedResponse {
    async fn handle(&self, _request: Request) -> Response {
        self.response.clone()
    }
}

/// Handler backed by an async closure. See [`handler_fn`].
#[derive(Debug, Clone)]
pub struct HandlerFn<F> {
    f: F,
}

/// Wrap an async closure as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send,
{
    HandlerFn { f }
}

impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send,
{
    fn handle(&self, request: Request) -> impl Future<Output = Response> + Send {
        (self.f)(request)
    }
}
