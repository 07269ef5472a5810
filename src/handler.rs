//! The dispatcher interface the connection session calls for every request.

use std::future::{Future, ready};

use crate::error::HandlerFault;
use crate::http::request::Request;
use crate::http::response::{Response, ResponseBuilder, StatusCode};

/// Turns a request into a response.
///
/// Called at most once per request. An `Err` (or a panic) is answered with
/// a 500 and the connection is closed.
pub trait Handler: Send + Sync + 'static {
    fn handle(
        &self,
        request: &Request,
    ) -> impl Future<Output = Result<Response, HandlerFault>> + Send;
}

/// Adapts a synchronous closure into a [`Handler`].
pub struct HandlerFn<F>(pub F);

impl<F> Handler for HandlerFn<F>
where
    F: Fn(&Request) -> Result<Response, HandlerFault> + Send + Sync + 'static,
{
    fn handle(
        &self,
        request: &Request,
    ) -> impl Future<Output = Result<Response, HandlerFault>> + Send {
        ready((self.0)(request))
    }
}

/// Wraps `f` as a [`Handler`].
///
/// ```
/// # use warden::handler::handler_fn;
/// # use warden::http::response::Response;
/// let handler = handler_fn(|request| Ok(Response::ok(request.path.clone())));
/// # let _ = handler;
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: Fn(&Request) -> Result<Response, HandlerFault> + Send + Sync + 'static,
{
    HandlerFn(f)
}

/// Placeholder dispatcher used by the binary until routing exists.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHandler;

impl Handler for DefaultHandler {
    async fn handle(&self, request: &Request) -> Result<Response, HandlerFault> {
        if request.is_head() {
            return Ok(Response::head());
        }

        let body = format!(
            "<br><h1 style='text-align: center;'>Hello from warden\nYou requested {:?}\n</h1>",
            request.path
        );
        Ok(ResponseBuilder::new(StatusCode::OK)
            .content_type("text/html")
            .body(body)
            .build())
    }
}
