//! Warden - minimal HTTP/1.1 server engine
//!
//! Accepts TCP connections behind an admission-controlled worker pool and
//! serves each one with a keep-alive aware request/response session.

pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod server;

pub use handler::{DefaultHandler, Handler, HandlerFn, handler_fn};
