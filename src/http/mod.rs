//! HTTP/1.1 protocol implementation.
//!
//! # Architecture
//!
//! - **`connection`**: per-connection request/response state machine
//! - **`parser`**: turns a buffered header block (plus body bytes) into a [`Request`]
//! - **`headers`**: case-insensitive header collection
//! - **`request`**: HTTP request representation
//! - **`response`**: HTTP response representation with builder pattern
//! - **`writer`**: serializes responses, fixed-length or chunked
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Wait for a complete header block
//!        └──────┬──────┘
//!               │ Request parsed (400 on failure)
//!               ▼
//!        ┌──────────────────┐
//!        │   Dispatching    │ ← Call the handler (500 on failure)
//!        └──────┬───────────┘
//!               │ Response ready
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← Send header block and body
//!        └──────┬───────────┘
//!               ▼
//!        ┌──────────────────┐
//!        │    Deciding      │
//!        └──────┬───────────┘
//!               ├─ Keep-Alive, under limit → Reading (same connection)
//!               └─ otherwise → Closed
//! ```
//!
//! Timeouts and socket errors in any state go straight to `Closed` without
//! a response.
//!
//! [`Request`]: request::Request

pub mod connection;
pub mod headers;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
