use std::fmt;

use bytes::Bytes;

use crate::http::headers::HeaderMap;

/// An HTTP status code.
///
/// Any `u16` is accepted; codes missing from the reason table are sent
/// with the reason phrase `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const CONTINUE: StatusCode = StatusCode(100);
    pub const OK: StatusCode = StatusCode(200);
    pub const CREATED: StatusCode = StatusCode(201);
    pub const ACCEPTED: StatusCode = StatusCode(202);
    pub const NO_CONTENT: StatusCode = StatusCode(204);
    pub const MOVED_PERMANENTLY: StatusCode = StatusCode(301);
    pub const TEMPORARY_REDIRECT: StatusCode = StatusCode(307);
    pub const PERMANENT_REDIRECT: StatusCode = StatusCode(308);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const UNAUTHORIZED: StatusCode = StatusCode(401);
    pub const FORBIDDEN: StatusCode = StatusCode(403);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const METHOD_NOT_ALLOWED: StatusCode = StatusCode(405);
    pub const LENGTH_REQUIRED: StatusCode = StatusCode(411);
    pub const CONTENT_TOO_LARGE: StatusCode = StatusCode(413);
    pub const TOO_MANY_REQUESTS: StatusCode = StatusCode(429);
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);

    /// Returns the numeric HTTP status code.
    ///
    /// ```
    /// # use warden::http::response::StatusCode;
    /// assert_eq!(StatusCode::OK.as_u16(), 200);
    /// assert_eq!(StatusCode(418).as_u16(), 418);
    /// ```
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Returns the standard reason phrase, or `Unknown`.
    ///
    /// ```
    /// # use warden::http::response::StatusCode;
    /// assert_eq!(StatusCode::NOT_FOUND.reason_phrase(), "Not Found");
    /// assert_eq!(StatusCode(599).reason_phrase(), "Unknown");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        match self.0 {
            100 => "Continue",
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            204 => "No Content",
            301 => "Moved Permanently",
            307 => "Temporary Redirect",
            308 => "Permanent Redirect",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            411 => "Length Required",
            413 => "Content Too Large",
            429 => "Too Many Requests",
            500 => "Internal Server Error",
            _ => "Unknown",
        }
    }
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> Self {
        StatusCode(code)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.0, self.reason_phrase())
    }
}

/// Lazily produced body pieces for a chunked response.
pub type Chunks = Box<dyn Iterator<Item = Bytes> + Send>;

/// Response payload: a fixed body or a chunk producer, never both.
pub enum Body {
    Full(Bytes),
    Chunked(Chunks),
}

impl Body {
    pub fn empty() -> Self {
        Body::Full(Bytes::new())
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self, Body::Chunked(_))
    }
}

impl Default for Body {
    fn default() -> Self {
        Body::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            Body::Chunked(_) => f.write_str("Chunked(..)"),
        }
    }
}

/// Represents a complete HTTP response ready to be sent to a client.
///
/// `headers` holds only user-supplied entries. The engine adds `date`,
/// `server`, framing and `content-type` when serializing, and those always
/// win over user entries of the same name.
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
    /// Media type for the `content-type` header.
    pub content_type: Option<String>,
    /// Emit the header block only (response to `HEAD`).
    pub head_only: bool,
}

/// Builder for constructing HTTP responses in a fluent style.
///
/// # Example
///
/// ```ignore
/// let response = ResponseBuilder::new(StatusCode::OK)
///     .content_type("application/json")
///     .body(&b"{}"[..])
///     .build();
/// ```
pub struct ResponseBuilder {
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
    content_type: Option<String>,
    head_only: bool,
}

impl ResponseBuilder {
    pub fn new(status: impl Into<StatusCode>) -> Self {
        Self {
            status: status.into(),
            headers: HeaderMap::new(),
            body: Body::empty(),
            content_type: None,
            head_only: false,
        }
    }

    /// Adds a user header. Engine-computed headers take precedence on send.
    pub fn header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    pub fn content_type(mut self, media_type: impl Into<String>) -> Self {
        self.content_type = Some(media_type.into());
        self
    }

    /// Sets a fixed body, replacing any chunk producer.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Body::Full(body.into());
        self
    }

    /// Streams the body with chunked transfer encoding.
    pub fn chunked<I>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = Bytes>,
        I::IntoIter: Send + 'static,
    {
        self.body = Body::Chunked(Box::new(chunks.into_iter()));
        self
    }

    pub fn head_only(mut self) -> Self {
        self.head_only = true;
        self
    }

    pub fn build(self) -> Response {
        Response {
            status: self.status,
            headers: self.headers,
            body: self.body,
            content_type: self.content_type,
            head_only: self.head_only,
        }
    }
}

impl Response {
    /// Creates a 200 OK `text/plain` response with the given body.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        ResponseBuilder::new(StatusCode::OK)
            .content_type("text/plain")
            .body(body)
            .build()
    }

    /// Header-only response for `HEAD` requests.
    pub fn head() -> Self {
        ResponseBuilder::new(StatusCode::OK).head_only().build()
    }

    pub fn bad_request() -> Self {
        Self::plain(StatusCode::BAD_REQUEST)
    }

    pub fn internal_error() -> Self {
        Self::plain(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// `text/plain` response whose body is the reason phrase.
    fn plain(status: StatusCode) -> Self {
        ResponseBuilder::new(status)
            .content_type("text/plain")
            .body(status.reason_phrase())
            .build()
    }

    pub fn is_chunked(&self) -> bool {
        self.body.is_chunked()
    }
}
