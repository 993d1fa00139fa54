//! Outgoing HTTP response type.
//!
//! Handlers never build these directly: the `send_*` methods on
//! [`RequestContext`](crate::RequestContext) do it. The type is public so
//! embedders driving an [`App`](crate::App) by hand can inspect what came out.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Content-type values restwell writes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Json,     // application/json
    Protobuf, // application/x-protobuf
    Text,     // text/plain
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json     => "application/json",
            Self::Protobuf => "application/x-protobuf",
            Self::Text     => "text/plain",
        }
    }
}

// ── Response ──────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
#[derive(Clone, Debug)]
pub struct Response {
    pub(crate) body: Bytes,
    pub(crate) headers: HeaderMap,
    pub(crate) status: StatusCode,
}

impl Response {
    /// `200 OK`, `application/json`.
    pub fn json(body: Bytes) -> Self {
        Self::builder().bytes(ContentType::Json, body)
    }

    /// `200 OK`, `text/plain`.
    pub fn text(body: impl Into<Bytes>) -> Self {
        Self::builder().bytes(ContentType::Text, body.into())
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { body: Bytes::new(), headers: HeaderMap::new(), status: code }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: HeaderMap::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Converts into the `http` type hyper writes to the connection.
    pub fn into_http(self) -> http::Response<Full<Bytes>> {
        let mut response = http::Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a typed body method, so you always know what you're sending.
pub struct ResponseBuilder {
    headers: HeaderMap,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: Bytes) -> Response {
        self.bytes(ContentType::Json, body)
    }

    /// Terminate with a typed body.
    pub fn bytes(mut self, content_type: ContentType, body: Bytes) -> Response {
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type.as_str()));
        Response { body, headers: self.headers, status: self.status }
    }
}

#[cfg(test)]
mod tests {
    use http::header::CACHE_CONTROL;

    use super::*;

    #[test]
    fn json_shortcut_sets_content_type() {
        let res = Response::json(Bytes::from_static(b"{}"));
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.content_type(), Some("application/json"));
    }

    #[test]
    fn text_is_plain() {
        let res = Response::text("raw");
        assert_eq!(res.content_type(), Some("text/plain"));
        assert_eq!(res.body().as_ref(), b"raw");
    }

    #[test]
    fn builder_keeps_extra_headers() {
        let res = Response::builder()
            .status(StatusCode::FORBIDDEN)
            .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"))
            .json(Bytes::new());
        let http = res.into_http();
        assert_eq!(http.status(), StatusCode::FORBIDDEN);
        assert_eq!(http.headers()[CACHE_CONTROL], "no-cache");
        assert_eq!(http.headers()[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn bare_status_has_no_body() {
        let res = Response::status(StatusCode::NOT_FOUND);
        assert!(res.body().is_empty());
        assert!(res.content_type().is_none());
    }
}
