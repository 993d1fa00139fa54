//! Incoming HTTP request type.

use std::collections::HashMap;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};

/// An incoming HTTP request with its body fully buffered.
#[derive(Clone, Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
}

impl Request {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        Self { method, uri, headers, body, params: HashMap::new() }
    }

    pub(crate) fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Returns the first non-empty query value among `keys`, tried in order.
    ///
    /// Only the first occurrence of each key is considered. An unparseable
    /// query string behaves like an empty one.
    pub fn query_param(&self, keys: &[&str]) -> Option<String> {
        let pairs: Vec<(String, String)> = self
            .uri
            .query()
            .and_then(|q| serde_urlencoded::from_str(q).ok())
            .unwrap_or_default();

        keys.iter()
            .filter_map(|key| pairs.iter().find(|(k, _)| k.as_str() == *key))
            .map(|(_, v)| v)
            .find(|v| !v.is_empty())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(uri: &'static str) -> Request {
        Request::new(Method::GET, Uri::from_static(uri), HeaderMap::new(), Bytes::new())
    }

    #[test]
    fn query_falls_through_to_later_keys() {
        let req = get("/users?ID=7");
        assert_eq!(req.query_param(&["id", "ID"]).as_deref(), Some("7"));
    }

    #[test]
    fn earlier_key_wins() {
        let req = get("/users?ID=7&id=3");
        assert_eq!(req.query_param(&["id", "ID"]).as_deref(), Some("3"));
    }

    #[test]
    fn empty_values_are_skipped() {
        let req = get("/users?id=&ID=9");
        assert_eq!(req.query_param(&["id", "ID"]).as_deref(), Some("9"));
    }

    #[test]
    fn only_first_occurrence_counts() {
        let req = get("/users?id=&id=5");
        assert_eq!(req.query_param(&["id"]), None);
    }

    #[test]
    fn percent_decoding() {
        let req = get("/search?q=hello%20world");
        assert_eq!(req.query_param(&["q"]).as_deref(), Some("hello world"));
    }

    #[test]
    fn missing_query() {
        assert_eq!(get("/users").query_param(&["id"]), None);
    }

    #[test]
    fn params_and_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-tenant", "acme".parse().unwrap());
        let req = Request::new(Method::GET, Uri::from_static("/t/1"), headers, Bytes::new())
            .with_params(HashMap::from([("id".to_owned(), "1".to_owned())]));
        assert_eq!(req.param("id"), Some("1"));
        assert_eq!(req.param("missing"), None);
        assert_eq!(req.header("X-Tenant"), Some("acme"));
    }
}
