//! Per-request input to the authorization pipeline.

use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::request::Parts;
use http::{Request, Uri};
use percent_encoding::percent_decode_str;

/// Decoded query string parameters.
///
/// Keeps every value of a repeated key in the order it appeared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    /// Parse an `application/x-www-form-urlencoded` query string.
    ///
    /// A leading `?` is ignored. `+` decodes to a space and percent escapes
    /// are decoded.
    ///
    /// # Example
    /// ```
    /// use axum_endpoint_authz::QueryParams;
    ///
    /// let query = QueryParams::parse("namespace=a%2Fb&namespace=second&q=x+y");
    /// assert_eq!(query.first("namespace"), Some("a/b"));
    /// assert_eq!(query.get_all("namespace").count(), 2);
    /// assert_eq!(query.first("q"), Some("x y"));
    /// ```
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let pairs = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        Self { pairs }
    }

    /// First value for `name`.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// All values for `name`, in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Append a value.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((name.into(), value.into()));
    }

    /// Iterate over all pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether there are no pairs.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for QueryParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// The parts of an HTTP request the authorization pipeline reads.
///
/// The body is never looked at.
#[derive(Debug, Clone, Default)]
pub struct RequestView {
    path: String,
    method: String,
    headers: HeaderMap,
    query: QueryParams,
}

impl RequestView {
    /// Build a view from a method and a request target.
    ///
    /// `target` may carry a query string (`/api/v1/namespaces?namespace=a`).
    /// The path is percent-decoded.
    pub fn new(method: impl Into<String>, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, QueryParams::parse(query)),
            None => (target, QueryParams::default()),
        };
        Self {
            path: decode_path(path),
            method: method.into(),
            headers: HeaderMap::new(),
            query,
        }
    }

    /// Build a view from a method and URI.
    ///
    /// The path is percent-decoded before it is stored, so rules see
    /// `/api/v1/evaluations` for `/api/v1/%65valuations` just as the router's
    /// extractors do.
    pub fn from_uri(method: &http::Method, uri: &Uri) -> Self {
        Self {
            path: decode_path(uri.path()),
            method: method.as_str().to_string(),
            headers: HeaderMap::new(),
            query: uri.query().map(QueryParams::parse).unwrap_or_default(),
        }
    }

    /// Build a view from request parts.
    pub fn from_parts(parts: &Parts) -> Self {
        let mut view = Self::from_uri(&parts.method, &parts.uri);
        view.headers = parts.headers.clone();
        view
    }

    /// Build a view from a request without touching its body.
    pub fn from_request<B>(request: &Request<B>) -> Self {
        let mut view = Self::from_uri(request.method(), request.uri());
        view.headers = request.headers().clone();
        view
    }

    /// Add a header. Names or values that are not valid HTTP are skipped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => {
                tracing::debug!(header = name, "Skipping invalid header in request view");
            }
        }
        self
    }

    /// Add a query parameter.
    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.append(name, value);
        self
    }

    /// Replace the header map.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Percent-decoded request path, without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Request method as sent (normally upper case).
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Decoded query parameters.
    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    /// First value of header `name`, decoded lossily as UTF-8.
    ///
    /// The lookup is case-insensitive.
    pub fn header_value(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
    }

    /// First value of query parameter `name`.
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query.first(name)
    }
}

/// Invalid escapes are kept as written; invalid UTF-8 is replaced.
fn decode_path(path: &str) -> String {
    percent_decode_str(path).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query() {
        let query = QueryParams::parse("?a=1&b=two&a=3");
        assert_eq!(query.len(), 3);
        assert_eq!(query.first("a"), Some("1"));
        assert_eq!(query.get_all("a").collect::<Vec<_>>(), vec!["1", "3"]);
        assert_eq!(query.first("b"), Some("two"));
        assert_eq!(query.first("c"), None);
    }

    #[test]
    fn test_query_decoding() {
        let query = QueryParams::parse("ns=team%20a&label=x+y&empty=");
        assert_eq!(query.first("ns"), Some("team a"));
        assert_eq!(query.first("label"), Some("x y"));
        assert_eq!(query.first("empty"), Some(""));
    }

    #[test]
    fn test_new_splits_target() {
        let view = RequestView::new("GET", "/api/v1/namespaces?namespace=query-ns");
        assert_eq!(view.path(), "/api/v1/namespaces");
        assert_eq!(view.method(), "GET");
        assert_eq!(view.query_value("namespace"), Some("query-ns"));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let view = RequestView::new("POST", "/jobs").header("x-tenant", "tenant-a");
        assert_eq!(view.header_value("X-Tenant").as_deref(), Some("tenant-a"));
        assert_eq!(view.header_value("X-TENANT").as_deref(), Some("tenant-a"));
        assert_eq!(view.header_value("X-Other"), None);
    }

    #[test]
    fn test_first_header_value_wins() {
        let view = RequestView::new("POST", "/jobs")
            .header("X-Tenant", "first")
            .header("X-Tenant", "second");
        assert_eq!(view.header_value("x-tenant").as_deref(), Some("first"));
    }

    #[test]
    fn test_non_utf8_header_is_lossy() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-tenant",
            HeaderValue::from_bytes(b"team-\xff").unwrap(),
        );
        let view = RequestView::new("GET", "/").with_headers(headers);
        assert_eq!(view.header_value("x-tenant").as_deref(), Some("team-\u{fffd}"));
    }

    #[test]
    fn test_invalid_header_is_skipped() {
        let view = RequestView::new("GET", "/").header("bad header", "v");
        assert!(view.headers().is_empty());
    }

    #[test]
    fn test_from_request() {
        let request = Request::builder()
            .method("DELETE")
            .uri("http://localhost/api/v1/jobs/7?namespace=ns1&namespace=ns2")
            .header("X-Tenant", "tenant-b")
            .body(())
            .unwrap();

        let view = RequestView::from_request(&request);
        assert_eq!(view.method(), "DELETE");
        assert_eq!(view.path(), "/api/v1/jobs/7");
        assert_eq!(view.query_value("namespace"), Some("ns1"));
        assert_eq!(view.header_value("x-tenant").as_deref(), Some("tenant-b"));

        let (parts, _) = request.into_parts();
        let from_parts = RequestView::from_parts(&parts);
        assert_eq!(from_parts.path(), view.path());
        assert_eq!(from_parts.query(), view.query());
    }

    #[test]
    fn test_path_is_percent_decoded() {
        let view = RequestView::new("POST", "/api/v1/%65valuations/jobs?namespace=a%20b");
        assert_eq!(view.path(), "/api/v1/evaluations/jobs");
        assert_eq!(view.query_value("namespace"), Some("a b"));

        let request = Request::builder()
            .uri("/api/v1/evaluations%2Fjobs/%7e1")
            .body(())
            .unwrap();
        let view = RequestView::from_request(&request);
        assert_eq!(view.path(), "/api/v1/evaluations/jobs/~1");

        let (parts, _) = request.into_parts();
        assert_eq!(RequestView::from_parts(&parts).path(), view.path());
    }

    #[test]
    fn test_path_decoding_edge_cases() {
        // Not a valid escape: left alone
        assert_eq!(RequestView::new("GET", "/a%zz/b%").path(), "/a%zz/b%");
        // Invalid UTF-8 after decoding
        assert_eq!(RequestView::new("GET", "/x%ff").path(), "/x\u{fffd}");
        // Plus is not a space in paths
        assert_eq!(RequestView::new("GET", "/a+b").path(), "/a+b");
    }
}
