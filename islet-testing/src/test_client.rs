// Test HTTP Client

use islet_core::{Dispatcher, Error, HttpMethod, HttpRequest, HttpResponse};
use std::ops::Deref;
use std::sync::Arc;

/// Drives requests through a [`Dispatcher`] without opening a socket.
#[derive(Clone)]
pub struct TestClient {
    dispatcher: Arc<Dispatcher>,
}

impl TestClient {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self::from_arc(Arc::new(dispatcher))
    }

    pub fn from_arc(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(HttpMethod::GET, path, None).await
    }

    /// Make a HEAD request
    pub async fn head(&self, path: &str) -> TestResponse {
        self.request(HttpMethod::HEAD, path, None).await
    }

    /// Make a POST request
    pub async fn post(&self, path: &str, body: Vec<u8>) -> TestResponse {
        self.request(HttpMethod::POST, path, Some(body)).await
    }

    /// Make a request with custom method
    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> TestResponse {
        self.send(HttpRequest::new(method.as_str(), path).with_body(body.unwrap_or_default()))
            .await
    }

    /// Send a fully built request, e.g. from [`TestRequestBuilder`].
    pub async fn send(&self, req: HttpRequest) -> TestResponse {
        TestResponse(self.dispatcher.handle(req).await)
    }
}

/// Builder for test requests
pub struct TestRequestBuilder {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    query_params: Vec<(String, String)>,
}

impl TestRequestBuilder {
    /// Accepts any method name so unknown methods can be exercised too.
    pub fn new(method: impl Into<String>, path: &str) -> Self {
        Self {
            method: method.into(),
            path: path.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
            query_params: Vec::new(),
        }
    }

    /// Add a header
    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    /// Set the body
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Set JSON body
    pub fn json<T: serde::Serialize>(mut self, data: &T) -> Result<Self, Error> {
        self.body = serde_json::to_vec(data)?;
        self.headers
            .push(("Content-Type".to_string(), "application/json".to_string()));
        Ok(self)
    }

    /// Add a query parameter; appended after any query already in the path.
    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query_params.push((key.to_string(), value.to_string()));
        self
    }

    pub fn build(self) -> HttpRequest {
        let mut path = self.path;
        for (i, (k, v)) in self.query_params.iter().enumerate() {
            let sep = if i == 0 && !path.contains('?') { '?' } else { '&' };
            path.push(sep);
            path.push_str(&urlencoding::encode(k));
            path.push('=');
            path.push_str(&urlencoding::encode(v));
        }

        let req = HttpRequest::new(self.method, path).with_body(self.body);
        self.headers
            .into_iter()
            .fold(req, |req, (k, v)| req.with_header(k, v))
    }
}

/// Response from a test request
#[derive(Debug, Clone)]
pub struct TestResponse(pub HttpResponse);

impl TestResponse {
    pub fn status(&self) -> u16 {
        self.0.status
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.0.header(key)
    }

    /// Get the response body as JSON
    pub fn body_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, String> {
        serde_json::from_slice(&self.0.body).map_err(|e| format!("Serialization error: {}", e))
    }

    /// Assert the status code, showing the body on mismatch.
    #[track_caller]
    pub fn assert_status(&self, expected: u16) -> &Self {
        assert_eq!(
            self.0.status,
            expected,
            "Expected status {}, got {}. Body: {}",
            expected,
            self.0.status,
            self.0.body_string()
        );
        self
    }

    pub fn into_inner(self) -> HttpResponse {
        self.0
    }
}

impl Deref for TestResponse {
    type Target = HttpResponse;

    fn deref(&self) -> &HttpResponse {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let req = TestRequestBuilder::new("GET", "/test")
            .header("Authorization", "Bearer token")
            .query("q", "a b")
            .query("page", "2")
            .build();

        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/test?q=a%20b&page=2");
        assert_eq!(req.header("authorization"), Some("Bearer token"));
        assert_eq!(req.query("page").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_query_appends_to_existing() {
        let req = TestRequestBuilder::new("GET", "/search?x=1").query("y", "2").build();
        assert_eq!(req.path, "/search?x=1&y=2");
    }

    #[test]
    fn test_json_body() {
        let req = TestRequestBuilder::new("POST", "/books")
            .json(&serde_json::json!({ "title": "Dune" }))
            .unwrap()
            .build();
        assert_eq!(req.header("content-type"), Some("application/json"));
        let body: serde_json::Value = req.json().unwrap();
        assert_eq!(body["title"], "Dune");
    }
}
