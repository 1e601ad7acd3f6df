// HTTP request and response types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// HTTP methods a route can be registered for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
}

impl HttpMethod {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(HttpMethod::GET),
            "POST" => Some(HttpMethod::POST),
            "PUT" => Some(HttpMethod::PUT),
            "DELETE" => Some(HttpMethod::DELETE),
            "PATCH" => Some(HttpMethod::PATCH),
            "HEAD" => Some(HttpMethod::HEAD),
            "OPTIONS" => Some(HttpMethod::OPTIONS),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::OPTIONS => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP request wrapper
///
/// Header names are stored lowercased; lookups through [`HttpRequest::header`]
/// are case-insensitive.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub path_params: HashMap<String, String>,
    pub query_params: HashMap<String, String>,
    parsed_body: OnceLock<Option<Value>>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: HashMap::new(),
            body: Vec::new(),
            path_params: HashMap::new(),
            query_params: HashMap::new(),
            parsed_body: OnceLock::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self.parsed_body = OnceLock::new();
        self
    }

    /// Set a JSON body and the matching content type.
    pub fn with_json<T: Serialize>(self, value: &T) -> Result<Self, crate::Error> {
        let body =
            serde_json::to_vec(value).map_err(|e| crate::Error::Serialization(e.to_string()))?;
        Ok(self
            .with_header("content-type", "application/json")
            .with_body(body))
    }

    /// Parse the request body as JSON
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, crate::Error> {
        serde_json::from_slice(&self.body).map_err(|e| crate::Error::Deserialization(e.to_string()))
    }

    /// Get a path parameter by name
    pub fn param(&self, name: &str) -> Option<&String> {
        self.path_params.get(name)
    }

    /// Get a query parameter by name
    pub fn query(&self, name: &str) -> Option<&String> {
        self.query_params.get(name)
    }

    /// Get a header by name, ignoring case
    pub fn header(&self, name: &str) -> Option<&String> {
        self.headers.get(&name.to_ascii_lowercase())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
            .map(|v| v.split(';').next().unwrap_or_default().trim())
    }

    /// The parsed body, decoded once per request.
    ///
    /// Form-encoded bodies become a flat object of strings; anything else is
    /// read as JSON. An empty or undecodable body yields `None`.
    pub fn body_value(&self) -> Option<&Value> {
        self.parsed_body
            .get_or_init(|| {
                if self.body.is_empty() {
                    return None;
                }
                if self.content_type() == Some("application/x-www-form-urlencoded") {
                    let pairs: Vec<(String, String)> =
                        serde_urlencoded::from_bytes(&self.body).ok()?;
                    let map = pairs
                        .into_iter()
                        .map(|(k, v)| (k, Value::String(v)))
                        .collect();
                    return Some(Value::Object(map));
                }
                serde_json::from_slice(&self.body).ok()
            })
            .as_ref()
    }

    /// Look up one top-level field of the parsed body.
    pub fn body_field(&self, name: &str) -> Option<&Value> {
        match self.body_value()? {
            Value::Object(map) => map.get(name),
            _ => None,
        }
    }
}

/// HTTP response wrapper
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn not_found() -> Self {
        Self::new(404)
    }

    pub fn internal_server_error() -> Self {
        Self::new(500)
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, crate::Error> {
        self.body =
            serde_json::to_vec(value).map_err(|e| crate::Error::Serialization(e.to_string()))?;
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(self)
    }

    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// Body as UTF-8 text, lossy.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body decoded as JSON
    pub fn json_body(&self) -> Result<Value, crate::Error> {
        serde_json::from_slice(&self.body).map_err(|e| crate::Error::Deserialization(e.to_string()))
    }
}

/// JSON response helper
#[derive(Debug)]
pub struct Json<T: Serialize>(pub T);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_parsing() {
        assert_eq!(HttpMethod::from_str("get"), Some(HttpMethod::GET));
        assert_eq!(HttpMethod::from_str("Patch"), Some(HttpMethod::PATCH));
        assert_eq!(HttpMethod::from_str("TRACE"), None);
        assert_eq!(HttpMethod::DELETE.to_string(), "DELETE");
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let req = HttpRequest::new("GET", "/").with_header("X-Token", "abc");
        assert_eq!(req.header("x-token").map(String::as_str), Some("abc"));
        assert_eq!(req.header("X-TOKEN").map(String::as_str), Some("abc"));
    }

    #[test]
    fn test_json_body_field() {
        let req = HttpRequest::new("POST", "/items")
            .with_json(&json!({"name": "widget", "count": 0}))
            .unwrap();
        assert_eq!(req.body_field("name"), Some(&json!("widget")));
        assert_eq!(req.body_field("count"), Some(&json!(0)));
        assert_eq!(req.body_field("missing"), None);
    }

    #[test]
    fn test_form_body_field() {
        let req = HttpRequest::new("POST", "/login")
            .with_header("Content-Type", "application/x-www-form-urlencoded; charset=utf-8")
            .with_body(b"user=ada&note=hello%20world".to_vec());
        assert_eq!(req.body_field("user"), Some(&json!("ada")));
        assert_eq!(req.body_field("note"), Some(&json!("hello world")));
    }

    #[test]
    fn test_non_object_body_has_no_fields() {
        let req = HttpRequest::new("POST", "/").with_body(b"[1,2,3]".to_vec());
        assert!(req.body_value().is_some());
        assert_eq!(req.body_field("0"), None);

        let empty = HttpRequest::new("POST", "/");
        assert!(empty.body_value().is_none());
    }

    #[test]
    fn test_response_json() {
        let res = HttpResponse::ok().with_json(&json!({"id": 1})).unwrap();
        assert_eq!(res.status, 200);
        assert_eq!(
            res.headers.get("Content-Type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(res.json_body().unwrap(), json!({"id": 1}));
    }
}
