//! Request descriptors and responses
//!
//! A [`RequestDescriptor`] is a plain, cloneable description of a request.
//! It is turned into a fresh `reqwest` request for every send attempt, which
//! is what lets a multipart upload be replayed after a token refresh: the
//! `reqwest::multipart::Form` consumed by the first attempt is rebuilt from
//! the same parts instead of being reused.

use super::error::ClientError;
use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Body of an outgoing request
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    /// No body
    #[default]
    Empty,
    /// JSON document
    Json(serde_json::Value),
    /// Plain text
    Text(String),
    /// Raw bytes
    Bytes(Bytes),
    /// URL-encoded form
    Form(Vec<(String, String)>),
    /// Multipart form, rebuilt on every send
    Multipart(MultipartForm),
}

impl RequestBody {
    /// Whether this body is a multipart form
    pub const fn is_multipart(&self) -> bool {
        matches!(self, Self::Multipart(_))
    }
}

/// Value of one multipart field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartValue {
    /// Text field
    Text(String),
    /// File upload
    File {
        file_name: String,
        mime: Option<String>,
        bytes: Bytes,
    },
}

/// One named multipart field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormPart {
    pub name: String,
    pub value: PartValue,
}

/// Re-buildable description of a multipart body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartForm {
    parts: Vec<FormPart>,
}

impl MultipartForm {
    /// Create an empty form
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text field
    #[must_use]
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            value: PartValue::Text(value.into()),
        });
        self
    }

    /// Add a file field
    #[must_use]
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            value: PartValue::File {
                file_name: file_name.into(),
                mime: None,
                bytes: bytes.into(),
            },
        });
        self
    }

    /// Add a file field with an explicit MIME type
    #[must_use]
    pub fn file_with_mime(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            value: PartValue::File {
                file_name: file_name.into(),
                mime: Some(mime.into()),
                bytes: bytes.into(),
            },
        });
        self
    }

    /// Fields in insertion order
    pub fn parts(&self) -> &[FormPart] {
        &self.parts
    }

    /// Field names in insertion order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|p| p.name.as_str())
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Whether the form has no fields
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Build a fresh single-use `reqwest` form with the same fields
    ///
    /// # Errors
    ///
    /// Returns an error if a file part carries an unparsable MIME type
    pub fn build(&self) -> Result<reqwest::multipart::Form, ClientError> {
        let mut form = reqwest::multipart::Form::new();
        for part in &self.parts {
            form = match &part.value {
                PartValue::Text(value) => form.text(part.name.clone(), value.clone()),
                PartValue::File {
                    file_name,
                    mime,
                    bytes,
                } => {
                    // shares the buffer instead of copying it for every attempt
                    let mut file = reqwest::multipart::Part::stream_with_length(
                        bytes.clone(),
                        bytes.len() as u64,
                    )
                    .file_name(file_name.clone());
                    if let Some(mime) = mime {
                        file = file.mime_str(mime)?;
                    }
                    form.part(part.name.clone(), file)
                }
            };
        }
        Ok(form)
    }
}

/// Description of one request, relative to a client's base URL
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    path: String,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    body: RequestBody,
    timeout: Option<Duration>,
    retry: u8,
}

impl RequestDescriptor {
    /// Create a descriptor for `method` on `path`
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: RequestBody::Empty,
            timeout: None,
            retry: 0,
        }
    }

    /// GET `path`
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// POST `path`
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// PUT `path`
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// PATCH `path`
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// DELETE `path`
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Add a query parameter
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set the body
    #[must_use]
    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Set a JSON body
    ///
    /// # Errors
    ///
    /// Returns an error if `body` cannot be serialized
    pub fn json<T: Serialize + ?Sized>(self, body: &T) -> Result<Self, ClientError> {
        Ok(self.body(RequestBody::Json(serde_json::to_value(body)?)))
    }

    /// Set a multipart body
    #[must_use]
    pub fn multipart(self, form: MultipartForm) -> Self {
        self.body(RequestBody::Multipart(form))
    }

    /// Override the client's timeout for this request
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// HTTP method
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Path relative to the base URL
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Request body
    pub const fn request_body(&self) -> &RequestBody {
        &self.body
    }

    /// How many times this request has already been replayed
    pub const fn retry(&self) -> u8 {
        self.retry
    }

    /// Whether this descriptor is a replay after a refresh
    pub const fn is_replay(&self) -> bool {
        self.retry > 0
    }

    /// Descriptor for the next attempt of this request
    pub(crate) fn replayed(&self) -> Self {
        Self {
            retry: self.retry.saturating_add(1),
            ..self.clone()
        }
    }

    /// Build a fresh `reqwest` request for one send attempt
    pub(crate) fn build(
        &self,
        client: &reqwest::Client,
        base_url: &str,
        token: Option<&str>,
    ) -> Result<reqwest::RequestBuilder, ClientError> {
        let url = format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        );

        let mut headers = self.headers.clone();
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                ClientError::Configuration("access token is not a valid header value".into())
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let mut request = client.request(self.method.clone(), url).headers(headers);

        if !self.query.is_empty() {
            request = request.query(&self.query);
        }

        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        request = match &self.body {
            RequestBody::Empty => request,
            RequestBody::Json(value) => request.json(value),
            RequestBody::Text(text) => request.body(text.clone()),
            RequestBody::Bytes(bytes) => request.body(bytes.clone()),
            RequestBody::Form(fields) => request.form(fields),
            RequestBody::Multipart(form) => request.multipart(form.build()?),
        };

        Ok(request)
    }
}

/// Successful response with its body fully read
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl ApiResponse {
    pub(crate) async fn read(response: reqwest::Response) -> Result<Self, ClientError> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok(Self {
            status,
            headers,
            body,
        })
    }

    /// Status code
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Raw body
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as text, replacing invalid UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON; an empty body decodes as `null`
    ///
    /// # Errors
    ///
    /// Returns an error if the body does not match `T`
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        if self.body.is_empty() {
            return Ok(serde_json::from_slice(b"null")?);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }
}
