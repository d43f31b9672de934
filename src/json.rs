//! JSON request decoding and response encoding
//!
//! Request bodies are read through a byte ceiling and must contain exactly one
//! JSON value. Unknown object keys are rejected unless
//! [`JsonOptions::allow_unknown_fields`] is set, independently of any serde
//! attributes on the target type.

use crate::metrics;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Body;
use hyper::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default ceiling for JSON request bodies (1 MiB).
pub const DEFAULT_MAX_JSON_BYTES: usize = 1024 * 1024;

const APPLICATION_JSON: &str = "application/json";

/// JSON errors
#[derive(Error, Debug)]
pub enum JsonError {
    #[error("Body must not be larger than {limit} bytes")]
    TooLarge { limit: usize },

    #[error("Body must not be empty")]
    Empty,

    #[error("Body contains badly-formed JSON (at line {line}, column {column})")]
    Syntax { line: usize, column: usize },

    #[error("Body contains badly-formed JSON (unexpected end of input)")]
    Truncated,

    #[error("Body contains incorrect JSON type: {0}")]
    InvalidType(String),

    #[error("Body contains unknown key {0}")]
    UnknownField(String),

    #[error("Body must contain only one JSON value")]
    MultipleValues,

    #[error("Failed to read body: {0}")]
    Body(String),

    #[error("Failed to encode JSON: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

impl JsonError {
    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            JsonError::TooLarge { .. } => "too_large",
            JsonError::Empty => "empty",
            JsonError::Syntax { .. } => "syntax",
            JsonError::Truncated => "truncated",
            JsonError::InvalidType(_) => "invalid_type",
            JsonError::UnknownField(_) => "unknown_field",
            JsonError::MultipleValues => "multiple_values",
            JsonError::Body(_) => "body",
            JsonError::Encode(_) => "encode",
            JsonError::Client(_) => "client",
        }
    }

    /// HTTP status a handler should answer with for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            JsonError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            JsonError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            JsonError::Client(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn from_decode(err: serde_json::Error) -> Self {
        use serde_json::error::Category;

        match err.classify() {
            Category::Syntax => JsonError::Syntax {
                line: err.line(),
                column: err.column(),
            },
            Category::Eof => JsonError::Truncated,
            Category::Data => JsonError::InvalidType(err.to_string()),
            Category::Io => JsonError::Body(err.to_string()),
        }
    }
}

/// Envelope used for JSON responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonResponse<T = serde_json::Value> {
    pub error: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> JsonResponse<T> {
    /// Successful response carrying `data`
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            error: false,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl JsonResponse {
    /// Error response without data
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: true,
            message: message.into(),
            data: None,
        }
    }
}

/// Options for [`read_json`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonOptions {
    pub max_bytes: usize,
    pub allow_unknown_fields: bool,
}

impl Default for JsonOptions {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_JSON_BYTES,
            allow_unknown_fields: false,
        }
    }
}

/// Decode the body of `req` as a single JSON value of type `T`.
pub async fn read_json<T, B>(req: Request<B>, options: &JsonOptions) -> Result<T, JsonError>
where
    T: DeserializeOwned,
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let result = read_json_inner(req, options).await;
    if let Err(ref e) = result {
        metrics::record_json_error(e.kind());
        tracing::debug!(error = %e, "Rejected JSON body");
    }
    result
}

async fn read_json_inner<T, B>(req: Request<B>, options: &JsonOptions) -> Result<T, JsonError>
where
    T: DeserializeOwned,
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let limited = Limited::new(req.into_body(), options.max_bytes);
    let body = match limited.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<http_body_util::LengthLimitError>() => {
            return Err(JsonError::TooLarge {
                limit: options.max_bytes,
            })
        }
        Err(e) => return Err(JsonError::Body(e.to_string())),
    };

    decode(&body, options.allow_unknown_fields)
}

/// Decode a complete JSON document from `body`.
pub fn decode<T: DeserializeOwned>(body: &[u8], allow_unknown_fields: bool) -> Result<T, JsonError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(JsonError::Empty);
    }

    let mut de = serde_json::Deserializer::from_slice(body);
    let mut unknown = Vec::new();
    let value: T = serde_ignored::deserialize(&mut de, |path| unknown.push(path.to_string()))
        .map_err(JsonError::from_decode)?;

    // Anything but whitespace after the first value
    de.end().map_err(|_| JsonError::MultipleValues)?;

    if !allow_unknown_fields {
        if let Some(field) = unknown.into_iter().next() {
            return Err(JsonError::UnknownField(format!("\"{}\"", field)));
        }
    }

    Ok(value)
}

/// Encode `data` as a JSON response with `status` and any `headers`.
pub fn write_json<T: Serialize>(
    status: StatusCode,
    data: &T,
    headers: Option<&HeaderMap>,
) -> Result<Response<Full<Bytes>>, JsonError> {
    let body = serde_json::to_vec(data)?;

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;

    let response_headers = response.headers_mut();
    if let Some(headers) = headers {
        for (name, value) in headers {
            response_headers.append(name, value.clone());
        }
    }
    response_headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));

    Ok(response)
}

/// Encode `err` as `{"error": true, "message": ...}`.
///
/// `status` defaults to `400 Bad Request`.
pub fn error_json(err: &dyn std::fmt::Display, status: Option<StatusCode>) -> Response<Full<Bytes>> {
    let status = status.unwrap_or(StatusCode::BAD_REQUEST);
    let payload = JsonResponse::failure(err.to_string());

    // A struct of a bool and a String always serializes
    let body = serde_json::to_vec(&payload).unwrap_or_default();

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    response
}

/// POST `data` as JSON to `uri` using `client`.
///
/// Returns the remote response together with its status code.
pub async fn push_json<T: Serialize + ?Sized>(
    client: &reqwest::Client,
    uri: &str,
    data: &T,
) -> Result<(reqwest::Response, StatusCode), JsonError> {
    let body = serde_json::to_vec(data)?;

    let response = client
        .post(uri)
        .header(CONTENT_TYPE.as_str(), APPLICATION_JSON)
        .body(body)
        .send()
        .await?;

    let status = response.status();

    tracing::debug!(uri, status = status.as_u16(), "Pushed JSON to remote");
    Ok((response, status))
}
