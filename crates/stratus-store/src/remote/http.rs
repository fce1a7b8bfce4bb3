use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, StatusCode};

use super::{BlobError, BlobStore, ByteRange};

/// Blob store behind an S3-style HTTP endpoint.
///
/// Blobs live at `{endpoint}/{bucket}/{key}` and are reached with plain
/// `HEAD`, `GET` (optionally with a `Range` header) and `PUT`.
#[derive(Clone, Debug)]
pub struct HttpBlobStore {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpBlobStore {
    pub fn new(endpoint: &str, token: Option<String>, timeout: Duration) -> Result<Self, BlobError> {
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(BlobError::Configuration(format!(
                "endpoint must be an http(s) URL: {endpoint}"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BlobError::Configuration(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, bucket, key)
    }

    fn request(&self, method: reqwest::Method, bucket: &str, key: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.url(bucket, key));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

/// Classify a non-success HTTP status.
fn status_error(status: StatusCode, bucket: &str, key: &str) -> BlobError {
    match status {
        StatusCode::NOT_FOUND => BlobError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            BlobError::Configuration(format!("HTTP {status} for {bucket}/{key}"))
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            BlobError::Transient(format!("HTTP {status}"))
        }
        s if s.is_server_error() => BlobError::Transient(format!("HTTP {status}")),
        _ => BlobError::Permanent(format!("HTTP {status} for {bucket}/{key}")),
    }
}

fn request_error(err: reqwest::Error) -> BlobError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        BlobError::Transient(err.to_string())
    } else {
        BlobError::Permanent(err.to_string())
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn head(&self, bucket: &str, key: &str) -> Result<bool, BlobError> {
        let resp = self
            .request(reqwest::Method::HEAD, bucket, key)
            .send()
            .await
            .map_err(request_error)?;
        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(status_error(s, bucket, key)),
        }
    }

    async fn get(&self, bucket: &str, key: &str, range: Option<ByteRange>) -> Result<Bytes, BlobError> {
        let mut req = self.request(reqwest::Method::GET, bucket, key);
        if let Some(range) = range {
            req = req.header(header::RANGE, range.to_header_value());
        }
        let resp = req.send().await.map_err(request_error)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(status_error(status, bucket, key));
        }
        let body = resp.bytes().await.map_err(request_error)?;
        // A server that ignores Range answers 200 with the whole blob.
        match range {
            Some(range) if status != StatusCode::PARTIAL_CONTENT => Ok(range.apply(&body)),
            _ => Ok(body),
        }
    }

    async fn put(&self, bucket: &str, key: &str, body: Bytes) -> Result<(), BlobError> {
        let resp = self
            .request(reqwest::Method::PUT, bucket, key)
            .body(body)
            .send()
            .await
            .map_err(request_error)?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(status_error(status, bucket, key))
        }
    }
}
