//! Registry API client.

use crate::error::ApiError;
use crate::retry::{Attempt, RetryError, RetryPolicy, retry};
use buildstash_core::config::ApiConfig;
use buildstash_core::upload::{
    CompleteUploadRequest, PartUrlRequest, PartUrlResponse, PresignedHeaders, UploadRequestResponse,
};
use buildstash_core::BuildRecord;
use reqwest::Url;
use reqwest::header::{CONTENT_LENGTH, ETAG, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

/// Bearer-authenticated client for the registry's JSON endpoints, plus
/// unauthenticated PUTs to presigned storage URLs.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(config: &ApiConfig, api_key: &str) -> Result<Self, ApiError> {
        // Endpoint paths are joined relative to the base, so it must end in '/'.
        let base = format!("{}/", config.base_url.trim().trim_end_matches('/'));
        let base_url = Url::parse(&base).map_err(|e| ApiError::Url(format!("{base}: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            http,
            base_url,
            api_key: api_key.to_string(),
        })
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::Url(format!("{path}: {e}")))
    }

    /// POST `body` as JSON and decode the JSON response.
    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path)?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ApiError::Status { status, body });
        }
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// [`post_json`](Self::post_json) retried on transport errors and 5xx.
    async fn post_json_with_retry<B, T>(
        &self,
        path: &str,
        body: &B,
        policy: RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<T, RetryError<ApiError>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        retry(policy, cancel, |_| async move {
            self.post_json(path, body).await.map_err(|e| {
                if e.is_transient() {
                    Attempt::Retry(e)
                } else {
                    Attempt::Abort(e)
                }
            })
        })
        .await
    }

    /// `POST /uploads`: register the build and receive a transfer plan.
    pub async fn request_upload<B: Serialize + ?Sized>(
        &self,
        payload: &B,
        policy: RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<UploadRequestResponse, RetryError<ApiError>> {
        self.post_json_with_retry("uploads", payload, policy, cancel)
            .await
    }

    /// `POST /uploads/{id}/parts`: a fresh presigned URL for one part.
    ///
    /// Not retried here; the caller retries the whole part.
    pub async fn request_part_url(
        &self,
        pending_upload_id: &str,
        request: &PartUrlRequest<'_>,
    ) -> Result<PartUrlResponse, ApiError> {
        self.post_json(&format!("uploads/{pending_upload_id}/parts"), request)
            .await
    }

    /// `POST /uploads/{id}/complete`: finalize the pending upload.
    ///
    /// Single shot. A lost response may still have committed the build.
    pub async fn complete_upload(
        &self,
        pending_upload_id: &str,
        request: &CompleteUploadRequest,
    ) -> Result<BuildRecord, ApiError> {
        self.post_json(&format!("uploads/{pending_upload_id}/complete"), request)
            .await
    }

    /// PUT `body` to a presigned URL with exactly the supplied headers.
    /// Returns the response's `ETag`, if any.
    pub async fn put_presigned(
        &self,
        url: &str,
        headers: &PresignedHeaders,
        body: reqwest::Body,
        content_length: u64,
    ) -> Result<Option<String>, ApiError> {
        let url = Url::parse(url).map_err(|e| ApiError::Url(format!("presigned URL: {e}")))?;

        let mut header_map = HeaderMap::with_capacity(headers.len() + 1);
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ApiError::Url(format!("invalid header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ApiError::Url(format!("invalid value for header {name}: {e}")))?;
            header_map.insert(name, value);
        }
        if !header_map.contains_key(CONTENT_LENGTH) {
            header_map.insert(CONTENT_LENGTH, HeaderValue::from(content_length));
        }

        let response = self
            .http
            .put(url)
            .headers(header_map)
            .body(body)
            .send()
            .await?;
        let status = response.status();
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { status, body });
        }
        Ok(etag)
    }
}
