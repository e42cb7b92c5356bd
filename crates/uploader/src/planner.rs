//! Upload negotiation: one `POST /uploads` round trip.

use crate::api::ApiClient;
use crate::error::{PublishError, PublishResult};
use crate::retry::{RetryError, RetryPolicy};
use buildstash_core::{PendingUpload, UploadRequest};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Registers a build with the registry and returns its transfer plan.
#[derive(Clone, Debug)]
pub struct UploadPlanner {
    client: ApiClient,
    policy: RetryPolicy,
}

impl UploadPlanner {
    pub fn new(client: ApiClient, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Validate `request` and negotiate a [`PendingUpload`].
    ///
    /// Validation happens before the network call. Non-2xx responses,
    /// undecodable bodies and unusable plans are planning failures.
    #[instrument(skip_all, fields(
        primary = request.primary_file.as_ref().map(|f| f.filename.as_str()).unwrap_or_default(),
        structure = %request.structure,
    ))]
    pub async fn plan(
        &self,
        request: &UploadRequest,
        cancel: &CancellationToken,
    ) -> PublishResult<PendingUpload> {
        let payload = request
            .payload()
            .map_err(|e| PublishError::Validation(e.to_string()))?;

        let response = self
            .client
            .request_upload(&payload, self.policy, cancel)
            .await
            .map_err(|e| match e {
                RetryError::Cancelled => PublishError::Cancelled,
                RetryError::Exhausted { error, .. } => PublishError::Planning(error.to_string()),
            })?;

        if let Some(message) = response.message.as_deref() {
            tracing::debug!(message, "Upload request accepted");
        }

        let pending =
            PendingUpload::from_response(response, request.structure.requires_expansion())
                .map_err(|e| PublishError::Planning(e.to_string()))?;

        tracing::info!(
            pending_upload_id = %pending.id,
            primary_chunked = pending.primary.is_chunked(),
            has_expansion = pending.expansion.is_some(),
            "Upload planned"
        );
        Ok(pending)
    }
}
