//! Moving artifact bytes to presigned storage and finalizing the upload.

use crate::api::ApiClient;
use crate::error::{ApiError, PublishError, PublishResult};
use crate::retry::{Attempt, RetryError, RetryPolicy, retry};
use buildstash_core::upload::{
    CompleteUploadRequest, CompletedFile, CompletedPart, PartRange, PartUrlRequest,
    PresignedHeaders,
};
use buildstash_core::{BuildRecord, PendingUpload, TransferMode, UploadPlan};
use buildstash_storage::{ArtifactSource, StorageError};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Why a single PUT attempt failed.
#[derive(Debug, Error)]
enum AttemptFailure {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("reading artifact failed: {0}")]
    Storage(#[from] StorageError),
    #[error("storage response carried no ETag")]
    MissingEtag,
}

/// Uploads the files of a [`PendingUpload`] and finalizes it.
///
/// Parts of one file upload concurrently, and the primary and expansion
/// files upload concurrently with each other; a shared semaphore caps the
/// total number of PUTs in flight.
#[derive(Clone, Debug)]
pub struct TransferOrchestrator {
    client: ApiClient,
    policy: RetryPolicy,
    max_parallel_parts: usize,
    permits: Arc<Semaphore>,
}

impl TransferOrchestrator {
    pub fn new(client: ApiClient, policy: RetryPolicy, max_parallel_parts: usize) -> Self {
        let max_parallel_parts = max_parallel_parts.max(1);
        Self {
            client,
            policy,
            max_parallel_parts,
            permits: Arc::new(Semaphore::new(max_parallel_parts)),
        }
    }

    /// Transfer every planned file and assemble the completion body.
    ///
    /// Fails on the first file that exhausts its retry budget; outstanding
    /// parts of both files are dropped.
    pub async fn transfer(
        &self,
        pending: &PendingUpload,
        primary: &dyn ArtifactSource,
        expansion: Option<&dyn ArtifactSource>,
        cancel: &CancellationToken,
    ) -> PublishResult<CompleteUploadRequest> {
        let expansion_job = async {
            match (&pending.expansion, expansion) {
                (Some(plan), Some(source)) => {
                    self.transfer_file(&pending.id, plan, source, cancel).await
                }
                (Some(plan), None) => Err(PublishError::Validation(format!(
                    "no source supplied for expansion file {}",
                    plan.filename
                ))),
                (None, _) => Ok(None),
            }
        };

        let (primary, expansion) = futures::try_join!(
            self.transfer_file(&pending.id, &pending.primary, primary, cancel),
            expansion_job,
        )?;

        Ok(CompleteUploadRequest {
            primary_file: primary,
            expansion_files: expansion.into_iter().collect(),
        })
    }

    /// Transfer one file. Chunked files yield their ordered part list.
    #[instrument(skip_all, fields(pending_upload_id = %pending_id, filename = %plan.filename))]
    pub async fn transfer_file(
        &self,
        pending_id: &str,
        plan: &UploadPlan,
        source: &dyn ArtifactSource,
        cancel: &CancellationToken,
    ) -> PublishResult<Option<CompletedFile>> {
        if cancel.is_cancelled() {
            return Err(PublishError::Cancelled);
        }
        let size = source
            .size()
            .await
            .map_err(|e| PublishError::Validation(format!("{}: {e}", source.name())))?;

        match &plan.mode {
            TransferMode::Direct { url, headers } => {
                self.put_direct(&plan.filename, url, headers, source, size, cancel)
                    .await?;
                tracing::info!(size, "Direct upload complete");
                Ok(None)
            }
            TransferMode::Chunked { .. } => {
                let ranges = plan.part_ranges(size)?;
                let parts = self
                    .put_parts(pending_id, &plan.filename, ranges, source, cancel)
                    .await?;
                tracing::info!(size, parts = parts.len(), "Chunked upload complete");
                Ok(Some(CompletedFile {
                    filename: plan.filename.clone(),
                    parts,
                }))
            }
        }
    }

    /// One PUT of the whole file, streamed from the source. Retried against
    /// the same URL on transient failures.
    async fn put_direct(
        &self,
        filename: &str,
        url: &str,
        headers: &PresignedHeaders,
        source: &dyn ArtifactSource,
        size: u64,
        cancel: &CancellationToken,
    ) -> PublishResult<()> {
        let _permit = self.acquire(cancel).await?;

        retry(self.policy, cancel, |_| async move {
            let stream = source
                .stream()
                .await
                .map_err(|e| Attempt::Abort(AttemptFailure::from(e)))?;
            self.client
                .put_presigned(url, headers, reqwest::Body::wrap_stream(stream), size)
                .await
                .map_err(|e| {
                    if e.is_transient() {
                        Attempt::Retry(AttemptFailure::from(e))
                    } else {
                        Attempt::Abort(AttemptFailure::from(e))
                    }
                })?;
            Ok::<_, Attempt<AttemptFailure>>(())
        })
        .await
        .map_err(|e| transfer_error(filename, None, e))
    }

    /// Upload every part with bounded concurrency. Each result lands in the
    /// slot for its part number, so the returned list is ascending.
    async fn put_parts(
        &self,
        pending_id: &str,
        filename: &str,
        ranges: Vec<PartRange>,
        source: &dyn ArtifactSource,
        cancel: &CancellationToken,
    ) -> PublishResult<Vec<CompletedPart>> {
        let mut etags: Vec<Option<String>> = vec![None; ranges.len()];
        let mut in_flight = FuturesUnordered::new();

        for range in ranges {
            if cancel.is_cancelled() {
                return Err(PublishError::Cancelled);
            }
            in_flight.push(self.put_part(pending_id, filename, range, source, cancel));

            if in_flight.len() >= self.max_parallel_parts
                && let Some(result) = in_flight.next().await
            {
                let (part_number, etag) = result?;
                store_etag(&mut etags, part_number, etag);
            }
        }

        while let Some(result) = in_flight.next().await {
            let (part_number, etag) = result?;
            store_etag(&mut etags, part_number, etag);
        }

        etags
            .into_iter()
            .zip(1u32..)
            .map(|(etag, part_number)| {
                etag.map(|etag| CompletedPart { part_number, etag })
                    .ok_or_else(|| PublishError::Transfer {
                        filename: filename.to_string(),
                        part_number: Some(part_number),
                        attempts: 0,
                        message: "part was never uploaded".to_string(),
                    })
            })
            .collect()
    }

    /// Presign and PUT one part. Every attempt asks for a fresh URL and
    /// streams the part's range from the source again.
    async fn put_part(
        &self,
        pending_id: &str,
        filename: &str,
        range: PartRange,
        source: &dyn ArtifactSource,
        cancel: &CancellationToken,
    ) -> PublishResult<(u32, String)> {
        let _permit = self.acquire(cancel).await?;
        let part_number = range.part_number;

        let request = PartUrlRequest {
            filename,
            part_number,
            content_length: range.length,
        };
        let no_headers = PresignedHeaders::new();

        let etag = retry(self.policy, cancel, |attempt| {
            let request = &request;
            let no_headers = &no_headers;
            async move {
                let part = self
                    .client
                    .request_part_url(pending_id, request)
                    .await
                    .map_err(part_attempt_failure)?;
                let body = source
                    .stream_range(range.offset, range.length)
                    .await
                    .map_err(|e| Attempt::Abort(AttemptFailure::from(e)))?;
                let etag = self
                    .client
                    .put_presigned(
                        &part.part_presigned_url,
                        no_headers,
                        reqwest::Body::wrap_stream(body),
                        range.length,
                    )
                    .await
                    .map_err(part_attempt_failure)?;
                tracing::debug!(part_number, attempt, "Part uploaded");
                etag.filter(|e| !e.trim().is_empty())
                    .ok_or(Attempt::Retry(AttemptFailure::MissingEtag))
            }
        })
        .await
        .map_err(|e| transfer_error(filename, Some(part_number), e))?;

        Ok((part_number, etag))
    }

    /// Call the completion endpoint once every file is transferred. The call
    /// is never repeated.
    #[instrument(skip_all, fields(pending_upload_id = %pending_id))]
    pub async fn finalize(
        &self,
        pending_id: &str,
        completion: &CompleteUploadRequest,
        cancel: &CancellationToken,
    ) -> PublishResult<BuildRecord> {
        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(PublishError::Cancelled),
            result = self.client.complete_upload(pending_id, completion) => result,
        };
        let record = result.map_err(|e| PublishError::Finalize {
            pending_upload_id: pending_id.to_string(),
            message: e.to_string(),
        })?;

        tracing::info!(
            build_id = %record.build_id,
            pending_processing = record.pending_processing,
            "Upload finalized"
        );
        Ok(record)
    }

    async fn acquire(
        &self,
        cancel: &CancellationToken,
    ) -> PublishResult<tokio::sync::SemaphorePermit<'_>> {
        tokio::select! {
            _ = cancel.cancelled() => Err(PublishError::Cancelled),
            permit = self.permits.acquire() => permit.map_err(|_| PublishError::Cancelled),
        }
    }
}

/// A fresh URL is requested per attempt, so any API failure is worth
/// another try except a URL we cannot even parse.
fn part_attempt_failure(err: ApiError) -> Attempt<AttemptFailure> {
    match err {
        ApiError::Url(_) => Attempt::Abort(err.into()),
        other => Attempt::Retry(other.into()),
    }
}

fn store_etag(etags: &mut [Option<String>], part_number: u32, etag: String) {
    if let Some(slot) = etags.get_mut((part_number as usize).wrapping_sub(1)) {
        *slot = Some(etag);
    }
}

fn transfer_error(
    filename: &str,
    part_number: Option<u32>,
    err: RetryError<AttemptFailure>,
) -> PublishError {
    match err {
        RetryError::Cancelled => PublishError::Cancelled,
        RetryError::Exhausted { error, attempts } => PublishError::Transfer {
            filename: filename.to_string(),
            part_number,
            attempts,
            message: error.to_string(),
        },
    }
}
