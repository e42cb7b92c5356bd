//! The publication pipeline: describe files, resolve provenance, plan,
//! transfer, finalize.

use crate::api::ApiClient;
use crate::error::{PublishError, PublishResult};
use crate::planner::UploadPlanner;
use crate::retry::RetryPolicy;
use crate::transfer::TransferOrchestrator;
use buildstash_core::{AppConfig, BuildRecord, FileDescriptor, UploadRequest};
use buildstash_metadata::{DetectionContext, Resolver};
use buildstash_storage::ArtifactSource;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The files taking part in one publication.
#[derive(Clone)]
pub struct Artifacts {
    pub primary: Arc<dyn ArtifactSource>,
    pub expansion: Option<Arc<dyn ArtifactSource>>,
}

impl Artifacts {
    pub fn new(primary: Arc<dyn ArtifactSource>) -> Self {
        Self {
            primary,
            expansion: None,
        }
    }

    pub fn with_expansion(mut self, expansion: Arc<dyn ArtifactSource>) -> Self {
        self.expansion = Some(expansion);
        self
    }
}

/// Publishes builds to the registry.
#[derive(Debug)]
pub struct Publisher {
    planner: UploadPlanner,
    orchestrator: TransferOrchestrator,
    resolver: Resolver,
    publish_timeout: Option<Duration>,
}

impl Publisher {
    /// Build a publisher from configuration. Fails if the configuration is
    /// invalid or no API key is set.
    pub fn new(config: &AppConfig) -> PublishResult<Self> {
        config.validate().map_err(PublishError::Validation)?;
        let api_key = config
            .api
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| PublishError::Validation("API key is required".to_string()))?;

        let client = ApiClient::new(&config.api, api_key)
            .map_err(|e| PublishError::Validation(e.to_string()))?;
        let policy = RetryPolicy::from(&config.transfer);

        Ok(Self {
            planner: UploadPlanner::new(client.clone(), policy),
            orchestrator: TransferOrchestrator::new(
                client,
                policy,
                config.transfer.max_parallel_parts,
            ),
            resolver: Resolver::default(),
            publish_timeout: config.transfer.publish_timeout(),
        })
    }

    /// Replace the default detector chain.
    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Fill in file descriptors and VC provenance without any network call.
    ///
    /// Caller-supplied provenance fields are kept; detectors only fill gaps.
    pub async fn prepare(
        &self,
        mut request: UploadRequest,
        artifacts: &Artifacts,
        ctx: &DetectionContext,
    ) -> PublishResult<UploadRequest> {
        request.primary_file = Some(describe(artifacts.primary.as_ref(), "primary").await?);

        request.expansion_file = match (&artifacts.expansion, request.structure.requires_expansion()) {
            (Some(source), true) => Some(describe(source.as_ref(), "expansion").await?),
            (None, true) => {
                return Err(PublishError::Validation(
                    "expansion file is required for file+expansion uploads".to_string(),
                ));
            }
            (Some(source), false) => {
                tracing::debug!(
                    filename = source.name(),
                    "Ignoring expansion file for single-file upload"
                );
                None
            }
            (None, false) => None,
        };

        let vc = std::mem::take(&mut request.vc);
        let request = request.with_vc(self.resolver.resolve(ctx, vc));
        request
            .validate()
            .map_err(|e| PublishError::Validation(e.to_string()))?;
        Ok(request)
    }

    /// Publish `request` with the given files.
    ///
    /// Cancelling `cancel`, or exceeding the configured publish timeout,
    /// abandons outstanding parts and never finalizes.
    pub async fn publish(
        &self,
        request: UploadRequest,
        artifacts: &Artifacts,
        ctx: &DetectionContext,
        cancel: &CancellationToken,
    ) -> PublishResult<BuildRecord> {
        if cancel.is_cancelled() {
            return Err(PublishError::Cancelled);
        }
        let request = self.prepare(request, artifacts, ctx).await?;

        let run = async {
            tokio::select! {
                _ = cancel.cancelled() => Err(PublishError::Cancelled),
                result = self.run(&request, artifacts, cancel) => result,
            }
        };

        match self.publish_timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| PublishError::TimedOut(limit))?,
            None => run.await,
        }
    }

    async fn run(
        &self,
        request: &UploadRequest,
        artifacts: &Artifacts,
        cancel: &CancellationToken,
    ) -> PublishResult<BuildRecord> {
        let pending = self.planner.plan(request, cancel).await?;

        let expansion = match (&pending.expansion, &artifacts.expansion) {
            (Some(_), Some(source)) => Some(source.as_ref()),
            _ => None,
        };
        let completion = self
            .orchestrator
            .transfer(&pending, artifacts.primary.as_ref(), expansion, cancel)
            .await?;

        self.orchestrator
            .finalize(&pending.id, &completion, cancel)
            .await
    }
}

/// Name and size of a source that must exist.
async fn describe(source: &dyn ArtifactSource, role: &str) -> PublishResult<FileDescriptor> {
    let exists = source
        .exists()
        .await
        .map_err(|e| PublishError::Validation(format!("{role} file {}: {e}", source.name())))?;
    if !exists {
        return Err(PublishError::Validation(format!(
            "{role} file not found: {}",
            source.name()
        )));
    }
    let size = source
        .size()
        .await
        .map_err(|e| PublishError::Validation(format!("{role} file {}: {e}", source.name())))?;
    FileDescriptor::new(source.name(), size).map_err(PublishError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildstash_core::{Structure, Version};
    use buildstash_storage::MemoryArtifact;
    use std::collections::BTreeMap;

    fn publisher() -> Publisher {
        Publisher::new(&AppConfig::for_testing("http://127.0.0.1:9")).unwrap()
    }

    fn request() -> UploadRequest {
        UploadRequest {
            version: Version::new("1", "2", "3"),
            platform: "android".to_string(),
            stream: "beta".to_string(),
            ..Default::default()
        }
    }

    fn empty_ctx() -> DetectionContext {
        DetectionContext::new(None, BTreeMap::new())
    }

    #[test]
    fn api_key_is_required() {
        let mut config = AppConfig::for_testing("http://127.0.0.1:9");
        config.api.api_key = Some("  ".to_string());
        let err = Publisher::new(&config).unwrap_err();
        assert_eq!(err.to_string(), "validation failed: API key is required");
    }

    #[tokio::test]
    async fn prepare_describes_files() {
        let artifacts = Artifacts::new(Arc::new(MemoryArtifact::new("app.bin", vec![0u8; 64])));
        let prepared = publisher()
            .prepare(request(), &artifacts, &empty_ctx())
            .await
            .unwrap();
        let primary = prepared.primary_file.unwrap();
        assert_eq!(primary.filename, "app.bin");
        assert_eq!(primary.size, 64);
        assert!(prepared.expansion_file.is_none());
    }

    #[tokio::test]
    async fn missing_primary_file_is_a_validation_error() {
        let artifacts = Artifacts::new(Arc::new(MemoryArtifact::missing("app.bin")));
        let err = publisher()
            .prepare(request(), &artifacts, &empty_ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Validation(ref m) if m.contains("not found")));
    }

    #[tokio::test]
    async fn expansion_structure_needs_expansion_source() {
        let mut request = request();
        request.structure = Structure::FileExpansion;
        let artifacts = Artifacts::new(Arc::new(MemoryArtifact::new("app.apk", vec![1u8; 8])));
        let err = publisher()
            .prepare(request, &artifacts, &empty_ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Validation(_)));
    }

    #[tokio::test]
    async fn prepare_resolves_provenance() {
        let ctx = DetectionContext::new(
            None,
            BTreeMap::from([
                (
                    "GIT_URL".to_string(),
                    "https://github.com/acme/widget.git".to_string(),
                ),
                ("GIT_COMMIT".to_string(), "deadbeef".to_string()),
            ]),
        );
        let artifacts = Artifacts::new(Arc::new(MemoryArtifact::new("app.bin", vec![0u8; 4])));
        let prepared = publisher()
            .prepare(request(), &artifacts, &ctx)
            .await
            .unwrap();
        assert_eq!(prepared.vc.host.as_deref(), Some("github"));
        assert_eq!(
            prepared.vc.commit_url.as_deref(),
            Some("https://github.com/acme/widget/commit/deadbeef")
        );
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let artifacts = Artifacts::new(Arc::new(MemoryArtifact::new("app.bin", vec![0u8; 4])));
        let err = publisher()
            .publish(request(), &artifacts, &empty_ctx(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Cancelled));
    }
}
