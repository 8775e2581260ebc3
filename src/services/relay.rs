use crate::models::{ConversionJob, ConversionKind, RelayStage, RelayStep, StagedFile};
use crate::services::error::RelayError;
use crate::services::remote::ConversionClient;
use crate::services::staging::{DeferredDeletion, StagingStore};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// A relay that stopped early, with the step it was attempting.
#[derive(Error, Debug)]
#[error("{step} step failed: {error}")]
pub struct RelayFailure {
    pub step: RelayStep,
    #[source]
    pub error: RelayError,
}

impl RelayFailure {
    pub fn new(step: RelayStep, error: RelayError) -> Self {
        Self { step, error }
    }
}

/// A converted document sitting in the staging area, ready to stream.
///
/// Holds the deletion guard for both staged files; dropping it (normally when
/// the response body finishes) starts their deletion countdown.
#[derive(Debug)]
pub struct ConvertedFile {
    pub staged: StagedFile,
    pub filename: String,
    pub content_type: &'static str,
    pub job: ConversionJob,
    pub cleanup: DeferredDeletion,
}

/// Runs upload -> convert -> fetch for one staged upload.
///
/// The three remote calls are strictly sequential with no retries; the first
/// failure ends the relay. Both staged files are queued for deferred deletion
/// whichever way the relay ends, including when the request is abandoned.
pub struct ConversionRelay {
    staging: Arc<StagingStore>,
    client: Arc<dyn ConversionClient>,
    deletion_delay: Duration,
}

impl ConversionRelay {
    pub fn new(
        staging: Arc<StagingStore>,
        client: Arc<dyn ConversionClient>,
        deletion_delay: Duration,
    ) -> Self {
        Self {
            staging,
            client,
            deletion_delay,
        }
    }

    pub async fn run(
        &self,
        kind: ConversionKind,
        source: StagedFile,
    ) -> Result<ConvertedFile, RelayFailure> {
        let mut job = ConversionJob::new(kind, source.path.clone());
        job.advance(RelayStage::Staged);

        let output_path = self.staging.result_path(kind.output_extension());
        let cleanup = self.staging.defer_deletion(
            vec![source.path.clone(), output_path.clone()],
            self.deletion_delay,
        );

        match self.drive(&mut job, &output_path).await {
            Ok(staged) => Ok(ConvertedFile {
                staged,
                filename: kind.output_filename(),
                content_type: kind.output_content_type(),
                job,
                cleanup,
            }),
            Err(failure) => {
                job.advance(RelayStage::Failed);
                tracing::warn!(
                    "Relay {} via {} failed at {}: {}",
                    kind,
                    self.client.provider_id(),
                    failure.step,
                    failure.error
                );
                Err(failure)
            }
        }
    }

    async fn drive(
        &self,
        job: &mut ConversionJob,
        output_path: &Path,
    ) -> Result<StagedFile, RelayFailure> {
        let uploaded = self
            .client
            .upload_file(&job.source_path)
            .await
            .map_err(|e| RelayFailure::new(RelayStep::Upload, e))?;
        job.remote_upload_url = Some(uploaded.clone());
        job.advance(RelayStage::Uploaded);

        let result = self
            .client
            .request_conversion(&uploaded, job.kind)
            .await
            .map_err(|e| RelayFailure::new(RelayStep::Convert, e))?;
        job.remote_result_url = Some(result.clone());
        job.advance(RelayStage::Converted);

        self.client
            .fetch_result(&result, output_path)
            .await
            .map_err(|e| RelayFailure::new(RelayStep::Fetch, e))?;
        let staged = self
            .staging
            .adopt(output_path.to_path_buf())
            .await
            .map_err(|e| RelayFailure::new(RelayStep::Fetch, e))?;
        job.advance(RelayStage::Downloaded);

        Ok(staged)
    }
}
