use crate::models::{ConversionKind, RemoteFileRef};
use crate::services::error::RelayResult;
use async_trait::async_trait;
use std::path::Path;

/// The three calls made against the remote conversion API, always in the
/// order upload -> convert -> fetch.
#[async_trait]
pub trait ConversionClient: Send + Sync {
    /// Provider identifier (e.g., "pdfco")
    fn provider_id(&self) -> &'static str;

    /// Send a local file to the remote API and get back its reference.
    async fn upload_file(&self, local_path: &Path) -> RelayResult<RemoteFileRef>;

    /// Run a synchronous conversion of an uploaded file.
    async fn request_conversion(
        &self,
        source: &RemoteFileRef,
        kind: ConversionKind,
    ) -> RelayResult<RemoteFileRef>;

    /// Download a converted result into `destination`. Returns bytes written.
    async fn fetch_result(&self, result: &RemoteFileRef, destination: &Path) -> RelayResult<u64>;
}

pub mod pdfco;
