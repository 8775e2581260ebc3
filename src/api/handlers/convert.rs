use crate::AppState;
use crate::api::error::AppError;
use crate::models::{ConversionJob, ConversionKind, RelayStage, RelayStep, StagedFile};
use crate::services::error::RelayError;
use crate::services::relay::ConvertedFile;
use crate::services::staging::DeferredDeletion;
use axum::{
    body::{Body, Bytes},
    extract::{Multipart, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::Response,
};
use futures::{Stream, TryStreamExt};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::io::{ReaderStream, StreamReader};
use utoipa::ToSchema;

/// Multipart form accepted by every conversion endpoint.
#[derive(ToSchema)]
pub struct ConversionUpload {
    /// The document to convert
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

/// Run one relay: stage the upload, hand it to the converter, stream the result.
pub async fn convert(
    state: AppState,
    kind: ConversionKind,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let relay = state.relay.clone().ok_or_else(|| {
        AppError::ServiceUnavailable(
            "PDFCO_API_KEY is not configured; conversions are disabled".to_string(),
        )
    })?;

    let staged = receive_upload(&state, &mut multipart).await?;
    tracing::info!(
        "📥 {} staged {} ({} bytes)",
        kind,
        staged.path.display(),
        staged.size
    );

    let converted = relay.run(kind, staged).await?;
    deliver(converted).await
}

/// Stage the first non-empty `file` part. Nothing touches the disk when no
/// such part exists.
async fn receive_upload(
    state: &AppState,
    multipart: &mut Multipart,
) -> Result<StagedFile, AppError> {
    let limit = state.config.max_file_size;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() != Some("file") {
            continue;
        }
        // Browsers send an empty, unnamed part when no file was picked
        let original_filename = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => continue,
        };

        let reader = StreamReader::new(field.map_err(std::io::Error::other));
        return state
            .staging
            .save(reader, &original_filename, limit)
            .await
            .map_err(|e| stage_error(e, limit));
    }

    Err(AppError::relay(
        RelayStep::Receive,
        RelayError::NoFileProvided,
    ))
}

fn multipart_error(error: MultipartError, limit: usize) -> AppError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::relay(RelayStep::Receive, RelayError::PayloadTooLarge { limit })
    } else {
        AppError::BadRequest(error.body_text())
    }
}

/// Errors raised by the multipart body surface as I/O errors inside the
/// staging writer; unwrap them back into request errors.
fn stage_error(error: RelayError, limit: usize) -> AppError {
    if let RelayError::Io(io) = &error {
        if let Some(multipart) = io
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<MultipartError>())
        {
            if multipart.status() == StatusCode::PAYLOAD_TOO_LARGE {
                return AppError::relay(RelayStep::Stage, RelayError::PayloadTooLarge { limit });
            }
            return AppError::BadRequest(multipart.body_text());
        }
    }
    AppError::relay(RelayStep::Stage, error)
}

/// Response body over a staged result. Marks the job delivered once every
/// byte has been read; dropping it releases the deletion guard either way.
struct DeliveryStream {
    inner: ReaderStream<tokio::fs::File>,
    job: ConversionJob,
    remaining: u64,
    finished: bool,
    _cleanup: DeferredDeletion,
}

impl Stream for DeliveryStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = Pin::new(&mut self.inner).poll_next(cx);
        match &polled {
            Poll::Ready(Some(Ok(chunk))) => {
                self.remaining = self.remaining.saturating_sub(chunk.len() as u64);
                if self.remaining == 0 {
                    self.finished = true;
                }
            }
            Poll::Ready(None) => self.finished = true,
            _ => {}
        }
        polled
    }
}

impl Drop for DeliveryStream {
    fn drop(&mut self) {
        if self.finished {
            self.job.advance(RelayStage::Delivered);
            tracing::info!("📤 {} delivered", self.job.kind);
        } else {
            tracing::warn!("{} response ended before the last byte", self.job.kind);
        }
    }
}

async fn deliver(converted: ConvertedFile) -> Result<Response, AppError> {
    let ConvertedFile {
        staged,
        filename,
        content_type,
        job,
        cleanup,
    } = converted;

    let file = tokio::fs::File::open(&staged.path)
        .await
        .map_err(|e| AppError::relay(RelayStep::Deliver, e.into()))?;
    let body = DeliveryStream {
        inner: ReaderStream::new(file),
        job,
        remaining: staged.size,
        finished: false,
        _cleanup: cleanup,
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, staged.size)
        .header(header::CONTENT_DISPOSITION, content_disposition(&filename))
        .body(Body::from_stream(body))
        .map_err(|e| AppError::relay(RelayStep::Deliver, RelayError::Io(std::io::Error::other(e))))
}

pub(crate) fn content_disposition(filename: &str) -> String {
    let ascii_filename = filename
        .chars()
        .filter(|c| c.is_ascii() && !c.is_control() && *c != '"' && *c != '\\' && *c != ';')
        .collect::<String>();
    let fallback_filename = if ascii_filename.is_empty() {
        "converted"
    } else {
        &ascii_filename
    };
    let encoded_filename = utf8_percent_encode(filename, NON_ALPHANUMERIC).to_string();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback_filename, encoded_filename
    )
}

#[utoipa::path(
    post,
    path = "/api/pdf-to-word",
    request_body(content = ConversionUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "DOCX document, served as converted.docx"),
        (status = 400, description = "No file uploaded", body = crate::api::error::ErrorResponse),
        (status = 413, description = "Upload exceeds the size limit", body = crate::api::error::ErrorResponse),
        (status = 502, description = "Upstream conversion failed", body = crate::api::error::ErrorResponse),
        (status = 503, description = "Upstream credential not configured", body = crate::api::error::ErrorResponse)
    ),
    tag = "convert"
)]
pub async fn pdf_to_word(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    convert(state, ConversionKind::PdfToWord, multipart).await
}

#[utoipa::path(
    post,
    path = "/api/word-to-pdf",
    request_body(content = ConversionUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "PDF document, served as converted.pdf"),
        (status = 400, description = "No file uploaded", body = crate::api::error::ErrorResponse),
        (status = 413, description = "Upload exceeds the size limit", body = crate::api::error::ErrorResponse),
        (status = 502, description = "Upstream conversion failed", body = crate::api::error::ErrorResponse),
        (status = 503, description = "Upstream credential not configured", body = crate::api::error::ErrorResponse)
    ),
    tag = "convert"
)]
pub async fn word_to_pdf(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    convert(state, ConversionKind::WordToPdf, multipart).await
}

#[utoipa::path(
    post,
    path = "/api/pdf-to-excel",
    request_body(content = ConversionUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "XLSX workbook, served as converted.xlsx"),
        (status = 400, description = "No file uploaded", body = crate::api::error::ErrorResponse),
        (status = 413, description = "Upload exceeds the size limit", body = crate::api::error::ErrorResponse),
        (status = 502, description = "Upstream conversion failed", body = crate::api::error::ErrorResponse),
        (status = 503, description = "Upstream credential not configured", body = crate::api::error::ErrorResponse)
    ),
    tag = "convert"
)]
pub async fn pdf_to_excel(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    convert(state, ConversionKind::PdfToExcel, multipart).await
}

#[utoipa::path(
    post,
    path = "/api/excel-to-pdf",
    request_body(content = ConversionUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "PDF document, served as converted.pdf"),
        (status = 400, description = "No file uploaded", body = crate::api::error::ErrorResponse),
        (status = 413, description = "Upload exceeds the size limit", body = crate::api::error::ErrorResponse),
        (status = 502, description = "Upstream conversion failed", body = crate::api::error::ErrorResponse),
        (status = 503, description = "Upstream credential not configured", body = crate::api::error::ErrorResponse)
    ),
    tag = "convert"
)]
pub async fn excel_to_pdf(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    convert(state, ConversionKind::ExcelToPdf, multipart).await
}

#[utoipa::path(
    post,
    path = "/api/pdf-to-ppt",
    request_body(content = ConversionUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "PPTX presentation, served as converted.pptx"),
        (status = 400, description = "No file uploaded", body = crate::api::error::ErrorResponse),
        (status = 413, description = "Upload exceeds the size limit", body = crate::api::error::ErrorResponse),
        (status = 502, description = "Upstream conversion failed", body = crate::api::error::ErrorResponse),
        (status = 503, description = "Upstream credential not configured", body = crate::api::error::ErrorResponse)
    ),
    tag = "convert"
)]
pub async fn pdf_to_ppt(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    convert(state, ConversionKind::PdfToPpt, multipart).await
}

#[utoipa::path(
    post,
    path = "/api/ppt-to-pdf",
    request_body(content = ConversionUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "PDF document, served as converted.pdf"),
        (status = 400, description = "No file uploaded", body = crate::api::error::ErrorResponse),
        (status = 413, description = "Upload exceeds the size limit", body = crate::api::error::ErrorResponse),
        (status = 502, description = "Upstream conversion failed", body = crate::api::error::ErrorResponse),
        (status = 503, description = "Upstream credential not configured", body = crate::api::error::ErrorResponse)
    ),
    tag = "convert"
)]
pub async fn ppt_to_pdf(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    convert(state, ConversionKind::PptToPdf, multipart).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::staging::StagingStore;
    use futures::StreamExt;
    use std::sync::Arc;
    use std::time::Duration;

    async fn delivery_for(store: &Arc<StagingStore>, bytes: &[u8]) -> DeliveryStream {
        let staged = store.save(bytes, "out.docx", 1024).await.unwrap();
        let file = tokio::fs::File::open(&staged.path).await.unwrap();
        let mut job = ConversionJob::new(ConversionKind::PdfToWord, staged.path.clone());
        job.advance(RelayStage::Downloaded);
        DeliveryStream {
            inner: ReaderStream::new(file),
            job,
            remaining: staged.size,
            finished: false,
            _cleanup: store.defer_deletion(vec![staged.path], Duration::from_secs(60)),
        }
    }

    #[tokio::test]
    async fn test_delivery_completes_after_last_byte() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StagingStore::new(dir.path()));
        let mut body = delivery_for(&store, b"DOCX!").await;

        let chunk = body.next().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"DOCX!");
        assert!(body.finished);
        assert_eq!(store.pending_deletions(), 0);

        drop(body);
        assert_eq!(store.pending_deletions(), 1);
    }

    #[tokio::test]
    async fn test_unread_delivery_still_releases_staged_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StagingStore::new(dir.path()));
        let body = delivery_for(&store, b"DOCX!").await;

        assert!(!body.finished);
        drop(body);
        assert_eq!(store.pending_deletions(), 1);
    }

    #[test]
    fn test_content_disposition_names_file() {
        let value = content_disposition("converted.docx");
        assert!(value.starts_with("attachment; filename=\"converted.docx\""));
        assert!(value.contains("filename*=UTF-8''converted%2Edocx"));
    }
}
