use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use utoipa::ToSchema;

/// A file held in the staging directory, either an inbound upload or a
/// downloaded conversion result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size: u64,
}

/// Opaque URL handed out by the remote API for an uploaded source or a
/// converted result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteFileRef(String);

impl RemoteFileRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteFileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The supported format pairs. Each one backs exactly one relay endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ConversionKind {
    PdfToWord,
    WordToPdf,
    PdfToExcel,
    ExcelToPdf,
    PdfToPpt,
    PptToPdf,
}

impl ConversionKind {
    pub const ALL: [ConversionKind; 6] = [
        ConversionKind::PdfToWord,
        ConversionKind::WordToPdf,
        ConversionKind::PdfToExcel,
        ConversionKind::ExcelToPdf,
        ConversionKind::PdfToPpt,
        ConversionKind::PptToPdf,
    ];

    /// Route the relay endpoint is mounted at.
    pub fn route(self) -> &'static str {
        match self {
            ConversionKind::PdfToWord => "/api/pdf-to-word",
            ConversionKind::WordToPdf => "/api/word-to-pdf",
            ConversionKind::PdfToExcel => "/api/pdf-to-excel",
            ConversionKind::ExcelToPdf => "/api/excel-to-pdf",
            ConversionKind::PdfToPpt => "/api/pdf-to-ppt",
            ConversionKind::PptToPdf => "/api/ppt-to-pdf",
        }
    }

    /// Upstream conversion endpoint, relative to `{base}/v1/`.
    pub fn upstream_endpoint(self) -> &'static str {
        match self {
            ConversionKind::PdfToWord => "pdf/convert/to/doc",
            ConversionKind::WordToPdf => "pdf/convert/from/doc",
            ConversionKind::PdfToExcel => "pdf/convert/to/xls",
            ConversionKind::ExcelToPdf => "pdf/convert/from/xls",
            ConversionKind::PdfToPpt => "pdf/convert/to/pptx",
            // PowerPoint input goes through the generic office-document converter.
            ConversionKind::PptToPdf => "pdf/convert/from/doc",
        }
    }

    pub fn output_extension(self) -> &'static str {
        match self {
            ConversionKind::PdfToWord => "docx",
            ConversionKind::PdfToExcel => "xlsx",
            ConversionKind::PdfToPpt => "pptx",
            ConversionKind::WordToPdf | ConversionKind::ExcelToPdf | ConversionKind::PptToPdf => {
                "pdf"
            }
        }
    }

    pub fn output_content_type(self) -> &'static str {
        match self.output_extension() {
            "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            _ => "application/pdf",
        }
    }

    /// Filename announced to the caller in `Content-Disposition`.
    pub fn output_filename(self) -> String {
        format!("converted.{}", self.output_extension())
    }
}

impl fmt::Display for ConversionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.route().trim_start_matches("/api/"))
    }
}

/// Per-request relay state: `Received -> Staged -> Uploaded -> Converted ->
/// Downloaded -> Delivered`, or `Failed` from any step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayStage {
    Received,
    Staged,
    Uploaded,
    Converted,
    Downloaded,
    Delivered,
    Failed,
}

/// The step that was being attempted when a relay failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RelayStep {
    Receive,
    Stage,
    Upload,
    Convert,
    Fetch,
    Deliver,
}

impl RelayStep {
    pub fn as_str(self) -> &'static str {
        match self {
            RelayStep::Receive => "receive",
            RelayStep::Stage => "stage",
            RelayStep::Upload => "upload",
            RelayStep::Convert => "convert",
            RelayStep::Fetch => "fetch",
            RelayStep::Deliver => "deliver",
        }
    }
}

impl fmt::Display for RelayStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bookkeeping for one in-flight relay. Never persisted.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub kind: ConversionKind,
    pub source_path: PathBuf,
    pub remote_upload_url: Option<RemoteFileRef>,
    pub remote_result_url: Option<RemoteFileRef>,
    pub stage: RelayStage,
}

impl ConversionJob {
    pub fn new(kind: ConversionKind, source_path: PathBuf) -> Self {
        Self {
            kind,
            source_path,
            remote_upload_url: None,
            remote_result_url: None,
            stage: RelayStage::Received,
        }
    }

    /// Move to `stage`, logging the transition.
    pub fn advance(&mut self, stage: RelayStage) {
        tracing::debug!(
            "Relay {} for {}: {:?} -> {:?}",
            self.kind,
            self.source_path.display(),
            self.stage,
            stage
        );
        self.stage = stage;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_filenames_match_target_format() {
        assert_eq!(ConversionKind::PdfToWord.output_filename(), "converted.docx");
        assert_eq!(ConversionKind::PdfToExcel.output_filename(), "converted.xlsx");
        assert_eq!(ConversionKind::PdfToPpt.output_filename(), "converted.pptx");
        assert_eq!(ConversionKind::WordToPdf.output_filename(), "converted.pdf");
        assert_eq!(ConversionKind::ExcelToPdf.output_filename(), "converted.pdf");
        assert_eq!(ConversionKind::PptToPdf.output_filename(), "converted.pdf");
    }

    #[test]
    fn test_routes_are_unique() {
        let mut routes: Vec<_> = ConversionKind::ALL.iter().map(|k| k.route()).collect();
        routes.sort();
        routes.dedup();
        assert_eq!(routes.len(), ConversionKind::ALL.len());
    }

    #[test]
    fn test_kind_display_uses_route_slug() {
        assert_eq!(ConversionKind::PptToPdf.to_string(), "ppt-to-pdf");
    }
}
