use thiserror::Error;

/// Everything that can go wrong while relaying one document.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("No file uploaded")]
    NoFileProvided,

    #[error("File exceeds the upload limit of {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Staging I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upstream rejected the API key: {0}")]
    Auth(String),

    #[error("Unusable upstream response: {0}")]
    Upstream(String),

    #[error("Conversion failed: {0}")]
    Conversion(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl RelayError {
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::NoFileProvided => "no_file_provided",
            RelayError::PayloadTooLarge { .. } => "payload_too_large",
            RelayError::Io(_) => "io_error",
            RelayError::Auth(_) => "auth_error",
            RelayError::Upstream(_) => "upstream_error",
            RelayError::Conversion(_) => "conversion_error",
            RelayError::Network(_) => "network_error",
        }
    }
}

pub type RelayResult<T> = Result<T, RelayError>;
