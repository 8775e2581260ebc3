use crate::config::RelayConfig;
use crate::services::remote::ConversionClient;
use crate::services::remote::pdfco::PdfCoClient;
use std::sync::Arc;
use tracing::{info, warn};

/// Build the conversion client. Without a credential there is no client and
/// every conversion endpoint stays closed.
pub fn setup_client(config: &RelayConfig) -> anyhow::Result<Option<Arc<dyn ConversionClient>>> {
    let Some(api_key) = config.pdfco_api_key.as_deref() else {
        warn!("🔒 PDFCO_API_KEY is not set; conversion endpoints will answer 503");
        return Ok(None);
    };

    let client: Arc<dyn ConversionClient> = Arc::new(PdfCoClient::new(
        &config.pdfco_base_url,
        api_key,
        config.upstream_timeout,
    )?);
    info!("☁️  Conversion API: {}", config.pdfco_base_url);
    Ok(Some(client))
}
