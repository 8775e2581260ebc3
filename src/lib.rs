pub mod api;
pub mod config;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::api::handlers::{convert, health};
use crate::config::RelayConfig;
use crate::models::ConversionKind;
use crate::services::relay::ConversionRelay;
use crate::services::remote::ConversionClient;
use crate::services::staging::StagingStore;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::root,
        api::handlers::health::health_check,
        api::handlers::convert::pdf_to_word,
        api::handlers::convert::word_to_pdf,
        api::handlers::convert::pdf_to_excel,
        api::handlers::convert::excel_to_pdf,
        api::handlers::convert::pdf_to_ppt,
        api::handlers::convert::ppt_to_pdf,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            api::handlers::convert::ConversionUpload,
            api::error::ErrorResponse,
            models::RelayStep,
        )
    ),
    tags(
        (name = "convert", description = "Document conversion relay endpoints"),
        (name = "system", description = "Liveness and health")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: RelayConfig,
    pub staging: Arc<StagingStore>,
    /// Present only when an upstream credential is configured.
    pub relay: Option<Arc<ConversionRelay>>,
}

impl AppState {
    pub fn new(
        config: RelayConfig,
        staging: Arc<StagingStore>,
        client: Option<Arc<dyn ConversionClient>>,
    ) -> Self {
        let relay = client.map(|client| {
            Arc::new(ConversionRelay::new(
                staging.clone(),
                client,
                config.deletion_delay,
            ))
        });
        Self {
            config,
            staging,
            relay,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>,
             latency: std::time::Duration,
             _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(health::root))
        .route("/api/health", get(health::health_check))
        .route(ConversionKind::PdfToWord.route(), post(convert::pdf_to_word))
        .route(ConversionKind::WordToPdf.route(), post(convert::word_to_pdf))
        .route(ConversionKind::PdfToExcel.route(), post(convert::pdf_to_excel))
        .route(ConversionKind::ExcelToPdf.route(), post(convert::excel_to_pdf))
        .route(ConversionKind::PdfToPpt.route(), post(convert::pdf_to_ppt))
        .route(ConversionKind::PptToPdf.route(), post(convert::ppt_to_pdf))
        .layer(cors_layer(&state.config))
        .layer(DefaultBodyLimit::max(state.config.body_limit()))
        .layer(trace_layer)
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .with_state(state)
}

fn cors_layer(config: &RelayConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    if config.allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}
