//! Service wiring and the HTTP router.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, Method},
    routing::get,
    Router,
};
use prometheus::Registry;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use covenant_approval_workflow::{default_ladder, load_levels_file, ApprovalMetrics, ApprovalService};
use covenant_database::{initialize_cache, initialize_store, BlobStore, Cache, FsBlobStore, RecordStore};
use covenant_document_processing::{
    CompletionClient, DocumentPipeline, DocumentTextExtractor, EntityNormalizer, ExtractionGateway, OpenAiClient,
    PipelineCoordinator, PipelineMetrics, PipelineQueue, TextExtractor,
};
use covenant_reconciliation::{ReconciliationMetrics, ValidationOrchestrator};
use covenant_utils::{AppConfig, CovenantError, CovenantResult};

use crate::handlers::{health_check, metrics_handler};
use crate::middleware::{request_id_middleware, REQUEST_ID_HEADER};
use crate::routes;

/// Multipart framing allowance on top of the file size limit; the
/// coordinator enforces the file limit itself.
const BODY_OVERHEAD_BYTES: u64 = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub coordinator: PipelineCoordinator,
    pub approvals: ApprovalService,
    pub registry: Registry,
    pub config: Arc<AppConfig>,
}

/// External collaborators the services are built on.
pub struct Backends {
    pub store: Arc<dyn RecordStore>,
    pub cache: Arc<dyn Cache>,
    pub blobs: Arc<dyn BlobStore>,
    pub client: Arc<dyn CompletionClient>,
    pub text: Arc<dyn TextExtractor>,
}

impl Backends {
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let store = initialize_store(&config.database).await?;
        let cache = initialize_cache(&config.cache, &config.database.redis_url).await?;
        let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(&config.pipeline.storage_dir));
        let client: Arc<dyn CompletionClient> =
            Arc::new(OpenAiClient::new(&config.extraction).context("Failed to build extraction client")?);

        Ok(Self {
            store,
            cache,
            blobs,
            client,
            text: Arc::new(DocumentTextExtractor::new()),
        })
    }
}

/// Build every service, seed the approval ladder and start the pipeline
/// workers. The returned queue must be shut down by the caller.
pub async fn build_state(config: &AppConfig, backends: Backends) -> CovenantResult<(AppState, PipelineQueue)> {
    let Backends {
        store,
        cache,
        blobs,
        client,
        text,
    } = backends;

    let registry = Registry::new_custom(Some(config.monitoring.prometheus_namespace.clone()), None)
        .map_err(|e| CovenantError::configuration(format!("invalid metrics namespace: {}", e)))?;
    let metrics_enabled = config.monitoring.metrics_enabled;

    let mut approvals = ApprovalService::new(store.clone(), cache.clone(), config.approval.clone());
    if metrics_enabled {
        approvals = approvals.with_metrics(ApprovalMetrics::register(&registry)?);
    }
    let levels = match &config.approval.levels_file {
        Some(path) => load_levels_file(path)?,
        None => default_ladder(),
    };
    approvals.seed_levels(levels).await?;

    let mut orchestrator = ValidationOrchestrator::new(store.clone(), approvals.clone());
    if metrics_enabled {
        orchestrator = orchestrator.with_metrics(ReconciliationMetrics::register(&registry)?);
    }

    let pipeline_metrics = if metrics_enabled {
        Some(PipelineMetrics::register(&registry)?)
    } else {
        None
    };

    let mut pipeline = DocumentPipeline::new(
        store.clone(),
        blobs.clone(),
        text,
        ExtractionGateway::new(client, &config.extraction),
        EntityNormalizer::new(store.clone(), cache),
        orchestrator.clone(),
    );
    if let Some(metrics) = &pipeline_metrics {
        pipeline = pipeline.with_metrics(metrics.clone());
    }

    let queue = PipelineQueue::start(pipeline, config.pipeline.workers, config.pipeline.queue_capacity);
    let mut coordinator = PipelineCoordinator::new(
        store.clone(),
        blobs,
        orchestrator,
        queue.clone(),
        &config.pipeline,
        config.server.max_upload_bytes,
    );
    if let Some(metrics) = pipeline_metrics {
        coordinator = coordinator.with_metrics(metrics);
    }

    let state = AppState {
        store,
        coordinator,
        approvals,
        registry,
        config: Arc::new(config.clone()),
    };
    Ok((state, queue))
}

pub fn create_app(state: AppState) -> Router {
    let config = state.config.clone();
    let body_limit = (config.server.max_upload_bytes + BODY_OVERHEAD_BYTES) as usize;

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .nest("/api/v1", routes::create_api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(config.server.timeout_seconds)))
                .layer(CompressionLayer::new())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods([Method::GET, Method::POST])
                        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(REQUEST_ID_HEADER)]),
                )
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}
