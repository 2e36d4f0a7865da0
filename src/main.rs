use dsv_transcoder::state::{MemoryPresetStore, PresetStore, RedbPresetStore};
use dsv_transcoder::{AppConfig, AppState, DsvTranscoderServer};
use rmcp::{transport::stdio, ServiceExt};
use std::env;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load_or_default(Some("config.toml"));

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("dsv_transcoder={}", config.logging.level).parse()?);
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let args: Vec<String> = env::args().collect();

    tracing::info!("Loaded configuration: {:?}", config.server.name);

    let presets: Arc<dyn PresetStore> = match RedbPresetStore::new(&config.presets.db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!(error = %e, "Preset database unavailable, keeping presets in memory");
            Arc::new(MemoryPresetStore::new())
        }
    };
    let app_state = AppState::new(config.transcode.clone(), presets);

    if args.len() > 1 && args[1] == "--http" {
        let port = args
            .get(2)
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(9527);

        let bind_addr = args
            .get(3)
            .map(|s| s.as_str())
            .unwrap_or("127.0.0.1");

        run_http_server(app_state, bind_addr, port).await?;
    } else {
        tracing::info!("Starting MCP Server on stdio");
        let server = DsvTranscoderServer::new(app_state);
        let service = server.serve(stdio()).await?;
        service.waiting().await?;
    }

    tracing::info!("MCP Server shutting down");
    Ok(())
}

async fn run_http_server(app_state: AppState, bind_addr: &str, port: u16) -> anyhow::Result<()> {
    use axum::{
        extract::{Path, State},
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::{get, post},
        Json, Router,
    };
    use dsv_transcoder::server::{
        ApplyPresetParams, ExportColumnsParams, PreviewFileParams, SavePresetParams,
    };
    use dsv_transcoder::{ErrorKind, TranscodeError};
    use serde::Serialize;

    fn error_response(e: TranscodeError) -> Response {
        let status = match e.kind() {
            ErrorKind::Admission => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::Selection => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Decode => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Export | ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(serde_json::json!({"error": e.to_string(), "kind": e.kind()})),
        )
            .into_response()
    }

    fn respond<T: Serialize>(result: dsv_transcoder::Result<T>) -> Response {
        match result {
            Ok(value) => (StatusCode::OK, Json(value)).into_response(),
            Err(e) => error_response(e),
        }
    }

    async fn health() -> impl IntoResponse {
        Json(serde_json::json!({
            "status": "ok",
            "service": "dsv-transcoder",
            "version": env!("CARGO_PKG_VERSION")
        }))
    }

    async fn info() -> impl IntoResponse {
        Json(serde_json::json!({
            "name": "dsv-transcoder",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Streaming DSV to CSV column exporter - HTTP Mode",
            "endpoints": {
                "GET /health": "Health check",
                "GET /info": "Server info",
                "POST /preview": "Preview a file and open a session",
                "POST /export": "Export selected columns",
                "GET /progress/{session_id}": "Get export progress",
                "GET /presets": "List presets",
                "POST /presets": "Save a preset",
                "POST /presets/apply": "Apply a preset to a session",
                "DELETE /presets/{name}": "Delete a preset"
            }
        }))
    }

    async fn preview_handler(
        State(server): State<DsvTranscoderServer>,
        Json(params): Json<PreviewFileParams>,
    ) -> Response {
        respond(server.preview_file(params).await)
    }

    async fn export_handler(
        State(server): State<DsvTranscoderServer>,
        Json(params): Json<ExportColumnsParams>,
    ) -> Response {
        respond(server.export_columns(params).await)
    }

    async fn progress_handler(
        State(server): State<DsvTranscoderServer>,
        Path(session_id): Path<String>,
    ) -> Response {
        respond(server.progress(&session_id).await)
    }

    async fn list_presets_handler(State(server): State<DsvTranscoderServer>) -> Response {
        respond(server.state().presets.list())
    }

    async fn save_preset_handler(
        State(server): State<DsvTranscoderServer>,
        Json(params): Json<SavePresetParams>,
    ) -> Response {
        respond(server.save_preset(params).await)
    }

    async fn apply_preset_handler(
        State(server): State<DsvTranscoderServer>,
        Json(params): Json<ApplyPresetParams>,
    ) -> Response {
        respond(server.apply_preset(params).await)
    }

    async fn delete_preset_handler(
        State(server): State<DsvTranscoderServer>,
        Path(name): Path<String>,
    ) -> Response {
        match server.state().presets.delete(&name) {
            Ok(true) => (StatusCode::OK, Json(serde_json::json!({"deleted": name}))).into_response(),
            Ok(false) => error_response(TranscodeError::PresetNotFound(name)),
            Err(e) => error_response(e),
        }
    }

    let server = DsvTranscoderServer::new(app_state);

    let app = Router::new()
        .route("/health", get(health))
        .route("/info", get(info))
        .route("/preview", post(preview_handler))
        .route("/export", post(export_handler))
        .route("/progress/{session_id}", get(progress_handler))
        .route("/presets", get(list_presets_handler).post(save_preset_handler))
        .route("/presets/apply", post(apply_preset_handler))
        .route("/presets/{name}", axum::routing::delete(delete_preset_handler))
        .with_state(server);

    let addr = format!("{}:{}", bind_addr, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("HTTP Server listening on http://{}", addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                - Health check");
    tracing::info!("  GET  /info                  - Server info");
    tracing::info!("  POST /preview               - Preview a file");
    tracing::info!("  POST /export                - Export selected columns");
    tracing::info!("  GET  /progress/{{session_id}} - Export progress");
    tracing::info!("  GET|POST /presets           - List or save presets");
    tracing::info!("Example:");
    tracing::info!("  curl -X POST http://{}/preview -H 'Content-Type: application/json' -d '{{\"file_path\": \"/path/to/file.tsv\"}}'", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
