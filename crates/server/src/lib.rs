//! EchoText HTTP Server
//!
//! Actix-web 기반 REST API: 업로드 → 전사 → 기록 저장

pub mod error;
pub mod pipeline;
pub mod routes;
pub mod staging;
pub mod state;
pub mod types;

#[cfg(test)]
mod testing;

use actix_cors::Cors;
use actix_files::Files;
use actix_web::{web, App, HttpServer};
use echotext_common::{AppConfig, EchoTextError, ModelManager, Result};
use echotext_store::TranscriptionStore;
use echotext_stt::{select_backend, EngineLoader, GpuDevice, SpeechEngine, WhisperLoader};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;

pub use state::{AppState, EngineSlot};

/// Register shared state, API routes and the `/audio` static mount
pub fn configure_app(cfg: &mut web::ServiceConfig, state: &Arc<AppState>) {
    cfg.app_data(web::Data::new(state.clone()));
    routes::configure(cfg);
    cfg.service(Files::new("/audio", &state.config.upload_dir));
}

/// Run the HTTP server until shutdown.
///
/// The listener comes up immediately; `POST /transcribe` answers 503 until
/// the speech model finishes loading in the background.
pub async fn start_server(config: AppConfig) -> Result<()> {
    config.ensure_directories()?;

    let store = TranscriptionStore::open(&config.db_path)?;
    info!("Database ready at {}", config.db_path.display());

    let models = ModelManager::new(config.models_dir.clone())?;
    let loader = Arc::new(WhisperLoader {
        accelerated_model: models.model_path(&config.whisper_model),
        fallback_model: models.model_path(&config.fallback_model),
        language: config.language.clone(),
    });

    let state = Arc::new(AppState::new(config, store, loader.clone()));
    let loading = tokio::spawn(load_engine(
        models,
        state.config.clone(),
        loader,
        state.engine.clone(),
    ));

    let bind_addr = state.config.server_bind_address();
    info!("Starting HTTP server on {}", bind_addr);

    let app_state = state.clone();
    let server = HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .wrap(TracingLogger::default())
            .configure(|cfg| configure_app(cfg, &app_state))
    })
    .bind(&bind_addr)?
    .run();

    let result = server.await;

    loading.abort();
    state.engine.clear().await;
    info!("Server stopped");

    result?;
    Ok(())
}

/// First delay before retrying a failed model load
const LOAD_RETRY_INITIAL: Duration = Duration::from_secs(5);

/// Upper bound on the delay between model load attempts
const LOAD_RETRY_MAX: Duration = Duration::from_secs(300);

/// Fetch model files, then load and install the shared engine.
///
/// Failures are retried with exponential backoff until a backend is installed
/// or the server shuts down; `POST /transcribe` answers 503 meanwhile.
async fn load_engine(
    models: ModelManager,
    config: Arc<AppConfig>,
    loader: Arc<WhisperLoader>,
    slot: Arc<EngineSlot>,
) {
    let prefer_accelerator = config.prefers_accelerator() && GpuDevice::detect().is_accelerated();

    install_with_retry(&slot, LOAD_RETRY_INITIAL, LOAD_RETRY_MAX, || {
        prepare_and_select(&models, &config, loader.clone(), prefer_accelerator)
    })
    .await;
}

/// Download whatever model files are missing, then pick a backend
async fn prepare_and_select(
    models: &ModelManager,
    config: &AppConfig,
    loader: Arc<WhisperLoader>,
    prefer_accelerator: bool,
) -> Result<Arc<dyn SpeechEngine>> {
    models.ensure_whisper_model(&config.fallback_model).await?;

    if prefer_accelerator {
        // a missing accelerated model just means loading falls through to CPU
        if let Err(e) = models.ensure_whisper_model(&config.whisper_model).await {
            warn!("Failed to prepare model {}: {}", config.whisper_model, e);
        }
    }

    select_on_blocking_pool(loader, prefer_accelerator).await
}

/// Run `attempt` until it yields an engine, doubling the delay after each failure
async fn install_with_retry<F, Fut>(slot: &EngineSlot, initial: Duration, max: Duration, mut attempt: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Arc<dyn SpeechEngine>>>,
{
    let mut delay = initial;
    let mut attempts = 1u32;

    loop {
        match attempt().await {
            Ok(engine) => {
                slot.install(engine).await;
                return;
            }
            Err(e) => error!(
                "Failed to load speech model (attempt {}): {}. Retrying in {:?}",
                attempts, e, delay
            ),
        }

        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(max);
        attempts += 1;
    }
}

/// Select a backend on the blocking pool
async fn select_on_blocking_pool(
    loader: Arc<dyn EngineLoader>,
    prefer_accelerator: bool,
) -> Result<Arc<dyn SpeechEngine>> {
    tokio::task::spawn_blocking(move || select_backend(loader.as_ref(), prefer_accelerator))
        .await
        .map_err(|e| EchoTextError::internal(format!("Model loading task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_state, FakeLoader, ScriptedEngine, TestDirs};
    use actix_web::http::header::CONTENT_TYPE;
    use actix_web::{http::StatusCode, test};
    use echotext_stt::Backend;
    use serde_json::Value;

    const BOUNDARY: &str = "----echotextboundary";

    fn multipart_body(field: &str, filename: &str, bytes: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(field: &str, filename: &str, bytes: &[u8]) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/transcribe")
            .insert_header((
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(multipart_body(field, filename, bytes))
    }

    fn ready_state(dirs: &TestDirs) -> Arc<AppState> {
        Arc::new(test_state(dirs, FakeLoader::failing()))
    }

    async fn install_sample_engine(state: &AppState) {
        state
            .engine
            .install(ScriptedEngine::ok(
                Backend::fallback(),
                vec![(0.0, 1.2, " hello"), (1.2, 2.5, " world"), (2.5, 4.0, " test")],
            ))
            .await;
    }

    #[actix_web::test]
    async fn test_status_reports_readiness() {
        let dirs = TestDirs::new();
        let state = ready_state(&dirs);
        let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &state))).await;

        let body: Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["message"], "EchoText API is ready");
        assert_eq!(body["model_ready"], false);

        install_sample_engine(&state).await;
        let body: Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(body["model_ready"], true);
        assert_eq!(body["backend"]["device"], "cpu");
        assert_eq!(body["backend"]["precision"], "int8");
    }

    #[actix_web::test]
    async fn test_transcribe_and_history_flow() {
        let dirs = TestDirs::new();
        let state = ready_state(&dirs);
        install_sample_engine(&state).await;
        let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &state))).await;

        let resp = test::call_service(&app, upload_request("file", "sample.wav", b"RIFFdata").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["transcript"], "hello world test");
        assert_eq!(body["filename"], "sample.wav");
        assert_eq!(body["segments"].as_array().unwrap().len(), 3);
        assert_eq!(body["segments"][1]["text"], "world");
        let id = body["id"].as_i64().unwrap();
        let audio_url = body["audio_url"].as_str().unwrap().to_string();

        // Stored audio is served back under /audio
        let audio_path = audio_url.strip_prefix("http://127.0.0.1:8000").unwrap();
        let resp = test::call_service(&app, test::TestRequest::get().uri(audio_path).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await.as_ref(), b"RIFFdata");

        let history: Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/history").to_request()).await;
        let records = history.as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["id"], id);
        assert_eq!(records[0]["audio_path"], audio_url.as_str());

        let record: Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get().uri(&format!("/history/{id}")).to_request(),
        )
        .await;
        assert_eq!(record["transcript"], "hello world test");

        for _ in 0..2 {
            let body: Value = test::call_and_read_body_json(
                &app,
                test::TestRequest::delete().uri(&format!("/history/{id}")).to_request(),
            )
            .await;
            assert_eq!(body, serde_json::json!({ "status": "ok", "deleted": id }));
        }

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri(&format!("/history/{id}")).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(dirs.work_entries(), 0);
    }

    #[actix_web::test]
    async fn test_invalid_extension_is_bad_request() {
        let dirs = TestDirs::new();
        let state = ready_state(&dirs);
        install_sample_engine(&state).await;
        let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &state))).await;

        let resp = test::call_service(&app, upload_request("file", "notes.txt", b"hello").to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["detail"], "Invalid file type.");
        assert_eq!(dirs.upload_entries(), 0);
    }

    #[actix_web::test]
    async fn test_transcribe_before_model_ready() {
        let dirs = TestDirs::new();
        let state = ready_state(&dirs);
        let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &state))).await;

        let resp = test::call_service(&app, upload_request("file", "sample.mp3", b"ID3").to_request()).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["detail"], "Model is loading...");
    }

    #[actix_web::test]
    async fn test_missing_file_field() {
        let dirs = TestDirs::new();
        let state = ready_state(&dirs);
        install_sample_engine(&state).await;
        let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &state))).await;

        let resp = test::call_service(&app, upload_request("attachment", "sample.wav", b"x").to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["detail"], "No file uploaded");
    }

    #[actix_web::test]
    async fn test_empty_history() {
        let dirs = TestDirs::new();
        let state = ready_state(&dirs);
        let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &state))).await;

        let body: Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/history").to_request()).await;
        assert_eq!(body, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_select_uses_fallback_without_accelerator() {
        let engine = ScriptedEngine::ok(Backend::fallback(), Vec::new());
        let loader = FakeLoader::returning(engine);

        let selected = select_on_blocking_pool(loader.clone(), false).await.unwrap();

        assert_eq!(selected.backend(), Backend::fallback());
        assert_eq!(loader.loads(), vec![Backend::fallback()]);
    }

    #[tokio::test]
    async fn test_failed_loads_are_retried_until_ready() {
        let engine = ScriptedEngine::ok(Backend::fallback(), Vec::new());
        let loader = FakeLoader::flaky(engine, 2);
        let slot = EngineSlot::new();

        install_with_retry(&slot, Duration::from_millis(1), Duration::from_millis(4), || {
            select_on_blocking_pool(loader.clone(), false)
        })
        .await;

        assert_eq!(slot.backend().await, Some(Backend::fallback()));
        assert_eq!(loader.loads().len(), 3);
    }

    #[tokio::test]
    async fn test_slot_stays_empty_while_loads_keep_failing() {
        let loader = FakeLoader::failing();
        let slot = Arc::new(EngineSlot::new());

        let retrying = {
            let slot = slot.clone();
            let loader = loader.clone();
            tokio::spawn(async move {
                install_with_retry(&slot, Duration::from_millis(1), Duration::from_millis(2), || {
                    select_on_blocking_pool(loader.clone(), false)
                })
                .await
            })
        };

        while loader.loads().len() < 3 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        retrying.abort();

        assert!(slot.get().await.is_none());
    }
}
