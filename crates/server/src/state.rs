use echotext_common::AppConfig;
use echotext_store::TranscriptionStore;
use echotext_stt::{Backend, EngineLoader, SpeechEngine};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::pipeline::TranscriptionPipeline;
use crate::staging::AudioStager;

/// Process-wide handle to the shared speech engine.
///
/// Empty until startup finishes loading a backend; emptied again at shutdown.
#[derive(Default)]
pub struct EngineSlot {
    engine: RwLock<Option<Arc<dyn SpeechEngine>>>,
}

impl EngineSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an engine available to requests
    pub async fn install(&self, engine: Arc<dyn SpeechEngine>) {
        info!("Speech engine ready on {}", engine.backend());
        *self.engine.write().await = Some(engine);
    }

    /// Shared engine, or `None` while still loading
    pub async fn get(&self) -> Option<Arc<dyn SpeechEngine>> {
        self.engine.read().await.clone()
    }

    pub async fn backend(&self) -> Option<Backend> {
        self.engine.read().await.as_ref().map(|e| e.backend())
    }

    /// Drop the shared engine; in-flight requests keep their own reference
    pub async fn clear(&self) -> bool {
        let released = self.engine.write().await.take().is_some();
        if released {
            info!("Speech engine released");
        }
        released
    }
}

/// Shared application state
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,

    /// Transcription history
    pub store: Arc<TranscriptionStore>,

    /// Shared speech engine
    pub engine: Arc<EngineSlot>,

    /// Upload → transcript → record
    pub pipeline: TranscriptionPipeline,
}

impl AppState {
    /// Create new application state with an empty engine slot
    pub fn new(
        config: AppConfig,
        store: TranscriptionStore,
        loader: Arc<dyn EngineLoader>,
    ) -> Self {
        let config = Arc::new(config);
        let store = Arc::new(store);
        let engine = Arc::new(EngineSlot::new());
        let stager = AudioStager::new(&config.upload_dir, &config.work_dir);

        let pipeline = TranscriptionPipeline::new(
            config.clone(),
            stager,
            store.clone(),
            engine.clone(),
            loader,
        );

        Self {
            config,
            store,
            engine,
            pipeline,
        }
    }
}
