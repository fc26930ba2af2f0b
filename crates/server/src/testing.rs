//! Scripted engines and fixtures shared by the server tests

use echotext_common::{AppConfig, EchoTextError, Result};
use echotext_store::TranscriptionStore;
use echotext_stt::{Backend, EngineLoader, RawSegment, SegmentStream, SpeechEngine};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use crate::state::AppState;

enum Script {
    Segments(Vec<(f64, f64, &'static str)>),
    Accelerator(String),
    Transcription(String),
}

/// Engine that replays fixed segments or a fixed failure
pub struct ScriptedEngine {
    backend: Backend,
    script: Script,
    seen: Mutex<Vec<Vec<u8>>>,
}

impl ScriptedEngine {
    pub fn ok(backend: Backend, segments: Vec<(f64, f64, &'static str)>) -> Arc<Self> {
        Self::with_script(backend, Script::Segments(segments))
    }

    pub fn failing(backend: Backend, error: EchoTextError) -> Arc<Self> {
        let script = match error {
            EchoTextError::Accelerator(msg) => Script::Accelerator(msg),
            EchoTextError::Transcription(msg) => Script::Transcription(msg),
            other => Script::Transcription(other.to_string()),
        };
        Self::with_script(backend, script)
    }

    fn with_script(backend: Backend, script: Script) -> Arc<Self> {
        Arc::new(Self {
            backend,
            script,
            seen: Mutex::new(Vec::new()),
        })
    }

    /// Contents of the working copy at each invocation
    pub fn seen_bytes(&self) -> Vec<Vec<u8>> {
        self.seen.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

impl SpeechEngine for ScriptedEngine {
    fn backend(&self) -> Backend {
        self.backend
    }

    fn segments(&self, audio_path: &Path) -> Result<SegmentStream<'_>> {
        let bytes = std::fs::read(audio_path)?;
        self.seen.lock().unwrap().push(bytes);

        match &self.script {
            Script::Segments(segments) => Ok(Box::new(segments.iter().map(|(start, end, text)| {
                Ok(RawSegment {
                    start: *start,
                    end: *end,
                    text: text.to_string(),
                })
            }))),
            Script::Accelerator(msg) => Err(EchoTextError::accelerator(msg.clone())),
            Script::Transcription(msg) => Err(EchoTextError::transcription(msg.clone())),
        }
    }
}

/// Loader handing out one prepared engine, or failing every load
pub struct FakeLoader {
    engine: Option<Arc<ScriptedEngine>>,
    failures_left: Mutex<usize>,
    loads: Mutex<Vec<Backend>>,
}

impl FakeLoader {
    pub fn returning(engine: Arc<ScriptedEngine>) -> Arc<Self> {
        Self::flaky(engine, 0)
    }

    /// Fails the first `failures` loads, then hands out `engine`
    pub fn flaky(engine: Arc<ScriptedEngine>, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            engine: Some(engine),
            failures_left: Mutex::new(failures),
            loads: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            engine: None,
            failures_left: Mutex::new(0),
            loads: Mutex::new(Vec::new()),
        })
    }

    pub fn loads(&self) -> Vec<Backend> {
        self.loads.lock().unwrap().clone()
    }
}

impl EngineLoader for FakeLoader {
    fn load(&self, backend: Backend) -> Result<Arc<dyn SpeechEngine>> {
        self.loads.lock().unwrap().push(backend);

        let mut failures_left = self.failures_left.lock().unwrap();
        if *failures_left > 0 {
            *failures_left -= 1;
            return Err(EchoTextError::transcription("model file missing"));
        }

        match &self.engine {
            Some(engine) => Ok(engine.clone()),
            None => Err(EchoTextError::transcription("model file missing")),
        }
    }
}

/// Engine that blocks every call until opened, tracking how many run at once
#[derive(Default)]
pub struct GatedEngine {
    open: AtomicBool,
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl GatedEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SpeechEngine for GatedEngine {
    fn backend(&self) -> Backend {
        Backend::fallback()
    }

    fn segments(&self, _audio_path: &Path) -> Result<SegmentStream<'_>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        while !self.open.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(2));
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(Box::new(std::iter::empty()))
    }
}

/// Upload and work directories under one temporary root
pub struct TestDirs {
    root: TempDir,
}

impl TestDirs {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("uploads")).unwrap();
        std::fs::create_dir(root.path().join("work")).unwrap();
        Self { root }
    }

    pub fn uploads(&self) -> PathBuf {
        self.root.path().join("uploads")
    }

    pub fn work(&self) -> PathBuf {
        self.root.path().join("work")
    }

    pub fn upload_entries(&self) -> usize {
        std::fs::read_dir(self.uploads()).unwrap().count()
    }

    pub fn work_entries(&self) -> usize {
        std::fs::read_dir(self.work()).unwrap().count()
    }

    pub fn config(&self) -> AppConfig {
        AppConfig {
            db_path: self.root.path().join("transcriptions.db"),
            upload_dir: self.uploads(),
            work_dir: self.work(),
            models_dir: self.root.path().join("models"),
            log_dir: self.root.path().join("log"),
            ..AppConfig::default()
        }
    }
}

/// State over an in-memory store with an empty engine slot
pub fn test_state(dirs: &TestDirs, loader: Arc<FakeLoader>) -> AppState {
    test_state_with(dirs.config(), loader)
}

pub fn test_state_with(config: AppConfig, loader: Arc<FakeLoader>) -> AppState {
    let store = TranscriptionStore::open_in_memory().unwrap();
    AppState::new(config, store, loader)
}
