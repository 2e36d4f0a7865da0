pub mod presets;
pub mod session;

pub use presets::{ColumnPreset, MemoryPresetStore, PresetStore, RedbPresetStore};
pub use session::TranscodeSession;

use crate::utils::{Result, TranscodeError, TranscodeOptions};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Previewed,
    Exporting,
    Completed,
    Failed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Previewed => write!(f, "previewed"),
            SessionStatus::Exporting => write!(f, "exporting"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub options: TranscodeOptions,
    pub sessions: Arc<RwLock<HashMap<String, SessionState>>>,
    pub presets: Arc<dyn PresetStore>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(TranscodeOptions::default(), Arc::new(MemoryPresetStore::new()))
    }
}

impl AppState {
    pub fn new(options: TranscodeOptions, presets: Arc<dyn PresetStore>) -> Self {
        Self {
            options,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            presets,
        }
    }

    pub async fn insert_session(&self, session: TranscodeSession) -> String {
        let id = session.id().to_string();
        self.sessions
            .write()
            .await
            .insert(id.clone(), SessionState::new(session));
        id
    }

    /// A handle on the session. Handles share the export flag with the
    /// registry copy.
    pub async fn session(&self, session_id: &str) -> Result<TranscodeSession> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|s| s.session.clone())
            .ok_or_else(|| TranscodeError::SessionNotFound(session_id.to_string()))
    }

    pub async fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(SessionState::snapshot)
            .ok_or_else(|| TranscodeError::SessionNotFound(session_id.to_string()))
    }

    pub async fn update<F, T>(&self, session_id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut SessionState) -> Result<T>,
    {
        let mut sessions = self.sessions.write().await;
        let state = sessions
            .get_mut(session_id)
            .ok_or_else(|| TranscodeError::SessionNotFound(session_id.to_string()))?;
        f(state)
    }
}

/// Registry entry: the session plus the bookkeeping the adapter reports.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session: TranscodeSession,
    pub status: SessionStatus,
    pub progress: Arc<AtomicU8>,
    pub rows_written: usize,
    pub output_file: Option<String>,
    pub last_error: Option<String>,
    pub started_at: u64,
    pub finished_at: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub source_name: String,
    pub status: String,
    pub progress_percent: u8,
    pub rows_written: usize,
    pub output_file: Option<String>,
    pub last_error: Option<String>,
    pub elapsed_secs: u64,
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

impl SessionState {
    pub fn new(session: TranscodeSession) -> Self {
        Self {
            session,
            status: SessionStatus::Previewed,
            progress: Arc::new(AtomicU8::new(0)),
            rows_written: 0,
            output_file: None,
            last_error: None,
            started_at: unix_now(),
            finished_at: None,
        }
    }

    pub fn begin_export(&mut self, output_file: Option<String>) {
        self.status = SessionStatus::Exporting;
        self.progress.store(0, Ordering::Release);
        self.output_file = output_file;
        self.last_error = None;
        self.rows_written = 0;
        self.started_at = unix_now();
        self.finished_at = None;
    }

    pub fn complete(&mut self, rows_written: usize) {
        self.status = SessionStatus::Completed;
        self.progress.store(100, Ordering::Release);
        self.rows_written = rows_written;
        self.finished_at = Some(unix_now());
    }

    pub fn fail(&mut self, error: &TranscodeError) {
        self.status = SessionStatus::Failed;
        self.last_error = Some(error.to_string());
        self.finished_at = Some(unix_now());
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let end = self.finished_at.unwrap_or_else(unix_now);
        SessionSnapshot {
            session_id: self.session.id().to_string(),
            source_name: self.session.source_name().to_string(),
            status: self.status.to_string(),
            progress_percent: self.progress.load(Ordering::Acquire),
            rows_written: self.rows_written,
            output_file: self.output_file.clone(),
            last_error: self.last_error.clone(),
            elapsed_secs: end.saturating_sub(self.started_at),
        }
    }
}
