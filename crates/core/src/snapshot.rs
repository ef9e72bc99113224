//! Hot-reloadable configuration snapshots.
//!
//! Prompts, model selection, and voice selection can change while requests
//! are in flight. The store is single-writer copy-and-swap: a poller task
//! watches the backing JSON file's mtime, parses a complete new snapshot
//! off to the side, and swaps it in over a `watch` channel. Readers call
//! [`ConfigStore::current`] and never block; they see either the old or the
//! new snapshot, never a partial one. A malformed file on reload is logged
//! and the previous valid snapshot is retained.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::watch;

use crate::error::{Error, Result};

/// One immutable, internally-consistent view of the dynamic configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    /// System prompt template; `{context}` is replaced with retrieved chunks.
    pub system_prompt: String,
    /// Reply substituted when all generation tiers fail or output is blocked.
    pub fallback_response: String,
    /// Reply substituted when the input is rejected by the safety gate.
    pub blocked_input_response: String,
    /// Generation model name.
    pub model_name: String,
    /// Sampling temperature.
    pub model_temperature: f32,
    /// Token cap for replies.
    pub model_max_tokens: u32,
    /// Preferred synthesis provider name.
    pub tts_provider: String,
    /// Default synthesis voice.
    pub tts_default_voice: String,
    /// Default synthesis speed multiplier.
    pub tts_speed: f32,
    /// Version string from the backing file.
    pub version: String,
    /// When this snapshot was loaded.
    pub loaded_at: DateTime<Utc>,
}

impl ConfigSnapshot {
    /// Render the system prompt with the retrieved context injected.
    pub fn system_prompt_with_context(&self, context: &str) -> String {
        self.system_prompt.replace("{context}", context)
    }
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            fallback_response: DEFAULT_FALLBACK_RESPONSE.to_string(),
            blocked_input_response: DEFAULT_BLOCKED_INPUT_RESPONSE.to_string(),
            model_name: "gpt-4o-mini".to_string(),
            model_temperature: 0.7,
            model_max_tokens: 500,
            tts_provider: "kokoro".to_string(),
            tts_default_voice: "af_heart".to_string(),
            tts_speed: 1.0,
            version: "default".to_string(),
            loaded_at: Utc::now(),
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = "\
You are Docent, a friendly guide answering visitor questions.\n\
Use only the context below. If the context is not sufficient to answer,\n\
say you don't know and suggest asking about something else.\n\n\
Context:\n{context}";

const DEFAULT_FALLBACK_RESPONSE: &str =
    "Oops! Let's talk about something else. What would you like to learn about?";

const DEFAULT_BLOCKED_INPUT_RESPONSE: &str =
    "Hmm, I'm not sure about that question! Ask me about any of the exhibits instead.";

// =============================================================================
// Backing file shape
// =============================================================================

#[derive(Debug, Deserialize, Default)]
struct SnapshotFile {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    prompts: PromptsSection,
    #[serde(default)]
    model: ModelSection,
    #[serde(default)]
    tts: TtsSection,
}

#[derive(Debug, Deserialize, Default)]
struct PromptsSection {
    system_prompt: Option<String>,
    fallback_response: Option<String>,
    blocked_input_response: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelSection {
    name: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct TtsSection {
    provider: Option<String>,
    default_voice: Option<String>,
    speed: Option<f32>,
}

impl SnapshotFile {
    fn into_snapshot(self) -> ConfigSnapshot {
        let defaults = ConfigSnapshot::default();
        ConfigSnapshot {
            system_prompt: self
                .prompts
                .system_prompt
                .unwrap_or(defaults.system_prompt),
            fallback_response: self
                .prompts
                .fallback_response
                .unwrap_or(defaults.fallback_response),
            blocked_input_response: self
                .prompts
                .blocked_input_response
                .unwrap_or(defaults.blocked_input_response),
            model_name: self.model.name.unwrap_or(defaults.model_name),
            model_temperature: self
                .model
                .temperature
                .unwrap_or(defaults.model_temperature),
            model_max_tokens: self.model.max_tokens.unwrap_or(defaults.model_max_tokens),
            tts_provider: self.tts.provider.unwrap_or(defaults.tts_provider),
            tts_default_voice: self
                .tts
                .default_voice
                .unwrap_or(defaults.tts_default_voice),
            tts_speed: self.tts.speed.unwrap_or(defaults.tts_speed),
            version: self.version.unwrap_or(defaults.version),
            loaded_at: Utc::now(),
        }
    }
}

fn read_snapshot(path: &std::path::Path) -> Result<ConfigSnapshot> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::ConfigLoadFailed(format!("{}: {}", path.display(), e)))?;
    let file: SnapshotFile = serde_json::from_str(&raw)
        .map_err(|e| Error::ConfigLoadFailed(format!("{}: {}", path.display(), e)))?;
    Ok(file.into_snapshot())
}

// =============================================================================
// Store & poller
// =============================================================================

/// Read handle to the current snapshot. Cheap to clone; reads never block.
#[derive(Clone)]
pub struct ConfigStore {
    rx: watch::Receiver<Arc<ConfigSnapshot>>,
    // Present only for fixed stores, which have no poller holding the sender.
    _tx: Option<Arc<watch::Sender<Arc<ConfigSnapshot>>>>,
}

impl ConfigStore {
    /// Load the initial snapshot from `path` (built-in defaults when the
    /// file is missing or malformed) and return the store together with the
    /// poller that keeps it fresh. Spawn the poller with
    /// [`ConfigPoller::run`].
    pub fn new(path: impl Into<PathBuf>, poll_interval: Duration) -> (Self, ConfigPoller) {
        let path = path.into();
        let initial = match read_snapshot(&path) {
            Ok(snapshot) => {
                tracing::info!(path = %path.display(), version = %snapshot.version, "Dynamic config loaded");
                snapshot
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Dynamic config unavailable, using defaults");
                ConfigSnapshot::default()
            }
        };
        let last_modified = file_mtime(&path);

        let (tx, rx) = watch::channel(Arc::new(initial));
        (
            Self { rx, _tx: None },
            ConfigPoller {
                tx,
                path,
                poll_interval,
                last_modified,
            },
        )
    }

    /// A store pinned to a fixed snapshot, mainly for tests.
    pub fn fixed(snapshot: ConfigSnapshot) -> Self {
        let (tx, rx) = watch::channel(Arc::new(snapshot));
        Self {
            rx,
            _tx: Some(Arc::new(tx)),
        }
    }

    /// The current snapshot. Non-blocking; never observes a partial reload.
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.rx.borrow().clone()
    }
}

/// Single writer refreshing the snapshot when the backing file changes.
pub struct ConfigPoller {
    tx: watch::Sender<Arc<ConfigSnapshot>>,
    path: PathBuf,
    poll_interval: Duration,
    last_modified: Option<SystemTime>,
}

impl ConfigPoller {
    /// Poll loop; runs until the last `ConfigStore` handle is dropped.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if self.tx.is_closed() {
                return;
            }
            self.poll_once();
        }
    }

    /// One mtime check + reload. The new snapshot is fully parsed before
    /// the swap; on parse failure the previous snapshot is retained.
    pub fn poll_once(&mut self) {
        let modified = file_mtime(&self.path);
        if modified == self.last_modified {
            return;
        }
        self.last_modified = modified;

        match read_snapshot(&self.path) {
            Ok(snapshot) => {
                tracing::info!(
                    path = %self.path.display(),
                    version = %snapshot.version,
                    model = %snapshot.model_name,
                    "Dynamic config reloaded"
                );
                let _ = self.tx.send(Arc::new(snapshot));
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Dynamic config reload failed, keeping previous snapshot"
                );
            }
        }
    }
}

fn file_mtime(path: &std::path::Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(path: &std::path::Path, model: &str, version: &str) {
        let mut f = std::fs::File::create(path).unwrap();
        write!(
            f,
            r#"{{
                "version": "{version}",
                "prompts": {{"system_prompt": "Prompt {version}: {{context}}"}},
                "model": {{"name": "{model}", "temperature": 0.5, "max_tokens": 1000}},
                "tts": {{"provider": "openai", "default_voice": "nova", "speed": 1.5}}
            }}"#
        )
        .unwrap();
        f.sync_all().unwrap();
    }

    #[test]
    fn missing_file_yields_defaults() {
        let (store, _poller) =
            ConfigStore::new("/tmp/docent_missing_config_404.json", Duration::from_secs(5));
        let snapshot = store.current();
        assert_eq!(snapshot.model_name, "gpt-4o-mini");
        assert_eq!(snapshot.model_temperature, 0.7);
        assert_eq!(snapshot.model_max_tokens, 500);
        assert_eq!(snapshot.tts_provider, "kokoro");
        assert_eq!(snapshot.tts_default_voice, "af_heart");
    }

    #[test]
    fn loads_values_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admin.json");
        write_config(&path, "gpt-4o", "1.0");

        let (store, _poller) = ConfigStore::new(&path, Duration::from_secs(5));
        let snapshot = store.current();
        assert_eq!(snapshot.model_name, "gpt-4o");
        assert_eq!(snapshot.model_temperature, 0.5);
        assert_eq!(snapshot.model_max_tokens, 1000);
        assert_eq!(snapshot.tts_default_voice, "nova");
        assert_eq!(snapshot.tts_speed, 1.5);
        assert_eq!(snapshot.version, "1.0");
    }

    #[test]
    fn reload_swaps_in_new_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admin.json");
        write_config(&path, "gpt-4o-mini", "1.0");

        let (store, mut poller) = ConfigStore::new(&path, Duration::from_millis(10));
        assert_eq!(store.current().model_name, "gpt-4o-mini");

        write_config(&path, "gpt-4o", "2.0");
        poller.poll_once();

        let snapshot = store.current();
        assert_eq!(snapshot.model_name, "gpt-4o");
        assert_eq!(snapshot.version, "2.0");
    }

    #[test]
    fn malformed_reload_retains_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admin.json");
        write_config(&path, "gpt-4o", "1.0");

        let (store, mut poller) = ConfigStore::new(&path, Duration::from_millis(10));

        std::fs::write(&path, "{ this is not json").unwrap();
        poller.poll_once();

        let snapshot = store.current();
        assert_eq!(snapshot.model_name, "gpt-4o");
        assert_eq!(snapshot.version, "1.0");
    }

    #[tokio::test]
    async fn concurrent_reads_see_consistent_snapshots() {
        // model_name and version are written in lockstep; a reader must
        // never observe a mix of the two.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admin.json");
        write_config(&path, "model-1", "1");

        let (store, mut poller) = ConfigStore::new(&path, Duration::from_millis(1));

        let reader = {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..500 {
                    let snapshot = store.current();
                    let suffix = snapshot.model_name.strip_prefix("model-").unwrap();
                    assert_eq!(suffix, snapshot.version);
                    tokio::task::yield_now().await;
                }
            })
        };

        for round in 2..20 {
            write_config(&path, &format!("model-{round}"), &round.to_string());
            poller.poll_once();
            tokio::task::yield_now().await;
        }

        reader.await.unwrap();
    }
}
