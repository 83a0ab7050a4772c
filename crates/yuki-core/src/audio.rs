//! Audio pipeline: base speech → voice conversion → cached final artifact.
//!
//! Base audio never outlives its turn. Final audio stays in the cache directory
//! (served to the browser) until [`AudioCache::purge`] ages it out.

use crate::conversion::{ConversionParams, ConversionRequest, VoiceConversionBackend};
use crate::error::YukiResult;
use crate::speech::SpeechBackend;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};

/// Leftover base files older than this are treated as orphans by the purge.
const STALE_BASE_AGE: Duration = Duration::from_secs(15 * 60);

/// Paths for one turn's artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub base: PathBuf,
    pub final_path: PathBuf,
    pub final_name: String,
}

/// Outcome of a cache purge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub removed: usize,
    pub kept: usize,
}

/// Directory holding generated audio.
#[derive(Debug, Clone)]
pub struct AudioCache {
    dir: PathBuf,
    stem: String,
    /// Per-process sequence; separates turns rendered in the same millisecond.
    seq: Arc<AtomicU64>,
}

impl AudioCache {
    pub fn new(dir: impl Into<PathBuf>, stem: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            stem: stem.into(),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the cache directory if needed.
    pub fn prepare(&self) -> YukiResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// `base_{stem}_{millis}_{seq}.wav` and `{stem}_{millis}_{seq}.wav`. Every
    /// call yields fresh names, even for the same `millis`.
    pub fn artifact_paths(&self, millis: i64) -> ArtifactPaths {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let final_name = format!("{}_{}_{}.wav", self.stem, millis, seq);
        ArtifactPaths {
            base: self.dir.join(format!("base_{}", final_name)),
            final_path: self.dir.join(&final_name),
            final_name,
        }
    }

    fn is_final(&self, name: &str) -> bool {
        name.starts_with(&format!("{}_", self.stem)) && name.ends_with(".wav")
    }

    fn is_base(&self, name: &str) -> bool {
        name.starts_with(&format!("base_{}_", self.stem)) && name.ends_with(".wav")
    }

    /// Remove final audio older than `max_age`, then the oldest beyond `max_files`.
    /// Orphaned base files are removed as well.
    pub async fn purge(&self, max_age: Duration, max_files: usize) -> YukiResult<PurgeReport> {
        let now = SystemTime::now();
        let mut finals: Vec<(SystemTime, PathBuf)> = Vec::new();
        let mut report = PurgeReport::default();

        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            let modified = meta.modified().unwrap_or(now);
            let age = now.duration_since(modified).unwrap_or_default();

            if self.is_base(&name) {
                if age > STALE_BASE_AGE && remove_quietly(&entry.path()).await {
                    report.removed += 1;
                }
            } else if self.is_final(&name) {
                if age > max_age {
                    if remove_quietly(&entry.path()).await {
                        report.removed += 1;
                    }
                } else {
                    finals.push((modified, entry.path()));
                }
            }
        }

        finals.sort_by(|a, b| b.0.cmp(&a.0));
        for (_, path) in finals.iter().skip(max_files) {
            if remove_quietly(path).await {
                report.removed += 1;
            }
        }
        report.kept = finals.len().min(max_files);
        Ok(report)
    }
}

async fn remove_quietly(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Could not delete {}: {}", path.display(), e);
            false
        }
    }
}

/// True when `path` is a regular file with content.
pub async fn is_non_empty_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

/// Two-stage synthesis: base voice, then character voice conversion.
pub struct AudioPipeline {
    speech: Arc<dyn SpeechBackend>,
    converter: Arc<dyn VoiceConversionBackend>,
    cache: AudioCache,
    base_voice: String,
    params: ConversionParams,
}

impl AudioPipeline {
    pub fn new(
        speech: Arc<dyn SpeechBackend>,
        converter: Arc<dyn VoiceConversionBackend>,
        cache: AudioCache,
        base_voice: impl Into<String>,
        params: ConversionParams,
    ) -> Self {
        Self {
            speech,
            converter,
            cache,
            base_voice: base_voice.into(),
            params,
        }
    }

    pub fn cache(&self) -> &AudioCache {
        &self.cache
    }

    /// Produce the final audio for `text`. Returns its file name, or `None` when
    /// either stage failed. Never returns an error.
    pub async fn render(&self, text: &str) -> Option<String> {
        info!("Generating voice for: '{}'", text);
        let paths = self.cache.artifact_paths(chrono::Utc::now().timestamp_millis());

        if let Err(e) = self.speech.synthesize(text, &self.base_voice, &paths.base).await {
            error!("Base speech synthesis failed: {}", e);
        }
        if !is_non_empty_file(&paths.base).await {
            warn!("Base audio missing or empty: {}", paths.base.display());
            self.discard_base(&paths.base).await;
            return None;
        }

        let result = self.convert(&paths).await;
        self.discard_base(&paths.base).await;
        result
    }

    async fn convert(&self, paths: &ArtifactPaths) -> Option<String> {
        let request = ConversionRequest {
            input: &paths.base,
            output: &paths.final_path,
            params: &self.params,
        };
        if let Err(e) = self.converter.convert(request).await {
            error!("Voice conversion failed: {}", e);
            return None;
        }
        if !is_non_empty_file(&paths.final_path).await {
            warn!(
                "Voice conversion ran but output is missing or empty: {}",
                paths.final_path.display()
            );
            return None;
        }
        info!("Converted audio ready: {}", paths.final_path.display());
        Some(paths.final_name.clone())
    }

    async fn discard_base(&self, base: &Path) {
        if tokio::fs::try_exists(base).await.unwrap_or(false) && remove_quietly(base).await {
            debug!("Cleaned up temporary base audio: {}", base.display());
        }
    }
}
