//! Voice conversion: re-voices base speech with the trained character model.
//!
//! Inference runs inside an Applio installation; this module only hands it paths
//! and the fixed inference settings.

use crate::config::ConversionConfig;
use crate::error::{YukiError, YukiResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::info;

/// Inference settings applied to every conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionParams {
    pub model_path: PathBuf,
    pub index_path: PathBuf,
    /// Semitone transpose.
    pub pitch: i32,
    /// Pitch extraction method (e.g. rmvpe).
    pub f0_method: String,
    /// Feature index blend rate, 0.0..=1.0.
    pub index_rate: f32,
    /// Consonant/breath protection, 0.0..=0.5.
    pub protect: f32,
    pub sid: u32,
    pub embedder_model: String,
    pub export_format: String,
}

impl From<&ConversionConfig> for ConversionParams {
    fn from(c: &ConversionConfig) -> Self {
        Self {
            model_path: c.model_path.clone(),
            index_path: c.index_path.clone(),
            pitch: c.pitch,
            f0_method: c.f0_method.clone(),
            index_rate: c.index_rate,
            protect: c.protect,
            sid: c.sid,
            embedder_model: c.embedder_model.clone(),
            export_format: c.export_format.clone(),
        }
    }
}

/// One conversion job.
#[derive(Debug, Clone, Copy)]
pub struct ConversionRequest<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub params: &'a ConversionParams,
}

/// Backend that writes a converted file to `request.output`.
#[async_trait]
pub trait VoiceConversionBackend: Send + Sync {
    async fn convert(&self, request: ConversionRequest<'_>) -> YukiResult<()>;

    /// Startup check: the artifacts named in `params` and the tooling must be resolvable.
    fn ensure_ready(&self, _params: &ConversionParams) -> YukiResult<()> {
        Ok(())
    }
}

/// Applio's `core.py infer` command line.
#[derive(Debug, Clone)]
pub struct ApplioCommand {
    python: String,
    applio_root: PathBuf,
    script: String,
}

impl ApplioCommand {
    pub fn new(config: &ConversionConfig) -> Self {
        Self {
            python: config.python.clone(),
            applio_root: config.applio_root.clone(),
            script: config.script.clone(),
        }
    }

    fn script_path(&self) -> PathBuf {
        self.applio_root.join(&self.script)
    }

    /// Arguments passed after the interpreter. The process runs inside
    /// `applio_root`, so every path is made absolute first.
    pub fn args(&self, request: &ConversionRequest<'_>) -> Vec<String> {
        let p = request.params;
        vec![
            self.script.clone(),
            "infer".to_string(),
            "--input_path".to_string(),
            absolute(request.input),
            "--output_path".to_string(),
            absolute(request.output),
            "--pth_path".to_string(),
            absolute(&p.model_path),
            "--index_path".to_string(),
            absolute(&p.index_path),
            "--pitch".to_string(),
            p.pitch.to_string(),
            "--f0_method".to_string(),
            p.f0_method.clone(),
            "--index_rate".to_string(),
            p.index_rate.to_string(),
            "--protect".to_string(),
            p.protect.to_string(),
            "--sid".to_string(),
            p.sid.to_string(),
            "--embedder_model".to_string(),
            p.embedder_model.clone(),
            "--export_format".to_string(),
            p.export_format.clone(),
        ]
    }
}

fn absolute(path: &Path) -> String {
    if path.is_absolute() {
        return path.display().to_string();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

#[async_trait]
impl VoiceConversionBackend for ApplioCommand {
    async fn convert(&self, request: ConversionRequest<'_>) -> YukiResult<()> {
        info!("Converting {} with {}", request.input.display(), request.params.model_path.display());
        let output = Command::new(&self.python)
            .args(self.args(&request))
            .current_dir(&self.applio_root)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| YukiError::Conversion(format!("failed to spawn {}: {}", self.python, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr.lines().rev().take(5).collect::<Vec<_>>().join(" | ");
            return Err(YukiError::Conversion(format!(
                "Applio infer exited with {}: {}",
                output.status, tail
            )));
        }
        Ok(())
    }

    fn ensure_ready(&self, params: &ConversionParams) -> YukiResult<()> {
        if !self.applio_root.is_dir() {
            return Err(YukiError::Config(format!(
                "Applio root not found: {}",
                self.applio_root.display()
            )));
        }
        let script = self.script_path();
        if !script.is_file() {
            return Err(YukiError::Config(format!("Applio entry point not found: {}", script.display())));
        }
        for (label, path) in [("model", &params.model_path), ("index", &params.index_path)] {
            if path.as_os_str().is_empty() || !path.is_file() {
                return Err(YukiError::Config(format!(
                    "voice {} file not found: '{}'",
                    label,
                    path.display()
                )));
            }
        }
        let probe = std::process::Command::new(&self.python)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| YukiError::Config(format!("python interpreter '{}': {}", self.python, e)))?;
        if !probe.success() {
            return Err(YukiError::Config(format!("python interpreter '{}' is not usable", self.python)));
        }
        Ok(())
    }
}
