use crate::pipeline::{default_model_dir, ModelPaths};
use crate::projection::ProjectionParams;
use serde::{Serialize, Serializer};
use std::path::PathBuf;
use thiserror::Error;

const DEFAULT_FONT_PATH: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("TELEGRAM_TOKEN is not set (environment or .env)")]
    MissingToken,
}

/// Runtime configuration, loaded from environment variables.
#[derive(Clone, Serialize)]
pub struct Config {
    /// Bot API token.
    #[serde(serialize_with = "mask_token")]
    pub telegram_token: Option<String>,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// One sub-directory per celebrity, each holding reference photos.
    pub celebs_dir: PathBuf,
    /// Largest Euclidean embedding distance still accepted as a known face.
    pub match_distance: f32,
    /// TrueType font for labels on rendered images.
    pub font_path: PathBuf,
    pub tsne_perplexity: f32,
    pub tsne_epochs: usize,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("telegram_token", &self.telegram_token.as_ref().map(|_| "***"))
            .field("model_dir", &self.model_dir)
            .field("celebs_dir", &self.celebs_dir)
            .field("match_distance", &self.match_distance)
            .field("font_path", &self.font_path)
            .field("tsne_perplexity", &self.tsne_perplexity)
            .field("tsne_epochs", &self.tsne_epochs)
            .finish()
    }
}

fn mask_token<S: Serializer>(token: &Option<String>, s: S) -> Result<S::Ok, S::Error> {
    match token {
        Some(_) => s.serialize_str("***"),
        None => s.serialize_none(),
    }
}

impl Config {
    /// Load configuration from `TELEGRAM_TOKEN` and `FACEBOT_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let path = |key: &str, default: PathBuf| lookup(key).map(PathBuf::from).unwrap_or(default);
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<f64>().ok());

        let defaults = ProjectionParams::default();
        Self {
            telegram_token: lookup("TELEGRAM_TOKEN").filter(|t| !t.trim().is_empty()),
            model_dir: path("FACEBOT_MODEL_DIR", default_model_dir()),
            celebs_dir: path("FACEBOT_CELEBS_DIR", PathBuf::from("celebs")),
            match_distance: parsed("FACEBOT_MATCH_DISTANCE").map(|v| v as f32).unwrap_or(1.10),
            font_path: path("FACEBOT_FONT_PATH", PathBuf::from(DEFAULT_FONT_PATH)),
            tsne_perplexity: parsed("FACEBOT_TSNE_PERPLEXITY")
                .map(|v| v as f32)
                .filter(|v| *v > 0.0)
                .unwrap_or(defaults.perplexity),
            tsne_epochs: lookup("FACEBOT_TSNE_EPOCHS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.epochs),
        }
    }

    pub fn require_token(&self) -> Result<&str, ConfigError> {
        self.telegram_token.as_deref().ok_or(ConfigError::MissingToken)
    }

    pub fn model_paths(&self) -> ModelPaths {
        ModelPaths::in_dir(&self.model_dir)
    }

    pub fn projection(&self) -> ProjectionParams {
        ProjectionParams { perplexity: self.tsne_perplexity, epochs: self.tsne_epochs }
    }
}
