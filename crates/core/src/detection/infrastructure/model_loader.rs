//! Resolves and parses the three model artifacts the analyzer needs.
//!
//! The base URI points at a directory serving `face_detector.onnx`,
//! `face_landmark_68.onnx` and `face_expression.onnx`. Remote bases are
//! downloaded once into the user cache; local bases are used in place.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::shared::constants::{DETECTOR_MODEL_NAME, EXPRESSION_MODEL_NAME, LANDMARK_MODEL_NAME};

use super::model_resolver::{self, ModelResolveError};
use super::onnx_face_analyzer::OnnxFaceAnalyzer;
use super::onnx_session::open_session;

pub const MODEL_ARTIFACTS: [&str; 3] = [
    DETECTOR_MODEL_NAME,
    LANDMARK_MODEL_NAME,
    EXPRESSION_MODEL_NAME,
];

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("invalid model base URI: {0}")]
    InvalidBaseUri(String),

    #[error("model artifact {artifact} not found at {}", path.display())]
    Missing { artifact: String, path: PathBuf },

    #[error("failed to fetch model artifact {artifact}: {source}")]
    Fetch {
        artifact: String,
        #[source]
        source: ModelResolveError,
    },

    #[error("failed to parse model artifact {artifact}: {message}")]
    Parse { artifact: String, message: String },
}

/// Load progress: `(artifact, bytes_downloaded, total_bytes)`. Only remote
/// artifacts that are not cached report progress.
pub type LoadProgressFn = Arc<dyn Fn(&str, u64, u64) + Send + Sync>;

/// Where the artifacts live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelSource {
    /// Base URL without a trailing slash.
    Remote(String),
    Local(PathBuf),
}

impl ModelSource {
    pub fn parse(base_uri: &str) -> Result<Self, ModelLoadError> {
        let uri = base_uri.trim();
        if uri.is_empty() {
            return Err(ModelLoadError::InvalidBaseUri(base_uri.to_string()));
        }
        if uri.starts_with("http://") || uri.starts_with("https://") {
            let trimmed = uri.trim_end_matches('/');
            let host = trimmed.split_once("://").map_or("", |(_, rest)| rest);
            if host.is_empty() {
                return Err(ModelLoadError::InvalidBaseUri(base_uri.to_string()));
            }
            return Ok(Self::Remote(trimmed.to_string()));
        }
        if let Some(path) = uri.strip_prefix("file://") {
            if path.is_empty() {
                return Err(ModelLoadError::InvalidBaseUri(base_uri.to_string()));
            }
            return Ok(Self::Local(PathBuf::from(path)));
        }
        if uri.contains("://") {
            return Err(ModelLoadError::InvalidBaseUri(base_uri.to_string()));
        }
        Ok(Self::Local(PathBuf::from(uri)))
    }
}

/// Local paths of the three artifacts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelArtifacts {
    pub detector: PathBuf,
    pub landmarks: PathBuf,
    pub expressions: PathBuf,
}

/// Makes every artifact available on disk, downloading remote ones.
pub fn resolve_artifacts(
    base_uri: &str,
    progress: Option<LoadProgressFn>,
) -> Result<ModelArtifacts, ModelLoadError> {
    let source = ModelSource::parse(base_uri)?;
    let resolve_one = |artifact: &str| -> Result<PathBuf, ModelLoadError> {
        match &source {
            ModelSource::Local(dir) => local_artifact(dir, artifact),
            ModelSource::Remote(base) => {
                let url = format!("{base}/{artifact}");
                let cb = progress.clone().map(|p| {
                    let name = artifact.to_string();
                    Box::new(move |done: u64, total: u64| p(&name, done, total))
                        as model_resolver::ProgressFn
                });
                model_resolver::resolve(artifact, &url, cb).map_err(|source| {
                    ModelLoadError::Fetch {
                        artifact: artifact.to_string(),
                        source,
                    }
                })
            }
        }
    };

    Ok(ModelArtifacts {
        detector: resolve_one(DETECTOR_MODEL_NAME)?,
        landmarks: resolve_one(LANDMARK_MODEL_NAME)?,
        expressions: resolve_one(EXPRESSION_MODEL_NAME)?,
    })
}

fn local_artifact(dir: &Path, artifact: &str) -> Result<PathBuf, ModelLoadError> {
    let path = dir.join(artifact);
    if path.is_file() {
        Ok(path)
    } else {
        Err(ModelLoadError::Missing {
            artifact: artifact.to_string(),
            path,
        })
    }
}

/// Parses resolved artifacts into an analyzer.
pub fn load_artifacts(
    artifacts: &ModelArtifacts,
    confidence: f64,
) -> Result<OnnxFaceAnalyzer, ModelLoadError> {
    let parse = |artifact: &str, path: &Path| {
        open_session(path).map_err(|e| ModelLoadError::Parse {
            artifact: artifact.to_string(),
            message: e.to_string(),
        })
    };
    let detector = parse(DETECTOR_MODEL_NAME, &artifacts.detector)?;
    let landmarks = parse(LANDMARK_MODEL_NAME, &artifacts.landmarks)?;
    let expressions = parse(EXPRESSION_MODEL_NAME, &artifacts.expressions)?;
    Ok(OnnxFaceAnalyzer::new(
        detector,
        landmarks,
        expressions,
        confidence,
    ))
}

/// Resolves and parses all artifacts. There is no retry; the caller decides
/// whether to try again.
pub fn load_models(
    base_uri: &str,
    confidence: f64,
    progress: Option<LoadProgressFn>,
) -> Result<OnnxFaceAnalyzer, ModelLoadError> {
    let artifacts = resolve_artifacts(base_uri, progress)?;
    let analyzer = load_artifacts(&artifacts, confidence)?;
    log::info!("Models loaded from {base_uri}");
    Ok(analyzer)
}
