use facebot_core::{CelebrityGallery, DetectedFace, FacePipeline, ModelPaths, PipelineError};
use image::RgbImage;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("pipeline: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from bot handlers to the engine thread.
enum EngineRequest {
    Analyze {
        image: RgbImage,
        reply: oneshot::Sender<Result<Vec<DetectedFace>, EngineError>>,
    },
    LoadCelebrities {
        dir: PathBuf,
        reply: oneshot::Sender<Result<CelebrityGallery, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Detect every face in `image` and extract its embedding.
    pub async fn analyze(&self, image: RgbImage) -> Result<Vec<DetectedFace>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Analyze { image, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Scan a celebrity directory tree and encode one image per celebrity.
    pub async fn load_celebrities(&self, dir: PathBuf) -> Result<CelebrityGallery, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::LoadCelebrities { dir, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Load both ONNX models and spawn the engine on a dedicated OS thread.
///
/// ONNX sessions need `&mut` access, so all inference is serialized through
/// this one thread. Fails fast if a model cannot be loaded.
pub fn spawn_engine(models: &ModelPaths) -> Result<EngineHandle, EngineError> {
    let mut pipeline = FacePipeline::load(models)?;
    tracing::info!(
        detector = %models.detector.display(),
        recognizer = %models.recognizer.display(),
        "face models loaded"
    );

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(8);

    std::thread::Builder::new()
        .name("facebot-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Analyze { image, reply } => {
                        let result = pipeline.analyze(&image).map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                    EngineRequest::LoadCelebrities { dir, reply } => {
                        let result = pipeline.load_celebrities(&dir).map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}
